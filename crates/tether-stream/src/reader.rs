//! Readers over a registered stream.

use crate::registry::{StreamEntry, StreamStatus};
use futures_util::Stream;
use std::sync::Arc;
use tether_core::SessionId;

/// A cursor over one registered stream.
///
/// Yields every chunk from its join point onward, in order, without gaps or
/// duplicates, and ends when the stream closes. A cancelled stream ends its
/// readers immediately, dropping chunks they have not read yet.
pub struct ResumableReader {
    entry: Arc<StreamEntry>,
    position: usize,
}

impl ResumableReader {
    pub(crate) fn new(entry: Arc<StreamEntry>, position: usize) -> Self {
        Self { entry, position }
    }

    /// Session the stream belongs to.
    pub fn session_id(&self) -> &SessionId {
        &self.entry.session_id
    }

    /// Index of the next chunk this reader will yield.
    pub fn position(&self) -> usize {
        self.position
    }

    /// Waits for the next chunk. `None` once the stream is closed and drained.
    pub async fn next_chunk(&mut self) -> Option<String> {
        loop {
            let notified = self.entry.notify.notified();
            tokio::pin!(notified);
            // Register interest before inspecting state so a push between the
            // check and the await is not missed.
            notified.as_mut().enable();

            {
                let state = self.entry.state.lock();
                if state.status == StreamStatus::Cancelled {
                    return None;
                }
                if let Some(chunk) = state.chunks.get(self.position) {
                    self.position += 1;
                    return Some(chunk.clone());
                }
                if state.status.is_closed() {
                    return None;
                }
            }

            notified.await;
        }
    }

    /// Reads until the stream closes.
    pub async fn collect(mut self) -> Vec<String> {
        let mut chunks = Vec::new();
        while let Some(chunk) = self.next_chunk().await {
            chunks.push(chunk);
        }
        chunks
    }

    /// Adapts the reader into a `Stream` of chunks.
    pub fn into_stream(self) -> impl Stream<Item = String> + Send + 'static {
        futures_util::stream::unfold(self, |mut reader| async move {
            reader.next_chunk().await.map(|chunk| (chunk, reader))
        })
    }
}
