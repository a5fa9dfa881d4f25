//! In-process registry of resumable streams.

use crate::decoder::Utf8ChunkDecoder;
use crate::reader::ResumableReader;
use bytes::Bytes;
use futures_util::stream::BoxStream;
use futures_util::StreamExt;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::Arc;
use tether_core::{SessionId, TetherResult};
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Raw producer output handed to the registry.
pub type ByteStream = BoxStream<'static, TetherResult<Bytes>>;

/// Lifecycle of a registered stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamStatus {
    /// The producer is still running.
    Open,
    /// The producer finished.
    Completed,
    /// Delivery was cancelled through [`ResumableStream::cancel`].
    Cancelled,
    /// The producer failed.
    Failed(String),
}

impl StreamStatus {
    /// Whether no more chunks will be appended.
    pub fn is_closed(&self) -> bool {
        !matches!(self, StreamStatus::Open)
    }
}

pub(crate) struct EntryState {
    pub(crate) chunks: Vec<String>,
    pub(crate) status: StreamStatus,
}

/// Buffered output of one generation.
pub(crate) struct StreamEntry {
    pub(crate) session_id: SessionId,
    pub(crate) state: Mutex<EntryState>,
    pub(crate) notify: Notify,
    cancel: CancellationToken,
}

impl StreamEntry {
    fn new(session_id: SessionId) -> Self {
        Self {
            session_id,
            state: Mutex::new(EntryState {
                chunks: Vec::new(),
                status: StreamStatus::Open,
            }),
            notify: Notify::new(),
            cancel: CancellationToken::new(),
        }
    }

    fn push(&self, chunk: String) {
        self.state.lock().chunks.push(chunk);
        self.notify.notify_waiters();
    }

    fn close(&self, status: StreamStatus) {
        {
            let mut state = self.state.lock();
            if state.status.is_closed() {
                return;
            }
            state.status = status;
        }
        self.notify.notify_waiters();
    }

    fn is_open(&self) -> bool {
        !self.state.lock().status.is_closed()
    }

    fn len(&self) -> usize {
        self.state.lock().chunks.len()
    }
}

#[derive(Default)]
struct RegistryInner {
    entries: RwLock<HashMap<SessionId, Arc<StreamEntry>>>,
}

impl RegistryInner {
    fn remove_if_same(&self, session_id: &SessionId, entry: &Arc<StreamEntry>) {
        let mut entries = self.entries.write();
        if entries.get(session_id).is_some_and(|e| Arc::ptr_eq(e, entry)) {
            entries.remove(session_id);
        }
    }
}

/// Handle returned by [`StreamRegistry::create_new_resumable_stream`].
///
/// Carries a reader positioned at the join point and can cancel delivery for
/// every reader of the stream.
pub struct ResumableStream {
    reader: ResumableReader,
    cancel: CancellationToken,
}

impl ResumableStream {
    /// Session the stream belongs to.
    pub fn session_id(&self) -> &SessionId {
        self.reader.session_id()
    }

    /// Stops the producer and ends every reader promptly.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Token that cancels this stream; cheap to clone into callbacks.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Consumes the handle, keeping only the reader.
    pub fn into_reader(self) -> ResumableReader {
        self.reader
    }
}

/// Session-keyed registry of resumable streams.
///
/// Cloning is cheap; clones share the same entries. Entries are removed as
/// soon as their producer completes, fails or is cancelled.
#[derive(Clone, Default)]
pub struct StreamRegistry {
    inner: Arc<RegistryInner>,
}

impl StreamRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether an open stream is registered for the session.
    pub fn has_existing_stream(&self, session_id: &SessionId) -> bool {
        self.inner
            .entries
            .read()
            .get(session_id)
            .is_some_and(|e| e.is_open())
    }

    /// A reader on the open stream, positioned at the live point.
    ///
    /// `None` when the stream closed after a `has_existing_stream` check;
    /// callers treat that as "no stream" and may start fresh.
    pub fn resume_existing_stream(&self, session_id: &SessionId) -> Option<ResumableReader> {
        let entry = self.open_entry(session_id)?;
        let position = entry.len();
        debug!(session_id = %session_id, position, "Resuming stream");
        Some(ResumableReader::new(entry, position))
    }

    /// A reader on the open stream replaying from `offset` (clamped to the
    /// buffered length).
    pub fn resume_from(&self, session_id: &SessionId, offset: usize) -> Option<ResumableReader> {
        let entry = self.open_entry(session_id)?;
        let position = offset.min(entry.len());
        Some(ResumableReader::new(entry, position))
    }

    /// Registers a stream for the session.
    ///
    /// `producer` is invoked only if no open stream exists for the session;
    /// otherwise the existing stream is joined at its live point. Must be
    /// called from within a Tokio runtime.
    pub fn create_new_resumable_stream<F>(
        &self,
        session_id: &SessionId,
        producer: F,
    ) -> ResumableStream
    where
        F: FnOnce() -> ByteStream,
    {
        let (entry, source) = {
            let mut entries = self.inner.entries.write();
            match entries.get(session_id) {
                Some(existing) if existing.is_open() => (existing.clone(), None),
                _ => {
                    let entry = Arc::new(StreamEntry::new(session_id.clone()));
                    entries.insert(session_id.clone(), entry.clone());
                    (entry, Some(producer()))
                }
            }
        };

        let position = match source {
            Some(source) => {
                info!(session_id = %session_id, "Registered resumable stream");
                tokio::spawn(pump(self.inner.clone(), entry.clone(), source));
                0
            }
            None => {
                debug!(session_id = %session_id, "Stream already registered, joining");
                entry.len()
            }
        };

        ResumableStream {
            cancel: entry.cancel.clone(),
            reader: ResumableReader::new(entry, position),
        }
    }

    /// Cancels the open stream for the session. Returns whether one existed.
    pub fn cancel(&self, session_id: &SessionId) -> bool {
        match self.open_entry(session_id) {
            Some(entry) => {
                entry.cancel.cancel();
                true
            }
            None => false,
        }
    }

    /// Number of open streams.
    pub fn open_streams(&self) -> usize {
        self.inner
            .entries
            .read()
            .values()
            .filter(|e| e.is_open())
            .count()
    }

    fn open_entry(&self, session_id: &SessionId) -> Option<Arc<StreamEntry>> {
        self.inner
            .entries
            .read()
            .get(session_id)
            .filter(|e| e.is_open())
            .cloned()
    }
}

/// Drives a producer into its entry until it ends or is cancelled.
async fn pump(registry: Arc<RegistryInner>, entry: Arc<StreamEntry>, mut source: ByteStream) {
    let mut decoder = Utf8ChunkDecoder::new();
    let status = loop {
        tokio::select! {
            biased;
            _ = entry.cancel.cancelled() => break StreamStatus::Cancelled,
            item = source.next() => match item {
                Some(Ok(bytes)) => {
                    if let Some(text) = decoder.decode(&bytes) {
                        entry.push(text);
                    }
                }
                Some(Err(e)) => {
                    warn!(session_id = %entry.session_id, error = %e, "Stream producer failed");
                    break StreamStatus::Failed(e.to_string());
                }
                None => {
                    if let Some(text) = decoder.finish() {
                        entry.push(text);
                    }
                    break StreamStatus::Completed;
                }
            },
        }
    };

    info!(session_id = %entry.session_id, status = ?status, "Resumable stream closed");
    entry.close(status);
    registry.remove_if_same(&entry.session_id, &entry);
}
