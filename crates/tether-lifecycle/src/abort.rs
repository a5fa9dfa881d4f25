//! Cross-process abort signalling.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tether_coord::{CoordinationStore, Subscription};
use tether_core::{ControlEvent, SessionId};
use tether_stream::StreamRegistry;
use tracing::{debug, info};

/// Process-local should-abort flag for one generation.
///
/// Raised by the abort subscriber or by a same-process cancel; read by the
/// driver at step boundaries. Never stored remotely.
#[derive(Debug, Clone, Default)]
pub struct AbortFlag(Arc<AtomicBool>);

impl AbortFlag {
    /// A lowered flag.
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests a stop at the next step boundary. Idempotent.
    pub fn raise(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Whether a stop was requested.
    pub fn is_raised(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Whether both handles refer to the same generation's flag.
    pub fn same_as(&self, other: &AbortFlag) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

/// Listens on `events:<id>` and raises `flag` on `abort-stream`.
///
/// The registry stream is cancelled at the same time so readers end promptly.
/// `None` when the store is unreachable; the generation then only stops via a
/// same-process cancel.
pub async fn subscribe_abort(
    store: &CoordinationStore,
    session_id: &SessionId,
    flag: AbortFlag,
    registry: StreamRegistry,
) -> Option<Subscription> {
    let id = session_id.clone();
    let subscription = store
        .subscribe(&session_id.events_channel(), move |payload| {
            match ControlEvent::from_payload(&payload) {
                Some(ControlEvent::AbortStream) => {
                    info!(session_id = %id, "Abort requested");
                    flag.raise();
                    registry.cancel(&id);
                }
                None => debug!(session_id = %id, payload = %payload, "Ignoring unknown control event"),
            }
        })
        .await;
    if subscription.is_none() {
        debug!(session_id = %session_id, "No abort subscription, cross-process cancel unavailable");
    }
    subscription
}
