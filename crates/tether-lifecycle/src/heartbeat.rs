//! Claim refresh pacing.

use std::time::Duration;
use tokio::time::Instant;

/// Decides when output activity should refresh the claim.
///
/// The claim is refreshed on a chunk only when more than `interval` has
/// passed since the last refresh (or since the claim was written).
#[derive(Debug)]
pub struct Heartbeat {
    interval: Duration,
    last: Instant,
}

impl Heartbeat {
    /// Starts the timer now.
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last: Instant::now(),
        }
    }

    /// Records activity. Returns `true` when a refresh is due; the timer
    /// restarts in that case.
    pub fn beat(&mut self) -> bool {
        let now = Instant::now();
        if now.duration_since(self.last) > self.interval {
            self.last = now;
            true
        } else {
            false
        }
    }
}
