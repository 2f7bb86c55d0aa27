// =============================================================================
// Refresh gates — elapsed-time checks in front of periodic fetches
// =============================================================================

use std::time::{Duration, Instant};

use parking_lot::Mutex;

/// Decides whether a periodic fetch is due. Callers serve the data they
/// already hold while the gate is closed.
#[derive(Debug)]
pub struct RefreshGate {
    interval: Duration,
    last: Mutex<Option<Instant>>,
}

impl RefreshGate {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last: Mutex::new(None),
        }
    }

    /// Check and record a fetch attempt in one step. True on the first call
    /// and whenever `interval` has elapsed since the last successful claim.
    pub fn try_claim(&self, now: Instant) -> bool {
        let mut last = self.last.lock();
        let due = match *last {
            Some(prev) => now.saturating_duration_since(prev) >= self.interval,
            None => true,
        };
        if due {
            *last = Some(now);
        }
        due
    }
}
