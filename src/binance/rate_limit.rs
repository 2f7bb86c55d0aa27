// =============================================================================
// Request-Weight Tracker — keeps kline polling under the Binance weight cap
// =============================================================================
//
// Binance allows 6000 request weight per minute per IP on the spot API. The
// tracker reads `X-MBX-USED-WEIGHT-1M` after every response and refuses new
// polls once a self-imposed ceiling is reached. The header is authoritative;
// the counter is never incremented locally.
// =============================================================================

use std::sync::atomic::{AtomicU32, Ordering};

use tracing::{debug, warn};

/// Ceiling at which polling stops until the exchange reports a lower weight.
const WEIGHT_HARD_LIMIT: u32 = 5000;
const WEIGHT_WARN_THRESHOLD: u32 = 4000;

/// Weight of one `GET /api/v3/klines` call with limit 100..=499.
pub const KLINES_WEIGHT: u32 = 2;

pub struct WeightTracker {
    used_weight_1m: AtomicU32,
}

impl WeightTracker {
    pub fn new() -> Self {
        Self {
            used_weight_1m: AtomicU32::new(0),
        }
    }

    /// Update the counter from the response headers of any spot API call.
    pub fn update_from_headers(&self, headers: &reqwest::header::HeaderMap) {
        let Some(weight) = headers
            .get("X-MBX-USED-WEIGHT-1M")
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.parse::<u32>().ok())
        else {
            return;
        };
        self.record(weight);
    }

    /// Store the exchange-reported weight.
    pub fn record(&self, weight: u32) {
        let prev = self.used_weight_1m.swap(weight, Ordering::Relaxed);
        if weight >= WEIGHT_WARN_THRESHOLD && prev < WEIGHT_WARN_THRESHOLD {
            warn!(
                used_weight = weight,
                hard_limit = WEIGHT_HARD_LIMIT,
                "request weight crossed warning threshold"
            );
        }
        debug!(used_weight_1m = weight, "request weight updated from header");
    }

    /// Whether `weight` more can be spent without crossing the ceiling.
    pub fn can_send_request(&self, weight: u32) -> bool {
        let current = self.used_weight_1m.load(Ordering::Relaxed);
        let allowed = current + weight <= WEIGHT_HARD_LIMIT;
        if !allowed {
            warn!(
                current_weight = current,
                requested_weight = weight,
                hard_limit = WEIGHT_HARD_LIMIT,
                "request blocked, would exceed weight ceiling"
            );
        }
        allowed
    }

    pub fn used_weight(&self) -> u32 {
        self.used_weight_1m.load(Ordering::Relaxed)
    }
}

impl Default for WeightTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for WeightTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WeightTracker")
            .field("used_weight_1m", &self.used_weight())
            .finish()
    }
}
