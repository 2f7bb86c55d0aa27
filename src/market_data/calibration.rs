// =============================================================================
// Calibration Engine — percentile thresholds from recent ladder history
// =============================================================================
//
// Every accepted book update is folded into a bounded per-symbol window
// (oldest evicted first) and the thresholds are recomputed on the spot:
//
//   cluster_threshold = P90 of every level notional across the window
//   wall_threshold    = P99 of the same population
//   ratio_min         = P50 of per-snapshot zone ratios (ask zone > 0 only)
//   zone_pct          = fixed, never recalibrated
//
// With fewer than two snapshots, or an empty population, the previous values
// are retained. Percentiles interpolate linearly between closest ranks.
// =============================================================================

use std::collections::{HashMap, VecDeque};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::market_data::metrics::zone_volumes;
use crate::market_data::orderbook::OrderBookSnapshot;

/// Maximum number of snapshots retained per symbol.
pub const CALIBRATION_WINDOW: usize = 100;

/// Minimum snapshots before thresholds move off their previous values.
const MIN_SNAPSHOTS: usize = 2;

const CLUSTER_PERCENTILE: f64 = 90.0;
const WALL_PERCENTILE: f64 = 99.0;
const RATIO_PERCENTILE: f64 = 50.0;

const DEFAULT_CLUSTER_THRESHOLD: f64 = 50_000.0;
const DEFAULT_WALL_THRESHOLD: f64 = 100_000.0;
const DEFAULT_ZONE_PCT: f64 = 0.005;
const DEFAULT_RATIO_MIN: f64 = 1.5;

/// Thresholds consumed by the metrics pass on the next update.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DynamicThresholds {
    pub cluster_threshold: f64,
    pub wall_threshold: f64,
    pub zone_pct: f64,
    pub ratio_min: f64,
}

impl Default for DynamicThresholds {
    /// Cold-start values used until a symbol has enough history.
    fn default() -> Self {
        Self {
            cluster_threshold: DEFAULT_CLUSTER_THRESHOLD,
            wall_threshold: DEFAULT_WALL_THRESHOLD,
            zone_pct: DEFAULT_ZONE_PCT,
            ratio_min: DEFAULT_RATIO_MIN,
        }
    }
}

/// Per-symbol calibration state. Created fully initialised.
#[derive(Debug, Clone, Default)]
pub struct CalibrationState {
    window: VecDeque<OrderBookSnapshot>,
    thresholds: DynamicThresholds,
}

impl CalibrationState {
    pub fn len(&self) -> usize {
        self.window.len()
    }

    pub fn thresholds(&self) -> DynamicThresholds {
        self.thresholds
    }

    /// Oldest-first view of the retained snapshots.
    pub fn snapshots(&self) -> impl Iterator<Item = &OrderBookSnapshot> {
        self.window.iter()
    }
}

/// Rolling ladder history for every symbol.
///
/// Not synchronised on its own; the order book store owns it behind the same
/// lock as the live snapshots so that a fold always sees the snapshot that
/// was just stored.
#[derive(Debug, Default)]
pub struct CalibrationEngine {
    states: HashMap<String, CalibrationState>,
}

impl CalibrationEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-create state for `symbol` so later reads need no presence checks.
    pub fn register(&mut self, symbol: &str) {
        self.states.entry(symbol.to_string()).or_default();
    }

    /// Append a copy of `snapshot` to its symbol's window and recompute the
    /// thresholds. Returns the thresholds now in force.
    pub fn fold(&mut self, snapshot: &OrderBookSnapshot) -> DynamicThresholds {
        let state = self.states.entry(snapshot.symbol.clone()).or_default();

        state.window.push_back(snapshot.clone());
        while state.window.len() > CALIBRATION_WINDOW {
            state.window.pop_front();
        }

        if state.window.len() < MIN_SNAPSHOTS {
            return state.thresholds;
        }

        let previous = state.thresholds;
        state.thresholds = recalibrate(&state.window, previous);

        debug!(
            symbol = %snapshot.symbol,
            window = state.window.len(),
            cluster = state.thresholds.cluster_threshold,
            wall = state.thresholds.wall_threshold,
            ratio_min = state.thresholds.ratio_min,
            "order book thresholds recalibrated"
        );

        state.thresholds
    }

    /// Thresholds currently in force for `symbol`, cold-start defaults when
    /// the symbol has never been seen.
    pub fn thresholds(&self, symbol: &str) -> DynamicThresholds {
        self.states
            .get(symbol)
            .map(CalibrationState::thresholds)
            .unwrap_or_default()
    }

    pub fn state(&self, symbol: &str) -> Option<&CalibrationState> {
        self.states.get(symbol)
    }

    pub fn window_len(&self, symbol: &str) -> usize {
        self.states.get(symbol).map_or(0, CalibrationState::len)
    }
}

/// Derive a fresh threshold set from `window`, keeping any value of
/// `previous` whose population is empty.
fn recalibrate<'a, I>(window: I, previous: DynamicThresholds) -> DynamicThresholds
where
    I: IntoIterator<Item = &'a OrderBookSnapshot>,
{
    let zone_pct = previous.zone_pct;
    let mut notionals = Vec::new();
    let mut ratios = Vec::new();

    for snap in window {
        notionals.extend(
            snap.bids
                .iter()
                .chain(snap.asks.iter())
                .map(|l| l.notional())
                .filter(|v| v.is_finite()),
        );

        if let Some((bid_volume, ask_volume)) = zone_volumes(&snap.bids, &snap.asks, zone_pct) {
            if ask_volume > 0.0 {
                let ratio = bid_volume / ask_volume;
                if ratio.is_finite() {
                    ratios.push(ratio);
                }
            }
        }
    }

    let mut next = previous;

    if let (Some(cluster), Some(wall)) = (
        percentile(&notionals, CLUSTER_PERCENTILE),
        percentile(&notionals, WALL_PERCENTILE),
    ) {
        next.cluster_threshold = cluster;
        next.wall_threshold = wall;
    }

    if let Some(ratio_min) = percentile(&ratios, RATIO_PERCENTILE) {
        next.ratio_min = ratio_min;
    }

    next
}

/// Linear-interpolation percentile (`q` in 0..=100) of `values`.
///
/// Returns `None` for an empty population or a non-finite result.
pub fn percentile(values: &[f64], q: f64) -> Option<f64> {
    if values.is_empty() || !(0.0..=100.0).contains(&q) {
        return None;
    }

    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);

    let rank = q / 100.0 * (sorted.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    let frac = rank - lo as f64;

    let value = sorted[lo] + (sorted[hi] - sorted[lo]) * frac;
    value.is_finite().then_some(value)
}
