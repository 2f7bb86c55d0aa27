// =============================================================================
// Order Book Metrics — microstructure stats from a single ladder snapshot
// =============================================================================
//
// Everything here is a pure function of (snapshot, thresholds):
//
//   mid        = (best_bid + best_ask) / 2
//   zone       = levels within `zone_pct` of mid (bids >= mid*(1-z),
//                asks <= mid*(1+z))
//   ratio      = bid_zone_notional / ask_zone_notional, 0 when the ask zone
//                is empty
//   large      = levels whose notional exceeds `cluster_threshold`
//   walls      = levels whose notional exceeds `wall_threshold`
// =============================================================================

use serde::{Deserialize, Serialize};

use crate::market_data::calibration::DynamicThresholds;
use crate::market_data::orderbook::OrderBookSnapshot;
use crate::types::{BookSide, PriceLevel};

/// A level flagged as a cluster (moderate size).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LargeLevel {
    pub price: f64,
    pub notional: f64,
}

/// A level flagged as a wall (very large size).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Wall {
    pub side: BookSide,
    pub price: f64,
    pub notional: f64,
}

/// Microstructure readings derived from one snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MicrostructureMetrics {
    /// Bid notional inside the zone around mid.
    pub bid_volume: f64,
    /// Ask notional inside the zone around mid.
    pub ask_volume: f64,
    /// `bid_volume / ask_volume`, or 0.0 when `ask_volume` is zero.
    pub ratio: f64,
    pub large_bids: Vec<LargeLevel>,
    pub large_asks: Vec<LargeLevel>,
    pub walls: Vec<Wall>,
    pub mid_price: f64,
    /// Absolute spread in quote units.
    pub spread: f64,
}

impl MicrostructureMetrics {
    /// True when every scalar reading is a finite number.
    pub fn is_finite(&self) -> bool {
        [
            self.bid_volume,
            self.ask_volume,
            self.ratio,
            self.mid_price,
            self.spread,
        ]
        .iter()
        .all(|v| v.is_finite())
    }
}

/// Notional sums of both sides inside the zone around mid.
///
/// Returns `None` when either side is empty.
pub fn zone_volumes(bids: &[PriceLevel], asks: &[PriceLevel], zone_pct: f64) -> Option<(f64, f64)> {
    let best_bid = bids.first()?.price;
    let best_ask = asks.first()?.price;
    let mid = (best_bid + best_ask) / 2.0;

    let bid_floor = mid * (1.0 - zone_pct);
    let ask_ceiling = mid * (1.0 + zone_pct);

    let bid_volume = bids
        .iter()
        .filter(|l| l.price >= bid_floor)
        .map(PriceLevel::notional)
        .sum();
    let ask_volume = asks
        .iter()
        .filter(|l| l.price <= ask_ceiling)
        .map(PriceLevel::notional)
        .sum();

    Some((bid_volume, ask_volume))
}

/// Bid/ask ratio with the zero-ask sentinel.
pub fn volume_ratio(bid_volume: f64, ask_volume: f64) -> f64 {
    if ask_volume > 0.0 {
        bid_volume / ask_volume
    } else {
        0.0
    }
}

/// Compute microstructure metrics for `snapshot` under `thresholds`.
///
/// Returns `None` when the snapshot lacks a best bid or best ask.
pub fn compute_metrics(
    snapshot: &OrderBookSnapshot,
    thresholds: &DynamicThresholds,
) -> Option<MicrostructureMetrics> {
    let best_bid = snapshot.best_bid()?;
    let best_ask = snapshot.best_ask()?;
    let mid_price = (best_bid + best_ask) / 2.0;

    let (bid_volume, ask_volume) =
        zone_volumes(&snapshot.bids, &snapshot.asks, thresholds.zone_pct)?;

    let large = |levels: &[PriceLevel]| -> Vec<LargeLevel> {
        levels
            .iter()
            .filter(|l| l.notional() > thresholds.cluster_threshold)
            .map(|l| LargeLevel {
                price: l.price,
                notional: l.notional(),
            })
            .collect()
    };

    let walls = snapshot
        .bids
        .iter()
        .map(|l| (BookSide::Bid, l))
        .chain(snapshot.asks.iter().map(|l| (BookSide::Ask, l)))
        .filter(|(_, l)| l.notional() > thresholds.wall_threshold)
        .map(|(side, l)| Wall {
            side,
            price: l.price,
            notional: l.notional(),
        })
        .collect();

    Some(MicrostructureMetrics {
        bid_volume,
        ask_volume,
        ratio: volume_ratio(bid_volume, ask_volume),
        large_bids: large(&snapshot.bids),
        large_asks: large(&snapshot.asks),
        walls,
        mid_price,
        spread: best_ask - best_bid,
    })
}
