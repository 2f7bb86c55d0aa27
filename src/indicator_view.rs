// =============================================================================
// Indicator View — read-only merge of candle and book readings
// =============================================================================
//
// A view exists only when every required reading is present and finite:
// ema_short, ema_long, atr, volume_ratio, close from the candle side and
// ratio, bid/ask volume, spread, mid price from the book side. Anything
// missing yields `None` (fail closed).
//
// Each half is copied out of its own store atomically. The two halves may
// come from different moments; both timestamps are carried so a consumer can
// judge the skew.
// =============================================================================

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::market_data::metrics::{LargeLevel, Wall};
use crate::market_data::orderbook::BookReading;
use crate::market_data::TechnicalIndicators;

/// Merged per-symbol snapshot for downstream consumers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MergedView {
    pub symbol: String,

    // Candle-derived
    pub ema_short: f64,
    pub ema_long: f64,
    pub atr: f64,
    pub volume: Option<f64>,
    pub volume_sma: Option<f64>,
    pub volume_ratio: f64,
    pub close: f64,
    pub candle_as_of: Option<i64>,

    // Book-derived
    pub ob_ratio: f64,
    pub ob_bid_volume: f64,
    pub ob_ask_volume: f64,
    pub ob_spread: f64,
    pub ob_mid_price: f64,
    pub ob_large_bids: Vec<LargeLevel>,
    pub ob_large_asks: Vec<LargeLevel>,
    pub ob_walls: Vec<Wall>,
    pub book_observed_at: DateTime<Utc>,

    pub funding_rate: f64,
}

impl MergedView {
    /// Spread as a fraction of mid price.
    pub fn relative_spread(&self) -> f64 {
        if self.ob_mid_price > 0.0 {
            self.ob_spread / self.ob_mid_price
        } else {
            0.0
        }
    }
}

fn finite(value: Option<f64>) -> Option<f64> {
    value.filter(|v| v.is_finite())
}

/// Merge both halves, or `None` when any required reading is missing.
pub fn merge(
    symbol: &str,
    technical: Option<TechnicalIndicators>,
    book: Option<BookReading>,
    funding_rate: f64,
) -> Option<MergedView> {
    let technical = technical?;
    let book = book?;

    let ema_short = finite(technical.ema_short)?;
    let ema_long = finite(technical.ema_long)?;
    let atr = finite(technical.atr)?;
    let close = finite(technical.close)?;
    let volume_ratio = finite(Some(technical.volume_ratio))?;

    if !book.metrics.is_finite() {
        return None;
    }
    let metrics = book.metrics;

    Some(MergedView {
        symbol: symbol.to_string(),
        ema_short,
        ema_long,
        atr,
        volume: technical.volume,
        volume_sma: technical.volume_sma,
        volume_ratio,
        close,
        candle_as_of: technical.as_of,
        ob_ratio: metrics.ratio,
        ob_bid_volume: metrics.bid_volume,
        ob_ask_volume: metrics.ask_volume,
        ob_spread: metrics.spread,
        ob_mid_price: metrics.mid_price,
        ob_large_bids: metrics.large_bids,
        ob_large_asks: metrics.large_asks,
        ob_walls: metrics.walls,
        book_observed_at: book.observed_at,
        funding_rate: if funding_rate.is_finite() { funding_rate } else { 0.0 },
    })
}
