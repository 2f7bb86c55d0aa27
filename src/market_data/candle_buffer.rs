use std::collections::HashMap;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::indicators::atr::{calculate_atr, calculate_atr_series};
use crate::indicators::ema::latest_ema;
use crate::indicators::volume::{calculate_sma, volume_ratio};
use crate::runtime_config::IndicatorPeriods;

// ---------------------------------------------------------------------------
// Data types
// ---------------------------------------------------------------------------

/// A single closed OHLCV bar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub open_time: i64,
    pub close_time: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Candle {
    pub fn new(
        open_time: i64,
        open: f64,
        high: f64,
        low: f64,
        close: f64,
        volume: f64,
        close_time: i64,
    ) -> Self {
        Self {
            open_time,
            close_time,
            open,
            high,
            low,
            close,
            volume,
        }
    }
}

/// Latest indicator readings for one symbol.
///
/// `None` means the window is too short for that indicator; consumers must
/// treat the symbol as not ready rather than reading a zero.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TechnicalIndicators {
    pub ema_short: Option<f64>,
    pub ema_long: Option<f64>,
    pub atr: Option<f64>,
    pub volume: Option<f64>,
    pub volume_sma: Option<f64>,
    /// `volume / volume_sma`, 0.0 while the average is undefined or zero.
    pub volume_ratio: f64,
    pub close: Option<f64>,
    /// Open time of the bar the readings were taken from.
    pub as_of: Option<i64>,
}

impl TechnicalIndicators {
    /// Derive every indicator from `candles` (oldest first).
    pub fn from_candles(candles: &[Candle], periods: &IndicatorPeriods) -> Self {
        let closes: Vec<f64> = candles.iter().map(|c| c.close).collect();
        let volumes: Vec<f64> = candles.iter().map(|c| c.volume).collect();

        let last = candles.last();
        let volume = last.map(|c| c.volume);
        let volume_sma = calculate_sma(&volumes, periods.volume_sma);

        Self {
            ema_short: latest_ema(&closes, periods.ema_short),
            ema_long: latest_ema(&closes, periods.ema_long),
            atr: calculate_atr(candles, periods.atr),
            volume,
            volume_sma,
            volume_ratio: volume_ratio(volume, volume_sma),
            close: last.map(|c| c.close),
            as_of: last.map(|c| c.open_time),
        }
    }

    /// ATR as a percentage of the latest close.
    pub fn normalized_atr(&self) -> Option<f64> {
        match (self.atr, self.close) {
            (Some(atr), Some(close)) if close > 0.0 => Some(atr / close * 100.0),
            _ => None,
        }
    }
}

/// Rolling bar window plus everything derived from it.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CandleSeries {
    pub candles: Vec<Candle>,
    pub indicators: TechnicalIndicators,
    /// ATR value per bar once the ATR period is satisfied.
    pub atr_series: Vec<f64>,
}

// ---------------------------------------------------------------------------
// CandleStore -- thread-safe rolling window per symbol
// ---------------------------------------------------------------------------

/// Holds the most recent `capacity` bars per symbol together with their
/// indicators. Every ingest replaces the series and its indicators in one
/// write, so readers never see bars and indicators from different batches.
pub struct CandleStore {
    series: RwLock<HashMap<String, CandleSeries>>,
    capacity: usize,
    periods: IndicatorPeriods,
}

impl CandleStore {
    pub fn new(capacity: usize, periods: IndicatorPeriods) -> Self {
        Self {
            series: RwLock::new(HashMap::new()),
            capacity,
            periods,
        }
    }

    /// Replace the window for `symbol` with `bars` (oldest first) and
    /// recompute its indicators.
    ///
    /// Bars whose open time does not strictly increase are dropped; only the
    /// newest `capacity` bars are kept. The recompute runs under the write
    /// lock, so concurrent ingests for one symbol land in lock order.
    pub fn ingest(&self, symbol: &str, bars: Vec<Candle>) -> TechnicalIndicators {
        let mut candles: Vec<Candle> = Vec::with_capacity(bars.len());
        let mut dropped = 0usize;
        for bar in bars {
            match candles.last() {
                Some(prev) if bar.open_time <= prev.open_time => dropped += 1,
                _ => candles.push(bar),
            }
        }
        if dropped > 0 {
            warn!(symbol, dropped, "out-of-order candles dropped");
        }

        if candles.len() > self.capacity {
            candles.drain(..candles.len() - self.capacity);
        }

        let mut series = self.series.write();
        let indicators = TechnicalIndicators::from_candles(&candles, &self.periods);
        let atr_series = calculate_atr_series(&candles, self.periods.atr);

        debug!(
            symbol,
            bars = candles.len(),
            ema_short = ?indicators.ema_short,
            ema_long = ?indicators.ema_long,
            atr = ?indicators.atr,
            volume_ratio = indicators.volume_ratio,
            "indicators recomputed"
        );

        series.insert(
            symbol.to_string(),
            CandleSeries {
                candles,
                indicators: indicators.clone(),
                atr_series,
            },
        );

        indicators
    }

    pub fn indicators(&self, symbol: &str) -> Option<TechnicalIndicators> {
        self.series.read().get(symbol).map(|s| s.indicators.clone())
    }

    /// Copy of the whole series for `symbol`.
    pub fn series(&self, symbol: &str) -> Option<CandleSeries> {
        self.series.read().get(symbol).cloned()
    }

    pub fn len(&self, symbol: &str) -> usize {
        self.series.read().get(symbol).map_or(0, |s| s.candles.len())
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn bars(n: usize) -> Vec<Candle> {
        (0..n)
            .map(|i| {
                let close = 100.0 + (i as f64 * 0.7).sin() * 2.0 + i as f64 * 0.05;
                Candle::new(
                    i as i64 * 300_000,
                    close - 0.1,
                    close + 0.6,
                    close - 0.6,
                    close,
                    1_000.0 + (i % 7) as f64 * 50.0,
                    i as i64 * 300_000 + 299_999,
                )
            })
            .collect()
    }

    fn store() -> CandleStore {
        CandleStore::new(100, IndicatorPeriods::default())
    }

    #[test]
    fn window_is_capped_to_newest_bars() {
        let s = store();
        s.ingest("SOLUSDT", bars(150));
        let series = s.series("SOLUSDT").unwrap();
        assert_eq!(series.candles.len(), 100);
        assert_eq!(series.candles[0].open_time, 50 * 300_000);
        assert!(series.candles.windows(2).all(|w| w[0].open_time < w[1].open_time));
    }

    #[test]
    fn ingest_replaces_previous_window() {
        let s = store();
        s.ingest("SOLUSDT", bars(60));
        s.ingest("SOLUSDT", bars(10));
        assert_eq!(s.len("SOLUSDT"), 10);
    }

    #[test]
    fn non_increasing_timestamps_are_dropped() {
        let s = store();
        let mut input = bars(5);
        input.insert(3, input[1].clone());
        s.ingest("SOLUSDT", input);
        assert_eq!(s.len("SOLUSDT"), 5);
    }

    #[test]
    fn short_window_leaves_indicators_undefined() {
        let s = store();
        let ind = s.ingest("SOLUSDT", bars(5));
        assert!(ind.ema_short.is_none());
        assert!(ind.ema_long.is_none());
        // ATR(5) needs six bars.
        assert!(ind.atr.is_none());
        assert!(ind.volume_sma.is_none());
        assert_eq!(ind.volume_ratio, 0.0);
        assert!(ind.close.is_some());
    }

    #[test]
    fn volume_ratio_zero_below_twenty_bars_defined_after() {
        let s = store();
        assert_eq!(s.ingest("SOLUSDT", bars(19)).volume_ratio, 0.0);

        let ind = s.ingest("SOLUSDT", bars(20));
        let sma = ind.volume_sma.unwrap();
        assert!(sma > 0.0);
        assert!((ind.volume_ratio - ind.volume.unwrap() / sma).abs() < 1e-12);
        assert!(ind.volume_ratio > 0.0);
    }

    #[test]
    fn full_window_defines_every_indicator() {
        let s = store();
        let ind = s.ingest("SOLUSDT", bars(100));
        assert!(ind.ema_short.is_some());
        assert!(ind.ema_long.is_some());
        assert!(ind.atr.is_some());
        assert_eq!(ind.as_of, Some(99 * 300_000));
        let series = s.series("SOLUSDT").unwrap();
        assert_eq!(series.atr_series.len(), 100 - 5);
        assert_eq!(series.atr_series.last().copied(), ind.atr);
    }

    #[test]
    fn normalized_atr_is_percent_of_close() {
        let ind = TechnicalIndicators {
            atr: Some(2.0),
            close: Some(100.0),
            ..TechnicalIndicators::default()
        };
        assert_eq!(ind.normalized_atr(), Some(2.0));
        let zero_close = TechnicalIndicators {
            atr: Some(2.0),
            close: Some(0.0),
            ..TechnicalIndicators::default()
        };
        assert_eq!(zero_close.normalized_atr(), None);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_ingests_keep_series_and_indicators_together() {
        let s = std::sync::Arc::new(store());
        let mut handles = Vec::new();
        for n in [30usize, 45, 60, 75, 90, 100] {
            let s = s.clone();
            handles.push(tokio::spawn(async move {
                for _ in 0..20 {
                    s.ingest("SOLUSDT", bars(n));
                    tokio::task::yield_now().await;
                }
            }));
        }
        for h in handles {
            h.await.unwrap();
        }

        let series = s.series("SOLUSDT").unwrap();
        let expected = TechnicalIndicators::from_candles(&series.candles, &IndicatorPeriods::default());
        assert_eq!(series.indicators, expected);
        assert_eq!(series.atr_series.len(), series.candles.len() - 5);
    }

    #[test]
    fn unknown_symbol_has_no_indicators() {
        assert!(store().indicators("XRPUSDT").is_none());
    }
}
