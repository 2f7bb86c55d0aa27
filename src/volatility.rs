// =============================================================================
// Volatility Calibrator — dynamic ATR and volume thresholds
// =============================================================================
//
// ATR threshold (fraction of price):
//   base   = 0.025 for USDT-quoted symbols, 0.04 otherwise
//   factor = max(1, stddev(ATR) / mean(ATR))
//   result = clamp(base * factor * 1.2, base, 0.06)
//   fewer than 50 candles (or 20 ATR values) => 0.03
//
// Volume threshold (multiple of average volume):
//   base   = 1.8 for major symbols, 2.2 otherwise
//   vf     = normalized ATR (% of close) / 3.0
//   result = base * clamp(1 + (vf - 1) * 0.2, 0.8, 1.5)
//
// Both are advisory; nothing here gates an order.
// =============================================================================

use std::sync::Arc;

use serde::Serialize;
use tracing::info;

use crate::market_data::CandleStore;
use crate::runtime_config::StrategyParams;
use crate::types::is_usdt_quoted;

const MIN_CANDLES: usize = 50;
const MIN_ATR_VALUES: usize = 20;
const DEFAULT_ATR_THRESHOLD: f64 = 0.03;
const USDT_BASE_ATR_THRESHOLD: f64 = 0.025;
const OTHER_BASE_ATR_THRESHOLD: f64 = 0.04;
const ATR_THRESHOLD_CEILING: f64 = 0.06;
const ATR_THRESHOLD_MARKUP: f64 = 1.2;

const MAJOR_BASE_VOLUME_THRESHOLD: f64 = 1.8;
const OTHER_BASE_VOLUME_THRESHOLD: f64 = 2.2;
/// Normalized ATR (percent) treated as "typical" volatility.
const REFERENCE_VOLATILITY_PCT: f64 = 3.0;

/// Per-symbol advisory thresholds, for diagnostics.
#[derive(Debug, Clone, Serialize)]
pub struct VolatilityReport {
    pub symbol: String,
    pub candles: usize,
    pub normalized_atr: Option<f64>,
    pub dynamic_atr_threshold: f64,
    pub dynamic_volume_threshold: f64,
}

pub struct VolatilityCalibrator {
    candles: Arc<CandleStore>,
    major_symbols: Vec<String>,
}

impl VolatilityCalibrator {
    pub fn new(candles: Arc<CandleStore>, major_symbols: Vec<String>) -> Self {
        Self {
            candles,
            major_symbols,
        }
    }

    fn is_major(&self, symbol: &str) -> bool {
        self.major_symbols.iter().any(|s| s == symbol)
    }

    /// Dynamic ATR threshold for `symbol` as a fraction of price.
    pub fn dynamic_atr_threshold(&self, symbol: &str) -> f64 {
        match self.candles.series(symbol) {
            Some(series) => atr_threshold(symbol, series.candles.len(), &series.atr_series),
            None => DEFAULT_ATR_THRESHOLD,
        }
    }

    /// Dynamic relative-volume threshold for `symbol`.
    pub fn dynamic_volume_threshold(&self, symbol: &str) -> f64 {
        let normalized_atr = self
            .candles
            .indicators(symbol)
            .and_then(|ind| ind.normalized_atr())
            .unwrap_or(0.0);
        volume_threshold(self.is_major(symbol), normalized_atr)
    }

    pub fn report(&self, symbol: &str) -> VolatilityReport {
        let series = self.candles.series(symbol);
        let candles = series.as_ref().map_or(0, |s| s.candles.len());
        let normalized_atr = series.as_ref().and_then(|s| s.indicators.normalized_atr());
        let dynamic_atr_threshold = series
            .as_ref()
            .map_or(DEFAULT_ATR_THRESHOLD, |s| atr_threshold(symbol, candles, &s.atr_series));

        VolatilityReport {
            symbol: symbol.to_string(),
            candles,
            normalized_atr,
            dynamic_atr_threshold,
            dynamic_volume_threshold: volume_threshold(
                self.is_major(symbol),
                normalized_atr.unwrap_or(0.0),
            ),
        }
    }

    /// Market-wide strategy parameters from the average normalized ATR of
    /// every symbol holding a full candle window.
    ///
    /// Returns `None` when no symbol qualifies; the caller keeps its current
    /// parameters in that case.
    pub fn calibrate_params(&self, symbols: &[String], current: &StrategyParams) -> Option<StrategyParams> {
        let full = self.candles.capacity();
        let readings: Vec<f64> = symbols
            .iter()
            .filter_map(|s| self.candles.series(s))
            .filter(|s| s.candles.len() >= full)
            .filter_map(|s| s.indicators.normalized_atr())
            .collect();

        if readings.is_empty() {
            return None;
        }

        let market_volatility = readings.iter().sum::<f64>() / readings.len() as f64;
        let params = StrategyParams {
            atr_threshold: (market_volatility * 0.75 / 100.0).clamp(0.025, 0.045),
            volume_ratio: (2.0 - (market_volatility - 3.0) * 0.05).clamp(1.8, 2.3),
            ..current.clone()
        };

        info!(
            market_volatility = format!("{market_volatility:.4}"),
            atr_threshold = format!("{:.4}", params.atr_threshold),
            volume_ratio = format!("{:.2}", params.volume_ratio),
            symbols = readings.len(),
            "strategy parameters recalibrated"
        );

        Some(params)
    }
}

/// ATR threshold from a symbol's candle count and ATR history.
pub fn atr_threshold(symbol: &str, candle_count: usize, atr_series: &[f64]) -> f64 {
    if candle_count < MIN_CANDLES || atr_series.len() < MIN_ATR_VALUES {
        return DEFAULT_ATR_THRESHOLD;
    }

    let base = if is_usdt_quoted(symbol) {
        USDT_BASE_ATR_THRESHOLD
    } else {
        OTHER_BASE_ATR_THRESHOLD
    };

    let n = atr_series.len() as f64;
    let mean = atr_series.iter().sum::<f64>() / n;
    // Sample standard deviation.
    let variance = atr_series.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0);
    let std_dev = variance.sqrt();

    let dispersion = if mean > 0.0 && std_dev.is_finite() {
        std_dev / mean
    } else {
        1.0
    };

    (base * dispersion.max(1.0) * ATR_THRESHOLD_MARKUP).clamp(base, ATR_THRESHOLD_CEILING)
}

/// Volume threshold from the major flag and normalized ATR (percent).
pub fn volume_threshold(is_major: bool, normalized_atr: f64) -> f64 {
    let base = if is_major {
        MAJOR_BASE_VOLUME_THRESHOLD
    } else {
        OTHER_BASE_VOLUME_THRESHOLD
    };
    let volatility_factor = normalized_atr / REFERENCE_VOLATILITY_PCT;
    base * (1.0 + (volatility_factor - 1.0) * 0.2).clamp(0.8, 1.5)
}
