// =============================================================================
// Runtime Configuration — engine settings loaded from JSON
// =============================================================================
//
// All fields carry `#[serde(default)]` so that a partial or older config file
// always loads. A missing file is not fatal: the caller falls back to
// defaults with a warning.
// =============================================================================

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

// =============================================================================
// Default-value helpers (required by serde `default = "..."` attribute)
// =============================================================================

fn default_symbols() -> Vec<String> {
    vec![
        "SOLUSDT".to_string(),
        "ARBUSDT".to_string(),
        "HBARUSDT".to_string(),
    ]
}

fn default_major_symbols() -> Vec<String> {
    vec!["BTCUSDT".to_string(), "ETHUSDT".to_string()]
}

fn default_candle_interval() -> String {
    "5m".to_string()
}

fn default_candle_limit() -> u32 {
    100
}

fn default_candle_refresh_secs() -> u64 {
    30
}

fn default_funding_refresh_secs() -> u64 {
    1800
}

fn default_dominance_refresh_secs() -> u64 {
    300
}

fn default_control_interval_secs() -> u64 {
    5
}

fn default_bind_addr() -> String {
    "0.0.0.0:3001".to_string()
}

fn default_ema_short() -> usize {
    8
}

fn default_ema_long() -> usize {
    20
}

fn default_atr_period() -> usize {
    5
}

fn default_volume_sma_period() -> usize {
    20
}

fn default_atr_threshold() -> f64 {
    0.025
}

fn default_volume_ratio() -> f64 {
    2.0
}

fn default_dominance_max() -> f64 {
    65.0
}

fn default_funding_rate_min() -> f64 {
    -0.0001
}

// =============================================================================
// IndicatorPeriods
// =============================================================================

/// Look-back periods for the candle-derived indicators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndicatorPeriods {
    #[serde(default = "default_ema_short")]
    pub ema_short: usize,

    #[serde(default = "default_ema_long")]
    pub ema_long: usize,

    #[serde(default = "default_atr_period")]
    pub atr: usize,

    #[serde(default = "default_volume_sma_period")]
    pub volume_sma: usize,
}

impl Default for IndicatorPeriods {
    fn default() -> Self {
        Self {
            ema_short: default_ema_short(),
            ema_long: default_ema_long(),
            atr: default_atr_period(),
            volume_sma: default_volume_sma_period(),
        }
    }
}

// =============================================================================
// StrategyParams
// =============================================================================

/// Parameters read by the entry evaluator.
///
/// Never mutated in place: the auto-calibration pass builds a new value and
/// swaps it in whole.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyParams {
    /// Minimum ATR as a fraction of close.
    #[serde(default = "default_atr_threshold")]
    pub atr_threshold: f64,

    /// Market-wide relative-volume reference. Diagnostic only: served by
    /// `/api/v1/params`, while the volume gate uses the per-symbol dynamic
    /// volume threshold.
    #[serde(default = "default_volume_ratio")]
    pub volume_ratio: f64,

    /// Entries are blocked at or above this BTC dominance (percent).
    #[serde(default = "default_dominance_max")]
    pub dominance_max: f64,

    /// Entries need a funding rate strictly above this.
    #[serde(default = "default_funding_rate_min")]
    pub funding_rate_min: f64,
}

impl Default for StrategyParams {
    fn default() -> Self {
        Self {
            atr_threshold: default_atr_threshold(),
            volume_ratio: default_volume_ratio(),
            dominance_max: default_dominance_max(),
            funding_rate_min: default_funding_rate_min(),
        }
    }
}

// =============================================================================
// RuntimeConfig
// =============================================================================

/// Top-level configuration for the calibrator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// Symbols streamed and polled.
    #[serde(default = "default_symbols")]
    pub symbols: Vec<String>,

    /// Symbols that get the lower "major" volume and spread thresholds.
    #[serde(default = "default_major_symbols")]
    pub major_symbols: Vec<String>,

    /// Kline interval requested on every candle poll.
    #[serde(default = "default_candle_interval")]
    pub candle_interval: String,

    /// Bars requested per poll; also the rolling window capacity.
    #[serde(default = "default_candle_limit")]
    pub candle_limit: u32,

    #[serde(default = "default_candle_refresh_secs")]
    pub candle_refresh_secs: u64,

    #[serde(default = "default_funding_refresh_secs")]
    pub funding_refresh_secs: u64,

    #[serde(default = "default_dominance_refresh_secs")]
    pub dominance_refresh_secs: u64,

    /// Cadence of the entry-evaluation loop.
    #[serde(default = "default_control_interval_secs")]
    pub control_interval_secs: u64,

    /// Diagnostics HTTP listener.
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    #[serde(default)]
    pub indicators: IndicatorPeriods,

    /// Starting strategy parameters before any auto-calibration.
    #[serde(default)]
    pub strategy: StrategyParams,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            symbols: default_symbols(),
            major_symbols: default_major_symbols(),
            candle_interval: default_candle_interval(),
            candle_limit: default_candle_limit(),
            candle_refresh_secs: default_candle_refresh_secs(),
            funding_refresh_secs: default_funding_refresh_secs(),
            dominance_refresh_secs: default_dominance_refresh_secs(),
            control_interval_secs: default_control_interval_secs(),
            bind_addr: default_bind_addr(),
            indicators: IndicatorPeriods::default(),
            strategy: StrategyParams::default(),
        }
    }
}

impl RuntimeConfig {
    /// Load configuration from a JSON file at `path`.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read runtime config from {}", path.display()))?;

        let config: Self = serde_json::from_str(&content)
            .with_context(|| format!("failed to parse runtime config from {}", path.display()))?;

        info!(
            path = %path.display(),
            symbols = ?config.symbols,
            "runtime config loaded"
        );

        Ok(config)
    }

    /// Replace the symbol list from a comma-separated string, ignoring blanks.
    pub fn override_symbols(&mut self, raw: &str) {
        let symbols: Vec<String> = raw
            .split(',')
            .map(|s| s.trim().to_uppercase())
            .filter(|s| !s.is_empty())
            .collect();
        if !symbols.is_empty() {
            self.symbols = symbols;
        }
    }

    pub fn is_major(&self, symbol: &str) -> bool {
        self.major_symbols.iter().any(|s| s == symbol)
    }
}
