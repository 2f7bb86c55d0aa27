pub mod calibration;
pub mod candle_buffer;
pub mod metrics;
pub mod orderbook;

pub use calibration::{CalibrationEngine, DynamicThresholds};
pub use candle_buffer::{Candle, CandleSeries, CandleStore, TechnicalIndicators};
pub use metrics::MicrostructureMetrics;
pub use orderbook::{OrderBookSnapshot, OrderBookStore, UpdateOutcome};

use anyhow::{Context, Result};

/// Binance sends most numeric values as JSON strings; accept numbers too.
pub(crate) fn parse_string_f64(val: &serde_json::Value, name: &str) -> Result<f64> {
    match val {
        serde_json::Value::String(s) => s
            .parse::<f64>()
            .with_context(|| format!("failed to parse {name} as f64: {s}")),
        serde_json::Value::Number(n) => n
            .as_f64()
            .with_context(|| format!("field {name} is not a valid f64")),
        _ => anyhow::bail!("field {name} has unexpected JSON type"),
    }
}
