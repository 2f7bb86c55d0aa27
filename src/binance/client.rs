// =============================================================================
// Binance REST API Client — public spot market data
// =============================================================================
//
// Only unauthenticated endpoints are used. Every response feeds the weight
// tracker so the poll loop can back off before the exchange starts returning
// 429s.
// =============================================================================

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{debug, instrument, warn};

use super::rate_limit::{WeightTracker, KLINES_WEIGHT};
use crate::market_data::{parse_string_f64, Candle};

#[derive(Clone)]
pub struct BinanceClient {
    base_url: String,
    client: reqwest::Client,
    weights: Arc<WeightTracker>,
}

impl BinanceClient {
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .build()
            .context("failed to build reqwest client")?;

        debug!("BinanceClient initialised (base_url=https://api.binance.com)");

        Ok(Self {
            base_url: "https://api.binance.com".to_string(),
            client,
            weights: Arc::new(WeightTracker::new()),
        })
    }

    // -------------------------------------------------------------------------
    // Public market data
    // -------------------------------------------------------------------------

    /// GET /api/v3/klines (public, no signature required).
    ///
    /// Array indices:
    ///   [0] openTime, [1] open, [2] high, [3] low, [4] close, [5] volume,
    ///   [6] closeTime, [7] quoteAssetVolume, [8] numberOfTrades,
    ///   [9] takerBuyBaseVolume, [10] takerBuyQuoteVolume
    #[instrument(skip(self), name = "binance::get_klines")]
    pub async fn get_klines(&self, symbol: &str, interval: &str, limit: u32) -> Result<Vec<Candle>> {
        if !self.weights.can_send_request(KLINES_WEIGHT) {
            anyhow::bail!("klines request for {symbol} deferred, request weight ceiling reached");
        }

        let url = format!(
            "{}/api/v3/klines?symbol={}&interval={}&limit={}",
            self.base_url, symbol, interval, limit
        );

        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .context("GET /api/v3/klines request failed")?;

        self.weights.update_from_headers(resp.headers());

        let status = resp.status();
        let body: serde_json::Value = resp
            .json()
            .await
            .context("failed to parse klines response")?;

        if !status.is_success() {
            anyhow::bail!("Binance GET /api/v3/klines returned {}: {}", status, body);
        }

        let candles = parse_klines(&body)?;
        debug!(symbol, interval, count = candles.len(), "klines fetched");
        Ok(candles)
    }
}

/// Parse the array-of-arrays kline payload, oldest bar first.
///
/// Short entries and bars with non-finite or non-positive prices are skipped.
pub fn parse_klines(body: &serde_json::Value) -> Result<Vec<Candle>> {
    let raw = body.as_array().context("klines response is not an array")?;

    let mut candles = Vec::with_capacity(raw.len());
    for entry in raw {
        let arr = entry.as_array().context("kline entry is not an array")?;

        if arr.len() < 7 {
            warn!("skipping malformed kline entry with {} elements", arr.len());
            continue;
        }

        let open_time = arr[0].as_i64().context("kline openTime is not an integer")?;
        let open = parse_string_f64(&arr[1], "open")?;
        let high = parse_string_f64(&arr[2], "high")?;
        let low = parse_string_f64(&arr[3], "low")?;
        let close = parse_string_f64(&arr[4], "close")?;
        let volume = parse_string_f64(&arr[5], "volume")?;
        let close_time = arr[6].as_i64().unwrap_or(0);

        let prices_ok = [open, high, low, close]
            .iter()
            .all(|p| p.is_finite() && *p > 0.0);
        if !prices_ok || !volume.is_finite() || volume < 0.0 {
            warn!(open_time, "skipping kline with invalid prices or volume");
            continue;
        }

        candles.push(Candle::new(open_time, open, high, low, close, volume, close_time));
    }

    Ok(candles)
}

impl std::fmt::Debug for BinanceClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BinanceClient")
            .field("base_url", &self.base_url)
            .field("weights", &self.weights)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_binance_kline_rows() {
        let body: serde_json::Value = serde_json::from_str(
            r#"[
                [1700000000000, "100.0", "101.5", "99.5", "101.0", "1234.5", 1700000299999, "0", 10, "0", "0", "0"],
                [1700000300000, "101.0", "102.0", "100.5", "101.8", "987.0", 1700000599999, "0", 8, "0", "0", "0"]
            ]"#,
        )
        .unwrap();
        let candles = parse_klines(&body).unwrap();
        assert_eq!(candles.len(), 2);
        assert_eq!(candles[0].open_time, 1_700_000_000_000);
        assert_eq!(candles[1].close, 101.8);
        assert_eq!(candles[0].volume, 1234.5);
    }

    #[test]
    fn skips_short_and_invalid_rows() {
        let body: serde_json::Value = serde_json::from_str(
            r#"[
                [1700000000000, "100.0"],
                [1700000300000, "0", "102.0", "100.5", "101.8", "987.0", 1700000599999],
                [1700000600000, "101.8", "102.2", "101.1", "102.0", "500.0", 1700000899999]
            ]"#,
        )
        .unwrap();
        let candles = parse_klines(&body).unwrap();
        assert_eq!(candles.len(), 1);
        assert_eq!(candles[0].open_time, 1_700_000_600_000);
    }

    #[test]
    fn accepts_numeric_fields() {
        let body: serde_json::Value = serde_json::from_str(
            r#"[[1700000000000, 100.0, 101.5, 99.5, 101.0, 1234.5, 1700000299999]]"#,
        )
        .unwrap();
        let candles = parse_klines(&body).unwrap();
        assert_eq!(candles[0].high, 101.5);
        assert_eq!(candles[0].volume, 1234.5);
    }

    #[test]
    fn unparseable_price_is_an_error() {
        let body: serde_json::Value = serde_json::from_str(
            r#"[[1700000000000, "abc", "101.5", "99.5", "101.0", "1.0", 1700000299999]]"#,
        )
        .unwrap();
        assert!(parse_klines(&body).is_err());
    }

    #[test]
    fn rejects_non_array_payload() {
        let body: serde_json::Value =
            serde_json::from_str(r#"{ "code": -1121, "msg": "Invalid symbol." }"#).unwrap();
        assert!(parse_klines(&body).is_err());
    }
}
