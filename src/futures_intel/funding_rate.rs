// =============================================================================
// Funding Rate — fetch from the futures API and per-symbol cache
// =============================================================================
//
// The cache is refreshed at most once per gate interval (30 minutes by
// default). A failed fetch keeps the last known value; 0.0 is only ever
// served for a symbol that has never been fetched successfully.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::market_data::parse_string_f64;
use crate::refresh::RefreshGate;

/// Latest funding observation for a symbol.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FundingState {
    /// Raw funding rate as a decimal (e.g. 0.0001 = 0.01%).
    pub rate: f64,

    /// Timestamp (ms) of the funding event the rate belongs to.
    pub funding_time: i64,
}

/// Fetches funding rates from the Binance Futures API.
pub struct FundingRateMonitor {
    client: reqwest::Client,
    base_url: String,
}

impl FundingRateMonitor {
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_default();
        Self {
            client,
            base_url: "https://fapi.binance.com".to_string(),
        }
    }

    /// Fetch the latest funding rate for the perpetual on `symbol`.
    pub async fn fetch(&self, symbol: &str) -> Result<FundingState> {
        let url = format!(
            "{}/fapi/v1/fundingRate?symbol={}&limit=1",
            self.base_url,
            perp_symbol(symbol)
        );

        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .with_context(|| format!("GET funding rate for {symbol}"))?;

        let status = resp.status();
        let body: serde_json::Value = resp
            .json()
            .await
            .context("failed to parse funding rate response body")?;

        if !status.is_success() {
            anyhow::bail!("funding rate API returned {}: {}", status, body);
        }

        let state = parse_funding_response(&body)?;
        debug!(
            symbol,
            rate = state.rate,
            funding_time = state.funding_time,
            "funding rate fetched"
        );
        Ok(state)
    }
}

impl Default for FundingRateMonitor {
    fn default() -> Self {
        Self::new()
    }
}

/// Perpetual contract symbol for a spot pair (`SOL/USDT` -> `SOLUSDT`).
pub fn perp_symbol(symbol: &str) -> String {
    symbol
        .split(':')
        .next()
        .unwrap_or(symbol)
        .replace('/', "")
        .to_uppercase()
}

fn parse_funding_response(body: &serde_json::Value) -> Result<FundingState> {
    let entry = body
        .as_array()
        .context("funding rate response is not an array")?
        .last()
        .context("funding rate response array is empty")?;

    let rate = parse_string_f64(&entry["fundingRate"], "fundingRate")?;
    if !rate.is_finite() {
        anyhow::bail!("funding rate is not finite: {rate}");
    }

    Ok(FundingState {
        rate,
        funding_time: entry["fundingTime"].as_i64().unwrap_or(0),
    })
}

// =============================================================================
// Cache
// =============================================================================

/// Last known funding rate per symbol.
pub struct FundingRates {
    rates: RwLock<HashMap<String, f64>>,
    gate: RefreshGate,
}

impl FundingRates {
    pub fn new(refresh_interval: Duration) -> Self {
        Self {
            rates: RwLock::new(HashMap::new()),
            gate: RefreshGate::new(refresh_interval),
        }
    }

    /// Store a freshly fetched rate. Non-finite input is ignored.
    pub fn update(&self, symbol: &str, rate: f64) {
        if !rate.is_finite() {
            warn!(symbol, rate, "non-finite funding rate ignored");
            return;
        }
        self.rates.write().insert(symbol.to_string(), rate);
    }

    /// Last known rate, 0.0 before the first successful fetch.
    pub fn get(&self, symbol: &str) -> f64 {
        self.rates.read().get(symbol).copied().unwrap_or(0.0)
    }

    /// Whether a refresh should start now. Claims the slot when it returns
    /// true so concurrent callers do not fetch twice.
    pub fn claim_refresh(&self, now: Instant) -> bool {
        self.gate.try_claim(now)
    }

    /// Fetch every symbol through `monitor`, keeping stale values on error.
    /// Does nothing while the refresh interval has not elapsed.
    pub async fn refresh(&self, monitor: &FundingRateMonitor, symbols: &[String]) {
        if !self.claim_refresh(Instant::now()) {
            return;
        }
        for symbol in symbols {
            match monitor.fetch(symbol).await {
                Ok(state) => self.update(symbol, state.rate),
                Err(e) => {
                    warn!(
                        symbol = %symbol,
                        error = %e,
                        stale = self.get(symbol),
                        "funding rate fetch failed, keeping last value"
                    );
                }
            }
        }
    }
}
