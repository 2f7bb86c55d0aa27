// =============================================================================
// Market-wide context — BTC dominance
// =============================================================================
//
// Dominance is handed straight to the entry evaluator by the control loop.
// The core stores never hold it.

use std::time::Duration;

use anyhow::{Context, Result};
use tracing::debug;

/// Neutral dominance used until the first successful fetch.
pub const INITIAL_DOMINANCE: f64 = 60.0;

/// Fetches BTC market-cap dominance (percent) from CoinGecko.
pub struct DominanceMonitor {
    client: reqwest::Client,
    url: String,
}

impl DominanceMonitor {
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_default();
        Self {
            client,
            url: "https://api.coingecko.com/api/v3/global".to_string(),
        }
    }

    pub async fn fetch(&self) -> Result<f64> {
        let resp = self
            .client
            .get(&self.url)
            .send()
            .await
            .context("GET global market data")?;

        let status = resp.status();
        let body: serde_json::Value = resp
            .json()
            .await
            .context("failed to parse global market data body")?;

        if !status.is_success() {
            anyhow::bail!("global market data API returned {}: {}", status, body);
        }

        let dominance = parse_dominance(&body)?;
        debug!(dominance, "BTC dominance fetched");
        Ok(dominance)
    }
}

impl Default for DominanceMonitor {
    fn default() -> Self {
        Self::new()
    }
}

fn parse_dominance(body: &serde_json::Value) -> Result<f64> {
    let dominance = body["data"]["market_cap_percentage"]["btc"]
        .as_f64()
        .context("missing field data.market_cap_percentage.btc")?;
    if !(0.0..=100.0).contains(&dominance) {
        anyhow::bail!("dominance out of range: {dominance}");
    }
    Ok(dominance)
}
