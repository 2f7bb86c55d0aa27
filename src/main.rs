// =============================================================================
// Depth Calibrator — Main Entry Point
// =============================================================================
//
// Tasks:
//   - one depth stream per symbol, reconnecting after 5 s on any error
//   - poll loop: klines, funding rates, BTC dominance, auto-calibration
//   - control loop: entry evaluation on every configured symbol
//   - diagnostics REST server
// =============================================================================

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use depth_calibrator::api;
use depth_calibrator::app_state::AppState;
use depth_calibrator::binance::BinanceClient;
use depth_calibrator::futures_intel::FundingRateMonitor;
use depth_calibrator::market_data;
use depth_calibrator::market_wide::{DominanceMonitor, INITIAL_DOMINANCE};
use depth_calibrator::refresh::RefreshGate;
use depth_calibrator::runtime_config::RuntimeConfig;
use depth_calibrator::strategy::StrategyEngine;

const RECONNECT_DELAY: Duration = Duration::from_secs(5);
const POLL_TICK: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ── 1. Environment & config ──────────────────────────────────────────
    let _ = dotenv::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("Depth Calibrator starting up");

    let config_path =
        std::env::var("CALIBRATOR_CONFIG").unwrap_or_else(|_| "calibrator_config.json".into());
    let mut config = RuntimeConfig::load(&config_path).unwrap_or_else(|e| {
        warn!(error = %e, path = %config_path, "Failed to load config, using defaults");
        RuntimeConfig::default()
    });

    if let Ok(syms) = std::env::var("CALIBRATOR_SYMBOLS") {
        config.override_symbols(&syms);
    }
    if let Ok(addr) = std::env::var("CALIBRATOR_BIND_ADDR") {
        config.bind_addr = addr;
    }

    info!(symbols = ?config.symbols, interval = %config.candle_interval, "Configured symbols");

    // ── 2. Shared state & clients ────────────────────────────────────────
    let state = Arc::new(AppState::new(config));
    let binance_client = BinanceClient::new()?;
    let funding_monitor = FundingRateMonitor::new();
    let dominance_monitor = DominanceMonitor::new();
    let dominance = Arc::new(RwLock::new(INITIAL_DOMINANCE));

    // ── 3. Depth streams ─────────────────────────────────────────────────
    let symbols = state.symbols();
    for symbol in &symbols {
        let stream_state = state.clone();
        let sym = symbol.clone();
        tokio::spawn(async move {
            loop {
                if let Err(e) = market_data::orderbook::run_depth_stream(&sym, &stream_state).await {
                    error!(symbol = %sym, error = %e, "Depth stream error, reconnecting in 5s");
                }
                tokio::time::sleep(RECONNECT_DELAY).await;
            }
        });
    }
    info!(count = symbols.len(), "Depth streams launched");

    // ── 4. Poll loop ─────────────────────────────────────────────────────
    let poll_state = state.clone();
    let poll_dominance = dominance.clone();
    tokio::spawn(async move {
        let (candle_gate, dominance_gate, interval, limit) = {
            let config = poll_state.runtime_config.read();
            (
                RefreshGate::new(Duration::from_secs(config.candle_refresh_secs)),
                RefreshGate::new(Duration::from_secs(config.dominance_refresh_secs)),
                config.candle_interval.clone(),
                config.candle_limit,
            )
        };

        let mut ticker = tokio::time::interval(POLL_TICK);
        loop {
            ticker.tick().await;
            let syms = poll_state.symbols();

            if candle_gate.try_claim(Instant::now()) {
                for symbol in &syms {
                    match binance_client.get_klines(symbol, &interval, limit).await {
                        Ok(bars) if !bars.is_empty() => {
                            poll_state.ingest_candles(symbol, bars);
                        }
                        Ok(_) => warn!(symbol = %symbol, "Empty kline response, keeping window"),
                        Err(e) => warn!(symbol = %symbol, error = %e, "Kline fetch failed"),
                    }
                }
                poll_state.auto_calibrate();
            }

            poll_state.funding.refresh(&funding_monitor, &syms).await;

            if dominance_gate.try_claim(Instant::now()) {
                match dominance_monitor.fetch().await {
                    Ok(value) => *poll_dominance.write() = value,
                    Err(e) => warn!(
                        error = %e,
                        stale = *poll_dominance.read(),
                        "Dominance fetch failed, keeping last value"
                    ),
                }
            }
        }
    });

    // ── 5. Control loop ──────────────────────────────────────────────────
    let control_state = state.clone();
    let control_dominance = dominance.clone();
    let control_interval = Duration::from_secs(state.runtime_config.read().control_interval_secs);
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(control_interval);
        loop {
            ticker.tick().await;
            let dominance = *control_dominance.read();
            for symbol in control_state.symbols() {
                StrategyEngine::evaluate_symbol(&control_state, &symbol, dominance);
            }
        }
    });

    // ── 6. Diagnostics API ───────────────────────────────────────────────
    let bind_addr = state.runtime_config.read().bind_addr.clone();
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!(addr = %bind_addr, "API server listening");
    let app = api::rest::router(state.clone());
    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            error!(error = %e, "API server failed");
        }
    });

    info!("All subsystems running. Press Ctrl+C to stop.");

    // ── 7. Shutdown ──────────────────────────────────────────────────────
    tokio::signal::ctrl_c().await?;
    warn!("Shutdown signal received, stopping");
    info!(state_version = state.current_state_version(), "Depth Calibrator shut down");
    Ok(())
}
