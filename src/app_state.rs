// =============================================================================
// Central Application State — Depth Calibrator
// =============================================================================
//
// Ties the stores together and is shared across every task as
// `Arc<AppState>`. Each store owns its own locking:
//   - OrderBookStore: one RwLock over books and calibration windows, so a
//     book update, its metrics and the calibration fold form one step.
//   - CandleStore: one RwLock over the per-symbol candle windows.
//   - FundingRates: last known rate per symbol.
//
// Strategy parameters are held as `Arc<StrategyParams>` and swapped whole;
// readers never observe a half-written parameter set.
// =============================================================================

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use serde::Serialize;
use tracing::{debug, info};

use crate::futures_intel::FundingRates;
use crate::indicator_view::{self, MergedView};
use crate::market_data::{
    Candle, CandleStore, DynamicThresholds, OrderBookStore, TechnicalIndicators, UpdateOutcome,
};
use crate::runtime_config::{RuntimeConfig, StrategyParams};
use crate::types::PriceLevel;
use crate::volatility::VolatilityCalibrator;

// =============================================================================
// Health snapshot
// =============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct SymbolHealth {
    pub symbol: String,
    pub book_ready: bool,
    pub calibration_window: usize,
    pub candles: usize,
    pub view_ready: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthSnapshot {
    pub state_version: u64,
    pub uptime_secs: u64,
    pub symbols: Vec<SymbolHealth>,
}

// =============================================================================
// AppState
// =============================================================================

pub struct AppState {
    /// Bumped on every stored book update and every candle ingest.
    pub state_version: AtomicU64,

    pub runtime_config: Arc<RwLock<RuntimeConfig>>,

    pub orderbook_store: Arc<OrderBookStore>,
    pub candle_store: Arc<CandleStore>,
    pub funding: Arc<FundingRates>,
    pub volatility: VolatilityCalibrator,

    strategy_params: RwLock<Arc<StrategyParams>>,

    pub start_time: std::time::Instant,
}

impl AppState {
    pub fn new(config: RuntimeConfig) -> Self {
        let candle_store = Arc::new(CandleStore::new(
            config.candle_limit as usize,
            config.indicators,
        ));
        let volatility = VolatilityCalibrator::new(candle_store.clone(), config.major_symbols.clone());

        Self {
            state_version: AtomicU64::new(1),
            orderbook_store: Arc::new(OrderBookStore::with_symbols(&config.symbols)),
            candle_store,
            funding: Arc::new(FundingRates::new(Duration::from_secs(
                config.funding_refresh_secs,
            ))),
            volatility,
            strategy_params: RwLock::new(Arc::new(config.strategy.clone())),
            runtime_config: Arc::new(RwLock::new(config)),
            start_time: std::time::Instant::now(),
        }
    }

    // ── Version Management ──────────────────────────────────────────────

    pub fn increment_version(&self) -> u64 {
        self.state_version.fetch_add(1, Ordering::SeqCst)
    }

    pub fn current_state_version(&self) -> u64 {
        self.state_version.load(Ordering::SeqCst)
    }

    // ── Order Book ──────────────────────────────────────────────────────

    /// Replace the book for `symbol`. See [`OrderBookStore::apply_update`].
    pub fn apply_order_book_update(
        &self,
        symbol: &str,
        bids: Vec<PriceLevel>,
        asks: Vec<PriceLevel>,
    ) -> UpdateOutcome {
        self.apply_order_book_update_sequenced(symbol, None, bids, asks)
    }

    pub fn apply_order_book_update_sequenced(
        &self,
        symbol: &str,
        update_id: Option<u64>,
        bids: Vec<PriceLevel>,
        asks: Vec<PriceLevel>,
    ) -> UpdateOutcome {
        let outcome = self
            .orderbook_store
            .apply_sequenced(symbol, update_id, bids, asks);
        if matches!(outcome, UpdateOutcome::Applied(_) | UpdateOutcome::OneSided) {
            self.increment_version();
        }
        outcome
    }

    /// Thresholds that the next book update for `symbol` will be measured
    /// against.
    pub fn get_dynamic_thresholds(&self, symbol: &str) -> DynamicThresholds {
        self.orderbook_store.thresholds(symbol)
    }

    // ── Candles ─────────────────────────────────────────────────────────

    pub fn ingest_candles(&self, symbol: &str, bars: Vec<Candle>) -> TechnicalIndicators {
        let indicators = self.candle_store.ingest(symbol, bars);
        self.increment_version();
        indicators
    }

    // ── Funding ─────────────────────────────────────────────────────────

    pub fn update_funding_rate(&self, symbol: &str, rate: f64) {
        self.funding.update(symbol, rate);
    }

    // ── Merged view ─────────────────────────────────────────────────────

    /// Merged indicator view for `symbol`, or `None` until every required
    /// reading is present.
    pub fn get_indicator_view(&self, symbol: &str) -> Option<MergedView> {
        indicator_view::merge(
            symbol,
            self.candle_store.indicators(symbol),
            self.orderbook_store.reading(symbol),
            self.funding.get(symbol),
        )
    }

    // ── Strategy parameters ─────────────────────────────────────────────

    pub fn strategy_params(&self) -> Arc<StrategyParams> {
        self.strategy_params.read().clone()
    }

    pub fn swap_strategy_params(&self, params: StrategyParams) -> Arc<StrategyParams> {
        let next = Arc::new(params);
        std::mem::replace(&mut *self.strategy_params.write(), next)
    }

    /// Recompute strategy parameters from market-wide volatility. Keeps the
    /// current set when no symbol has a full candle window.
    pub fn auto_calibrate(&self) -> bool {
        let symbols = self.runtime_config.read().symbols.clone();
        let current = self.strategy_params();
        match self.volatility.calibrate_params(&symbols, &current) {
            Some(params) if params != *current => {
                info!(
                    atr_threshold = params.atr_threshold,
                    volume_ratio = params.volume_ratio,
                    "strategy parameters swapped"
                );
                self.swap_strategy_params(params);
                true
            }
            Some(_) => false,
            None => {
                debug!("auto-calibration skipped, no symbol has a full candle window");
                false
            }
        }
    }

    // ── Misc ────────────────────────────────────────────────────────────

    pub fn is_major(&self, symbol: &str) -> bool {
        self.runtime_config.read().is_major(symbol)
    }

    pub fn symbols(&self) -> Vec<String> {
        self.runtime_config.read().symbols.clone()
    }

    pub fn health_snapshot(&self) -> HealthSnapshot {
        let symbols = self
            .symbols()
            .into_iter()
            .map(|symbol| SymbolHealth {
                book_ready: self.orderbook_store.reading(&symbol).is_some(),
                calibration_window: self.orderbook_store.calibration_window_len(&symbol),
                candles: self.candle_store.len(&symbol),
                view_ready: self.get_indicator_view(&symbol).is_some(),
                symbol,
            })
            .collect();

        HealthSnapshot {
            state_version: self.current_state_version(),
            uptime_secs: self.start_time.elapsed().as_secs(),
            symbols,
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    fn candles(n: usize) -> Vec<Candle> {
        (0..n)
            .map(|i| {
                let close = 100.0 + i as f64 * 0.5;
                let volume = if i + 1 == n { 3_000.0 } else { 1_000.0 };
                Candle::new(
                    i as i64 * 300_000,
                    close - 0.2,
                    close + 1.0,
                    close - 1.0,
                    close,
                    volume,
                    i as i64 * 300_000 + 299_999,
                )
            })
            .collect()
    }

    fn book_levels() -> (Vec<PriceLevel>, Vec<PriceLevel>) {
        (
            vec![PriceLevel::new(99.99, 800.0), PriceLevel::new(99.98, 100.0)],
            vec![PriceLevel::new(100.01, 100.0), PriceLevel::new(100.02, 100.0)],
        )
    }

    fn state() -> AppState {
        let config = RuntimeConfig {
            symbols: vec!["SOLUSDT".into()],
            ..RuntimeConfig::default()
        };
        AppState::new(config)
    }

    #[test]
    fn view_absent_until_both_halves_ready() {
        let state = state();
        assert!(state.get_indicator_view("SOLUSDT").is_none());

        state.ingest_candles("SOLUSDT", candles(30));
        assert!(state.get_indicator_view("SOLUSDT").is_none());

        let (bids, asks) = book_levels();
        let outcome = state.apply_order_book_update("SOLUSDT", bids, asks);
        assert!(matches!(outcome, UpdateOutcome::Applied(_)));

        let view = state.get_indicator_view("SOLUSDT").unwrap();
        assert!(view.ema_short > view.ema_long);
        assert_eq!(view.funding_rate, 0.0);
    }

    #[test]
    fn view_stays_ready_under_steady_ingestion() {
        let state = state();
        state.ingest_candles("SOLUSDT", candles(30));
        for _ in 0..20 {
            let (bids, asks) = book_levels();
            state.apply_order_book_update("SOLUSDT", bids, asks);
            state.ingest_candles("SOLUSDT", candles(30));
            assert!(state.get_indicator_view("SOLUSDT").is_some());
        }
    }

    #[test]
    fn version_bumps_only_on_stored_updates() {
        let state = state();
        let v0 = state.current_state_version();

        state.apply_order_book_update("SOLUSDT", Vec::new(), Vec::new());
        assert_eq!(state.current_state_version(), v0);

        let (bids, asks) = book_levels();
        state.apply_order_book_update("SOLUSDT", bids, asks);
        assert_eq!(state.current_state_version(), v0 + 1);

        state.apply_order_book_update("SOLUSDT", vec![PriceLevel::new(99.0, 1.0)], Vec::new());
        assert_eq!(state.current_state_version(), v0 + 2);

        state.ingest_candles("SOLUSDT", candles(5));
        assert_eq!(state.current_state_version(), v0 + 3);
    }

    #[test]
    fn one_sided_book_withdraws_view() {
        let state = state();
        state.ingest_candles("SOLUSDT", candles(30));
        let (bids, asks) = book_levels();
        state.apply_order_book_update("SOLUSDT", bids, asks);
        assert!(state.get_indicator_view("SOLUSDT").is_some());

        let outcome =
            state.apply_order_book_update("SOLUSDT", vec![PriceLevel::new(90.0, 1.0)], Vec::new());
        assert_eq!(outcome, UpdateOutcome::OneSided);
        assert!(state.get_indicator_view("SOLUSDT").is_none());
        assert!(!state.health_snapshot().symbols[0].book_ready);

        let (bids, asks) = book_levels();
        state.apply_order_book_update("SOLUSDT", bids, asks);
        assert!(state.get_indicator_view("SOLUSDT").is_some());
    }

    #[test]
    fn funding_flows_into_view() {
        let state = state();
        state.ingest_candles("SOLUSDT", candles(30));
        let (bids, asks) = book_levels();
        state.apply_order_book_update("SOLUSDT", bids, asks);
        state.update_funding_rate("SOLUSDT", -0.0003);
        assert_eq!(state.get_indicator_view("SOLUSDT").unwrap().funding_rate, -0.0003);
    }

    #[test]
    fn params_swap_is_whole() {
        let state = state();
        let before = state.strategy_params();
        let next = StrategyParams {
            atr_threshold: 0.04,
            ..(*before).clone()
        };
        let old = state.swap_strategy_params(next.clone());
        assert_eq!(*old, *before);
        assert_eq!(*state.strategy_params(), next);
        assert_eq!(*before, StrategyParams::default());
    }

    #[test]
    fn auto_calibrate_needs_full_window() {
        let state = state();
        state.ingest_candles("SOLUSDT", candles(30));
        assert!(!state.auto_calibrate());
        assert_eq!(*state.strategy_params(), StrategyParams::default());
    }

    #[test]
    fn health_lists_configured_symbols() {
        let state = state();
        let health = state.health_snapshot();
        assert_eq!(health.symbols.len(), 1);
        assert!(!health.symbols[0].view_ready);
        assert!(!health.symbols[0].book_ready);
    }
}
