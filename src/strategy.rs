// =============================================================================
// Entry Evaluator — gates a long entry on the merged indicator view
// =============================================================================
//
// Checks (all must pass):
//   1. volume ratio  >= dynamic volume threshold
//   2. spread / mid  <= spread threshold (0.08% major, 0.15% other)
//   3. ATR           >= close * params.atr_threshold
//   4. EMA short     >  EMA long
//   5. BTC dominance <  params.dominance_max
//   6. funding rate  >  params.funding_rate_min
//   7. book ratio    >= calibrated ratio_min
//   8. at least one large bid cluster
//   9. no walls on either side
//
// The evaluator only decides; it never places orders.
// =============================================================================

use serde::Serialize;
use tracing::{debug, info};

use crate::app_state::AppState;
use crate::indicator_view::MergedView;
use crate::market_data::DynamicThresholds;
use crate::runtime_config::StrategyParams;

const MAJOR_SPREAD_THRESHOLD: f64 = 0.08 / 100.0;
const OTHER_SPREAD_THRESHOLD: f64 = 0.15 / 100.0;

/// Maximum relative spread tolerated for entries.
pub fn spread_threshold(is_major: bool) -> f64 {
    if is_major {
        MAJOR_SPREAD_THRESHOLD
    } else {
        OTHER_SPREAD_THRESHOLD
    }
}

/// Everything the evaluator compares the view against.
#[derive(Debug, Clone, Copy)]
pub struct EntryContext<'a> {
    pub thresholds: &'a DynamicThresholds,
    pub params: &'a StrategyParams,
    pub dominance: f64,
    pub volume_threshold: f64,
    pub spread_threshold: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EntryCheck {
    pub name: &'static str,
    pub passed: bool,
}

/// Result of one evaluation, with every individual check.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EntryDecision {
    pub symbol: String,
    pub passed: bool,
    pub checks: Vec<EntryCheck>,
}

impl EntryDecision {
    pub fn failed_checks(&self) -> Vec<&'static str> {
        self.checks
            .iter()
            .filter(|c| !c.passed)
            .map(|c| c.name)
            .collect()
    }
}

/// Evaluate the entry conditions for `view`.
pub fn evaluate_entry(view: &MergedView, ctx: &EntryContext<'_>) -> EntryDecision {
    let checks = vec![
        EntryCheck {
            name: "volume_ratio",
            passed: view.volume_ratio >= ctx.volume_threshold,
        },
        EntryCheck {
            name: "spread",
            passed: view.relative_spread() <= ctx.spread_threshold,
        },
        EntryCheck {
            name: "atr",
            passed: view.atr >= view.close * ctx.params.atr_threshold,
        },
        EntryCheck {
            name: "ema_trend",
            passed: view.ema_short > view.ema_long,
        },
        EntryCheck {
            name: "dominance",
            passed: ctx.dominance < ctx.params.dominance_max,
        },
        EntryCheck {
            name: "funding",
            passed: view.funding_rate > ctx.params.funding_rate_min,
        },
        EntryCheck {
            name: "book_ratio",
            passed: view.ob_ratio >= ctx.thresholds.ratio_min,
        },
        EntryCheck {
            name: "large_bids",
            passed: !view.ob_large_bids.is_empty(),
        },
        EntryCheck {
            name: "no_walls",
            passed: view.ob_walls.is_empty(),
        },
    ];

    EntryDecision {
        symbol: view.symbol.clone(),
        passed: checks.iter().all(|c| c.passed),
        checks,
    }
}

pub struct StrategyEngine;

impl StrategyEngine {
    /// Evaluate `symbol` against the current shared state.
    ///
    /// Returns `None` while the indicator view is not ready.
    pub fn evaluate_symbol(state: &AppState, symbol: &str, dominance: f64) -> Option<EntryDecision> {
        let Some(view) = state.get_indicator_view(symbol) else {
            debug!(symbol, "indicator view not ready, skipping");
            return None;
        };

        let thresholds = state.get_dynamic_thresholds(symbol);
        let params = state.strategy_params();
        let is_major = state.is_major(symbol);

        let ctx = EntryContext {
            thresholds: &thresholds,
            params: &params,
            dominance,
            volume_threshold: state.volatility.dynamic_volume_threshold(symbol),
            spread_threshold: spread_threshold(is_major),
        };

        let decision = evaluate_entry(&view, &ctx);
        info!(
            symbol,
            passed = decision.passed,
            failed = ?decision.failed_checks(),
            volume_ratio = view.volume_ratio,
            ob_ratio = view.ob_ratio,
            funding = view.funding_rate,
            dominance,
            "entry conditions evaluated"
        );
        Some(decision)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::market_data::metrics::LargeLevel;
    use chrono::Utc;

    fn view() -> MergedView {
        MergedView {
            symbol: "SOLUSDT".into(),
            ema_short: 101.0,
            ema_long: 100.0,
            atr: 3.0,
            volume: Some(3_000.0),
            volume_sma: Some(1_000.0),
            volume_ratio: 3.0,
            close: 100.0,
            candle_as_of: None,
            ob_ratio: 2.0,
            ob_bid_volume: 200_000.0,
            ob_ask_volume: 100_000.0,
            ob_spread: 0.01,
            ob_mid_price: 100.0,
            ob_large_bids: vec![LargeLevel {
                price: 99.99,
                notional: 60_000.0,
            }],
            ob_large_asks: Vec::new(),
            ob_walls: Vec::new(),
            book_observed_at: Utc::now(),
            funding_rate: 0.0001,
        }
    }

    fn decide(view: &MergedView, dominance: f64) -> EntryDecision {
        let thresholds = DynamicThresholds::default();
        let params = StrategyParams::default();
        let ctx = EntryContext {
            thresholds: &thresholds,
            params: &params,
            dominance,
            volume_threshold: 2.2,
            spread_threshold: spread_threshold(false),
        };
        evaluate_entry(view, &ctx)
    }

    #[test]
    fn all_conditions_met() {
        let d = decide(&view(), 55.0);
        assert!(d.passed, "failed: {:?}", d.failed_checks());
        assert_eq!(d.checks.len(), 9);
    }

    #[test]
    fn calibrated_ratio_min_gates_entry() {
        let mut v = view();
        v.ob_ratio = 1.4;
        let d = decide(&v, 55.0);
        assert!(!d.passed);
        assert_eq!(d.failed_checks(), vec!["book_ratio"]);
    }

    #[test]
    fn walls_and_dominance_block() {
        let mut v = view();
        v.ob_walls.push(crate::market_data::metrics::Wall {
            side: crate::types::BookSide::Ask,
            price: 100.5,
            notional: 250_000.0,
        });
        let d = decide(&v, 70.0);
        assert_eq!(d.failed_checks(), vec!["dominance", "no_walls"]);
    }

    #[test]
    fn funding_at_floor_is_rejected() {
        let mut v = view();
        v.funding_rate = -0.0001;
        assert_eq!(decide(&v, 55.0).failed_checks(), vec!["funding"]);
    }

    #[test]
    fn spread_thresholds() {
        assert!((spread_threshold(true) - 0.0008).abs() < 1e-15);
        assert!((spread_threshold(false) - 0.0015).abs() < 1e-15);
    }
}
