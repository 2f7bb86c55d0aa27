// =============================================================================
// Futures Intelligence Module
// =============================================================================
//
// Data pulled from the perpetual-futures side of the exchange. Only the
// funding rate is consumed: it reaches the indicator view as a cost and
// sentiment signal.

pub mod funding_rate;

pub use funding_rate::{FundingRateMonitor, FundingRates, FundingState};
