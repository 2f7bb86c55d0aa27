// =============================================================================
// Technical Indicators Module
// =============================================================================
//
// Pure, side-effect-free implementations of the indicators derived from the
// candle window. Insufficient data surfaces as `None` or an empty series,
// never as zero.

pub mod atr;
pub mod ema;
pub mod volume;
