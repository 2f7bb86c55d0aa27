// =============================================================================
// Depth Calibrator — order-book microstructure calibration engine
// =============================================================================

pub mod api;
pub mod app_state;
pub mod binance;
pub mod futures_intel;
pub mod indicator_view;
pub mod indicators;
pub mod market_data;
pub mod market_wide;
pub mod refresh;
pub mod runtime_config;
pub mod strategy;
pub mod types;
pub mod volatility;
