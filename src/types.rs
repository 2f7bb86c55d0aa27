// =============================================================================
// Shared types used across the depth calibrator
// =============================================================================

use serde::{Deserialize, Serialize};

/// One price level of a ladder.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriceLevel {
    pub price: f64,
    pub size: f64,
}

impl PriceLevel {
    pub fn new(price: f64, size: f64) -> Self {
        Self { price, size }
    }

    /// Quote-currency value of the level (price x size).
    pub fn notional(&self) -> f64 {
        self.price * self.size
    }

    /// A level is usable when both price and size are finite and positive.
    pub fn is_valid(&self) -> bool {
        self.price.is_finite() && self.size.is_finite() && self.price > 0.0 && self.size > 0.0
    }
}

impl From<(f64, f64)> for PriceLevel {
    fn from((price, size): (f64, f64)) -> Self {
        Self { price, size }
    }
}

/// Which side of the book a level sits on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BookSide {
    Bid,
    Ask,
}

impl std::fmt::Display for BookSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Bid => write!(f, "bid"),
            Self::Ask => write!(f, "ask"),
        }
    }
}

/// True when `symbol` is quoted in USDT (`SOLUSDT`, `SOL/USDT`, `SOL/USDT:USDT`).
pub fn is_usdt_quoted(symbol: &str) -> bool {
    symbol.to_uppercase().ends_with("USDT")
}
