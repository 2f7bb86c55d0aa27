// =============================================================================
// Exponential Moving Average (EMA)
// =============================================================================
//
// Formula:
//   multiplier = 2 / (period + 1)
//   EMA_t      = close_t * multiplier + EMA_{t-1} * (1 - multiplier)
//
// The very first EMA value is seeded with the SMA of the first `period` closes.
// =============================================================================

/// Compute the EMA series for `closes` with look-back `period`.
///
/// Each output element corresponds to a close starting at index `period - 1`.
/// Returns an empty `Vec` when `period` is zero or the input is too short.
/// A non-finite intermediate value ends the series early.
pub fn calculate_ema(closes: &[f64], period: usize) -> Vec<f64> {
    if period == 0 || closes.len() < period {
        return Vec::new();
    }

    let multiplier = 2.0 / (period + 1) as f64;

    let sma: f64 = closes[..period].iter().sum::<f64>() / period as f64;
    if !sma.is_finite() {
        return Vec::new();
    }

    let mut result = Vec::with_capacity(closes.len() - period + 1);
    result.push(sma);

    let mut prev_ema = sma;
    for &close in &closes[period..] {
        let ema = close * multiplier + prev_ema * (1.0 - multiplier);
        if !ema.is_finite() {
            break;
        }
        result.push(ema);
        prev_ema = ema;
    }

    result
}

/// Latest EMA value, `None` while there are fewer than `period` closes.
///
/// Also `None` when the series was cut short by a non-finite value, so a
/// stale reading is never reported as current.
pub fn latest_ema(closes: &[f64], period: usize) -> Option<f64> {
    let series = calculate_ema(closes, period);
    if period == 0 || series.len() != closes.len().saturating_sub(period - 1) {
        return None;
    }
    series.last().copied()
}
