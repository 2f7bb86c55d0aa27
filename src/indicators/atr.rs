// =============================================================================
// Average True Range (ATR) — Wilder's Smoothing Method
// =============================================================================
//
// True Range (TR) for each bar:
//   TR = max(H - L, |H - prevClose|, |L - prevClose|)
//
// ATR is then the smoothed average of TR using Wilder's method:
//   ATR_0   = SMA of first `period` TR values
//   ATR_t   = (ATR_{t-1} * (period - 1) + TR_t) / period
//
// The first bar has no previous close, so `period + 1` candles are needed
// for the first ATR value.
// =============================================================================

use crate::market_data::Candle;

fn true_ranges(candles: &[Candle]) -> Vec<f64> {
    candles
        .windows(2)
        .map(|pair| {
            let prev_close = pair[0].close;
            let bar = &pair[1];
            // f64::max ignores NaN, so broken bars must poison the range explicitly.
            if !(bar.high.is_finite() && bar.low.is_finite() && prev_close.is_finite()) {
                return f64::NAN;
            }
            let hl = bar.high - bar.low;
            let hc = (bar.high - prev_close).abs();
            let lc = (bar.low - prev_close).abs();
            hl.max(hc).max(lc)
        })
        .collect()
}

/// Full ATR series; element `i` is the ATR as of candle `period + i`.
///
/// Empty when `period` is zero or there are not enough candles. A non-finite
/// value ends the series.
pub fn calculate_atr_series(candles: &[Candle], period: usize) -> Vec<f64> {
    if period == 0 || candles.len() < period + 1 {
        return Vec::new();
    }

    let tr_values = true_ranges(candles);

    let seed: f64 = tr_values[..period].iter().sum::<f64>() / period as f64;
    if !seed.is_finite() {
        return Vec::new();
    }

    let period_f = period as f64;
    let mut series = Vec::with_capacity(tr_values.len() - period + 1);
    series.push(seed);

    let mut atr = seed;
    for &tr in &tr_values[period..] {
        atr = (atr * (period_f - 1.0) + tr) / period_f;
        if !atr.is_finite() {
            break;
        }
        series.push(atr);
    }

    series
}

/// Most recent ATR value, `None` with insufficient or broken input.
pub fn calculate_atr(candles: &[Candle], period: usize) -> Option<f64> {
    let series = calculate_atr_series(candles, period);
    if series.is_empty() || series.len() != candles.len() - period {
        return None;
    }
    series.last().copied()
}
