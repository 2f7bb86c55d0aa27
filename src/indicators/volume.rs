// =============================================================================
// Volume — simple moving average and relative volume
// =============================================================================

/// Simple moving average of the last `period` values.
///
/// `None` when `period` is zero, the input is shorter than `period`, or the
/// result is not finite.
pub fn calculate_sma(values: &[f64], period: usize) -> Option<f64> {
    if period == 0 || values.len() < period {
        return None;
    }
    let window = &values[values.len() - period..];
    let sma = window.iter().sum::<f64>() / period as f64;
    sma.is_finite().then_some(sma)
}

/// Latest volume relative to its average; 0.0 when the average is missing
/// or zero.
pub fn volume_ratio(volume: Option<f64>, volume_sma: Option<f64>) -> f64 {
    match (volume, volume_sma) {
        (Some(v), Some(sma)) if sma > 0.0 => {
            let ratio = v / sma;
            if ratio.is_finite() {
                ratio
            } else {
                0.0
            }
        }
        _ => 0.0,
    }
}
