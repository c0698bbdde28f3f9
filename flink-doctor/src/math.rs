/// Tolerance applied to threshold comparisons so float noise (e.g., `0.4 - 0.1`) never moves a
/// boundary value across the line.
pub const THRESHOLD_EPSILON: f64 = 1e-9;

/// `value > threshold`, where values within [`THRESHOLD_EPSILON`] of the threshold are equal.
pub fn exceeds(value: f64, threshold: f64) -> bool {
    threshold + THRESHOLD_EPSILON < value
}

/// `value >= threshold`, where values within [`THRESHOLD_EPSILON`] of the threshold are equal.
pub fn reaches(value: f64, threshold: f64) -> bool {
    threshold - THRESHOLD_EPSILON <= value
}

/// Divides only when the denominator is positive and the result is finite; otherwise the ratio
/// is unavailable.
pub fn ratio(numerator: f64, denominator: f64) -> Option<f64> {
    if denominator <= 0.0 {
        return None;
    }

    let result = numerator / denominator;
    if result.is_finite() {
        Some(result)
    } else {
        None
    }
}
