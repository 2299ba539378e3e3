//! Numeric helpers shared by detection and aggregation
//!
//! All statistics are population statistics. Rounding is half away from zero
//! and is only applied to values about to leave the crate.

/// Sum of a slice
pub fn sum(values: &[f64]) -> f64 {
    values.iter().sum()
}

/// Arithmetic mean, 0 for an empty slice
pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    sum(values) / values.len() as f64
}

/// Population standard deviation, 0 for fewer than two values
pub fn std_dev(values: &[f64]) -> f64 {
    if values.len() <= 1 {
        return 0.0;
    }

    let avg = mean(values);
    let variance = values.iter().map(|v| (v - avg).powi(2)).sum::<f64>() / values.len() as f64;
    variance.sqrt()
}

/// Round to `decimals` places, half away from zero
pub fn round_to(value: f64, decimals: u32) -> f64 {
    let factor = 10f64.powi(decimals as i32);
    let rounded = (value * factor).round() / factor;
    // Avoid handing out -0.0
    if rounded == 0.0 {
        0.0
    } else {
        rounded
    }
}

/// Round a currency amount to cents
pub fn round_currency(value: f64) -> f64 {
    round_to(value, 2)
}

/// Clamp into [min, max]
pub fn clamp(value: f64, min: f64, max: f64) -> f64 {
    value.max(min).min(max)
}
