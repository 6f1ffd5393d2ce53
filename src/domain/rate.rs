/// Scale of a per-capita rate.
pub const PER_INHABITANTS: f64 = 100_000.0;

/// Decimal places kept in exported rates.
pub const RATE_PRECISION: usize = 4;

/// `count / population * 100000`, rounded to [`RATE_PRECISION`] places.
///
/// Returns `None` when the population is zero, negative, or not finite.
pub fn per_100k(count: f64, population: f64) -> Option<f64> {
    if !population.is_finite() || population <= 0.0 || !count.is_finite() {
        return None;
    }
    Some(round_to(count / population * PER_INHABITANTS, RATE_PRECISION))
}

/// Correctly rounded to `places` decimals, ties to even.
///
/// Formatting rounds the exact binary value, so `19.53125` becomes `19.5312`.
pub fn round_to(value: f64, places: usize) -> f64 {
    format!("{:.*}", places, value).parse().unwrap_or(value)
}
