//! Percentile extraction for Monte Carlo aggregation

use crate::model::PercentileBand;

/// Standard percentiles reported in every band
pub mod standard {
    pub const P5: f64 = 0.05;
    pub const P25: f64 = 0.25;
    pub const P50: f64 = 0.50;
    pub const P75: f64 = 0.75;
    pub const P95: f64 = 0.95;
}

/// Percentile of an ascending-sorted slice, interpolating linearly between
/// order statistics: `h = (n - 1) * p`.
///
/// Returns 0.0 for an empty slice.
#[inline]
pub fn percentile_sorted(sorted: &[f64], p: f64) -> f64 {
    match sorted.len() {
        0 => 0.0,
        1 => sorted[0],
        n => {
            let h = (n - 1) as f64 * p.clamp(0.0, 1.0);
            let lo = h.floor() as usize;
            let hi = (lo + 1).min(n - 1);
            sorted[lo] + (h - lo as f64) * (sorted[hi] - sorted[lo])
        }
    }
}

/// Sort `values` in place and extract the standard band
pub fn band(values: &mut [f64]) -> PercentileBand {
    values.sort_by(f64::total_cmp);
    band_sorted(values)
}

/// Standard band of an already sorted slice
pub fn band_sorted(sorted: &[f64]) -> PercentileBand {
    PercentileBand {
        p5: percentile_sorted(sorted, standard::P5),
        p25: percentile_sorted(sorted, standard::P25),
        p50: percentile_sorted(sorted, standard::P50),
        p75: percentile_sorted(sorted, standard::P75),
        p95: percentile_sorted(sorted, standard::P95),
    }
}
