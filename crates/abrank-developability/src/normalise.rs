//! Score normalisation functions.

/// Normalised value assigned to every member of a cohort too small for min-max
/// scaling (fewer than two variants).
pub const DEGENERATE_COHORT_SCORE: f64 = 0.5;

/// Ranges narrower than this are treated as zero.
const RANGE_EPSILON: f64 = 1e-10;

/// Min-max normalisation within a given range [min_val, max_val].
/// A zero-width range maps every value to 0.0 (all equally low risk).
pub fn minmax_normalise(value: f64, min_val: f64, max_val: f64) -> f64 {
    if (max_val - min_val).abs() < RANGE_EPSILON {
        return 0.0;
    }
    ((value - min_val) / (max_val - min_val)).clamp(0.0, 1.0)
}

/// Min-max normalise a whole cohort of raw scores to [0, 1].
///
/// Returns values in input order. Cohorts of fewer than two members get
/// [`DEGENERATE_COHORT_SCORE`] since the bounds are undefined.
pub fn cohort_minmax(raw_scores: &[f64]) -> Vec<f64> {
    if raw_scores.len() < 2 {
        return vec![DEGENERATE_COHORT_SCORE; raw_scores.len()];
    }

    let (min_val, max_val) = raw_scores
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &x| (lo.min(x), hi.max(x)));

    raw_scores
        .iter()
        .map(|&x| minmax_normalise(x, min_val, max_val))
        .collect()
}

/// True when `raw_scores` spread enough to discriminate between variants.
pub fn has_spread(raw_scores: &[f64]) -> bool {
    if raw_scores.len() < 2 {
        return false;
    }
    let (min_val, max_val) = raw_scores
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &x| (lo.min(x), hi.max(x)));
    (max_val - min_val).abs() >= RANGE_EPSILON
}

/// Map a 1-based rank onto [0, 1]: rank 1 → 0.0, rank `worst` → 1.0.
/// Fractional ranks (imputed medians) interpolate linearly.
pub fn normalise_rank(rank: f64, worst: f64) -> f64 {
    if worst - 1.0 < RANGE_EPSILON {
        return 0.0;
    }
    ((rank - 1.0) / (worst - 1.0)).clamp(0.0, 1.0)
}

/// Index of the equal-width bin `value` falls in, splitting `[min_val, max_val]`
/// into `bins` bins. The maximum lands in the last bin; a zero-width range puts
/// everything in bin 0.
pub fn equal_width_bin(value: f64, min_val: f64, max_val: f64, bins: usize) -> usize {
    if bins <= 1 || (max_val - min_val).abs() < RANGE_EPSILON {
        return 0;
    }
    let t = ((value - min_val) / (max_val - min_val)).clamp(0.0, 1.0);
    ((t * bins as f64).floor() as usize).min(bins - 1)
}
