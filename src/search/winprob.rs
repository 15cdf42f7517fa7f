//! Win-probability calibration.
//!
//! Converts a centipawn score into a win probability via a logistic curve,
//! and estimates the uncertainty of that probability from the spread of
//! scores seen across the last few completed iterative-deepening depths.

/// Logistic steepness.
pub const SIGMOID_K: f64 = 0.0045;

/// Scores at or beyond this magnitude are treated as forced mate and the
/// probability saturates to (effectively) 0 or 1, matching the TT
/// mate-adjust threshold used elsewhere.
pub const MATE_SATURATION_THRESHOLD: i32 = 900_000;

/// `p = 1 / (1 + exp(-K * score / 100))`, saturating near 0/1 for mate scores.
pub fn win_probability(score_cp: i32) -> f64 {
    if score_cp >= MATE_SATURATION_THRESHOLD {
        return 1.0;
    }
    if score_cp <= -MATE_SATURATION_THRESHOLD {
        return 0.0;
    }
    let x = -SIGMOID_K * (score_cp as f64) / 100.0;
    1.0 / (1.0 + x.exp())
}

/// Derivative of `win_probability` with respect to the centipawn score,
/// `dp/dx = (K/100) * p * (1 - p)`.
fn win_probability_derivative(score_cp: i32) -> f64 {
    let p = win_probability(score_cp);
    (SIGMOID_K / 100.0) * p * (1.0 - p)
}

/// Sample standard deviation (Bessel-corrected) of a score sequence,
/// e.g. the best-line score recorded at each completed search depth.
fn sample_stddev(scores: &[i32]) -> f64 {
    if scores.len() < 2 {
        return 0.0;
    }
    let n = scores.len() as f64;
    let mean = scores.iter().map(|&s| s as f64).sum::<f64>() / n;
    let variance = scores
        .iter()
        .map(|&s| {
            let d = s as f64 - mean;
            d * d
        })
        .sum::<f64>()
        / (n - 1.0);
    variance.sqrt()
}

/// Estimate the standard deviation of the win probability from a history of
/// per-depth centipawn scores, via the delta method: the score spread is
/// mapped through the sigmoid's local derivative at the mean score.
pub fn win_probability_stddev(scores: &[i32]) -> f64 {
    if scores.is_empty() {
        return 0.0;
    }
    let mean_score =
        (scores.iter().map(|&s| s as i64).sum::<i64>() as f64 / scores.len() as f64).round() as i32;
    let score_sd = sample_stddev(scores);
    win_probability_derivative(mean_score) * score_sd
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn even_score_is_fifty_fifty() {
        let p = win_probability(0);
        assert!((p - 0.5).abs() < 1e-12);
    }

    #[test]
    fn probability_is_monotonic_in_score() {
        let scores = [-800, -400, -100, 0, 100, 400, 800];
        let probs: Vec<f64> = scores.iter().map(|&s| win_probability(s)).collect();
        for w in probs.windows(2) {
            assert!(w[1] > w[0]);
        }
    }

    #[test]
    fn mate_scores_saturate() {
        assert_eq!(win_probability(1_000_000), 1.0);
        assert_eq!(win_probability(-1_000_000), 0.0);
    }

    #[test]
    fn probability_is_symmetric_around_zero() {
        let p_pos = win_probability(250);
        let p_neg = win_probability(-250);
        assert!((p_pos + p_neg - 1.0).abs() < 1e-9);
    }

    #[test]
    fn stddev_is_zero_for_constant_scores() {
        let scores = [30, 30, 30, 30];
        assert_eq!(win_probability_stddev(&scores), 0.0);
    }

    #[test]
    fn stddev_is_nonzero_for_varying_scores() {
        let scores = [10, 60, -20, 40, 15];
        assert!(win_probability_stddev(&scores) > 0.0);
    }

    #[test]
    fn empty_or_singleton_history_has_zero_stddev() {
        assert_eq!(win_probability_stddev(&[]), 0.0);
        assert_eq!(win_probability_stddev(&[42]), 0.0);
    }
}
