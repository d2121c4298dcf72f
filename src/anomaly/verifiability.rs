//! Empirical verifiability score
//!
//! Collapses a batch of raw anomaly scores into a single value in [0, 1]
//! by min-max normalizing them against each other and averaging. The value
//! is relative to the batch: the same sample contributes differently
//! depending on what else is submitted with it.

use crate::error::{Result, VerifiableError};

/// Aggregate a batch of raw anomaly scores
///
/// Returns exactly `1.0` for degenerate batches (one sample, or all scores equal).
pub fn verifiability_score(raw_scores: &[f64]) -> Result<f64> {
    if raw_scores.is_empty() {
        return Err(VerifiableError::InvalidInput(
            "cannot score an empty batch".to_string(),
        ));
    }

    if raw_scores.iter().any(|s| !s.is_finite()) {
        return Err(VerifiableError::InvalidInput(
            "raw scores must be finite".to_string(),
        ));
    }

    let min_score = raw_scores.iter().copied().fold(f64::INFINITY, f64::min);
    let max_score = raw_scores.iter().copied().fold(f64::NEG_INFINITY, f64::max);

    if max_score == min_score {
        return Ok(1.0);
    }

    let range = max_score - min_score;
    let mean = raw_scores
        .iter()
        .map(|&s| (s - min_score) / range)
        .sum::<f64>()
        / raw_scores.len() as f64;

    Ok(mean.clamp(0.0, 1.0))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_sample_is_fully_verifiable() {
        assert_eq!(verifiability_score(&[0.37]).unwrap(), 1.0);
    }

    #[test]
    fn test_identical_scores() {
        assert_eq!(verifiability_score(&[0.5, 0.5, 0.5, 0.5]).unwrap(), 1.0);
    }

    #[test]
    fn test_min_max_mean() {
        // normalized: 0.0, 0.5, 1.0
        let score = verifiability_score(&[0.2, 0.4, 0.6]).unwrap();
        assert!((score - 0.5).abs() < 1e-12);

        // normalized: 0.0, 0.0, 0.0, 1.0
        let score = verifiability_score(&[0.4, 0.4, 0.4, 0.9]).unwrap();
        assert!((score - 0.25).abs() < 1e-12);
    }

    #[test]
    fn test_batch_relative() {
        let alone = verifiability_score(&[0.45, 0.55]).unwrap();
        let with_outlier = verifiability_score(&[0.45, 0.55, 0.95]).unwrap();
        assert!((alone - 0.5).abs() < 1e-12);
        assert!(with_outlier < alone);
    }

    #[test]
    fn test_always_in_unit_interval() {
        let batches: [&[f64]; 4] = [
            &[0.1, 0.9],
            &[0.33, 0.34, 0.35, 0.99, 0.01],
            &[1.0, 0.5, 0.5000001],
            &[0.7, 0.2, 0.2, 0.2, 0.2, 0.2],
        ];
        for batch in batches {
            let score = verifiability_score(batch).unwrap();
            assert!((0.0..=1.0).contains(&score), "{:?} -> {}", batch, score);
        }
    }

    #[test]
    fn test_empty_and_non_finite_batches() {
        assert!(matches!(
            verifiability_score(&[]),
            Err(VerifiableError::InvalidInput(_))
        ));
        assert!(verifiability_score(&[0.5, f64::NAN, 0.2]).is_err());
        assert!(verifiability_score(&[0.5, f64::INFINITY]).is_err());
    }
}
