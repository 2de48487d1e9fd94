//! Accuracy metrics over predictions.
//!
//! Only predictions that carry an actual rating are scored. Every metric
//! returns [`CfError::EmptyPredictions`] when nothing can be scored.

use crate::error::{CfError, Result};
use crate::traits::Prediction;
use std::collections::HashMap;

fn errors(predictions: &[Prediction]) -> Result<Vec<f64>> {
    let errors: Vec<f64> = predictions
        .iter()
        .filter_map(|p| p.actual.map(|actual| actual - p.estimate))
        .collect();
    if errors.is_empty() {
        return Err(CfError::EmptyPredictions);
    }
    Ok(errors)
}

/// Root mean squared error.
///
/// RMSE = sqrt(mean((r - r̂)²))
///
/// # Errors
///
/// Returns [`CfError::EmptyPredictions`] if no prediction has an actual rating.
///
/// # Examples
///
/// ```
/// use aprender_cf::metrics::rmse;
/// use aprender_cf::traits::{Details, Prediction};
///
/// let predictions = vec![
///     Prediction { user: "a".into(), item: "x".into(), actual: Some(4.0), estimate: 3.0, details: Details::default() },
///     Prediction { user: "a".into(), item: "y".into(), actual: Some(2.0), estimate: 3.0, details: Details::default() },
/// ];
/// assert!((rmse(&predictions).expect("non-empty") - 1.0).abs() < 1e-12);
/// ```
pub fn rmse(predictions: &[Prediction]) -> Result<f64> {
    let errors = errors(predictions)?;
    let mse = errors.iter().map(|e| e * e).sum::<f64>() / errors.len() as f64;
    Ok(mse.sqrt())
}

/// Mean absolute error.
///
/// # Errors
///
/// Returns [`CfError::EmptyPredictions`] if no prediction has an actual rating.
pub fn mae(predictions: &[Prediction]) -> Result<f64> {
    let errors = errors(predictions)?;
    Ok(errors.iter().map(|e| e.abs()).sum::<f64>() / errors.len() as f64)
}

/// Fraction of concordant pairs.
///
/// Among pairs of predictions for the same user, a pair is concordant when
/// the estimates are ordered like the actual ratings and discordant when the
/// estimates do not separate a strictly ordered pair.
///
/// FCP = concordant / (concordant + discordant)
///
/// # Errors
///
/// Returns [`CfError::EmptyPredictions`] if no user has a comparable pair.
pub fn fcp(predictions: &[Prediction]) -> Result<f64> {
    let mut by_user: HashMap<&str, Vec<(f64, f64)>> = HashMap::new();
    for p in predictions {
        if let Some(actual) = p.actual {
            by_user
                .entry(p.user.as_str())
                .or_default()
                .push((actual, p.estimate));
        }
    }

    let mut concordant = 0usize;
    let mut discordant = 0usize;
    for pairs in by_user.values() {
        for &(r_a, est_a) in pairs {
            for &(r_b, est_b) in pairs {
                if est_a > est_b && r_a > r_b {
                    concordant += 1;
                }
                if est_a >= est_b && r_a < r_b {
                    discordant += 1;
                }
            }
        }
    }

    let total = concordant + discordant;
    if total == 0 {
        return Err(CfError::EmptyPredictions);
    }
    Ok(concordant as f64 / total as f64)
}
