//! Core traits for rating predictors.
//!
//! Every prediction strategy (neighborhood, latent factor, slope one,
//! co-clustering, ...) implements [`Predictor`]: `fit` builds the derived
//! structures from a [`RatingStore`], `estimate` answers for inner ids.
//! Unknown users and items are handled once, in the provided methods.

use crate::data::{RatingScale, RatingStore};
use crate::error::{CfError, Result};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Diagnostic information attached to an estimate.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Details {
    /// True when the estimate came from a fallback rather than the primary
    /// algorithm.
    pub was_impossible: bool,
    /// Why the fallback was used.
    pub reason: Option<String>,
    /// Number of neighbors that contributed (neighborhood models only).
    pub actual_k: Option<usize>,
}

/// A raw estimate on inner ids.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Estimate {
    /// Estimated rating, not clipped to the scale.
    pub value: f64,
    /// Diagnostics.
    pub details: Details,
}

impl Estimate {
    /// Estimate produced by the primary algorithm.
    #[must_use]
    pub fn new(value: f64) -> Self {
        Self {
            value,
            details: Details::default(),
        }
    }

    /// Estimate produced by a fallback.
    #[must_use]
    pub fn impossible(value: f64, reason: impl Into<String>) -> Self {
        Self {
            value,
            details: Details {
                was_impossible: true,
                reason: Some(reason.into()),
                actual_k: None,
            },
        }
    }

    /// Records how many neighbors were used.
    #[must_use]
    pub fn with_actual_k(mut self, actual_k: usize) -> Self {
        self.details.actual_k = Some(actual_k);
        self
    }
}

/// A prediction for a raw (user, item) pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    /// Raw user id.
    pub user: String,
    /// Raw item id.
    pub item: String,
    /// Known rating, if the pair came from a test set.
    pub actual: Option<f64>,
    /// Estimated rating.
    pub estimate: f64,
    /// Diagnostics.
    pub details: Details,
}

impl Prediction {
    /// Clamps the estimate into `scale`.
    #[must_use]
    pub fn clipped(mut self, scale: RatingScale) -> Self {
        self.estimate = scale.clip(self.estimate);
        self
    }

    /// Shorthand for `details.was_impossible`.
    #[must_use]
    pub fn was_impossible(&self) -> bool {
        self.details.was_impossible
    }
}

const UNKNOWN_REASON: &str = "User and/or item is unknown.";

/// Common capability set of every rating prediction strategy.
///
/// Implementors own their derived structures exclusively. After `fit`
/// returns they are read-only, so a fitted predictor can be shared across
/// threads.
///
/// # Examples
///
/// ```
/// use aprender_cf::prelude::*;
/// use std::sync::Arc;
///
/// let store = RatingStore::from_triples(
///     RatingScale::default(),
///     vec![("a", "x", 4.0), ("a", "y", 2.0), ("b", "x", 5.0)],
/// )
/// .expect("valid ratings");
///
/// let mut model = BaselineOnly::new();
/// model.fit(Arc::new(store)).expect("fit succeeds");
///
/// let known = model.predict("b", "y", None).expect("fitted");
/// assert!(!known.was_impossible());
///
/// let unknown = model.predict("zoe", "y", None).expect("fitted");
/// assert!(unknown.was_impossible());
/// ```
pub trait Predictor: Send + Sync {
    /// Short algorithm name used in logs and errors.
    fn name(&self) -> &'static str;

    /// Builds every derived structure from `store`, discarding earlier state.
    ///
    /// # Errors
    ///
    /// Returns a configuration error before any computation if a
    /// hyperparameter is invalid, or [`CfError::Diverged`] if training
    /// produced non-finite values.
    fn fit(&mut self, store: Arc<RatingStore>) -> Result<()>;

    /// The store the model was fitted on, `None` before `fit`.
    fn store(&self) -> Option<&RatingStore>;

    /// Estimates the rating of known user `u` for known item `i`.
    ///
    /// # Errors
    ///
    /// Returns [`CfError::NotFitted`] before `fit`.
    fn estimate(&self, u: usize, i: usize) -> Result<Estimate>;

    /// Estimates on inner ids; `None` marks an id unknown to the store.
    ///
    /// Unknown users or items get the global mean with `was_impossible`.
    ///
    /// # Errors
    ///
    /// Returns [`CfError::NotFitted`] before `fit`.
    fn predict_inner(&self, u: Option<usize>, i: Option<usize>) -> Result<Estimate> {
        let store = self.store().ok_or(CfError::NotFitted(self.name()))?;
        match (u, i) {
            (Some(u), Some(i)) if store.knows_user(u) && store.knows_item(i) => {
                self.estimate(u, i)
            }
            _ => Ok(Estimate::impossible(store.global_mean(), UNKNOWN_REASON)),
        }
    }

    /// Predicts the rating of a raw (user, item) pair.
    ///
    /// # Errors
    ///
    /// Returns [`CfError::NotFitted`] before `fit`.
    fn predict(&self, user: &str, item: &str, actual: Option<f64>) -> Result<Prediction> {
        let store = self.store().ok_or(CfError::NotFitted(self.name()))?;
        let estimate =
            self.predict_inner(store.to_inner_user(user), store.to_inner_item(item))?;
        Ok(Prediction {
            user: user.to_string(),
            item: item.to_string(),
            actual,
            estimate: estimate.value,
            details: estimate.details,
        })
    }

    /// Predicts every `(user, item, actual)` triple of a test set.
    ///
    /// # Errors
    ///
    /// Returns [`CfError::NotFitted`] before `fit`.
    fn test(&self, testset: &[(String, String, f64)]) -> Result<Vec<Prediction>> {
        testset
            .iter()
            .map(|(user, item, actual)| self.predict(user, item, Some(*actual)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Predicts the item mean; enough to exercise the provided methods.
    struct ItemMean {
        store: Option<Arc<RatingStore>>,
        means: Vec<f64>,
    }

    impl Predictor for ItemMean {
        fn name(&self) -> &'static str {
            "ItemMean"
        }

        fn fit(&mut self, store: Arc<RatingStore>) -> Result<()> {
            self.means = store.item_means();
            self.store = Some(store);
            Ok(())
        }

        fn store(&self) -> Option<&RatingStore> {
            self.store.as_deref()
        }

        fn estimate(&self, _u: usize, i: usize) -> Result<Estimate> {
            Ok(Estimate::new(self.means[i]))
        }
    }

    fn store() -> Arc<RatingStore> {
        Arc::new(
            RatingStore::from_triples(
                RatingScale::default(),
                vec![("a", "x", 4.0), ("b", "x", 2.0), ("b", "y", 5.0)],
            )
            .expect("valid store"),
        )
    }

    #[test]
    fn test_predict_before_fit_fails() {
        let model = ItemMean {
            store: None,
            means: Vec::new(),
        };
        let err = model.predict("a", "x", None).expect_err("not fitted");
        assert!(matches!(err, CfError::NotFitted("ItemMean")));
    }

    #[test]
    fn test_predict_known_pair() {
        let mut model = ItemMean {
            store: None,
            means: Vec::new(),
        };
        model.fit(store()).expect("fit");
        let prediction = model.predict("a", "y", Some(1.0)).expect("fitted");
        assert!((prediction.estimate - 5.0).abs() < 1e-12);
        assert_eq!(prediction.actual, Some(1.0));
        assert!(!prediction.was_impossible());
    }

    #[test]
    fn test_predict_unknown_falls_back_to_global_mean() {
        let mut model = ItemMean {
            store: None,
            means: Vec::new(),
        };
        model.fit(store()).expect("fit");
        let prediction = model.predict("a", "zzz", None).expect("fitted");
        assert!(prediction.was_impossible());
        assert!((prediction.estimate - 11.0 / 3.0).abs() < 1e-12);
        assert_eq!(prediction.details.reason.as_deref(), Some(UNKNOWN_REASON));

        let estimate = model.predict_inner(Some(0), Some(99)).expect("fitted");
        assert!(estimate.details.was_impossible);
    }

    #[test]
    fn test_testset_predictions() {
        let mut model = ItemMean {
            store: None,
            means: Vec::new(),
        };
        let store = store();
        model.fit(Arc::clone(&store)).expect("fit");
        let predictions = model.test(&store.build_testset()).expect("fitted");
        assert_eq!(predictions.len(), 3);
        assert!(predictions.iter().all(|p| p.actual.is_some()));
    }

    #[test]
    fn test_clipped_prediction() {
        let prediction = Prediction {
            user: "a".into(),
            item: "x".into(),
            actual: None,
            estimate: 6.0,
            details: Details::default(),
        };
        let clipped = prediction.clipped(RatingScale::default());
        assert!((clipped.estimate - 5.0).abs() < 1e-12);
    }
}
