//! Random predictor drawing from the training rating distribution.

use crate::data::RatingStore;
use crate::error::{CfError, Result};
use crate::rng::seeded_rng;
use crate::traits::{Estimate, Predictor};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Normal};
use std::sync::Arc;
use tracing::info;

#[derive(Debug, Clone)]
struct NormalState {
    store: Arc<RatingStore>,
    mean: f64,
    std_dev: f64,
    distribution: Normal<f64>,
    base_seed: u64,
}

/// Predicts a draw from `Normal(μ, σ)` fitted to the training ratings.
///
/// Draws for a given (user, item) pair are deterministic: the generator is
/// seeded from the fit seed mixed with both ids.
#[derive(Debug, Clone, Default)]
pub struct NormalPredictor {
    seed: Option<u64>,
    state: Option<NormalState>,
}

impl NormalPredictor {
    /// Creates an unfitted predictor.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the random seed for reproducibility.
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Fitted (mean, standard deviation).
    #[must_use]
    pub fn parameters(&self) -> Option<(f64, f64)> {
        self.state
            .as_ref()
            .map(|state| (state.mean, state.std_dev))
    }
}

fn mix(seed: u64, u: usize, i: usize) -> u64 {
    seed ^ (u as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15)
        ^ (i as u64).wrapping_mul(0xC2B2_AE3D_27D4_EB4F)
}

impl Predictor for NormalPredictor {
    fn name(&self) -> &'static str {
        "NormalPredictor"
    }

    fn fit(&mut self, store: Arc<RatingStore>) -> Result<()> {
        let mean = store.global_mean();
        let variance = store
            .all_ratings()
            .map(|(_, _, r)| (r - mean).powi(2))
            .sum::<f64>()
            / store.n_ratings() as f64;
        let std_dev = variance.sqrt();
        let distribution = Normal::new(mean, std_dev)
            .map_err(|_| CfError::invalid_param("std_dev", std_dev, ">= 0 and finite"))?;
        info!(mean, std_dev, "fitted normal predictor");

        self.state = Some(NormalState {
            store,
            mean,
            std_dev,
            distribution,
            base_seed: seeded_rng(self.seed).gen(),
        });
        Ok(())
    }

    fn store(&self) -> Option<&RatingStore> {
        self.state.as_ref().map(|state| state.store.as_ref())
    }

    fn estimate(&self, u: usize, i: usize) -> Result<Estimate> {
        let state = self.state.as_ref().ok_or(CfError::NotFitted(self.name()))?;
        let mut rng = StdRng::seed_from_u64(mix(state.base_seed, u, i));
        Ok(Estimate::new(state.distribution.sample(&mut rng)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::RatingScale;

    fn store(ratings: &[f64]) -> Arc<RatingStore> {
        Arc::new(
            RatingStore::from_triples(
                RatingScale::default(),
                ratings
                    .iter()
                    .enumerate()
                    .map(|(n, &r)| (format!("u{n}"), "item", r)),
            )
            .expect("valid store"),
        )
    }

    #[test]
    fn test_population_parameters() {
        let mut model = NormalPredictor::new().with_seed(1);
        model.fit(store(&[1.0, 3.0, 5.0])).expect("fit");
        let (mean, std_dev) = model.parameters().expect("fitted");
        assert!((mean - 3.0).abs() < 1e-12);
        assert!((std_dev - (8.0_f64 / 3.0).sqrt()).abs() < 1e-12);
    }

    #[test]
    fn test_constant_ratings_predict_the_constant() {
        let mut model = NormalPredictor::new();
        model.fit(store(&[4.0, 4.0])).expect("fit");
        let prediction = model.predict("u0", "item", None).expect("fitted");
        assert_eq!(prediction.estimate, 4.0);
    }

    #[test]
    fn test_draws_are_deterministic_per_pair() {
        let data = store(&[1.0, 2.0, 5.0, 4.0]);
        let mut a = NormalPredictor::new().with_seed(9);
        let mut b = NormalPredictor::new().with_seed(9);
        a.fit(Arc::clone(&data)).expect("fit");
        b.fit(data).expect("fit");

        let first = a.estimate(1, 0).expect("fitted").value;
        assert_eq!(first, a.estimate(1, 0).expect("fitted").value);
        assert_eq!(first, b.estimate(1, 0).expect("fitted").value);
    }

    #[test]
    fn test_not_fitted() {
        assert!(matches!(
            NormalPredictor::new().estimate(0, 0),
            Err(CfError::NotFitted(_))
        ));
    }
}
