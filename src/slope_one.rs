//! Slope One predictor.
//!
//! For every ordered item pair `(j, t)` co-rated by at least one user, `fit`
//! stores the mean deviation `dev(j, t) = mean(r_ut - r_uj)`. A rating of
//! user `u` for `t` is the average of `r_uj + dev(j, t)` over the items `j`
//! that `u` rated and that share a co-rater with `t`.
//!
//! # Reference
//!
//! Lemire, D., & Maclachlan, A. (2005). Slope One Predictors for Online
//! Rating-Based Collaborative Filtering.

use crate::data::RatingStore;
use crate::error::{CfError, Result};
use crate::traits::{Estimate, Predictor};
use std::sync::Arc;
use tracing::info;

const NO_DEVIATIONS: &str = "No co-rated items.";

/// Pairwise item deviations.
#[derive(Debug, Clone, PartialEq)]
pub struct Deviations {
    n_items: usize,
    dev: Vec<f64>,
    freq: Vec<u32>,
}

impl Deviations {
    /// Accumulates deviations over every user's rated items.
    #[must_use]
    pub fn compute(store: &RatingStore) -> Self {
        let n = store.n_items();
        let mut dev = vec![0.0; n * n];
        let mut freq = vec![0u32; n * n];

        for u in 0..store.n_users() {
            let row = store.user_ratings(u);
            for (j, r_j) in row.iter() {
                for (t, r_t) in row.iter() {
                    if j != t {
                        dev[j * n + t] += r_t - r_j;
                        freq[j * n + t] += 1;
                    }
                }
            }
        }
        for (d, &f) in dev.iter_mut().zip(&freq) {
            if f > 0 {
                *d /= f64::from(f);
            }
        }
        Self {
            n_items: n,
            dev,
            freq,
        }
    }

    /// Mean of `r_ut - r_uj` over co-raters of `j` and `t`, if any.
    #[must_use]
    pub fn get(&self, j: usize, t: usize) -> Option<f64> {
        let idx = j * self.n_items + t;
        (self.freq[idx] > 0).then(|| self.dev[idx])
    }

    /// Number of users who rated both `j` and `t`.
    #[must_use]
    pub fn support(&self, j: usize, t: usize) -> u32 {
        self.freq[j * self.n_items + t]
    }
}

/// Slope One predictor.
///
/// # Examples
///
/// ```
/// use aprender_cf::prelude::*;
/// use std::sync::Arc;
///
/// let store = RatingStore::from_triples(
///     RatingScale::default(),
///     vec![("a", "item1", 3.0), ("a", "item2", 5.0), ("b", "item1", 4.0)],
/// )
/// .expect("valid ratings");
///
/// let mut slope_one = SlopeOne::new();
/// slope_one.fit(Arc::new(store)).expect("fit succeeds");
/// let prediction = slope_one.predict("b", "item2", None).expect("fitted");
/// assert!((prediction.estimate - 6.0).abs() < 1e-12);
/// ```
#[derive(Debug, Clone, Default)]
pub struct SlopeOne {
    state: Option<(Arc<RatingStore>, Deviations)>,
}

impl SlopeOne {
    /// Creates an unfitted predictor.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Deviations computed by the last fit.
    #[must_use]
    pub fn deviations(&self) -> Option<&Deviations> {
        self.state.as_ref().map(|(_, deviations)| deviations)
    }
}

impl Predictor for SlopeOne {
    fn name(&self) -> &'static str {
        "SlopeOne"
    }

    fn fit(&mut self, store: Arc<RatingStore>) -> Result<()> {
        info!(
            n_items = store.n_items(),
            n_ratings = store.n_ratings(),
            "fitting slope one"
        );
        let deviations = Deviations::compute(&store);
        self.state = Some((store, deviations));
        Ok(())
    }

    fn store(&self) -> Option<&RatingStore> {
        self.state.as_ref().map(|(store, _)| store.as_ref())
    }

    fn estimate(&self, u: usize, i: usize) -> Result<Estimate> {
        let (store, deviations) = self.state.as_ref().ok_or(CfError::NotFitted(self.name()))?;

        let (sum, count) = store
            .user_ratings(u)
            .iter()
            .filter(|&(j, _)| j != i)
            .filter_map(|(j, r_j)| deviations.get(j, i).map(|dev| r_j + dev))
            .fold((0.0, 0usize), |(sum, count), value| (sum + value, count + 1));

        if count == 0 {
            return Ok(Estimate::impossible(store.global_mean(), NO_DEVIATIONS));
        }
        Ok(Estimate::new(sum / count as f64))
    }
}

#[cfg(test)]
#[path = "slope_one_tests.rs"]
mod tests;
