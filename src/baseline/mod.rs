//! Baseline (bias) estimation.
//!
//! A baseline estimate models a rating as `global_mean + bu[u] + bi[i]`: the
//! overall mean plus a systematic offset per user and per item. Two fitting
//! procedures are provided:
//!
//! - **ALS**: alternating regularized averages. Each epoch recomputes every
//!   user bias, then every item bias from the fresh user biases.
//! - **SGD**: stochastic gradient descent on the regularized squared error.
//!
//! The resulting [`Baselines`] are reused by the neighborhood predictor, the
//! `pearson_baseline` similarity and as a warm start for factor models.

use crate::data::RatingStore;
use crate::error::{require_learning_rate, require_non_negative, require_positive, CfError, Result};
use crate::rng::seeded_rng;
use crate::traits::{Estimate, Predictor};
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};

/// Procedure used to fit the biases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BaselineMethod {
    /// Alternating least squares approximation.
    Als,
    /// Stochastic gradient descent.
    Sgd,
}

impl BaselineMethod {
    /// Returns the snake_case name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Als => "als",
            Self::Sgd => "sgd",
        }
    }

    /// Parses a name.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "als" => Some(Self::Als),
            "sgd" => Some(Self::Sgd),
            _ => None,
        }
    }
}

/// Hyperparameters of baseline estimation.
///
/// `learning_rate` and `shuffle` only matter for [`BaselineMethod::Sgd`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BaselineOptions {
    /// Fitting procedure.
    pub method: BaselineMethod,
    /// Number of passes.
    pub n_epochs: usize,
    /// User bias regularization.
    pub reg_u: f64,
    /// Item bias regularization.
    pub reg_i: f64,
    /// SGD step size.
    pub learning_rate: f64,
    /// Visit ratings in a fresh random order every SGD epoch.
    pub shuffle: bool,
    /// Seed for the SGD shuffle.
    pub seed: Option<u64>,
}

impl Default for BaselineOptions {
    fn default() -> Self {
        Self::als()
    }
}

impl BaselineOptions {
    /// ALS defaults: 10 epochs, `reg_u = 15`, `reg_i = 10`.
    #[must_use]
    pub fn als() -> Self {
        Self {
            method: BaselineMethod::Als,
            n_epochs: 10,
            reg_u: 15.0,
            reg_i: 10.0,
            learning_rate: 0.005,
            shuffle: false,
            seed: None,
        }
    }

    /// SGD defaults: 20 epochs, regularization 0.02, learning rate 0.005.
    #[must_use]
    pub fn sgd() -> Self {
        Self {
            method: BaselineMethod::Sgd,
            n_epochs: 20,
            reg_u: 0.02,
            reg_i: 0.02,
            learning_rate: 0.005,
            shuffle: false,
            seed: None,
        }
    }

    /// Sets the number of epochs.
    #[must_use]
    pub fn with_n_epochs(mut self, n_epochs: usize) -> Self {
        self.n_epochs = n_epochs;
        self
    }

    /// Sets both regularization terms.
    #[must_use]
    pub fn with_reg(mut self, reg_u: f64, reg_i: f64) -> Self {
        self.reg_u = reg_u;
        self.reg_i = reg_i;
        self
    }

    /// Sets the SGD learning rate.
    #[must_use]
    pub fn with_learning_rate(mut self, learning_rate: f64) -> Self {
        self.learning_rate = learning_rate;
        self
    }

    /// Enables shuffled SGD passes.
    #[must_use]
    pub fn with_shuffle(mut self, shuffle: bool) -> Self {
        self.shuffle = shuffle;
        self
    }

    /// Sets the random seed for reproducibility.
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Checks every hyperparameter.
    ///
    /// # Errors
    ///
    /// Returns [`CfError::InvalidHyperparameter`] for a zero epoch count, a
    /// negative regularization or (SGD only) a non-positive learning rate.
    pub fn validate(&self) -> Result<()> {
        require_positive("bsl_options.n_epochs", self.n_epochs)?;
        require_non_negative("bsl_options.reg_u", self.reg_u)?;
        require_non_negative("bsl_options.reg_i", self.reg_i)?;
        if self.method == BaselineMethod::Sgd {
            require_learning_rate("bsl_options.learning_rate", self.learning_rate)?;
        }
        Ok(())
    }
}

/// Frozen bias vectors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Baselines {
    /// Mean of all training ratings.
    pub global_mean: f64,
    /// Per-user offsets.
    pub bu: Vec<f64>,
    /// Per-item offsets.
    pub bi: Vec<f64>,
}

impl Baselines {
    /// All-zero biases around the store's global mean.
    #[must_use]
    pub fn zeros(store: &RatingStore) -> Self {
        Self {
            global_mean: store.global_mean(),
            bu: vec![0.0; store.n_users()],
            bi: vec![0.0; store.n_items()],
        }
    }

    /// `global_mean + bu[u] + bi[i]`.
    #[must_use]
    pub fn estimate(&self, u: usize, i: usize) -> f64 {
        self.global_mean + self.bu[u] + self.bi[i]
    }

    /// Root mean squared reconstruction error over every stored rating.
    #[must_use]
    pub fn rmse(&self, store: &RatingStore) -> f64 {
        let sum: f64 = store
            .all_ratings()
            .map(|(u, i, r)| {
                let err = r - self.estimate(u, i);
                err * err
            })
            .sum();
        (sum / store.n_ratings() as f64).sqrt()
    }
}

/// Fits user and item biases.
///
/// # Errors
///
/// Returns a configuration error for invalid options and
/// [`CfError::Diverged`] if SGD produced a non-finite bias.
///
/// # Examples
///
/// ```
/// use aprender_cf::baseline::{estimate_baselines, BaselineOptions};
/// use aprender_cf::data::{RatingScale, RatingStore};
/// use rand::SeedableRng;
///
/// let store = RatingStore::from_triples(
///     RatingScale::default(),
///     vec![("a", "x", 5.0), ("a", "y", 4.0), ("b", "x", 2.0)],
/// )
/// .expect("valid ratings");
/// let mut rng = rand::rngs::StdRng::seed_from_u64(0);
///
/// let baselines = estimate_baselines(&store, &BaselineOptions::als(), &mut rng)
///     .expect("valid options");
/// assert!(baselines.bu[0] > baselines.bu[1]);
/// ```
pub fn estimate_baselines<R: Rng + ?Sized>(
    store: &RatingStore,
    options: &BaselineOptions,
    rng: &mut R,
) -> Result<Baselines> {
    options.validate()?;
    let mut baselines = Baselines::zeros(store);
    match options.method {
        BaselineMethod::Als => als(store, options, &mut baselines),
        BaselineMethod::Sgd => sgd(store, options, &mut baselines, rng)?,
    }
    debug!(
        method = options.method.as_str(),
        rmse = baselines.rmse(store),
        "estimated baselines"
    );
    Ok(baselines)
}

fn als(store: &RatingStore, options: &BaselineOptions, baselines: &mut Baselines) {
    let Baselines {
        global_mean,
        bu,
        bi,
    } = baselines;
    let global_mean = *global_mean;
    for _ in 0..options.n_epochs {
        for (u, bias) in bu.iter_mut().enumerate() {
            let row = store.user_ratings(u);
            let denominator = options.reg_u + row.len() as f64;
            if row.is_empty() || denominator == 0.0 {
                continue;
            }
            let residual: f64 = row.iter().map(|(i, r)| r - global_mean - bi[i]).sum();
            *bias = residual / denominator;
        }

        for (i, bias) in bi.iter_mut().enumerate() {
            let column = store.item_ratings(i);
            let denominator = options.reg_i + column.len() as f64;
            if column.is_empty() || denominator == 0.0 {
                continue;
            }
            let residual: f64 = column.iter().map(|(u, r)| r - global_mean - bu[u]).sum();
            *bias = residual / denominator;
        }
    }
}

fn sgd<R: Rng + ?Sized>(
    store: &RatingStore,
    options: &BaselineOptions,
    baselines: &mut Baselines,
    rng: &mut R,
) -> Result<()> {
    let mut order: Vec<(usize, usize, f64)> = store.all_ratings().collect();
    let lr = options.learning_rate;
    for epoch in 0..options.n_epochs {
        if options.shuffle {
            order.shuffle(rng);
        }
        for &(u, i, r) in &order {
            let err = r - baselines.estimate(u, i);
            baselines.bu[u] += lr * (err - options.reg_u * baselines.bu[u]);
            baselines.bi[i] += lr * (err - options.reg_i * baselines.bi[i]);
        }
        if !baselines.bu.iter().all(|b| b.is_finite()) {
            return Err(CfError::Diverged {
                epoch,
                parameter: "bu",
            });
        }
        if !baselines.bi.iter().all(|b| b.is_finite()) {
            return Err(CfError::Diverged {
                epoch,
                parameter: "bi",
            });
        }
    }
    Ok(())
}

/// Predicts the baseline estimate alone.
///
/// # Examples
///
/// ```
/// use aprender_cf::prelude::*;
/// use std::sync::Arc;
///
/// let store = RatingStore::from_triples(
///     RatingScale::default(),
///     vec![("a", "x", 5.0), ("a", "y", 4.0), ("b", "x", 2.0)],
/// )
/// .expect("valid ratings");
///
/// let mut model = BaselineOnly::new().with_options(BaselineOptions::sgd().with_seed(1));
/// model.fit(Arc::new(store)).expect("fit succeeds");
/// let prediction = model.predict("b", "y", None).expect("fitted");
/// assert!(prediction.estimate < 4.0);
/// ```
#[derive(Debug, Clone, Default)]
pub struct BaselineOnly {
    options: BaselineOptions,
    store: Option<Arc<RatingStore>>,
    baselines: Option<Baselines>,
}

impl BaselineOnly {
    /// Creates a predictor with ALS defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the baseline options.
    #[must_use]
    pub fn with_options(mut self, options: BaselineOptions) -> Self {
        self.options = options;
        self
    }

    /// Fitted biases, `None` before `fit`.
    #[must_use]
    pub fn baselines(&self) -> Option<&Baselines> {
        self.baselines.as_ref()
    }
}

impl Predictor for BaselineOnly {
    fn name(&self) -> &'static str {
        "BaselineOnly"
    }

    fn fit(&mut self, store: Arc<RatingStore>) -> Result<()> {
        self.options.validate()?;
        info!(
            method = self.options.method.as_str(),
            n_users = store.n_users(),
            n_items = store.n_items(),
            "fitting baseline predictor"
        );
        let mut rng = seeded_rng(self.options.seed);
        self.baselines = Some(estimate_baselines(&store, &self.options, &mut rng)?);
        self.store = Some(store);
        Ok(())
    }

    fn store(&self) -> Option<&RatingStore> {
        self.store.as_deref()
    }

    fn estimate(&self, u: usize, i: usize) -> Result<Estimate> {
        let baselines = self
            .baselines
            .as_ref()
            .ok_or(CfError::NotFitted(self.name()))?;
        Ok(Estimate::new(baselines.estimate(u, i)))
    }
}

#[cfg(test)]
mod tests;
