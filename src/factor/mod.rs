//! Latent factor models trained with stochastic gradient descent.
//!
//! The estimate of user `u` for item `i` is
//!
//! ```text
//! r̂ = μ + bu[u] + bi[i] + q_i · (p_u + |N(u)|^-½ Σ_{j ∈ N(u)} y_j)
//! ```
//!
//! where the implicit term (SVD++) is only present when `implicit` is set and
//! the bias terms only when `biased` is set. Training visits the ratings in a
//! fresh random order each epoch and applies simultaneous regularized
//! updates computed from pre-update values.
//!
//! The [`nmf`] submodule trains the non-negative variant with multiplicative
//! updates and shares [`FactorModel`] for prediction.
//!
//! # References
//!
//! - Koren, Y., Bell, R., & Volinsky, C. (2009). Matrix factorization
//!   techniques for recommender systems. Computer.
//! - Koren, Y. (2008). Factorization meets the neighborhood. KDD.

use crate::baseline::{estimate_baselines, BaselineOptions, Baselines};
use crate::data::RatingStore;
use crate::error::{require_learning_rate, require_non_negative, require_positive, CfError, Result};
use crate::rng::seeded_rng;
use crate::traits::{Estimate, Predictor};
use rand::seq::SliceRandom;
use rand::Rng;
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};

pub mod nmf;

pub use nmf::{train_nmf, NmfOptions, NmfPredictor};

/// Hyperparameters of SGD factor training.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FactorOptions {
    /// Latent dimension.
    pub n_factors: usize,
    /// Number of SGD epochs.
    pub n_epochs: usize,
    /// Use the bias terms (warm-started from baseline estimation).
    pub biased: bool,
    /// Use implicit feedback vectors (SVD++).
    pub implicit: bool,
    /// Mean of the factor initialization.
    pub init_mean: f64,
    /// Standard deviation of the factor initialization.
    pub init_std: f64,
    /// Learning rate of bu.
    pub lr_bu: f64,
    /// Learning rate of bi.
    pub lr_bi: f64,
    /// Learning rate of P.
    pub lr_pu: f64,
    /// Learning rate of Q.
    pub lr_qi: f64,
    /// Learning rate of Y.
    pub lr_yj: f64,
    /// Regularization of bu.
    pub reg_bu: f64,
    /// Regularization of bi.
    pub reg_bi: f64,
    /// Regularization of P.
    pub reg_pu: f64,
    /// Regularization of Q.
    pub reg_qi: f64,
    /// Regularization of Y.
    pub reg_yj: f64,
    /// Baseline estimation used to initialize the biases.
    pub bsl_options: BaselineOptions,
    /// Random seed for initialization and shuffling.
    pub seed: Option<u64>,
}

impl Default for FactorOptions {
    fn default() -> Self {
        Self::svd()
    }
}

impl FactorOptions {
    /// SVD defaults: 100 factors, 20 epochs, lr 0.005, reg 0.02.
    #[must_use]
    pub fn svd() -> Self {
        Self {
            n_factors: 100,
            n_epochs: 20,
            biased: true,
            implicit: false,
            init_mean: 0.0,
            init_std: 0.1,
            lr_bu: 0.005,
            lr_bi: 0.005,
            lr_pu: 0.005,
            lr_qi: 0.005,
            lr_yj: 0.005,
            reg_bu: 0.02,
            reg_bi: 0.02,
            reg_pu: 0.02,
            reg_qi: 0.02,
            reg_yj: 0.02,
            bsl_options: BaselineOptions::default(),
            seed: None,
        }
    }

    /// SVD++ defaults: 20 factors, 20 epochs, lr 0.007, reg 0.02.
    #[must_use]
    pub fn svdpp() -> Self {
        Self {
            n_factors: 20,
            implicit: true,
            ..Self::svd()
        }
        .with_lr_all(0.007)
    }

    /// Sets the latent dimension.
    #[must_use]
    pub fn with_n_factors(mut self, n_factors: usize) -> Self {
        self.n_factors = n_factors;
        self
    }

    /// Sets the number of epochs.
    #[must_use]
    pub fn with_n_epochs(mut self, n_epochs: usize) -> Self {
        self.n_epochs = n_epochs;
        self
    }

    /// Enables or disables the bias terms.
    #[must_use]
    pub fn with_biased(mut self, biased: bool) -> Self {
        self.biased = biased;
        self
    }

    /// Sets the initialization distribution.
    #[must_use]
    pub fn with_init(mut self, init_mean: f64, init_std: f64) -> Self {
        self.init_mean = init_mean;
        self.init_std = init_std;
        self
    }

    /// Sets every learning rate.
    #[must_use]
    pub fn with_lr_all(mut self, lr: f64) -> Self {
        self.lr_bu = lr;
        self.lr_bi = lr;
        self.lr_pu = lr;
        self.lr_qi = lr;
        self.lr_yj = lr;
        self
    }

    /// Sets every regularization term.
    #[must_use]
    pub fn with_reg_all(mut self, reg: f64) -> Self {
        self.reg_bu = reg;
        self.reg_bi = reg;
        self.reg_pu = reg;
        self.reg_qi = reg;
        self.reg_yj = reg;
        self
    }

    /// Sets the baseline warm start.
    #[must_use]
    pub fn with_bsl_options(mut self, bsl_options: BaselineOptions) -> Self {
        self.bsl_options = bsl_options;
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
    /// Returns [`CfError::InvalidHyperparameter`] on the first invalid value.
    pub fn validate(&self) -> Result<()> {
        require_positive("n_factors", self.n_factors)?;
        require_positive("n_epochs", self.n_epochs)?;
        if !self.init_mean.is_finite() {
            return Err(CfError::invalid_param("init_mean", self.init_mean, "finite"));
        }
        require_non_negative("init_std", self.init_std)?;
        for (param, lr) in [
            ("lr_bu", self.lr_bu),
            ("lr_bi", self.lr_bi),
            ("lr_pu", self.lr_pu),
            ("lr_qi", self.lr_qi),
            ("lr_yj", self.lr_yj),
        ] {
            require_learning_rate(param, lr)?;
        }
        for (param, reg) in [
            ("reg_bu", self.reg_bu),
            ("reg_bi", self.reg_bi),
            ("reg_pu", self.reg_pu),
            ("reg_qi", self.reg_qi),
            ("reg_yj", self.reg_yj),
        ] {
            require_non_negative(param, reg)?;
        }
        if self.biased {
            self.bsl_options.validate()?;
        }
        Ok(())
    }
}

/// Dense row-major matrix of latent factors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FactorMatrix {
    n_rows: usize,
    n_factors: usize,
    data: Vec<f64>,
}

impl FactorMatrix {
    fn random<R: Rng + ?Sized>(
        n_rows: usize,
        n_factors: usize,
        init: &Normal<f64>,
        rng: &mut R,
    ) -> Self {
        let data = (0..n_rows * n_factors).map(|_| init.sample(rng)).collect();
        Self {
            n_rows,
            n_factors,
            data,
        }
    }

    /// Returns the shape as (`n_rows`, `n_factors`).
    #[must_use]
    pub fn shape(&self) -> (usize, usize) {
        (self.n_rows, self.n_factors)
    }

    /// Factor vector of `row`.
    #[must_use]
    pub fn row(&self, row: usize) -> &[f64] {
        &self.data[row * self.n_factors..(row + 1) * self.n_factors]
    }

    fn row_mut(&mut self, row: usize) -> &mut [f64] {
        &mut self.data[row * self.n_factors..(row + 1) * self.n_factors]
    }

    fn is_finite(&self) -> bool {
        self.data.iter().all(|v| v.is_finite())
    }
}

/// Trained biases and factors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FactorModel {
    /// Mean of all training ratings.
    pub global_mean: f64,
    /// Whether the bias terms are part of the estimate.
    pub biased: bool,
    /// User biases.
    pub bu: Vec<f64>,
    /// Item biases.
    pub bi: Vec<f64>,
    /// User factors P.
    pub pu: FactorMatrix,
    /// Item factors Q.
    pub qi: FactorMatrix,
    /// Implicit feedback factors Y (SVD++ only).
    pub yj: Option<FactorMatrix>,
    /// Training RMSE after each epoch.
    pub history: Vec<f64>,
}

impl FactorModel {
    /// Latent dimension.
    #[must_use]
    pub fn n_factors(&self) -> usize {
        self.pu.n_factors
    }

    /// Estimate of user `u` for item `i`; `rated_by_u` are the items `u` rated.
    #[must_use]
    pub fn predict(&self, rated_by_u: &[usize], u: usize, i: usize) -> f64 {
        let q = self.qi.row(i);
        let mut interaction = dot(q, self.pu.row(u));
        if let Some(yj) = &self.yj {
            if !rated_by_u.is_empty() {
                let norm = (rated_by_u.len() as f64).sqrt();
                interaction += rated_by_u.iter().map(|&j| dot(q, yj.row(j))).sum::<f64>() / norm;
            }
        }
        self.with_biases(u, i, interaction)
    }

    fn with_biases(&self, u: usize, i: usize, interaction: f64) -> f64 {
        if self.biased {
            self.global_mean + self.bu[u] + self.bi[i] + interaction
        } else {
            interaction
        }
    }

    /// Same as [`FactorModel::predict`], leaving the implicit feedback sum
    /// `|N(u)|^-½ Σ y_j` in `implicit`.
    fn predict_into(&self, rated_by_u: &[usize], u: usize, i: usize, implicit: &mut [f64]) -> f64 {
        implicit.iter_mut().for_each(|v| *v = 0.0);
        if let Some(yj) = &self.yj {
            if !rated_by_u.is_empty() {
                let norm = (rated_by_u.len() as f64).sqrt();
                for &j in rated_by_u {
                    for (acc, y) in implicit.iter_mut().zip(yj.row(j)) {
                        *acc += y;
                    }
                }
                implicit.iter_mut().for_each(|v| *v /= norm);
            }
        }

        let interaction: f64 = self
            .qi
            .row(i)
            .iter()
            .zip(self.pu.row(u))
            .zip(implicit.iter())
            .map(|((q, p), y)| q * (p + y))
            .sum();
        self.with_biases(u, i, interaction)
    }

    /// Root mean squared error over every stored rating.
    #[must_use]
    pub fn training_rmse(&self, store: &RatingStore) -> f64 {
        let mut implicit = vec![0.0; self.n_factors()];
        let mut sum = 0.0;
        for u in 0..store.n_users() {
            let row = store.user_ratings(u);
            for (i, r) in row.iter() {
                let err = r - self.predict_into(row.ids(), u, i, &mut implicit);
                sum += err * err;
            }
        }
        (sum / store.n_ratings() as f64).sqrt()
    }

    fn first_non_finite(&self) -> Option<&'static str> {
        if !self.bu.iter().all(|v| v.is_finite()) {
            Some("bu")
        } else if !self.bi.iter().all(|v| v.is_finite()) {
            Some("bi")
        } else if !self.pu.is_finite() {
            Some("pu")
        } else if !self.qi.is_finite() {
            Some("qi")
        } else if !self.yj.as_ref().map_or(true, FactorMatrix::is_finite) {
            Some("yj")
        } else {
            None
        }
    }

    /// One simultaneous update for rating `r` of user `u` on item `i`.
    fn sgd_step(
        &mut self,
        options: &FactorOptions,
        rated_by_u: &[usize],
        (u, i, r): (usize, usize, f64),
        scratch: &mut Scratch,
    ) -> std::result::Result<(), &'static str> {
        let err = r - self.predict_into(rated_by_u, u, i, &mut scratch.implicit);
        if !err.is_finite() {
            return Err("prediction");
        }

        if self.biased {
            let (bu, bi) = (self.bu[u], self.bi[i]);
            self.bu[u] += options.lr_bu * (err - options.reg_bu * bu);
            self.bi[i] += options.lr_bi * (err - options.reg_bi * bi);
        }

        scratch.q_old.copy_from_slice(self.qi.row(i));
        let p = self.pu.row_mut(u);
        let q = self.qi.row_mut(i);
        for f in 0..p.len() {
            let (puf, qif) = (p[f], q[f]);
            p[f] += options.lr_pu * (err * qif - options.reg_pu * puf);
            q[f] += options.lr_qi * (err * (puf + scratch.implicit[f]) - options.reg_qi * qif);
        }

        if let Some(yj) = &mut self.yj {
            let scaled_err = err / (rated_by_u.len() as f64).sqrt();
            for &j in rated_by_u {
                for (y, qif) in yj.row_mut(j).iter_mut().zip(&scratch.q_old) {
                    *y += options.lr_yj * (scaled_err * qif - options.reg_yj * *y);
                }
            }
        }
        Ok(())
    }
}

fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

struct Scratch {
    implicit: Vec<f64>,
    q_old: Vec<f64>,
}

/// Trains biases and latent factors.
///
/// When biased, the biases start from `baselines` if given, otherwise from a
/// fresh baseline estimation with `options.bsl_options`.
///
/// # Errors
///
/// Returns a configuration error before any computation for invalid options,
/// and [`CfError::Diverged`] as soon as a non-finite value appears.
///
/// # Examples
///
/// ```
/// use aprender_cf::data::{RatingScale, RatingStore};
/// use aprender_cf::factor::{train, FactorOptions};
/// use rand::SeedableRng;
///
/// let store = RatingStore::from_triples(
///     RatingScale::default(),
///     vec![("a", "x", 5.0), ("a", "y", 1.0), ("b", "x", 4.0), ("b", "y", 2.0)],
/// )
/// .expect("valid ratings");
/// let options = FactorOptions::svd().with_n_factors(2).with_n_epochs(30);
/// let mut rng = rand::rngs::StdRng::seed_from_u64(42);
///
/// let model = train(&store, &options, None, &mut rng).expect("training succeeds");
/// assert_eq!(model.history.len(), 30);
/// assert_eq!(model.pu.shape(), (2, 2));
/// ```
pub fn train<R: Rng + ?Sized>(
    store: &RatingStore,
    options: &FactorOptions,
    baselines: Option<&Baselines>,
    rng: &mut R,
) -> Result<FactorModel> {
    options.validate()?;
    let k = options.n_factors;
    let init = Normal::new(options.init_mean, options.init_std)
        .map_err(|_| CfError::invalid_param("init_std", options.init_std, ">= 0"))?;

    let (bu, bi) = if options.biased {
        match baselines {
            Some(b) if b.bu.len() == store.n_users() && b.bi.len() == store.n_items() => {
                (b.bu.clone(), b.bi.clone())
            }
            _ => {
                let estimated = estimate_baselines(store, &options.bsl_options, rng)?;
                (estimated.bu, estimated.bi)
            }
        }
    } else {
        (vec![0.0; store.n_users()], vec![0.0; store.n_items()])
    };
    let pu = FactorMatrix::random(store.n_users(), k, &init, rng);
    let qi = FactorMatrix::random(store.n_items(), k, &init, rng);
    let yj = options
        .implicit
        .then(|| FactorMatrix::random(store.n_items(), k, &init, rng));

    let mut model = FactorModel {
        global_mean: store.global_mean(),
        biased: options.biased,
        bu,
        bi,
        pu,
        qi,
        yj,
        history: Vec::with_capacity(options.n_epochs),
    };
    let mut scratch = Scratch {
        implicit: vec![0.0; k],
        q_old: vec![0.0; k],
    };
    let mut order: Vec<(usize, usize, f64)> = store.all_ratings().collect();

    for epoch in 0..options.n_epochs {
        order.shuffle(rng);
        for &rating in &order {
            let rated_by_u = store.user_ratings(rating.0).ids();
            model
                .sgd_step(options, rated_by_u, rating, &mut scratch)
                .map_err(|parameter| CfError::Diverged { epoch, parameter })?;
        }
        if let Some(parameter) = model.first_non_finite() {
            return Err(CfError::Diverged { epoch, parameter });
        }

        let rmse = model.training_rmse(store);
        debug!(epoch, rmse, "factor training epoch");
        model.history.push(rmse);
    }
    Ok(model)
}

/// Matrix factorization predictor (SVD, or SVD++ with implicit feedback).
///
/// # Examples
///
/// ```
/// use aprender_cf::prelude::*;
/// use std::sync::Arc;
///
/// let store = RatingStore::from_triples(
///     RatingScale::default(),
///     vec![("a", "x", 5.0), ("a", "y", 1.0), ("b", "x", 4.0)],
/// )
/// .expect("valid ratings");
///
/// let mut svd = FactorPredictor::svdpp().with_options(
///     FactorOptions::svdpp().with_n_factors(4).with_seed(7),
/// );
/// svd.fit(Arc::new(store)).expect("fit succeeds");
/// let prediction = svd.predict("b", "y", None).expect("fitted");
/// assert!(prediction.estimate.is_finite());
/// ```
#[derive(Debug, Clone, Default)]
pub struct FactorPredictor {
    options: FactorOptions,
    state: Option<(Arc<RatingStore>, FactorModel)>,
}

impl FactorPredictor {
    /// Creates an unfitted predictor.
    #[must_use]
    pub fn new(options: FactorOptions) -> Self {
        Self {
            options,
            state: None,
        }
    }

    /// SVD with default options.
    #[must_use]
    pub fn svd() -> Self {
        Self::new(FactorOptions::svd())
    }

    /// SVD++ with default options.
    #[must_use]
    pub fn svdpp() -> Self {
        Self::new(FactorOptions::svdpp())
    }

    /// Replaces the options.
    #[must_use]
    pub fn with_options(mut self, options: FactorOptions) -> Self {
        self.options = options;
        self
    }

    /// Options in use.
    #[must_use]
    pub fn options(&self) -> &FactorOptions {
        &self.options
    }

    /// Model trained by the last fit.
    #[must_use]
    pub fn model(&self) -> Option<&FactorModel> {
        self.state.as_ref().map(|(_, model)| model)
    }
}

impl Predictor for FactorPredictor {
    fn name(&self) -> &'static str {
        if self.options.implicit {
            "SVD++"
        } else {
            "SVD"
        }
    }

    fn fit(&mut self, store: Arc<RatingStore>) -> Result<()> {
        self.options.validate()?;
        self.state = None;
        info!(
            algorithm = self.name(),
            n_factors = self.options.n_factors,
            n_epochs = self.options.n_epochs,
            n_ratings = store.n_ratings(),
            "fitting factor model"
        );
        let mut rng = seeded_rng(self.options.seed);
        let model = train(&store, &self.options, None, &mut rng)?;
        info!(
            algorithm = self.name(),
            final_rmse = model.history.last().copied().unwrap_or(f64::NAN),
            "factor model trained"
        );
        self.state = Some((store, model));
        Ok(())
    }

    fn store(&self) -> Option<&RatingStore> {
        self.state.as_ref().map(|(store, _)| store.as_ref())
    }

    fn estimate(&self, u: usize, i: usize) -> Result<Estimate> {
        let (store, model) = self.state.as_ref().ok_or(CfError::NotFitted(self.name()))?;
        Ok(Estimate::new(model.predict(store.user_ratings(u).ids(), u, i)))
    }
}
