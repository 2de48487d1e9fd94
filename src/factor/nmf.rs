//! Non-negative matrix factorization.
//!
//! Factors start uniform in `[init_low, init_high]` and are updated once per
//! epoch with multiplicative rules:
//!
//! ```text
//! p_uf ← p_uf · Σ_{i ∈ I(u)} q_if r_ui / (Σ_{i ∈ I(u)} q_if r̂_ui + |I(u)| λ_u p_uf)
//! q_if ← q_if · Σ_{u ∈ U(i)} p_uf r_ui / (Σ_{u ∈ U(i)} p_uf r̂_ui + |U(i)| λ_i q_if)
//! ```
//!
//! With non-negative ratings the factors stay non-negative. The biased
//! variant adds SGD-trained biases, which may drive estimates negative and
//! overfits easily on small data.
//!
//! # References
//!
//! - Luo, X., et al. (2014). An efficient non-negative matrix-factorization
//!   based approach to collaborative filtering for recommender systems.
//!   IEEE Transactions on Industrial Informatics.

use super::{FactorMatrix, FactorModel};
use crate::data::RatingStore;
use crate::error::{require_learning_rate, require_non_negative, require_positive, CfError, Result};
use crate::rng::seeded_rng;
use crate::traits::{Estimate, Predictor};
use rand::distributions::{Distribution, Uniform};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};

/// Hyperparameters of NMF training.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NmfOptions {
    /// Latent dimension.
    pub n_factors: usize,
    /// Number of epochs.
    pub n_epochs: usize,
    /// Use the bias terms.
    pub biased: bool,
    /// Lower bound of the factor initialization.
    pub init_low: f64,
    /// Upper bound of the factor initialization.
    pub init_high: f64,
    /// Regularization of P.
    pub reg_pu: f64,
    /// Regularization of Q.
    pub reg_qi: f64,
    /// Regularization of bu.
    pub reg_bu: f64,
    /// Regularization of bi.
    pub reg_bi: f64,
    /// Learning rate of bu.
    pub lr_bu: f64,
    /// Learning rate of bi.
    pub lr_bi: f64,
    /// Random seed for initialization.
    pub seed: Option<u64>,
}

impl Default for NmfOptions {
    fn default() -> Self {
        Self {
            n_factors: 15,
            n_epochs: 50,
            biased: false,
            init_low: 0.0,
            init_high: 1.0,
            reg_pu: 0.06,
            reg_qi: 0.06,
            reg_bu: 0.02,
            reg_bi: 0.02,
            lr_bu: 0.005,
            lr_bi: 0.005,
            seed: None,
        }
    }
}

impl NmfOptions {
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

    /// Sets the initialization interval.
    #[must_use]
    pub fn with_init(mut self, init_low: f64, init_high: f64) -> Self {
        self.init_low = init_low;
        self.init_high = init_high;
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
        require_non_negative("init_low", self.init_low)?;
        if !self.init_high.is_finite() || self.init_high < self.init_low {
            return Err(CfError::invalid_param(
                "init_high",
                self.init_high,
                ">= init_low",
            ));
        }
        for (param, reg) in [
            ("reg_pu", self.reg_pu),
            ("reg_qi", self.reg_qi),
            ("reg_bu", self.reg_bu),
            ("reg_bi", self.reg_bi),
        ] {
            require_non_negative(param, reg)?;
        }
        require_learning_rate("lr_bu", self.lr_bu)?;
        require_learning_rate("lr_bi", self.lr_bi)
    }
}

impl FactorMatrix {
    fn uniform<R: Rng + ?Sized>(
        n_rows: usize,
        n_factors: usize,
        init: &Uniform<f64>,
        rng: &mut R,
    ) -> Self {
        let data = (0..n_rows * n_factors).map(|_| init.sample(rng)).collect();
        Self {
            n_rows,
            n_factors,
            data,
        }
    }

    // row *= num / denom, where denom also carries count * reg * row
    fn multiplicative_update(&mut self, num: &Self, denom: &Self, counts: &[usize], reg: f64) {
        for (row, &count) in counts.iter().enumerate() {
            let reg_scale = count as f64 * reg;
            let (num, denom) = (num.row(row), denom.row(row));
            for (f, value) in self.row_mut(row).iter_mut().enumerate() {
                if *value == 0.0 {
                    continue;
                }
                let d = denom[f] + reg_scale * *value;
                if d > 0.0 {
                    *value *= num[f] / d;
                }
            }
        }
    }

    fn zeros_like(&self) -> Self {
        Self {
            n_rows: self.n_rows,
            n_factors: self.n_factors,
            data: vec![0.0; self.data.len()],
        }
    }
}

// num[row] += other * r, denom[row] += other * est
fn accumulate(
    num: &mut FactorMatrix,
    denom: &mut FactorMatrix,
    row: usize,
    other: &[f64],
    r: f64,
    est: f64,
) {
    let targets = num.row_mut(row).iter_mut().zip(denom.row_mut(row).iter_mut());
    for ((n, d), &x) in targets.zip(other) {
        *n += x * r;
        *d += x * est;
    }
}

/// Trains a non-negative factorization.
///
/// The ratings are visited in store order; `rng` only draws the initial
/// factors. The returned model has no implicit factors and, when unbiased,
/// predicts the plain dot product `q_i · p_u`.
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
/// use aprender_cf::factor::{train_nmf, NmfOptions};
/// use rand::SeedableRng;
///
/// let store = RatingStore::from_triples(
///     RatingScale::default(),
///     vec![("a", "x", 5.0), ("a", "y", 1.0), ("b", "x", 4.0), ("b", "y", 2.0)],
/// )
/// .expect("valid ratings");
/// let options = NmfOptions::default().with_n_factors(2).with_n_epochs(20);
/// let mut rng = rand::rngs::StdRng::seed_from_u64(42);
///
/// let model = train_nmf(&store, &options, &mut rng).expect("training succeeds");
/// assert!(model.pu.row(0).iter().all(|&p| p >= 0.0));
/// ```
pub fn train_nmf<R: Rng + ?Sized>(
    store: &RatingStore,
    options: &NmfOptions,
    rng: &mut R,
) -> Result<FactorModel> {
    options.validate()?;
    let k = options.n_factors;
    let init = Uniform::new_inclusive(options.init_low, options.init_high);

    let pu = FactorMatrix::uniform(store.n_users(), k, &init, rng);
    let qi = FactorMatrix::uniform(store.n_items(), k, &init, rng);
    let mut model = FactorModel {
        global_mean: if options.biased {
            store.global_mean()
        } else {
            0.0
        },
        biased: options.biased,
        bu: vec![0.0; store.n_users()],
        bi: vec![0.0; store.n_items()],
        pu,
        qi,
        yj: None,
        history: Vec::with_capacity(options.n_epochs),
    };

    let user_counts: Vec<usize> = (0..store.n_users())
        .map(|u| store.user_ratings(u).len())
        .collect();
    let item_counts: Vec<usize> = (0..store.n_items())
        .map(|i| store.item_ratings(i).len())
        .collect();

    for epoch in 0..options.n_epochs {
        let mut user_num = model.pu.zeros_like();
        let mut user_denom = model.pu.zeros_like();
        let mut item_num = model.qi.zeros_like();
        let mut item_denom = model.qi.zeros_like();

        for (u, i, r) in store.all_ratings() {
            let est = model.predict(&[], u, i);
            if !est.is_finite() {
                return Err(CfError::Diverged {
                    epoch,
                    parameter: "prediction",
                });
            }
            if options.biased {
                let err = r - est;
                let (bu, bi) = (model.bu[u], model.bi[i]);
                model.bu[u] += options.lr_bu * (err - options.reg_bu * bu);
                model.bi[i] += options.lr_bi * (err - options.reg_bi * bi);
            }

            accumulate(&mut user_num, &mut user_denom, u, model.qi.row(i), r, est);
            accumulate(&mut item_num, &mut item_denom, i, model.pu.row(u), r, est);
        }

        model
            .pu
            .multiplicative_update(&user_num, &user_denom, &user_counts, options.reg_pu);
        model
            .qi
            .multiplicative_update(&item_num, &item_denom, &item_counts, options.reg_qi);
        if let Some(parameter) = model.first_non_finite() {
            return Err(CfError::Diverged { epoch, parameter });
        }

        let rmse = model.training_rmse(store);
        debug!(epoch, rmse, "nmf epoch");
        model.history.push(rmse);
    }
    Ok(model)
}

/// Non-negative matrix factorization predictor.
#[derive(Debug, Clone, Default)]
pub struct NmfPredictor {
    options: NmfOptions,
    state: Option<(Arc<RatingStore>, FactorModel)>,
}

impl NmfPredictor {
    /// Creates an unfitted predictor.
    #[must_use]
    pub fn new(options: NmfOptions) -> Self {
        Self {
            options,
            state: None,
        }
    }

    /// Options in use.
    #[must_use]
    pub fn options(&self) -> &NmfOptions {
        &self.options
    }

    /// Model trained by the last fit.
    #[must_use]
    pub fn model(&self) -> Option<&FactorModel> {
        self.state.as_ref().map(|(_, model)| model)
    }
}

impl Predictor for NmfPredictor {
    fn name(&self) -> &'static str {
        "NMF"
    }

    fn fit(&mut self, store: Arc<RatingStore>) -> Result<()> {
        self.options.validate()?;
        self.state = None;
        info!(
            n_factors = self.options.n_factors,
            n_epochs = self.options.n_epochs,
            biased = self.options.biased,
            n_ratings = store.n_ratings(),
            "fitting nmf"
        );
        let model = train_nmf(&store, &self.options, &mut seeded_rng(self.options.seed))?;
        self.state = Some((store, model));
        Ok(())
    }

    fn store(&self) -> Option<&RatingStore> {
        self.state.as_ref().map(|(store, _)| store.as_ref())
    }

    fn estimate(&self, u: usize, i: usize) -> Result<Estimate> {
        let (_, model) = self.state.as_ref().ok_or(CfError::NotFitted(self.name()))?;
        Ok(Estimate::new(model.predict(&[], u, i)))
    }
}

#[cfg(test)]
#[path = "nmf_tests.rs"]
mod tests;
