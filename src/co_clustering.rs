//! Co-clustering predictor.
//!
//! Users and items are partitioned into clusters simultaneously. A rating is
//! the average of its co-cluster corrected by how the user and item deviate
//! from their own clusters:
//!
//! ```text
//! r̂ = A_cc + (μ_u - A_uc) + (μ_i - A_ic)
//! ```
//!
//! Assignments start uniformly at random and are refined for a fixed number
//! of epochs, each user (then each item) moving to the cluster that minimizes
//! the squared error over its ratings.
//!
//! # Reference
//!
//! George, T., & Merugu, S. (2005). A scalable collaborative filtering
//! framework based on co-clustering. ICDM.

use crate::data::RatingStore;
use crate::error::{require_positive, CfError, Result};
use crate::rng::seeded_rng;
use crate::traits::{Estimate, Predictor};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};

/// Hyperparameters of co-clustering.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoClusteringOptions {
    /// Number of user clusters.
    pub n_user_clusters: usize,
    /// Number of item clusters.
    pub n_item_clusters: usize,
    /// Number of refinement epochs.
    pub n_epochs: usize,
    /// Random seed for the initial assignment.
    pub seed: Option<u64>,
}

impl Default for CoClusteringOptions {
    fn default() -> Self {
        Self {
            n_user_clusters: 3,
            n_item_clusters: 3,
            n_epochs: 20,
            seed: None,
        }
    }
}

impl CoClusteringOptions {
    /// Sets both cluster counts.
    #[must_use]
    pub fn with_clusters(mut self, n_user_clusters: usize, n_item_clusters: usize) -> Self {
        self.n_user_clusters = n_user_clusters;
        self.n_item_clusters = n_item_clusters;
        self
    }

    /// Sets the number of epochs.
    #[must_use]
    pub fn with_n_epochs(mut self, n_epochs: usize) -> Self {
        self.n_epochs = n_epochs;
        self
    }

    /// Sets the random seed for reproducibility.
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Checks the epoch and cluster counts.
    ///
    /// # Errors
    ///
    /// Returns [`CfError::InvalidHyperparameter`] for zero epochs or clusters.
    pub fn validate(&self) -> Result<()> {
        require_positive("n_epochs", self.n_epochs)?;
        require_positive("n_user_clusters", self.n_user_clusters)?;
        require_positive("n_item_clusters", self.n_item_clusters)
    }
}

/// Cluster assignments and averages of a fitted co-clustering.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoClusters {
    /// Mean of all ratings.
    pub global_mean: f64,
    /// Mean rating of each user.
    pub user_means: Vec<f64>,
    /// Mean rating of each item.
    pub item_means: Vec<f64>,
    /// Cluster of each user.
    pub user_cluster: Vec<usize>,
    /// Cluster of each item.
    pub item_cluster: Vec<usize>,
    /// Average rating of each user cluster.
    pub avg_user_cluster: Vec<f64>,
    /// Average rating of each item cluster.
    pub avg_item_cluster: Vec<f64>,
    /// Average rating of each co-cluster, row-major by user cluster.
    pub avg_cocluster: Vec<f64>,
    /// Whether each co-cluster holds at least one rating.
    pub populated: Vec<bool>,
}

impl CoClusters {
    fn cell(&self, user_cluster: usize, item_cluster: usize) -> usize {
        user_cluster * self.avg_item_cluster.len() + item_cluster
    }

    fn corrected(&self, u: usize, i: usize, uc: usize, ic: usize) -> f64 {
        self.avg_cocluster[self.cell(uc, ic)]
            + (self.user_means[u] - self.avg_user_cluster[uc])
            + (self.item_means[i] - self.avg_item_cluster[ic])
    }

    /// Estimate of user `u` for item `i` under the current assignment.
    ///
    /// Unpopulated co-clusters fall back to `μ_u + μ_i - μ`.
    #[must_use]
    pub fn estimate(&self, u: usize, i: usize) -> f64 {
        let (uc, ic) = (self.user_cluster[u], self.item_cluster[i]);
        if self.populated[self.cell(uc, ic)] {
            self.corrected(u, i, uc, ic)
        } else {
            self.user_means[u] + self.item_means[i] - self.global_mean
        }
    }

    /// Recomputes every average from the current assignment.
    fn recompute_averages(&mut self, store: &RatingStore) {
        let (n_uc, n_ic) = (self.avg_user_cluster.len(), self.avg_item_cluster.len());
        let mut user_sums = vec![(0.0, 0usize); n_uc];
        let mut item_sums = vec![(0.0, 0usize); n_ic];
        let mut cell_sums = vec![(0.0, 0usize); n_uc * n_ic];

        for (u, i, r) in store.all_ratings() {
            let (uc, ic) = (self.user_cluster[u], self.item_cluster[i]);
            for slot in [
                &mut user_sums[uc],
                &mut item_sums[ic],
                &mut cell_sums[uc * n_ic + ic],
            ] {
                slot.0 += r;
                slot.1 += 1;
            }
        }

        let global_mean = self.global_mean;
        let mean_or_global = |&(sum, count): &(f64, usize)| {
            if count > 0 {
                sum / count as f64
            } else {
                global_mean
            }
        };
        self.avg_user_cluster = user_sums.iter().map(mean_or_global).collect();
        self.avg_item_cluster = item_sums.iter().map(mean_or_global).collect();
        self.avg_cocluster = cell_sums.iter().map(mean_or_global).collect();
        self.populated = cell_sums.iter().map(|&(_, count)| count > 0).collect();
    }

    fn reassign_users(&mut self, store: &RatingStore) {
        let n_uc = self.avg_user_cluster.len();
        for u in 0..store.n_users() {
            let row = store.user_ratings(u);
            let best = argmin(n_uc, |uc| {
                row.iter()
                    .map(|(i, r)| (r - self.corrected(u, i, uc, self.item_cluster[i])).powi(2))
                    .sum()
            });
            self.user_cluster[u] = best;
        }
    }

    fn reassign_items(&mut self, store: &RatingStore) {
        let n_ic = self.avg_item_cluster.len();
        for i in 0..store.n_items() {
            let column = store.item_ratings(i);
            let best = argmin(n_ic, |ic| {
                column
                    .iter()
                    .map(|(u, r)| (r - self.corrected(u, i, self.user_cluster[u], ic)).powi(2))
                    .sum()
            });
            self.item_cluster[i] = best;
        }
    }
}

// lowest-index cluster with minimal error
fn argmin(n: usize, error: impl Fn(usize) -> f64) -> usize {
    let mut best = (0, f64::INFINITY);
    for cluster in 0..n {
        let e = error(cluster);
        if e < best.1 {
            best = (cluster, e);
        }
    }
    best.0
}

/// Fits co-clusters to `store`.
///
/// # Errors
///
/// Returns [`CfError::InvalidHyperparameter`] for invalid options.
pub fn fit_co_clusters<R: Rng + ?Sized>(
    store: &RatingStore,
    options: &CoClusteringOptions,
    rng: &mut R,
) -> Result<CoClusters> {
    options.validate()?;
    let (n_uc, n_ic) = (options.n_user_clusters, options.n_item_clusters);

    let user_cluster = (0..store.n_users()).map(|_| rng.gen_range(0..n_uc)).collect();
    let item_cluster = (0..store.n_items()).map(|_| rng.gen_range(0..n_ic)).collect();
    let mut clusters = CoClusters {
        global_mean: store.global_mean(),
        user_means: store.user_means(),
        item_means: store.item_means(),
        user_cluster,
        item_cluster,
        avg_user_cluster: vec![0.0; n_uc],
        avg_item_cluster: vec![0.0; n_ic],
        avg_cocluster: vec![0.0; n_uc * n_ic],
        populated: vec![false; n_uc * n_ic],
    };

    for epoch in 0..options.n_epochs {
        clusters.recompute_averages(store);
        clusters.reassign_users(store);
        clusters.reassign_items(store);
        debug!(
            epoch,
            populated = clusters.populated.iter().filter(|&&p| p).count(),
            "co-clustering epoch"
        );
    }
    clusters.recompute_averages(store);
    Ok(clusters)
}

/// Co-clustering predictor.
///
/// # Examples
///
/// ```
/// use aprender_cf::prelude::*;
/// use std::sync::Arc;
///
/// let store = RatingStore::from_triples(
///     RatingScale::default(),
///     vec![("a", "x", 5.0), ("a", "y", 1.0), ("b", "x", 4.0), ("b", "y", 2.0)],
/// )
/// .expect("valid ratings");
///
/// let mut model = CoClustering::new(CoClusteringOptions::default().with_seed(3));
/// model.fit(Arc::new(store)).expect("fit succeeds");
/// assert!(model.predict("a", "x", Some(5.0)).expect("fitted").estimate.is_finite());
/// ```
#[derive(Debug, Clone, Default)]
pub struct CoClustering {
    options: CoClusteringOptions,
    state: Option<(Arc<RatingStore>, CoClusters)>,
}

impl CoClustering {
    /// Creates an unfitted predictor.
    #[must_use]
    pub fn new(options: CoClusteringOptions) -> Self {
        Self {
            options,
            state: None,
        }
    }

    /// Options in use.
    #[must_use]
    pub fn options(&self) -> &CoClusteringOptions {
        &self.options
    }

    /// Clusters found by the last fit.
    #[must_use]
    pub fn clusters(&self) -> Option<&CoClusters> {
        self.state.as_ref().map(|(_, clusters)| clusters)
    }
}

impl Predictor for CoClustering {
    fn name(&self) -> &'static str {
        "CoClustering"
    }

    fn fit(&mut self, store: Arc<RatingStore>) -> Result<()> {
        self.options.validate()?;
        self.state = None;
        info!(
            n_user_clusters = self.options.n_user_clusters,
            n_item_clusters = self.options.n_item_clusters,
            n_epochs = self.options.n_epochs,
            "fitting co-clustering"
        );
        let mut rng = seeded_rng(self.options.seed);
        let clusters = fit_co_clusters(&store, &self.options, &mut rng)?;
        self.state = Some((store, clusters));
        Ok(())
    }

    fn store(&self) -> Option<&RatingStore> {
        self.state.as_ref().map(|(store, _)| store.as_ref())
    }

    fn estimate(&self, u: usize, i: usize) -> Result<Estimate> {
        let (_, clusters) = self.state.as_ref().ok_or(CfError::NotFitted(self.name()))?;
        Ok(Estimate::new(clusters.estimate(u, i)))
    }
}

#[cfg(test)]
#[path = "co_clustering_tests.rs"]
mod tests;
