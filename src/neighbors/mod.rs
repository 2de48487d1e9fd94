//! k-nearest-neighbor rating prediction.
//!
//! A rating is inferred from the ratings that the most similar users (or
//! items) gave to the same item (or received from the same user). Three
//! variants differ in how neighbor ratings are normalized before averaging:
//!
//! - [`KnnVariant::Basic`]: raw ratings
//! - [`KnnVariant::WithMeans`]: deviations from each entity's mean rating
//! - [`KnnVariant::Baseline`]: deviations from the baseline estimate
//!
//! When no neighbor qualifies, the prediction falls back to the variant's
//! reference value and is flagged `was_impossible`.

use crate::baseline::{estimate_baselines, BaselineOptions, Baselines};
use crate::data::RatingStore;
use crate::error::{require_positive, CfError, Result};
use crate::rng::seeded_rng;
use crate::similarity::{compute_similarity, SimilarityMatrix, SimilarityOptions};
use crate::traits::{Estimate, Predictor};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::Arc;
use tracing::info;

const NOT_ENOUGH_NEIGHBORS: &str = "Not enough neighbors.";

/// Neighbor weight sums below this magnitude count as zero.
const MIN_WEIGHT_SUM: f64 = 1e-12;

/// Normalization applied to neighbor ratings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KnnVariant {
    /// Similarity-weighted average of raw ratings.
    Basic,
    /// Mean-centered ratings.
    WithMeans,
    /// Baseline-centered ratings.
    Baseline,
}

impl KnnVariant {
    /// Returns the snake_case name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Basic => "basic",
            Self::WithMeans => "with_means",
            Self::Baseline => "baseline",
        }
    }
}

/// Hyperparameters of the neighborhood predictor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KnnOptions {
    /// Maximum number of neighbors.
    pub k: usize,
    /// Minimum number of neighbors for a non-fallback estimate.
    pub min_k: usize,
    /// Rating normalization.
    pub variant: KnnVariant,
    /// Similarity configuration.
    pub sim_options: SimilarityOptions,
    /// Baseline configuration (baseline variant and `pearson_baseline`).
    pub bsl_options: BaselineOptions,
}

impl Default for KnnOptions {
    fn default() -> Self {
        Self {
            k: 40,
            min_k: 1,
            variant: KnnVariant::Baseline,
            sim_options: SimilarityOptions::default(),
            bsl_options: BaselineOptions::default(),
        }
    }
}

impl KnnOptions {
    /// Checks every hyperparameter.
    ///
    /// # Errors
    ///
    /// Returns [`CfError::InvalidHyperparameter`] for `k == 0` or invalid
    /// baseline options.
    pub fn validate(&self) -> Result<()> {
        require_positive("k", self.k)?;
        if self.needs_baselines() {
            self.bsl_options.validate()?;
        }
        Ok(())
    }

    fn needs_baselines(&self) -> bool {
        self.variant == KnnVariant::Baseline || self.sim_options.metric.needs_baselines()
    }
}

/// Candidate neighbor.
///
/// Ordered so that "greater" means "less useful": lower similarity, then
/// higher id. A max-heap of neighbors therefore keeps the worst retained
/// neighbor on top, ready to be evicted.
#[derive(Debug, Clone, Copy)]
pub struct Neighbor {
    /// Inner id of the neighbor.
    pub id: usize,
    /// Similarity to the target entity.
    pub similarity: f64,
    /// Rating the neighbor gave (or received) for the counterpart.
    pub rating: f64,
}

impl PartialEq for Neighbor {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Neighbor {}

impl PartialOrd for Neighbor {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Neighbor {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .similarity
            .total_cmp(&self.similarity)
            .then(self.id.cmp(&other.id))
    }
}

/// The `k` best positive-similarity candidates, best first.
///
/// `target` itself is skipped.
pub fn top_k_neighbors(
    target: usize,
    candidates: impl Iterator<Item = (usize, f64)>,
    similarities: &[f64],
    k: usize,
) -> Vec<Neighbor> {
    let mut heap: BinaryHeap<Neighbor> = BinaryHeap::with_capacity(k + 1);
    for (id, rating) in candidates {
        let similarity = similarities[id];
        if id == target || similarity <= 0.0 {
            continue;
        }
        let candidate = Neighbor {
            id,
            similarity,
            rating,
        };
        if heap.len() < k {
            heap.push(candidate);
        } else if let Some(mut worst) = heap.peek_mut() {
            if candidate < *worst {
                *worst = candidate;
            }
        }
    }
    heap.into_sorted_vec()
}

#[derive(Debug, Clone)]
struct KnnState {
    store: Arc<RatingStore>,
    similarities: SimilarityMatrix,
    baselines: Option<Baselines>,
    means: Vec<f64>,
}

/// Neighborhood predictor.
///
/// # Examples
///
/// ```
/// use aprender_cf::prelude::*;
/// use std::sync::Arc;
///
/// let store = RatingStore::from_triples(
///     RatingScale::default(),
///     vec![
///         ("ann", "a", 5.0), ("ann", "b", 1.0), ("ann", "c", 5.0),
///         ("bob", "a", 5.0), ("bob", "b", 1.0),
///     ],
/// )
/// .expect("valid ratings");
///
/// let mut knn = KnnPredictor::new(KnnOptions {
///     variant: KnnVariant::Basic,
///     sim_options: SimilarityOptions::new(SimilarityMetric::Cosine),
///     ..KnnOptions::default()
/// });
/// knn.fit(Arc::new(store)).expect("fit succeeds");
///
/// let prediction = knn.predict("bob", "c", None).expect("fitted");
/// assert!((prediction.estimate - 5.0).abs() < 1e-9);
/// assert_eq!(prediction.details.actual_k, Some(1));
/// ```
#[derive(Debug, Clone, Default)]
pub struct KnnPredictor {
    options: KnnOptions,
    state: Option<KnnState>,
}

impl KnnPredictor {
    /// Creates an unfitted predictor.
    #[must_use]
    pub fn new(options: KnnOptions) -> Self {
        Self {
            options,
            state: None,
        }
    }

    /// Sets the neighbor count.
    #[must_use]
    pub fn with_k(mut self, k: usize) -> Self {
        self.options.k = k;
        self
    }

    /// Sets the minimum neighbor count.
    #[must_use]
    pub fn with_min_k(mut self, min_k: usize) -> Self {
        self.options.min_k = min_k;
        self
    }

    /// Options in use.
    #[must_use]
    pub fn options(&self) -> &KnnOptions {
        &self.options
    }

    /// Similarity matrix built by the last fit.
    #[must_use]
    pub fn similarities(&self) -> Option<&SimilarityMatrix> {
        self.state.as_ref().map(|state| &state.similarities)
    }

    /// Baselines built by the last fit, if the configuration needed them.
    #[must_use]
    pub fn baselines(&self) -> Option<&Baselines> {
        self.state.as_ref().and_then(|state| state.baselines.as_ref())
    }
}

impl Predictor for KnnPredictor {
    fn name(&self) -> &'static str {
        "KnnPredictor"
    }

    fn fit(&mut self, store: Arc<RatingStore>) -> Result<()> {
        self.options.validate()?;
        self.state = None;
        let user_based = self.options.sim_options.user_based;
        info!(
            variant = self.options.variant.as_str(),
            k = self.options.k,
            user_based,
            "fitting neighborhood predictor"
        );

        let baselines = if self.options.needs_baselines() {
            let mut rng = seeded_rng(self.options.bsl_options.seed);
            Some(estimate_baselines(&store, &self.options.bsl_options, &mut rng)?)
        } else {
            None
        };
        let similarities =
            compute_similarity(&store, &self.options.sim_options, baselines.as_ref())?;
        let means = match self.options.variant {
            KnnVariant::WithMeans if user_based => store.user_means(),
            KnnVariant::WithMeans => store.item_means(),
            _ => Vec::new(),
        };

        self.state = Some(KnnState {
            store,
            similarities,
            baselines,
            means,
        });
        Ok(())
    }

    fn store(&self) -> Option<&RatingStore> {
        self.state.as_ref().map(|state| state.store.as_ref())
    }

    fn estimate(&self, u: usize, i: usize) -> Result<Estimate> {
        let state = self.state.as_ref().ok_or(CfError::NotFitted(self.name()))?;
        let user_based = self.options.sim_options.user_based;
        // x: entity whose neighbors are searched, y: its counterpart
        let (x, y) = if user_based { (u, i) } else { (i, u) };

        let neighbors = top_k_neighbors(
            x,
            state.store.ratings_of(y, !user_based).iter(),
            state.similarities.row(x),
            self.options.k,
        );

        // reference value of (entity, counterpart) that ratings deviate from
        let reference = |entity: usize| -> f64 {
            match (self.options.variant, &state.baselines) {
                (KnnVariant::Baseline, Some(b)) if user_based => b.estimate(entity, y),
                (KnnVariant::Baseline, Some(b)) => b.estimate(y, entity),
                (KnnVariant::WithMeans, _) => state.means[entity],
                _ => 0.0,
            }
        };
        let fallback = match self.options.variant {
            KnnVariant::Basic => state.store.global_mean(),
            _ => reference(x),
        };

        let actual_k = neighbors.len();
        if actual_k == 0 || actual_k < self.options.min_k {
            return Ok(Estimate::impossible(fallback, NOT_ENOUGH_NEIGHBORS).with_actual_k(actual_k));
        }

        let mut sum_sim = 0.0;
        let mut sum_weighted = 0.0;
        for neighbor in &neighbors {
            sum_sim += neighbor.similarity;
            sum_weighted += neighbor.similarity * (neighbor.rating - reference(neighbor.id));
        }
        if sum_sim.abs() < MIN_WEIGHT_SUM {
            return Ok(Estimate::impossible(fallback, NOT_ENOUGH_NEIGHBORS).with_actual_k(actual_k));
        }

        Ok(Estimate::new(reference(x) + sum_weighted / sum_sim).with_actual_k(actual_k))
    }
}
