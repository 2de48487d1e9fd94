//! Convenience re-exports for common usage.
//!
//! # Usage
//!
//! ```
//! use aprender_cf::prelude::*;
//! ```

pub use crate::baseline::{BaselineMethod, BaselineOnly, BaselineOptions};
pub use crate::co_clustering::{CoClustering, CoClusteringOptions};
pub use crate::config::{Algorithm, ModelConfig};
pub use crate::data::{RatingScale, RatingStore, RatingStoreBuilder};
pub use crate::error::CfError;
pub use crate::factor::{FactorOptions, FactorPredictor, NmfOptions, NmfPredictor};
pub use crate::metrics::{fcp, mae, rmse};
pub use crate::neighbors::{KnnOptions, KnnPredictor, KnnVariant};
pub use crate::normal::NormalPredictor;
pub use crate::similarity::{SimilarityMetric, SimilarityOptions};
pub use crate::slope_one::SlopeOne;
pub use crate::traits::{Details, Estimate, Prediction, Predictor};
