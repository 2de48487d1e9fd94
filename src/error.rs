//! Error types for rating prediction.
//!
//! Configuration problems surface before any computation starts; numeric
//! divergence surfaces as soon as it is detected. Low-support situations are
//! not errors: predictors fall back to documented estimates instead.

use thiserror::Error;

/// Main error type for aprender-cf operations.
///
/// # Examples
///
/// ```
/// use aprender_cf::error::CfError;
///
/// let err = CfError::InvalidHyperparameter {
///     param: "n_factors".to_string(),
///     value: "0".to_string(),
///     constraint: "> 0".to_string(),
/// };
/// assert!(err.to_string().contains("n_factors"));
/// ```
#[derive(Debug, Error)]
pub enum CfError {
    /// Invalid hyperparameter value provided.
    #[error("Invalid hyperparameter: {param} = {value}, expected {constraint}")]
    InvalidHyperparameter {
        /// Parameter name.
        param: String,
        /// Provided value.
        value: String,
        /// Constraint description.
        constraint: String,
    },

    /// Similarity metric name not recognized.
    #[error("Unknown similarity metric '{0}' (expected cosine, msd, pearson or pearson_baseline)")]
    UnknownMetric(String),

    /// Algorithm name not recognized.
    #[error("Unknown algorithm '{0}'")]
    UnknownAlgorithm(String),

    /// SGD produced a non-finite value.
    #[error("Training diverged at epoch {epoch}: non-finite value in {parameter}")]
    Diverged {
        /// Zero-based epoch in which divergence was detected.
        epoch: usize,
        /// Parameter block holding the first non-finite value.
        parameter: &'static str,
    },

    /// The same (user, item) pair was added twice.
    #[error("Duplicate rating for user '{user}' and item '{item}'")]
    DuplicateRating {
        /// Raw user id.
        user: String,
        /// Raw item id.
        item: String,
    },

    /// A rating lies outside the configured scale.
    #[error("Rating {rating} outside of scale [{lower}, {upper}]")]
    RatingOutOfScale {
        /// Offending rating.
        rating: f64,
        /// Scale lower bound.
        lower: f64,
        /// Scale upper bound.
        upper: f64,
    },

    /// Rating scale bounds are not ordered or not finite.
    #[error("Invalid rating scale [{lower}, {upper}]")]
    InvalidScale {
        /// Lower bound.
        lower: f64,
        /// Upper bound.
        upper: f64,
    },

    /// A rating store needs at least one rating.
    #[error("Cannot build a rating store without ratings")]
    EmptyDataset,

    /// Prediction requested before `fit`.
    #[error("{0} is not fitted. Call fit() first.")]
    NotFitted(&'static str),

    /// Accuracy measure requested over no predictions.
    #[error("Cannot compute accuracy over an empty prediction list")]
    EmptyPredictions,

    /// I/O error (config file not found, permission denied, etc.).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl CfError {
    /// Create an invalid hyperparameter error with descriptive context.
    #[must_use]
    pub fn invalid_param(param: &str, value: impl ToString, constraint: &str) -> Self {
        Self::InvalidHyperparameter {
            param: param.to_string(),
            value: value.to_string(),
            constraint: constraint.to_string(),
        }
    }
}

/// Convenience type alias for Results with [`CfError`].
pub type Result<T> = std::result::Result<T, CfError>;

/// Rejects zero for counts such as epochs, factors or neighbors.
pub(crate) fn require_positive(param: &str, value: usize) -> Result<()> {
    if value == 0 {
        return Err(CfError::invalid_param(param, value, "> 0"));
    }
    Ok(())
}

/// Rejects negative or non-finite regularization terms.
pub(crate) fn require_non_negative(param: &str, value: f64) -> Result<()> {
    if !value.is_finite() || value < 0.0 {
        return Err(CfError::invalid_param(param, value, ">= 0"));
    }
    Ok(())
}

/// Rejects non-positive or non-finite learning rates.
pub(crate) fn require_learning_rate(param: &str, value: f64) -> Result<()> {
    if !value.is_finite() || value <= 0.0 {
        return Err(CfError::invalid_param(param, value, "> 0"));
    }
    Ok(())
}
