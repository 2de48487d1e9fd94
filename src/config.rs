//! Model configuration.
//!
//! A [`ModelConfig`] names an algorithm and carries its options. It is read
//! from JSON with the algorithm in an `"algorithm"` field, every other field
//! being optional:
//!
//! ```json
//! {"algorithm": "knn", "k": 20, "sim_options": {"metric": "pearson_baseline"}}
//! ```

use crate::baseline::{BaselineOnly, BaselineOptions};
use crate::co_clustering::{CoClustering, CoClusteringOptions};
use crate::error::{CfError, Result};
use crate::factor::{FactorOptions, FactorPredictor, NmfOptions, NmfPredictor};
use crate::neighbors::{KnnOptions, KnnPredictor};
use crate::normal::NormalPredictor;
use crate::slope_one::SlopeOne;
use crate::traits::Predictor;
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::path::Path;
use tracing::debug;

/// Available algorithms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Algorithm {
    /// Global mean plus user and item biases.
    BaselineOnly,
    /// Neighborhood predictor.
    Knn,
    /// Biased matrix factorization.
    Svd,
    /// Matrix factorization with implicit feedback.
    SvdPp,
    /// Non-negative matrix factorization.
    Nmf,
    /// Slope One.
    SlopeOne,
    /// Co-clustering.
    CoClustering,
    /// Random draws from the rating distribution.
    NormalPredictor,
}

impl Algorithm {
    /// All algorithms.
    pub const ALL: [Self; 8] = [
        Self::BaselineOnly,
        Self::Knn,
        Self::Svd,
        Self::SvdPp,
        Self::Nmf,
        Self::SlopeOne,
        Self::CoClustering,
        Self::NormalPredictor,
    ];

    /// Returns the snake_case name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BaselineOnly => "baseline_only",
            Self::Knn => "knn",
            Self::Svd => "svd",
            Self::SvdPp => "svd_pp",
            Self::Nmf => "nmf",
            Self::SlopeOne => "slope_one",
            Self::CoClustering => "co_clustering",
            Self::NormalPredictor => "normal_predictor",
        }
    }

    /// Parses a name, accepting the common aliases.
    ///
    /// # Errors
    ///
    /// Returns [`CfError::UnknownAlgorithm`] for unrecognized names.
    pub fn parse(s: &str) -> Result<Self> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "baseline_only" | "baseline" => Ok(Self::BaselineOnly),
            "knn" => Ok(Self::Knn),
            "svd" => Ok(Self::Svd),
            "svd_pp" | "svdpp" | "svd++" => Ok(Self::SvdPp),
            "nmf" => Ok(Self::Nmf),
            "slope_one" | "slopeone" => Ok(Self::SlopeOne),
            "co_clustering" | "coclustering" => Ok(Self::CoClustering),
            "normal_predictor" | "normal" => Ok(Self::NormalPredictor),
            _ => Err(CfError::UnknownAlgorithm(s.to_string())),
        }
    }

    /// Configuration of this algorithm with default options.
    #[must_use]
    pub fn default_config(self) -> ModelConfig {
        match self {
            Self::BaselineOnly => ModelConfig::BaselineOnly(BaselineOptions::default()),
            Self::Knn => ModelConfig::Knn(KnnOptions::default()),
            Self::Svd => ModelConfig::Svd(FactorOptions::svd()),
            Self::SvdPp => ModelConfig::SvdPp(FactorOptions::svdpp()),
            Self::Nmf => ModelConfig::Nmf(NmfOptions::default()),
            Self::SlopeOne => ModelConfig::SlopeOne,
            Self::CoClustering => ModelConfig::CoClustering(CoClusteringOptions::default()),
            Self::NormalPredictor => ModelConfig::NormalPredictor { seed: None },
        }
    }
}

/// Algorithm choice with its options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "algorithm", rename_all = "snake_case")]
pub enum ModelConfig {
    /// [`BaselineOnly`].
    BaselineOnly(BaselineOptions),
    /// [`KnnPredictor`].
    Knn(KnnOptions),
    /// [`FactorPredictor`] without implicit feedback.
    Svd(FactorOptions),
    /// [`FactorPredictor`] with implicit feedback.
    SvdPp(#[serde(deserialize_with = "svdpp_options")] FactorOptions),
    /// [`NmfPredictor`].
    Nmf(NmfOptions),
    /// [`SlopeOne`].
    SlopeOne,
    /// [`CoClustering`].
    CoClustering(CoClusteringOptions),
    /// [`NormalPredictor`].
    NormalPredictor {
        /// Random seed.
        #[serde(default)]
        seed: Option<u64>,
    },
}

// SVD++ fields missing from the input take the SVD++ defaults.
fn svdpp_options<'de, D>(deserializer: D) -> std::result::Result<FactorOptions, D::Error>
where
    D: Deserializer<'de>,
{
    let overrides = Map::<String, Value>::deserialize(deserializer)?;
    let mut merged = match serde_json::to_value(FactorOptions::svdpp()) {
        Ok(Value::Object(defaults)) => defaults,
        _ => Map::new(),
    };
    merged.extend(overrides);
    serde_json::from_value(Value::Object(merged)).map_err(D::Error::custom)
}

impl ModelConfig {
    /// Parses a configuration from JSON text.
    ///
    /// # Errors
    ///
    /// Returns [`CfError::Serialization`] for malformed JSON or unknown
    /// algorithm names.
    ///
    /// # Examples
    ///
    /// ```
    /// use aprender_cf::config::{Algorithm, ModelConfig};
    ///
    /// let config = ModelConfig::from_json(r#"{"algorithm": "svd", "n_factors": 10}"#)
    ///     .expect("valid config");
    /// assert_eq!(config.algorithm(), Algorithm::Svd);
    /// ```
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Reads a JSON configuration file.
    ///
    /// # Errors
    ///
    /// Returns [`CfError::Io`] if the file cannot be read, otherwise as
    /// [`ModelConfig::from_json`].
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let config = Self::from_json(&text)?;
        debug!(path = %path.display(), algorithm = config.algorithm().as_str(), "loaded model config");
        Ok(config)
    }

    /// Serializes to pretty-printed JSON.
    ///
    /// # Errors
    ///
    /// Returns [`CfError::Serialization`] on failure.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Algorithm this configuration selects.
    #[must_use]
    pub fn algorithm(&self) -> Algorithm {
        match self {
            Self::BaselineOnly(_) => Algorithm::BaselineOnly,
            Self::Knn(_) => Algorithm::Knn,
            Self::Svd(_) => Algorithm::Svd,
            Self::SvdPp(_) => Algorithm::SvdPp,
            Self::Nmf(_) => Algorithm::Nmf,
            Self::SlopeOne => Algorithm::SlopeOne,
            Self::CoClustering(_) => Algorithm::CoClustering,
            Self::NormalPredictor { .. } => Algorithm::NormalPredictor,
        }
    }

    /// Checks the options without fitting anything.
    ///
    /// # Errors
    ///
    /// Returns [`CfError::InvalidHyperparameter`] on the first invalid value.
    pub fn validate(&self) -> Result<()> {
        match self {
            Self::BaselineOnly(options) => options.validate(),
            Self::Knn(options) => options.validate(),
            Self::Svd(options) | Self::SvdPp(options) => options.validate(),
            Self::Nmf(options) => options.validate(),
            Self::CoClustering(options) => options.validate(),
            Self::SlopeOne | Self::NormalPredictor { .. } => Ok(()),
        }
    }

    /// Validates and creates the unfitted predictor.
    ///
    /// # Errors
    ///
    /// Returns [`CfError::InvalidHyperparameter`] for invalid options.
    pub fn build(&self) -> Result<Box<dyn Predictor>> {
        self.validate()?;
        let predictor: Box<dyn Predictor> = match self {
            Self::BaselineOnly(options) => {
                Box::new(BaselineOnly::new().with_options(options.clone()))
            }
            Self::Knn(options) => Box::new(KnnPredictor::new(options.clone())),
            Self::Svd(options) => Box::new(FactorPredictor::new(FactorOptions {
                implicit: false,
                ..options.clone()
            })),
            Self::SvdPp(options) => Box::new(FactorPredictor::new(FactorOptions {
                implicit: true,
                ..options.clone()
            })),
            Self::Nmf(options) => Box::new(NmfPredictor::new(options.clone())),
            Self::SlopeOne => Box::new(SlopeOne::new()),
            Self::CoClustering(options) => Box::new(CoClustering::new(options.clone())),
            Self::NormalPredictor { seed } => {
                let predictor = NormalPredictor::new();
                Box::new(match seed {
                    Some(seed) => predictor.with_seed(*seed),
                    None => predictor,
                })
            }
        };
        Ok(predictor)
    }
}

impl Default for ModelConfig {
    fn default() -> Self {
        Algorithm::Svd.default_config()
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
