//! Aprender CF: collaborative-filtering rating prediction in pure Rust.
//!
//! Given a sparse set of explicit (user, item, rating) triples, the crate
//! estimates ratings for unobserved pairs with neighborhood, matrix
//! factorization, Slope One and co-clustering models.
//!
//! # Quick Start
//!
//! ```
//! use aprender_cf::prelude::*;
//! use std::sync::Arc;
//!
//! let store = RatingStore::from_triples(
//!     RatingScale::new(1.0, 5.0).expect("valid scale"),
//!     vec![
//!         ("alice", "matrix", 5.0),
//!         ("alice", "heat", 4.0),
//!         ("bob", "matrix", 4.0),
//!         ("bob", "heat", 4.0),
//!         ("bob", "amelie", 2.0),
//!         ("carol", "amelie", 5.0),
//!     ],
//! )
//! .expect("valid ratings");
//! let store = Arc::new(store);
//!
//! let mut model = FactorPredictor::svd()
//!     .with_options(FactorOptions::svd().with_n_factors(5).with_seed(42));
//! model.fit(Arc::clone(&store)).expect("training succeeds");
//!
//! let prediction = model.predict("alice", "amelie", None).expect("fitted");
//! assert!(prediction.estimate.is_finite());
//!
//! let unseen = model.predict("dave", "amelie", None).expect("fitted");
//! assert!(unseen.was_impossible());
//! ```
//!
//! # Modules
//!
//! - [`data`]: Rating store with dense inner ids and sparse row access
//! - [`baseline`]: User/item bias estimation (ALS, SGD) and `BaselineOnly`
//! - [`similarity`]: Pairwise user or item similarity (cosine, MSD, Pearson)
//! - [`neighbors`]: k-nearest-neighbor prediction
//! - [`factor`]: Matrix factorization (SVD, SVD++, NMF)
//! - [`slope_one`]: Slope One
//! - [`co_clustering`]: Co-clustering
//! - [`normal`]: Random predictor from the rating distribution
//! - [`metrics`]: RMSE, MAE and FCP over predictions
//! - [`config`]: JSON model configuration and predictor factory

pub mod baseline;
pub mod co_clustering;
pub mod config;
pub mod data;
pub mod error;
pub mod factor;
pub mod metrics;
pub mod neighbors;
pub mod normal;
pub mod prelude;
pub mod rng;
pub mod similarity;
pub mod slope_one;
pub mod traits;

pub use error::{CfError, Result};
pub use traits::{Estimate, Prediction, Predictor};
