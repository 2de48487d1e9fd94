//! Integration tests for Aprender CF.
//!
//! These tests verify end-to-end workflows: building a store, fitting every
//! predictor through the configuration layer, and scoring predictions.

use aprender_cf::prelude::*;
use std::sync::Arc;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn movie_store() -> Arc<RatingStore> {
    let ratings = [
        ("alice", "matrix", 5.0),
        ("alice", "inception", 4.0),
        ("alice", "amelie", 1.0),
        ("alice", "notebook", 2.0),
        ("bob", "matrix", 4.0),
        ("bob", "inception", 5.0),
        ("bob", "amelie", 2.0),
        ("carol", "amelie", 5.0),
        ("carol", "notebook", 4.0),
        ("carol", "matrix", 2.0),
        ("dave", "notebook", 5.0),
        ("dave", "amelie", 4.0),
        ("dave", "inception", 1.0),
        ("erin", "matrix", 5.0),
        ("erin", "notebook", 1.0),
    ];
    let mut builder = RatingStore::builder(RatingScale::default());
    for (user, item, rating) in ratings {
        builder.add(user, item, rating).expect("valid rating");
    }
    Arc::new(builder.build().expect("non-empty"))
}

#[test]
fn test_every_algorithm_end_to_end() {
    init_tracing();
    let store = movie_store();
    let testset = store.build_testset();

    for algorithm in Algorithm::ALL {
        let mut config = algorithm.default_config();
        if let ModelConfig::Svd(options) | ModelConfig::SvdPp(options) = &mut config {
            options.seed = Some(42);
        }
        if let ModelConfig::Nmf(options) = &mut config {
            options.seed = Some(42);
        }
        let mut predictor = config.build().expect("valid defaults");
        predictor.fit(Arc::clone(&store)).expect("fit");

        let predictions = predictor.test(&testset).expect("fitted");
        assert_eq!(predictions.len(), store.n_ratings());
        assert!(
            predictions.iter().all(|p| p.estimate.is_finite()),
            "{}",
            predictor.name()
        );
        let error = rmse(&predictions).expect("scored");
        assert!(error.is_finite() && error >= 0.0, "{}", predictor.name());

        let unseen = predictor.predict("zoe", "matrix", None).expect("fitted");
        assert!(unseen.was_impossible(), "{}", predictor.name());
        assert_eq!(unseen.estimate, store.global_mean());
    }
}

#[test]
fn test_svd_end_to_end_rmse_decreases() {
    init_tracing();
    let store = Arc::new(
        RatingStore::from_triples(
            RatingScale::default(),
            vec![
                ("u0", "i0", 5.0),
                ("u0", "i1", 3.0),
                ("u0", "i2", 4.0),
                ("u1", "i0", 4.0),
                ("u1", "i1", 2.0),
                ("u1", "i2", 3.0),
                ("u2", "i0", 1.0),
                ("u2", "i1", 5.0),
            ],
        )
        .expect("valid store"),
    );
    let options = FactorOptions::svd()
        .with_n_factors(1)
        .with_n_epochs(50)
        .with_lr_all(0.01)
        .with_reg_all(0.02)
        .with_seed(2024);
    let mut svd = FactorPredictor::new(options);
    svd.fit(Arc::clone(&store)).expect("training");

    let history = &svd.model().expect("fitted").history;
    assert!(history.iter().all(|rmse| rmse.is_finite()));
    for window in history[..11].windows(2) {
        assert!(window[1] <= window[0] + 1e-12, "{window:?}");
    }

    let missing = svd.predict("u2", "i2", None).expect("fitted");
    assert!(missing.estimate.is_finite());
    assert!(!missing.was_impossible());
}

#[test]
fn test_neighborhood_ranks_anti_testset() {
    let store = movie_store();
    let mut knn = KnnPredictor::new(KnnOptions {
        variant: KnnVariant::WithMeans,
        sim_options: SimilarityOptions::new(SimilarityMetric::Pearson),
        ..KnnOptions::default()
    });
    knn.fit(Arc::clone(&store)).expect("fit");

    let anti = store.build_anti_testset(None);
    assert_eq!(
        anti.len(),
        store.n_users() * store.n_items() - store.n_ratings()
    );
    let predictions = knn.test(&anti).expect("fitted");
    for prediction in &predictions {
        let clipped = prediction.clone().clipped(store.scale());
        assert!((1.0..=5.0).contains(&clipped.estimate));
        if prediction.was_impossible() {
            assert!(prediction.details.reason.is_some());
        }
    }
}

#[test]
fn test_slope_one_matches_worked_example() {
    let store = Arc::new(
        RatingStore::from_triples(
            RatingScale::default(),
            vec![("A", "item1", 3.0), ("A", "item2", 5.0), ("B", "item1", 4.0)],
        )
        .expect("valid store"),
    );
    let mut slope_one = SlopeOne::new();
    slope_one.fit(Arc::clone(&store)).expect("fit");

    let prediction = slope_one.predict("B", "item2", None).expect("fitted");
    assert!((prediction.estimate - 6.0).abs() < 1e-12);
    // clipping is opt-in
    let clipped = prediction.clipped(store.scale());
    assert_eq!(clipped.estimate, 5.0);
}

#[test]
fn test_predicting_before_fit_fails() {
    let predictor = ModelConfig::default().build().expect("valid");
    assert!(matches!(
        predictor.predict("alice", "matrix", None),
        Err(CfError::NotFitted(_))
    ));
}

#[test]
fn test_refit_replaces_state() {
    let mut model = BaselineOnly::new();
    model.fit(movie_store()).expect("fit");
    let small = Arc::new(
        RatingStore::from_triples(RatingScale::default(), vec![("x", "y", 2.0)])
            .expect("valid store"),
    );
    model.fit(Arc::clone(&small)).expect("refit");

    let gone = model.predict("alice", "matrix", None).expect("fitted");
    assert!(gone.was_impossible());
    assert_eq!(gone.estimate, 2.0);
}

#[test]
fn test_fitted_predictor_is_shareable_across_threads() {
    let store = movie_store();
    let mut model = SlopeOne::new();
    model.fit(store).expect("fit");
    let model = Arc::new(model);

    let handles: Vec<_> = ["alice", "bob", "carol"]
        .into_iter()
        .map(|user| {
            let model = Arc::clone(&model);
            std::thread::spawn(move || model.predict(user, "notebook", None).map(|p| p.estimate))
        })
        .collect();
    for handle in handles {
        let estimate = handle.join().expect("thread").expect("fitted");
        assert!(estimate.is_finite());
    }
}
