use super::*;
use crate::data::RatingScale;
use rand::rngs::StdRng;
use rand::SeedableRng;

// r_ui = 3 + a_u + b_i with a = [1, 0, -1] and b = [0.5, 0, -0.5].
fn biasable_store() -> RatingStore {
    let user_offsets = [1.0, 0.0, -1.0];
    let item_offsets = [0.5, 0.0, -0.5];
    let mut triples = Vec::new();
    for (u, a) in user_offsets.iter().enumerate() {
        for (i, b) in item_offsets.iter().enumerate() {
            triples.push((format!("u{u}"), format!("i{i}"), 3.0 + a + b));
        }
    }
    RatingStore::from_triples(RatingScale::default(), triples).expect("valid store")
}

fn sparse_store() -> RatingStore {
    RatingStore::from_triples(
        RatingScale::default(),
        vec![
            ("u0", "i0", 5.0),
            ("u0", "i1", 3.0),
            ("u1", "i0", 4.0),
            ("u1", "i2", 1.0),
            ("u2", "i1", 2.0),
            ("u2", "i2", 1.0),
            ("u3", "i0", 5.0),
        ],
    )
    .expect("valid store")
}

#[test]
fn test_als_without_regularization_beats_zero_biases() {
    let store = biasable_store();
    let options = BaselineOptions::als().with_reg(0.0, 0.0);
    let mut rng = StdRng::seed_from_u64(0);

    let baselines = estimate_baselines(&store, &options, &mut rng).expect("valid options");
    let zero = Baselines::zeros(&store);

    assert!(baselines.rmse(&store) < zero.rmse(&store));
    assert!(baselines.rmse(&store) < 1e-9);
    assert!((baselines.bu[0] - 1.0).abs() < 1e-9);
    assert!((baselines.bi[2] + 0.5).abs() < 1e-9);
}

#[test]
fn test_als_regularization_shrinks_biases() {
    let store = biasable_store();
    let mut rng = StdRng::seed_from_u64(0);
    let free = estimate_baselines(&store, &BaselineOptions::als().with_reg(0.0, 0.0), &mut rng)
        .expect("valid options");
    let shrunk = estimate_baselines(&store, &BaselineOptions::als(), &mut rng)
        .expect("valid options");

    assert!(shrunk.bu[0].abs() < free.bu[0].abs());
    assert!(shrunk.bu[0] > 0.0);
}

#[test]
fn test_sgd_reduces_error() {
    let store = sparse_store();
    let options = BaselineOptions::sgd().with_n_epochs(200).with_learning_rate(0.05);
    let mut rng = StdRng::seed_from_u64(3);

    let baselines = estimate_baselines(&store, &options, &mut rng).expect("valid options");
    assert!(baselines.rmse(&store) < Baselines::zeros(&store).rmse(&store));
}

#[test]
fn test_sgd_shuffle_is_seeded() {
    let store = sparse_store();
    let options = BaselineOptions::sgd().with_shuffle(true);

    let a = estimate_baselines(&store, &options, &mut StdRng::seed_from_u64(11))
        .expect("valid options");
    let b = estimate_baselines(&store, &options, &mut StdRng::seed_from_u64(11))
        .expect("valid options");
    assert_eq!(a, b);
}

#[test]
fn test_sgd_divergence_is_reported() {
    let store = sparse_store();
    let options = BaselineOptions::sgd()
        .with_n_epochs(50)
        .with_learning_rate(1e10);
    let mut rng = StdRng::seed_from_u64(0);

    let err = estimate_baselines(&store, &options, &mut rng).expect_err("diverges");
    assert!(matches!(err, CfError::Diverged { .. }));
}

#[test]
fn test_invalid_options_rejected() {
    let store = sparse_store();
    let mut rng = StdRng::seed_from_u64(0);

    let zero_epochs = BaselineOptions::als().with_n_epochs(0);
    assert!(matches!(
        estimate_baselines(&store, &zero_epochs, &mut rng),
        Err(CfError::InvalidHyperparameter { .. })
    ));

    let negative_reg = BaselineOptions::als().with_reg(-1.0, 0.0);
    assert!(negative_reg.validate().is_err());

    let zero_lr = BaselineOptions::sgd().with_learning_rate(0.0);
    assert!(zero_lr.validate().is_err());

    // learning rate is irrelevant to ALS
    let als_zero_lr = BaselineOptions::als().with_learning_rate(0.0);
    assert!(als_zero_lr.validate().is_ok());
}

#[test]
fn test_method_parsing() {
    assert_eq!(BaselineMethod::parse("ALS"), Some(BaselineMethod::Als));
    assert_eq!(BaselineMethod::parse("sgd"), Some(BaselineMethod::Sgd));
    assert_eq!(BaselineMethod::parse("newton"), None);
    assert_eq!(BaselineMethod::Sgd.as_str(), "sgd");
}

#[test]
fn test_baseline_only_predicts_bias_sum() {
    let store = Arc::new(biasable_store());
    let mut model = BaselineOnly::new().with_options(BaselineOptions::als().with_reg(0.0, 0.0));
    model.fit(Arc::clone(&store)).expect("fit");

    let prediction = model.predict("u0", "i0", None).expect("fitted");
    assert!((prediction.estimate - 4.5).abs() < 1e-9);
    assert!(!prediction.was_impossible());
    assert!(model.baselines().is_some());
}

#[test]
fn test_baseline_only_not_fitted() {
    let model = BaselineOnly::new();
    assert!(matches!(model.estimate(0, 0), Err(CfError::NotFitted(_))));
}
