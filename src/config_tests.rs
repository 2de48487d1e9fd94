use super::*;
use crate::similarity::SimilarityMetric;
use std::io::Write;

#[test]
fn test_parse_algorithm_names() {
    for algorithm in Algorithm::ALL {
        assert_eq!(Algorithm::parse(algorithm.as_str()).expect("known"), algorithm);
    }
    assert_eq!(Algorithm::parse("SVD++").expect("known"), Algorithm::SvdPp);
    assert_eq!(Algorithm::parse("slope-one").expect("known"), Algorithm::SlopeOne);
    assert!(matches!(
        Algorithm::parse("kmeans"),
        Err(CfError::UnknownAlgorithm(name)) if name == "kmeans"
    ));
}

#[test]
fn test_knn_config_from_json() {
    let config = ModelConfig::from_json(
        r#"{"algorithm": "knn", "k": 20, "sim_options": {"metric": "pearson_baseline", "shrinkage": 50}}"#,
    )
    .expect("valid config");
    let ModelConfig::Knn(options) = &config else {
        panic!("expected knn, got {config:?}");
    };
    assert_eq!(options.k, 20);
    assert_eq!(options.sim_options.metric, SimilarityMetric::PearsonBaseline);
    assert_eq!(options.sim_options.shrinkage, 50);
    assert_eq!(options.sim_options.min_support, 1);
    assert_eq!(config.build().expect("valid").name(), "KnnPredictor");
}

#[test]
fn test_svdpp_uses_its_own_defaults() {
    let config = ModelConfig::from_json(r#"{"algorithm": "svd_pp", "n_epochs": 5}"#)
        .expect("valid config");
    let ModelConfig::SvdPp(options) = &config else {
        panic!("expected svd_pp, got {config:?}");
    };
    assert_eq!(options.n_factors, 20);
    assert_eq!(options.n_epochs, 5);
    assert!((options.lr_yj - 0.007).abs() < 1e-12);
    assert_eq!(config.build().expect("valid").name(), "SVD++");
}

#[test]
fn test_nmf_config_from_json() {
    let config = ModelConfig::from_json(r#"{"algorithm": "nmf", "n_factors": 4, "biased": true}"#)
        .expect("valid config");
    let ModelConfig::Nmf(options) = &config else {
        panic!("expected nmf, got {config:?}");
    };
    assert_eq!(options.n_factors, 4);
    assert!(options.biased);
    assert_eq!(options.n_epochs, 50);
    assert_eq!(config.algorithm(), Algorithm::Nmf);
    assert_eq!(config.build().expect("valid").name(), "NMF");
}

#[test]
fn test_unit_and_struct_variants() {
    let slope_one = ModelConfig::from_json(r#"{"algorithm": "slope_one"}"#).expect("valid");
    assert_eq!(slope_one, ModelConfig::SlopeOne);

    let normal = ModelConfig::from_json(r#"{"algorithm": "normal_predictor", "seed": 4}"#)
        .expect("valid");
    assert_eq!(normal, ModelConfig::NormalPredictor { seed: Some(4) });
}

#[test]
fn test_unknown_algorithm_is_a_serialization_error() {
    let err = ModelConfig::from_json(r#"{"algorithm": "kmeans"}"#).expect_err("unknown");
    assert!(matches!(err, CfError::Serialization(_)));
}

#[test]
fn test_build_rejects_invalid_options() {
    let config = ModelConfig::from_json(r#"{"algorithm": "co_clustering", "n_user_clusters": 0}"#)
        .expect("valid json");
    assert!(matches!(
        config.build(),
        Err(CfError::InvalidHyperparameter { .. })
    ));
}

#[test]
fn test_json_round_trip_through_file() {
    let config = Algorithm::CoClustering.default_config();
    let mut file = tempfile::NamedTempFile::new().expect("temp file");
    file.write_all(config.to_json().expect("serialize").as_bytes())
        .expect("write");

    let loaded = ModelConfig::load(file.path()).expect("load");
    assert_eq!(loaded, config);
}

#[test]
fn test_load_missing_file() {
    let dir = tempfile::tempdir().expect("temp dir");
    let err = ModelConfig::load(dir.path().join("missing.json")).expect_err("missing");
    assert!(matches!(err, CfError::Io(_)));
}

#[test]
fn test_every_default_config_builds() {
    for algorithm in Algorithm::ALL {
        let config = algorithm.default_config();
        assert_eq!(config.algorithm(), algorithm);
        assert!(config.build().is_ok(), "{}", algorithm.as_str());
    }
}
