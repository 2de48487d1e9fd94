//! Property-based tests using proptest.
//!
//! These tests verify invariants of the similarity, factorization and
//! clustering routines on random rating sets.

use aprender_cf::co_clustering::{fit_co_clusters, CoClusteringOptions};
use aprender_cf::factor::train;
use aprender_cf::prelude::*;
use aprender_cf::similarity::compute_similarity;
use proptest::prelude::*;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::collections::BTreeMap;

// Strategy for small stores: up to 6 users x 6 items, ratings 1..=5
fn store_strategy() -> impl Strategy<Value = RatingStore> {
    proptest::collection::btree_map((0u8..6, 0u8..6), 1u8..=5, 1..30).prop_map(
        |ratings: BTreeMap<(u8, u8), u8>| {
            RatingStore::from_triples(
                RatingScale::default(),
                ratings
                    .into_iter()
                    .map(|((u, i), r)| (format!("u{u}"), format!("i{i}"), f64::from(r))),
            )
            .expect("Test data should be valid")
        },
    )
}

fn metric_strategy() -> impl Strategy<Value = SimilarityMetric> {
    prop_oneof![
        Just(SimilarityMetric::Cosine),
        Just(SimilarityMetric::Msd),
        Just(SimilarityMetric::Pearson),
        Just(SimilarityMetric::PearsonBaseline),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn similarity_is_symmetric_and_bounded(
        store in store_strategy(),
        metric in metric_strategy(),
        user_based in any::<bool>(),
    ) {
        let options = SimilarityOptions::new(metric).with_user_based(user_based);
        let sim = compute_similarity(&store, &options, None).expect("similarity");
        for a in 0..sim.len() {
            prop_assert_eq!(sim.get(a, a), 1.0);
            for b in 0..sim.len() {
                prop_assert_eq!(sim.get(a, b), sim.get(b, a));
                prop_assert!(sim.get(a, b) >= metric.min_value() - 1e-12);
                prop_assert!(sim.get(a, b) <= 1.0 + 1e-12);
            }
        }
    }

    #[test]
    fn similarity_below_min_support_is_zero(
        store in store_strategy(),
        metric in metric_strategy(),
        min_support in 1usize..5,
    ) {
        let options = SimilarityOptions::new(metric).with_min_support(min_support);
        let sim = compute_similarity(&store, &options, None).expect("similarity");
        for a in 0..store.n_users() {
            for b in (a + 1)..store.n_users() {
                let rated_by_b = store.user_ratings(b);
                let overlap = store
                    .user_ratings(a)
                    .ids()
                    .iter()
                    .filter(|&&i| rated_by_b.get(i).is_some())
                    .count();
                if overlap < min_support {
                    prop_assert_eq!(sim.get(a, b), 0.0);
                }
            }
        }
    }

    #[test]
    fn factor_training_is_reproducible(store in store_strategy(), seed in any::<u64>()) {
        let options = FactorOptions::svd().with_n_factors(3).with_n_epochs(5);
        let first = train(&store, &options, None, &mut StdRng::seed_from_u64(seed)).expect("training");
        let second = train(&store, &options, None, &mut StdRng::seed_from_u64(seed)).expect("training");
        prop_assert_eq!(&first, &second);
        prop_assert!(first.history.iter().all(|rmse| rmse.is_finite()));
    }

    #[test]
    fn co_cluster_averages_stay_in_cell_range(store in store_strategy(), seed in any::<u64>()) {
        let options = CoClusteringOptions::default().with_n_epochs(5);
        let clusters = fit_co_clusters(&store, &options, &mut StdRng::seed_from_u64(seed))
            .expect("fit");
        let n_ic = clusters.avg_item_cluster.len();
        let mut ranges = vec![(f64::INFINITY, f64::NEG_INFINITY); clusters.avg_cocluster.len()];
        for (u, i, r) in store.all_ratings() {
            let cell = clusters.user_cluster[u] * n_ic + clusters.item_cluster[i];
            ranges[cell] = (ranges[cell].0.min(r), ranges[cell].1.max(r));
        }
        for (cell, &(lo, hi)) in ranges.iter().enumerate() {
            if clusters.populated[cell] {
                let avg = clusters.avg_cocluster[cell];
                prop_assert!(avg >= lo - 1e-9 && avg <= hi + 1e-9);
            }
        }
    }

    #[test]
    fn slope_one_estimates_are_finite(store in store_strategy()) {
        let store = std::sync::Arc::new(store);
        let mut slope_one = SlopeOne::new();
        slope_one.fit(std::sync::Arc::clone(&store)).expect("fit");
        for (user, item, _) in store.build_testset() {
            let prediction = slope_one.predict(&user, &item, None).expect("fitted");
            prop_assert!(prediction.estimate.is_finite());
        }
    }
}
