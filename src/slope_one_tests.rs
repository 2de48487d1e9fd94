use super::*;
use crate::data::RatingScale;

fn two_user_store() -> Arc<RatingStore> {
    Arc::new(
        RatingStore::from_triples(
            RatingScale::default(),
            vec![("A", "item1", 3.0), ("A", "item2", 5.0), ("B", "item1", 4.0)],
        )
        .expect("valid store"),
    )
}

#[test]
fn test_deviation_and_prediction() {
    let store = two_user_store();
    let mut slope_one = SlopeOne::new();
    slope_one.fit(Arc::clone(&store)).expect("fit");

    let item1 = store.to_inner_item("item1").expect("known");
    let item2 = store.to_inner_item("item2").expect("known");
    let deviations = slope_one.deviations().expect("fitted");
    assert_eq!(deviations.get(item1, item2), Some(2.0));
    assert_eq!(deviations.get(item2, item1), Some(-2.0));
    assert_eq!(deviations.support(item1, item2), 1);

    let prediction = slope_one.predict("B", "item2", None).expect("fitted");
    assert!((prediction.estimate - 6.0).abs() < 1e-12);
    assert!(!prediction.was_impossible());
}

#[test]
fn test_averages_over_rated_items() {
    let store = Arc::new(
        RatingStore::from_triples(
            RatingScale::default(),
            vec![
                ("a", "x", 2.0),
                ("a", "y", 3.0),
                ("a", "z", 4.0),
                ("b", "x", 3.0),
                ("b", "z", 3.0),
                ("c", "x", 1.0),
                ("c", "y", 2.0),
            ],
        )
        .expect("valid store"),
    );
    let mut slope_one = SlopeOne::new();
    slope_one.fit(store).expect("fit");

    // dev(x, z) = mean(2, 0) = 1; dev(y, z) = 1 (only a)
    // c: (1 + 1 + 2 + 1) / 2
    let prediction = slope_one.predict("c", "z", None).expect("fitted");
    assert!((prediction.estimate - 2.5).abs() < 1e-12);
}

#[test]
fn test_no_co_rated_items_falls_back_to_global_mean() {
    let store = Arc::new(
        RatingStore::from_triples(
            RatingScale::default(),
            vec![("a", "x", 2.0), ("b", "y", 4.0)],
        )
        .expect("valid store"),
    );
    let mut slope_one = SlopeOne::new();
    slope_one.fit(Arc::clone(&store)).expect("fit");

    let prediction = slope_one.predict("a", "y", None).expect("fitted");
    assert!(prediction.was_impossible());
    assert!((prediction.estimate - 3.0).abs() < 1e-12);
}

#[test]
fn test_not_fitted() {
    assert!(matches!(
        SlopeOne::new().estimate(0, 0),
        Err(CfError::NotFitted("SlopeOne"))
    ));
}
