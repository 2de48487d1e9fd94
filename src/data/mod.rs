//! Sparse rating storage.
//!
//! A [`RatingStore`] holds every known (user, item, rating) triple in two
//! compressed sparse layouts: rows by user and columns by item. Raw external
//! identifiers are translated to dense inner ids exactly once, inside
//! [`RatingStoreBuilder`]; every numeric kernel in the crate works on inner ids.

use crate::error::{CfError, Result};
use serde::{Deserialize, Serialize};
use sprs::CsMat;
use std::collections::{HashMap, HashSet};

/// Closed interval of valid rating values.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RatingScale {
    /// Lowest valid rating.
    pub lower: f64,
    /// Highest valid rating.
    pub upper: f64,
}

impl RatingScale {
    /// Creates a validated scale.
    ///
    /// # Errors
    ///
    /// Returns [`CfError::InvalidScale`] if a bound is not finite or
    /// `lower > upper`.
    pub fn new(lower: f64, upper: f64) -> Result<Self> {
        if !lower.is_finite() || !upper.is_finite() || lower > upper {
            return Err(CfError::InvalidScale { lower, upper });
        }
        Ok(Self { lower, upper })
    }

    /// Returns true if `rating` lies within the scale.
    #[must_use]
    pub fn contains(&self, rating: f64) -> bool {
        rating >= self.lower && rating <= self.upper
    }

    /// Clamps an estimate into the scale.
    #[must_use]
    pub fn clip(&self, estimate: f64) -> f64 {
        estimate.clamp(self.lower, self.upper)
    }
}

impl Default for RatingScale {
    fn default() -> Self {
        Self {
            lower: 1.0,
            upper: 5.0,
        }
    }
}

/// Raw identifier arena: inner id is the position in `raw`.
#[derive(Debug, Clone, Default)]
struct IdArena {
    inner: HashMap<String, usize>,
    raw: Vec<String>,
}

impl IdArena {
    fn intern(&mut self, id: String) -> usize {
        if let Some(&inner) = self.inner.get(&id) {
            return inner;
        }
        let inner = self.raw.len();
        self.inner.insert(id.clone(), inner);
        self.raw.push(id);
        inner
    }

    fn len(&self) -> usize {
        self.raw.len()
    }
}

/// Ratings of one user (or one item), sorted by the counterpart inner id.
#[derive(Debug, Clone, Copy)]
pub struct RatingRow<'a> {
    ids: &'a [usize],
    ratings: &'a [f64],
}

impl<'a> RatingRow<'a> {
    /// Counterpart inner ids.
    #[must_use]
    pub fn ids(&self) -> &'a [usize] {
        self.ids
    }

    /// Rating values, aligned with [`RatingRow::ids`].
    #[must_use]
    pub fn ratings(&self) -> &'a [f64] {
        self.ratings
    }

    /// Number of ratings in the row.
    #[must_use]
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    /// True if the row holds no ratings.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Iterates `(counterpart_id, rating)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (usize, f64)> + 'a {
        self.ids.iter().copied().zip(self.ratings.iter().copied())
    }

    /// Rating given to `id`, found by binary search over the sorted ids.
    #[must_use]
    pub fn get(&self, id: usize) -> Option<f64> {
        self.ids
            .binary_search(&id)
            .ok()
            .map(|position| self.ratings[position])
    }

    /// Arithmetic mean of the row, `None` when empty.
    #[must_use]
    pub fn mean(&self) -> Option<f64> {
        if self.is_empty() {
            None
        } else {
            Some(self.ratings.iter().sum::<f64>() / self.len() as f64)
        }
    }
}

fn lane(matrix: &CsMat<f64>, outer: usize) -> RatingRow<'_> {
    let range = matrix.indptr().outer_inds_sz(outer);
    RatingRow {
        ids: &matrix.indices()[range.clone()],
        ratings: &matrix.data()[range],
    }
}

/// Immutable sparse store of known ratings.
///
/// # Examples
///
/// ```
/// use aprender_cf::data::{RatingScale, RatingStore};
///
/// let mut builder = RatingStore::builder(RatingScale::default());
/// builder.add("alice", "matrix", 5.0).expect("valid rating");
/// builder.add("alice", "heat", 3.0).expect("valid rating");
/// builder.add("bob", "matrix", 4.0).expect("valid rating");
/// let store = builder.build().expect("non-empty store");
///
/// assert_eq!(store.n_users(), 2);
/// assert_eq!(store.n_items(), 2);
/// assert!((store.global_mean() - 4.0).abs() < 1e-12);
/// ```
#[derive(Debug, Clone)]
pub struct RatingStore {
    scale: RatingScale,
    users: IdArena,
    items: IdArena,
    by_user: CsMat<f64>,
    by_item: CsMat<f64>,
    global_mean: f64,
}

impl RatingStore {
    /// Starts a builder for ratings on the given scale.
    #[must_use]
    pub fn builder(scale: RatingScale) -> RatingStoreBuilder {
        RatingStoreBuilder::new(scale)
    }

    /// Builds a store directly from raw triples.
    ///
    /// # Errors
    ///
    /// Propagates builder errors (duplicates, out-of-scale ratings, no data).
    pub fn from_triples<U, I>(
        scale: RatingScale,
        triples: impl IntoIterator<Item = (U, I, f64)>,
    ) -> Result<Self>
    where
        U: Into<String>,
        I: Into<String>,
    {
        let mut builder = Self::builder(scale);
        for (user, item, rating) in triples {
            builder.add(user, item, rating)?;
        }
        builder.build()
    }

    /// Rating scale the store was built with.
    #[must_use]
    pub fn scale(&self) -> RatingScale {
        self.scale
    }

    /// Number of distinct users.
    #[must_use]
    pub fn n_users(&self) -> usize {
        self.users.len()
    }

    /// Number of distinct items.
    #[must_use]
    pub fn n_items(&self) -> usize {
        self.items.len()
    }

    /// Number of stored ratings.
    #[must_use]
    pub fn n_ratings(&self) -> usize {
        self.by_user.nnz()
    }

    /// Mean over all stored ratings.
    #[must_use]
    pub fn global_mean(&self) -> f64 {
        self.global_mean
    }

    /// Ratings given by user `u`, sorted by item id.
    #[must_use]
    pub fn user_ratings(&self, u: usize) -> RatingRow<'_> {
        lane(&self.by_user, u)
    }

    /// Ratings received by item `i`, sorted by user id.
    #[must_use]
    pub fn item_ratings(&self, i: usize) -> RatingRow<'_> {
        lane(&self.by_item, i)
    }

    /// Ratings of entity `x` along the requested axis.
    #[must_use]
    pub fn ratings_of(&self, x: usize, user_based: bool) -> RatingRow<'_> {
        if user_based {
            self.user_ratings(x)
        } else {
            self.item_ratings(x)
        }
    }

    /// Number of entities along the requested axis.
    #[must_use]
    pub fn n_entities(&self, user_based: bool) -> usize {
        if user_based {
            self.n_users()
        } else {
            self.n_items()
        }
    }

    /// Iterates every rating as `(user, item, rating)` in user-major order.
    pub fn all_ratings(&self) -> impl Iterator<Item = (usize, usize, f64)> + '_ {
        (0..self.n_users())
            .flat_map(move |u| self.user_ratings(u).iter().map(move |(i, r)| (u, i, r)))
    }

    /// Per-user mean ratings.
    #[must_use]
    pub fn user_means(&self) -> Vec<f64> {
        (0..self.n_users())
            .map(|u| self.user_ratings(u).mean().unwrap_or(self.global_mean))
            .collect()
    }

    /// Per-item mean ratings.
    #[must_use]
    pub fn item_means(&self) -> Vec<f64> {
        (0..self.n_items())
            .map(|i| self.item_ratings(i).mean().unwrap_or(self.global_mean))
            .collect()
    }

    /// True if `u` is a valid inner user id.
    #[must_use]
    pub fn knows_user(&self, u: usize) -> bool {
        u < self.n_users()
    }

    /// True if `i` is a valid inner item id.
    #[must_use]
    pub fn knows_item(&self, i: usize) -> bool {
        i < self.n_items()
    }

    /// Inner id of a raw user id.
    #[must_use]
    pub fn to_inner_user(&self, raw: &str) -> Option<usize> {
        self.users.inner.get(raw).copied()
    }

    /// Inner id of a raw item id.
    #[must_use]
    pub fn to_inner_item(&self, raw: &str) -> Option<usize> {
        self.items.inner.get(raw).copied()
    }

    /// Raw id of an inner user id.
    #[must_use]
    pub fn to_raw_user(&self, u: usize) -> Option<&str> {
        self.users.raw.get(u).map(String::as_str)
    }

    /// Raw id of an inner item id.
    #[must_use]
    pub fn to_raw_item(&self, i: usize) -> Option<&str> {
        self.items.raw.get(i).map(String::as_str)
    }

    /// Every known rating as `(raw_user, raw_item, rating)`, for measuring
    /// training error.
    #[must_use]
    pub fn build_testset(&self) -> Vec<(String, String, f64)> {
        self.all_ratings()
            .map(|(u, i, r)| (self.users.raw[u].clone(), self.items.raw[i].clone(), r))
            .collect()
    }

    /// Every unknown (user, item) pair, paired with `fill` (global mean when
    /// `None`) as a placeholder actual rating.
    #[must_use]
    pub fn build_anti_testset(&self, fill: Option<f64>) -> Vec<(String, String, f64)> {
        let fill = fill.unwrap_or(self.global_mean);
        let mut anti = Vec::new();
        for u in 0..self.n_users() {
            let row = self.user_ratings(u);
            for i in 0..self.n_items() {
                if row.get(i).is_none() {
                    anti.push((self.users.raw[u].clone(), self.items.raw[i].clone(), fill));
                }
            }
        }
        anti
    }
}

/// Collects raw ratings and assigns inner ids in first-seen order.
#[derive(Debug, Clone)]
pub struct RatingStoreBuilder {
    scale: RatingScale,
    users: IdArena,
    items: IdArena,
    triples: Vec<(usize, usize, f64)>,
    seen: HashSet<(usize, usize)>,
}

impl RatingStoreBuilder {
    /// Creates an empty builder.
    #[must_use]
    pub fn new(scale: RatingScale) -> Self {
        Self {
            scale,
            users: IdArena::default(),
            items: IdArena::default(),
            triples: Vec::new(),
            seen: HashSet::new(),
        }
    }

    /// Adds one rating.
    ///
    /// # Errors
    ///
    /// Returns [`CfError::RatingOutOfScale`] for ratings outside the scale and
    /// [`CfError::DuplicateRating`] if the pair was already added. Nothing is
    /// recorded when an error is returned.
    pub fn add(
        &mut self,
        user: impl Into<String>,
        item: impl Into<String>,
        rating: f64,
    ) -> Result<()> {
        if !self.scale.contains(rating) {
            return Err(CfError::RatingOutOfScale {
                rating,
                lower: self.scale.lower,
                upper: self.scale.upper,
            });
        }
        let (user, item) = (user.into(), item.into());
        if let (Some(&u), Some(&i)) = (self.users.inner.get(&user), self.items.inner.get(&item)) {
            if self.seen.contains(&(u, i)) {
                return Err(CfError::DuplicateRating { user, item });
            }
        }
        let u = self.users.intern(user);
        let i = self.items.intern(item);
        self.seen.insert((u, i));
        self.triples.push((u, i, rating));
        Ok(())
    }

    /// Number of ratings added so far.
    #[must_use]
    pub fn len(&self) -> usize {
        self.triples.len()
    }

    /// True if no rating was added.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.triples.is_empty()
    }

    /// Freezes the ratings into a [`RatingStore`].
    ///
    /// # Errors
    ///
    /// Returns [`CfError::EmptyDataset`] if no rating was added.
    pub fn build(mut self) -> Result<RatingStore> {
        if self.triples.is_empty() {
            return Err(CfError::EmptyDataset);
        }
        let (n_users, n_items) = (self.users.len(), self.items.len());
        self.triples.sort_by(|a, b| (a.0, a.1).cmp(&(b.0, b.1)));

        let mut indptr = vec![0usize; n_users + 1];
        let mut indices = Vec::with_capacity(self.triples.len());
        let mut data = Vec::with_capacity(self.triples.len());
        let mut sum = 0.0;
        for &(u, i, r) in &self.triples {
            indptr[u + 1] += 1;
            indices.push(i);
            data.push(r);
            sum += r;
        }
        for u in 0..n_users {
            indptr[u + 1] += indptr[u];
        }

        let global_mean = sum / self.triples.len() as f64;
        let by_user = CsMat::new((n_users, n_items), indptr, indices, data);
        let by_item = by_user.to_csc();

        tracing::debug!(
            n_users,
            n_items,
            n_ratings = self.triples.len(),
            global_mean,
            "built rating store"
        );

        Ok(RatingStore {
            scale: self.scale,
            users: self.users,
            items: self.items,
            by_user,
            by_item,
            global_mean,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_store() -> RatingStore {
        RatingStore::from_triples(
            RatingScale::default(),
            vec![
                ("u1", "i1", 5.0),
                ("u1", "i3", 1.0),
                ("u2", "i2", 4.0),
                ("u2", "i1", 3.0),
                ("u3", "i3", 2.0),
            ],
        )
        .expect("valid store")
    }

    #[test]
    fn test_inner_ids_follow_first_seen_order() {
        let store = small_store();
        assert_eq!(store.to_inner_user("u1"), Some(0));
        assert_eq!(store.to_inner_user("u3"), Some(2));
        assert_eq!(store.to_inner_item("i3"), Some(1));
        assert_eq!(store.to_inner_item("i2"), Some(2));
        assert_eq!(store.to_raw_item(1), Some("i3"));
        assert_eq!(store.to_inner_user("nobody"), None);
    }

    #[test]
    fn test_rows_are_sorted_and_complete() {
        let store = small_store();
        let u2 = store.user_ratings(1);
        assert_eq!(u2.ids(), &[0, 2]);
        assert_eq!(u2.ratings(), &[3.0, 4.0]);

        let i1 = store.item_ratings(0);
        assert_eq!(i1.ids(), &[0, 1]);
        assert_eq!(i1.ratings(), &[5.0, 3.0]);
        assert_eq!(i1.get(1), Some(3.0));
        assert_eq!(i1.get(2), None);
    }

    #[test]
    fn test_counts_and_mean() {
        let store = small_store();
        assert_eq!(store.n_users(), 3);
        assert_eq!(store.n_items(), 3);
        assert_eq!(store.n_ratings(), 5);
        assert!((store.global_mean() - 3.0).abs() < 1e-12);
        assert_eq!(store.all_ratings().count(), 5);
    }

    #[test]
    fn test_user_and_item_means() {
        let store = small_store();
        let means = store.user_means();
        assert!((means[0] - 3.0).abs() < 1e-12);
        assert!((means[1] - 3.5).abs() < 1e-12);
        let item_means = store.item_means();
        assert!((item_means[0] - 4.0).abs() < 1e-12);
    }

    #[test]
    fn test_zero_rating_is_kept() {
        let scale = RatingScale::new(0.0, 1.0).expect("valid scale");
        let store = RatingStore::from_triples(scale, vec![("a", "x", 0.0), ("a", "y", 1.0)])
            .expect("valid store");
        assert_eq!(store.n_ratings(), 2);
        assert_eq!(store.user_ratings(0).get(0), Some(0.0));
    }

    #[test]
    fn test_duplicate_rejected() {
        let mut builder = RatingStore::builder(RatingScale::default());
        builder.add("u", "i", 3.0).expect("first add");
        let err = builder.add("u", "i", 4.0).expect_err("duplicate");
        assert!(matches!(err, CfError::DuplicateRating { .. }));
        assert_eq!(builder.len(), 1);
    }

    #[test]
    fn test_out_of_scale_rejected() {
        let mut builder = RatingStore::builder(RatingScale::default());
        let err = builder.add("u", "i", 6.0).expect_err("out of scale");
        assert!(matches!(err, CfError::RatingOutOfScale { .. }));
        assert!(builder.is_empty());
    }

    #[test]
    fn test_empty_build_rejected() {
        let builder = RatingStore::builder(RatingScale::default());
        assert!(matches!(builder.build(), Err(CfError::EmptyDataset)));
    }

    #[test]
    fn test_invalid_scale() {
        assert!(RatingScale::new(5.0, 1.0).is_err());
        assert!(RatingScale::new(f64::NAN, 1.0).is_err());
        let scale = RatingScale::new(1.0, 5.0).expect("valid");
        assert!((scale.clip(7.2) - 5.0).abs() < 1e-12);
        assert!((scale.clip(-1.0) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_testsets() {
        let store = small_store();
        assert_eq!(store.build_testset().len(), 5);
        let anti = store.build_anti_testset(None);
        assert_eq!(anti.len(), 9 - 5);
        assert!(anti
            .iter()
            .all(|(_, _, fill)| (fill - store.global_mean()).abs() < 1e-12));
        assert!(anti.contains(&("u3".to_string(), "i1".to_string(), 3.0)));
    }
}
