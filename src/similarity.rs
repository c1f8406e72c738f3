//! Pairwise item similarities.
//!
//! For two items `i` and `j`, let `U` be the users who rated both. With
//! `avg_i` and `avg_j` the means over *all* ratings of each item, the
//! weight is
//!
//! ```text
//! sum_U (r_ui - avg_i)(r_uj - avg_j)
//! ------------------------------------------------------------
//! sqrt(sum_U (r_ui - avg_i)^2) * sqrt(sum_U (r_uj - avg_j)^2)
//! ```
//!
//! The weight is 0 when `U` is empty, either sum of squares is exactly
//! zero, or the result is not finite (a non-finite score poisons the
//! averages it touches). Every unordered pair of distinct items has exactly one
//! entry, so lookups for any two known items always succeed.
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;

use itertools::{EitherOrBoth, Itertools};
use rayon::prelude::*;

use super::data::RatingStore;
use super::{ItemId, Score, UserId};

/// Unordered pair of distinct items, smaller index first.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ItemPair {
    first: ItemId,
    second: ItemId,
}

impl ItemPair {
    /// Normalise `(a, b)` into canonical order. Returns `None` for a self-pair.
    pub fn new(a: ItemId, b: ItemId) -> Option<Self> {
        if a < b {
            Some(ItemPair {
                first: a,
                second: b,
            })
        } else if b < a {
            Some(ItemPair {
                first: b,
                second: a,
            })
        } else {
            None
        }
    }

    /// The smaller item index.
    pub fn first(&self) -> ItemId {
        self.first
    }

    /// The larger item index.
    pub fn second(&self) -> ItemId {
        self.second
    }
}

/// Similarity between two items.
#[derive(Clone, Copy, Debug, PartialEq, Default)]
pub struct Similarity {
    /// Correlation weight in `[-1, 1]`, or 0 when undefined.
    pub weight: Score,
    /// Number of users who rated both items.
    pub co_raters: usize,
}

/// Item-item similarity weights, stored as the upper triangle of an
/// `num_items x num_items` matrix in row-major order.
#[derive(Clone, Debug)]
pub struct SimilarityMatrix {
    num_items: usize,
    entries: Vec<Similarity>,
}

impl SimilarityMatrix {
    /// Compute similarities for every pair of items in `store`.
    pub fn build(store: &RatingStore) -> Self {
        SimilarityMatrix::build_with_progress(store, |_, _| {})
    }

    /// Compute similarities, calling `progress(rows_done, rows_total)`
    /// each time a row of the upper triangle is finished. Rows are
    /// computed in parallel, so calls may arrive from any worker thread.
    pub fn build_with_progress<F>(store: &RatingStore, progress: F) -> Self
    where
        F: Fn(usize, usize) + Sync,
    {
        let start = Instant::now();
        let num_items = store.num_items();
        let raters = store.raters_by_item();
        let averages: Vec<Score> = (0..num_items)
            .map(|item_id| store.item_average(item_id).unwrap_or(0.0))
            .collect();

        info!(
            num_items,
            num_users = store.num_users(),
            num_pairs = num_pairs(num_items),
            "Computing item similarities."
        );

        let rows_done = AtomicUsize::new(0);
        let rows: Vec<Vec<Similarity>> = (0..num_items)
            .into_par_iter()
            .map(|i| {
                let row: Vec<Similarity> = ((i + 1)..num_items)
                    .map(|j| {
                        pair_similarity(&raters[i], averages[i], &raters[j], averages[j])
                    })
                    .collect();

                progress(rows_done.fetch_add(1, Ordering::Relaxed) + 1, num_items);

                row
            })
            .collect();

        let mut entries = Vec::with_capacity(num_pairs(num_items));
        for row in rows {
            entries.extend(row);
        }

        info!(
            num_pairs = entries.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Computed item similarities."
        );

        SimilarityMatrix { num_items, entries }
    }

    fn index(&self, pair: ItemPair) -> Option<usize> {
        if pair.second >= self.num_items {
            return None;
        }

        let (i, j, n) = (pair.first, pair.second, self.num_items);

        // Rows before `i` hold (n - 1) + (n - 2) + ... + (n - i) entries.
        Some(i * (2 * n - i - 1) / 2 + (j - i - 1))
    }

    /// Similarity of two items, in either order. `None` for a self-pair
    /// or an item index outside the matrix.
    pub fn get(&self, a: ItemId, b: ItemId) -> Option<&Similarity> {
        ItemPair::new(a, b)
            .and_then(|pair| self.index(pair))
            .map(|idx| &self.entries[idx])
    }

    /// Weight of two items, in either order.
    pub fn weight(&self, a: ItemId, b: ItemId) -> Option<Score> {
        self.get(a, b).map(|x| x.weight)
    }

    /// Iterate over all pairs and their similarities in canonical order.
    pub fn iter(&self) -> impl Iterator<Item = (ItemPair, &Similarity)> {
        let num_items = self.num_items;

        (0..num_items)
            .flat_map(move |i| ((i + 1)..num_items).map(move |j| ItemPair { first: i, second: j }))
            .zip(self.entries.iter())
    }

    /// Number of items the matrix covers.
    pub fn num_items(&self) -> usize {
        self.num_items
    }

    /// Number of stored pairs.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the matrix has no pairs.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn num_pairs(num_items: usize) -> usize {
    num_items * num_items.saturating_sub(1) / 2
}

fn pair_similarity(
    raters_i: &[(UserId, Score)],
    avg_i: Score,
    raters_j: &[(UserId, Score)],
    avg_j: Score,
) -> Similarity {
    let mut co_raters = 0;
    let mut numerator = 0.0;
    let mut denom_i = 0.0;
    let mut denom_j = 0.0;

    let co_rated = raters_i
        .iter()
        .merge_join_by(raters_j.iter(), |(u, _), (v, _)| u.cmp(v))
        .filter_map(|x| match x {
            EitherOrBoth::Both(&(_, r_i), &(_, r_j)) => Some((r_i, r_j)),
            _ => None,
        });

    for (r_i, r_j) in co_rated {
        let d_i = r_i - avg_i;
        let d_j = r_j - avg_j;

        numerator += d_i * d_j;
        denom_i += d_i * d_i;
        denom_j += d_j * d_j;
        co_raters += 1;
    }

    let weight = if co_raters == 0 || denom_i == 0.0 || denom_j == 0.0 {
        0.0
    } else {
        numerator / (denom_i.sqrt() * denom_j.sqrt())
    };
    let weight = if weight.is_finite() { weight } else { 0.0 };

    Similarity { weight, co_raters }
}
