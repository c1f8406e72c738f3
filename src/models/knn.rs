//! Item-based k-nearest-neighbour rating prediction.
//!
//! To predict how `user` would rate `item`, every item the user has
//! already rated is weighted by its similarity to `item`. The `k` most
//! similar are kept and the prediction is the weighted average of the
//! user's scores on them:
//!
//! ```text
//! sum(score * weight) / sum(weight)
//! ```
//!
//! Neighbours with equal weights keep ascending item index order, so
//! predictions are reproducible for a given store.
use std::num::NonZeroUsize;

use crate::data::RatingStore;
use crate::similarity::SimilarityMatrix;
use crate::{ItemId, PredictionError, RatingModel, Score};

/// Neighbourhood size used when none is configured.
pub const DEFAULT_NUM_NEIGHBOURS: usize = 3;

/// A rated item selected to contribute to a prediction.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Neighbour {
    /// Index of the rated item.
    pub item_id: ItemId,
    /// The user's score for it.
    pub score: Score,
    /// Its similarity to the target item.
    pub weight: Score,
}

/// Read-only prediction view over a rating store and its similarities.
#[derive(Clone, Copy, Debug)]
pub struct Predictor<'a> {
    store: &'a RatingStore,
    similarities: &'a SimilarityMatrix,
    num_neighbours: usize,
}

impl<'a> Predictor<'a> {
    /// Build a predictor using `DEFAULT_NUM_NEIGHBOURS` neighbours.
    ///
    /// `similarities` must have been built from `store`.
    pub fn new(store: &'a RatingStore, similarities: &'a SimilarityMatrix) -> Self {
        Predictor {
            store,
            similarities,
            num_neighbours: DEFAULT_NUM_NEIGHBOURS,
        }
    }

    /// Set the maximum number of neighbours used per prediction.
    pub fn num_neighbours(mut self, num_neighbours: NonZeroUsize) -> Self {
        self.num_neighbours = num_neighbours.get();
        self
    }

    /// The rating store predictions are made against.
    pub fn store(&self) -> &'a RatingStore {
        self.store
    }

    /// Select the neighbours used to predict `user`'s score for `item`:
    /// the user's rated items ordered by descending similarity to
    /// `item`, truncated to the neighbourhood size.
    pub fn neighbours(&self, user: &str, item: &str) -> Result<Vec<Neighbour>, PredictionError> {
        let ratings = self
            .store
            .user_id(user)
            .and_then(|user_id| self.store.user_ratings(user_id))
            .ok_or(PredictionError::UserNotFound)?;

        let item_id = self.store.item_id(item);

        if let Some(&score) = item_id.and_then(|item_id| ratings.get(&item_id)) {
            return Err(PredictionError::AlreadyRated { score });
        }

        let item_id = item_id.ok_or(PredictionError::ItemNotFound)?;

        let mut neighbours = ratings
            .iter()
            .map(|(&rated_id, &score)| {
                self.similarities
                    .weight(item_id, rated_id)
                    .map(|weight| Neighbour {
                        item_id: rated_id,
                        score,
                        weight,
                    })
                    .ok_or(PredictionError::MissingSimilarity)
            })
            .collect::<Result<Vec<_>, _>>()?;

        // Stable: ties stay in item index order.
        neighbours.sort_by(|a, b| b.weight.total_cmp(&a.weight));
        neighbours.truncate(self.num_neighbours);

        Ok(neighbours)
    }

    /// Predict the score `user` would give `item`.
    pub fn predict(&self, user: &str, item: &str) -> Result<Score, PredictionError> {
        let neighbours = self.neighbours(user, item)?;

        let (weighted_sum, weight_sum) = neighbours
            .iter()
            .fold((0.0, 0.0), |(weighted_sum, weight_sum), neighbour| {
                (
                    weighted_sum + neighbour.score * neighbour.weight,
                    weight_sum + neighbour.weight,
                )
            });

        if weight_sum == 0.0 {
            debug!(user, item, "Neighbour weights sum to zero.");
            return Err(PredictionError::UndefinedNeighbourhood);
        }

        let prediction = weighted_sum / weight_sum;

        debug!(
            user,
            item,
            num_neighbours = neighbours.len(),
            prediction,
            "Predicted rating."
        );

        if prediction.is_finite() {
            Ok(prediction)
        } else {
            Err(PredictionError::InvalidPredictionValue)
        }
    }
}

impl<'a> RatingModel for Predictor<'a> {
    fn predict(&self, user: &str, item: &str) -> Result<Score, PredictionError> {
        Predictor::predict(self, user, item)
    }
}

#[cfg(test)]
mod tests {
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    use super::*;
    use crate::data::Rating;

    fn k(k: usize) -> NonZeroUsize {
        NonZeroUsize::new(k).unwrap()
    }

    fn ratings() -> Vec<Rating> {
        vec![
            Rating::new("A", "u1", 5.0),
            Rating::new("A", "u2", 3.0),
            Rating::new("A", "u3", 4.0),
            Rating::new("B", "u1", 4.0),
            Rating::new("B", "u2", 2.0),
            Rating::new("B", "u3", 5.0),
        ]
    }

    fn with(extra: Vec<Rating>) -> RatingStore {
        ratings().into_iter().chain(extra).collect()
    }

    #[test]
    fn single_neighbour_returns_its_rating() {
        let store = with(vec![Rating::new("A", "u4", 5.0)]);
        let similarities = SimilarityMatrix::build(&store);
        let predictor = Predictor::new(&store, &similarities).num_neighbours(k(1));

        let neighbours = predictor.neighbours("u4", "B").unwrap();
        assert_eq!(neighbours.len(), 1);
        assert!(neighbours[0].weight > 0.0);

        let prediction = predictor.predict("u4", "B").unwrap();
        assert!((prediction - 5.0).abs() < 1e-12);
    }

    #[test]
    fn weighted_average_over_two_neighbours() {
        // u5's scores equal the item averages of A and C, leaving them unchanged.
        let store = with(vec![
            Rating::new("C", "u1", 1.0),
            Rating::new("C", "u2", 4.0),
            Rating::new("C", "u3", 4.0),
            Rating::new("A", "u5", 4.0),
            Rating::new("C", "u5", 3.0),
        ]);
        let similarities = SimilarityMatrix::build(&store);

        let w_ab = 6.0 / 84.0_f64.sqrt();
        let w_cb = -1.0 / 28.0_f64.sqrt();

        let a = store.item_id("A").unwrap();
        let b = store.item_id("B").unwrap();
        let c = store.item_id("C").unwrap();
        assert!((similarities.weight(a, b).unwrap() - w_ab).abs() < 1e-12);
        assert!((similarities.weight(c, b).unwrap() - w_cb).abs() < 1e-12);

        let predictor = Predictor::new(&store, &similarities);

        let neighbours = predictor.neighbours("u5", "B").unwrap();
        assert_eq!(
            neighbours.iter().map(|x| x.item_id).collect::<Vec<_>>(),
            vec![a, c]
        );

        let expected = (4.0 * w_ab + 3.0 * w_cb) / (w_ab + w_cb);
        let prediction = predictor.predict("u5", "B").unwrap();
        assert!((prediction - expected).abs() < 1e-9);
        assert!((prediction - 4.4058).abs() < 1e-3);

        // Only the most similar item is kept.
        let prediction = predictor.num_neighbours(k(1)).predict("u5", "B").unwrap();
        assert!((prediction - 4.0).abs() < 1e-12);
    }

    #[test]
    fn failures() {
        let store = with(vec![Rating::new("D", "u6", 3.0)]);
        let similarities = SimilarityMatrix::build(&store);
        let predictor = Predictor::new(&store, &similarities);

        for _ in 0..3 {
            assert_eq!(
                predictor.predict("nobody", "B"),
                Err(PredictionError::UserNotFound)
            );
            assert_eq!(
                predictor.predict("nobody", "nothing"),
                Err(PredictionError::UserNotFound)
            );
            assert_eq!(
                predictor.predict("u2", "B"),
                Err(PredictionError::AlreadyRated { score: 2.0 })
            );
            assert_eq!(
                predictor.predict("u2", "nothing"),
                Err(PredictionError::ItemNotFound)
            );
        }
    }

    #[test]
    fn zero_weight_sum_is_undefined() {
        // D shares no raters with B.
        let store = with(vec![Rating::new("D", "u6", 3.0)]);
        let similarities = SimilarityMatrix::build(&store);
        let predictor = Predictor::new(&store, &similarities);

        assert_eq!(
            predictor.predict("u6", "B"),
            Err(PredictionError::UndefinedNeighbourhood)
        );
    }

    #[test]
    fn cancelling_weights_are_undefined() {
        // A moves with B, C mirrors it; q's scores sit on A's and C's averages.
        let store: RatingStore = vec![
            Rating::new("A", "u1", 1.0),
            Rating::new("A", "u2", 5.0),
            Rating::new("B", "u1", 1.0),
            Rating::new("B", "u2", 5.0),
            Rating::new("C", "u1", 5.0),
            Rating::new("C", "u2", 1.0),
            Rating::new("A", "q", 3.0),
            Rating::new("C", "q", 3.0),
        ]
        .into_iter()
        .collect();
        let similarities = SimilarityMatrix::build(&store);
        let predictor = Predictor::new(&store, &similarities);

        let neighbours = predictor.neighbours("q", "B").unwrap();
        assert_eq!(neighbours.len(), 2);
        assert!(neighbours[0].weight > 0.99);
        assert_eq!(neighbours[0].weight, -neighbours[1].weight);

        assert_eq!(
            predictor.predict("q", "B"),
            Err(PredictionError::UndefinedNeighbourhood)
        );
    }

    #[test]
    fn negative_neighbourhood_is_averaged() {
        let store: RatingStore = vec![
            Rating::new("B", "u1", 1.0),
            Rating::new("B", "u2", 5.0),
            Rating::new("C", "u1", 5.0),
            Rating::new("C", "u2", 1.0),
            Rating::new("D", "u1", 4.0),
            Rating::new("D", "u2", 2.0),
            Rating::new("C", "r", 5.0),
            Rating::new("D", "r", 1.0),
        ]
        .into_iter()
        .collect();
        let similarities = SimilarityMatrix::build(&store);
        let predictor = Predictor::new(&store, &similarities);

        let neighbours = predictor.neighbours("r", "B").unwrap();
        assert_eq!(neighbours.len(), 2);
        assert!(neighbours.iter().all(|x| x.weight < 0.0));

        let weighted: Score = neighbours.iter().map(|x| x.score * x.weight).sum();
        let total: Score = neighbours.iter().map(|x| x.weight).sum();

        let prediction = predictor.predict("r", "B").unwrap();
        assert!((prediction - weighted / total).abs() < 1e-12);
        assert!(prediction > 1.0 && prediction < 5.0);
    }

    #[test]
    fn non_finite_scores_do_not_poison_selection() {
        let mut store = RatingStore::new();

        for user in 1..5 {
            let name = format!("u{}", user);
            store.record(&name, "target", user as Score);

            for item in 0..40 {
                store.record(&name, &format!("i{}", item), (user + item) as Score);
            }
        }
        for item in (0..40).step_by(3) {
            store.record("u0", &format!("i{}", item), std::f64::NAN);
        }
        for item in 0..40 {
            store.record("q", &format!("i{}", item), (1 + item % 5) as Score);
        }

        let similarities = SimilarityMatrix::build(&store);
        let target = store.item_id("target").unwrap();

        for item in 0..40 {
            let weight = similarities
                .weight(target, store.item_id(&format!("i{}", item)).unwrap())
                .unwrap();

            if item % 3 == 0 {
                assert_eq!(weight, 0.0);
            } else {
                assert!(weight > 0.0 && weight <= 1.0 + 1e-12);
            }
        }

        let predictor = Predictor::new(&store, &similarities);

        let neighbours = predictor.neighbours("q", "target").unwrap();
        assert_eq!(neighbours.len(), DEFAULT_NUM_NEIGHBOURS);
        assert!(neighbours.iter().all(|x| x.weight > 0.0));

        let first = predictor.predict("q", "target").unwrap();
        let second = predictor.predict("q", "target").unwrap();
        assert!(first.is_finite());
        assert_eq!(first.to_bits(), second.to_bits());
    }

    #[test]
    fn ties_keep_item_order() {
        let store = with(vec![
            Rating::new("A", "q", 4.0),
            Rating::new("X", "q", 1.0),
            Rating::new("Y", "q", 2.0),
        ]);
        let similarities = SimilarityMatrix::build(&store);
        let predictor = Predictor::new(&store, &similarities);

        let a = store.item_id("A").unwrap();
        let x = store.item_id("X").unwrap();
        let y = store.item_id("Y").unwrap();

        let selected: Vec<_> = predictor
            .neighbours("q", "B")
            .unwrap()
            .iter()
            .map(|n| (n.item_id, n.weight == 0.0))
            .collect();
        assert_eq!(selected, vec![(a, false), (x, true), (y, true)]);

        let predictor = predictor.num_neighbours(k(2));
        let selected: Vec<_> = predictor
            .neighbours("q", "B")
            .unwrap()
            .iter()
            .map(|n| n.item_id)
            .collect();
        assert_eq!(selected, vec![a, x]);
        assert!((predictor.predict("q", "B").unwrap() - 4.0).abs() < 1e-12);
    }

    #[test]
    fn mismatched_matrix_is_reported() {
        let small = with(Vec::new());
        let similarities = SimilarityMatrix::build(&small);
        let store = with(vec![Rating::new("C", "u9", 3.0)]);
        let predictor = Predictor::new(&store, &similarities);

        assert_eq!(
            predictor.predict("u9", "B"),
            Err(PredictionError::MissingSimilarity)
        );
    }

    #[test]
    fn neighbourhood_size_and_idempotence() {
        let mut rng = StdRng::seed_from_u64(11);
        let mut store = RatingStore::new();

        for user in 0..30 {
            for item in 0..15 {
                if rng.gen::<f64>() < 0.4 {
                    store.record(
                        &format!("u{}", user),
                        &format!("i{}", item),
                        rng.gen_range(1..6) as Score,
                    );
                }
            }
        }

        let similarities = SimilarityMatrix::build(&store);
        let users: Vec<_> = store.known_users().map(|x| x.to_owned()).collect();
        let items: Vec<_> = store.known_items().map(|x| x.to_owned()).collect();

        for num_neighbours in 1..6 {
            let predictor = Predictor::new(&store, &similarities).num_neighbours(k(num_neighbours));

            for user in &users {
                let num_rated = store.items_rated_by(user).count();

                for item in &items {
                    if store.rating_of(user, item).is_some() {
                        continue;
                    }

                    let neighbours = predictor.neighbours(user, item).unwrap();
                    assert_eq!(neighbours.len(), num_neighbours.min(num_rated));

                    for pair in neighbours.windows(2) {
                        assert!(pair[0].weight >= pair[1].weight);
                    }

                    let first = predictor.predict(user, item).map(|x| x.to_bits());
                    let second = predictor.predict(user, item).map(|x| x.to_bits());
                    assert_eq!(first, second);
                }
            }
        }
    }
}
