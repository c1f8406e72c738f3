#![deny(missing_docs)]
//! # itemcf
//!
//! `itemcf` implements item-based collaborative filtering: items are
//! considered similar when the users who rated both gave correlated
//! scores, and a missing rating is predicted as a weighted average of
//! the user's ratings on the most similar items they have rated.
//!
//! ## Example
//!
//! ```rust
//! # extern crate itemcf;
//! use itemcf::data::{Rating, RatingStore};
//! use itemcf::models::knn::Predictor;
//! use itemcf::similarity::SimilarityMatrix;
//!
//! let store: RatingStore = vec![
//!     Rating::new("A", "alice", 5.0),
//!     Rating::new("A", "bob", 3.0),
//!     Rating::new("A", "carol", 4.0),
//!     Rating::new("B", "alice", 4.0),
//!     Rating::new("B", "bob", 2.0),
//!     Rating::new("B", "carol", 5.0),
//!     Rating::new("A", "dave", 5.0),
//! ]
//! .into_iter()
//! .collect();
//!
//! let similarities = SimilarityMatrix::build(&store);
//! let predictor = Predictor::new(&store, &similarities);
//!
//! let prediction = predictor.predict("dave", "B").unwrap();
//! assert!((prediction - 5.0).abs() < 1e-12);
//! ```
#[macro_use]
extern crate serde_derive;

#[macro_use]
extern crate failure;
#[macro_use]
extern crate tracing;

#[cfg(feature = "datasets")]
extern crate csv;
extern crate itertools;
extern crate rand;
extern crate rayon;
extern crate serde;
extern crate siphasher;

pub mod data;
#[cfg(feature = "datasets")]
pub mod datasets;
pub mod evaluation;
pub mod models;
pub mod similarity;

/// Alias for user indices.
pub type UserId = usize;
/// Alias for item indices.
pub type ItemId = usize;
/// Alias for rating scores.
pub type Score = f64;

/// Prediction error types.
#[derive(Debug, Fail, Clone, PartialEq)]
pub enum PredictionError {
    /// The user has no ratings in the store.
    #[fail(display = "Unknown user.")]
    UserNotFound,
    /// Nobody has rated the item.
    #[fail(display = "Unknown item.")]
    ItemNotFound,
    /// The user has already rated the item; the observed score is returned instead.
    #[fail(display = "User has already rated this item with a score of {}.", score)]
    AlreadyRated {
        /// The score the user gave.
        score: Score,
    },
    /// The selected neighbour weights sum to zero, so the weighted average is undefined.
    #[fail(display = "Neighbourhood weights sum to zero: prediction is undefined.")]
    UndefinedNeighbourhood,
    /// Failed prediction due to numerical issues.
    #[fail(display = "Invalid prediction value: non-finite or not a number.")]
    InvalidPredictionValue,
    /// The similarity matrix has no entry for a pair of known items. This
    /// only happens when the matrix was built from a different store.
    #[fail(display = "Similarity matrix has no entry for a known item pair.")]
    MissingSimilarity,
}

/// Trait describing models that predict explicit ratings.
pub trait RatingModel {
    /// Predict the score `user` would give `item`.
    fn predict(&self, user: &str, item: &str) -> Result<Score, PredictionError>;
}
