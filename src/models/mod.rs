//! Models module.
pub mod knn;
