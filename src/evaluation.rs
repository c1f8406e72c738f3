//! Accuracy of rating predictions on held-out data.
use rayon::prelude::*;

use crate::data::Rating;
use crate::{PredictionError, RatingModel, Score};

/// Evaluation error types.
#[derive(Debug, Fail)]
pub enum EvaluationError {
    /// None of the held-out ratings could be predicted.
    #[fail(display = "No held-out rating could be predicted.")]
    NoPredictions,
}

/// Summary of prediction accuracy over a set of held-out ratings.
#[derive(Clone, Debug, Serialize)]
pub struct RatingScores {
    /// Root mean squared error over predicted ratings.
    pub rmse: Score,
    /// Mean absolute error over predicted ratings.
    pub mae: Score,
    /// Number of ratings that were predicted.
    pub predicted: usize,
    /// Number of ratings for which prediction failed.
    pub failed: usize,
}

/// Score `model` against `test`. Ratings the model cannot predict are
/// counted in `failed` and excluded from the error metrics.
pub fn rating_scores<T: RatingModel + Sync>(
    model: &T,
    test: &[Rating],
) -> Result<RatingScores, EvaluationError> {
    let outcomes: Vec<Result<Score, PredictionError>> = test
        .par_iter()
        .map(|rating| {
            model
                .predict(rating.user_id(), rating.item_id())
                .map(|prediction| prediction - rating.score())
        })
        .collect();

    let errors: Vec<Score> = outcomes.iter().filter_map(|x| x.clone().ok()).collect();
    let failed = outcomes.len() - errors.len();

    if errors.is_empty() {
        return Err(EvaluationError::NoPredictions);
    }

    let num = errors.len() as Score;
    let rmse = (errors.iter().map(|x| x * x).sum::<Score>() / num).sqrt();
    let mae = errors.iter().map(|x| x.abs()).sum::<Score>() / num;

    info!(rmse, mae, predicted = errors.len(), failed, "Evaluated predictions.");

    Ok(RatingScores {
        rmse,
        mae,
        predicted: errors.len(),
        failed,
    })
}

/// Root mean squared error of `model` on `test`.
pub fn rmse_score<T: RatingModel + Sync>(
    model: &T,
    test: &[Rating],
) -> Result<Score, EvaluationError> {
    rating_scores(model, test).map(|x| x.rmse)
}
