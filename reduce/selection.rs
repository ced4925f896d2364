//! Grid search over ridge regularization strengths scored by k-fold error.

use crate::crossval::CvSplit;
use crate::metrics::FitMetrics;
use crate::ridge::{RidgeError, fit_ridge};
use ndarray::{ArrayView1, ArrayView2, Axis};
use std::cmp::Ordering;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SelectionError {
    #[error("The regularization grid is empty")]
    EmptyGrid,

    #[error("No cross-validation folds were supplied")]
    NoFolds,

    #[error("Every candidate strength failed to fit; last failure: {last}")]
    AllCandidatesFailed {
        rejected: Vec<f64>,
        #[source]
        last: RidgeError,
    },

    #[error(transparent)]
    Ridge(#[from] RidgeError),
}

/// Mean cross-validated metrics of one candidate strength.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CandidateScore {
    pub alpha: f64,
    pub rmse: f64,
    pub r2: f64,
}

impl CandidateScore {
    /// Lexicographic order on `(rmse, -r2, alpha)`; smaller is better.
    pub fn rank(&self, other: &Self) -> Ordering {
        self.rmse
            .total_cmp(&other.rmse)
            .then_with(|| (-self.r2 + 0.0).total_cmp(&(-other.r2 + 0.0)))
            .then_with(|| self.alpha.total_cmp(&other.alpha))
    }
}

/// Outcome of the search: the winner plus the candidates that could not be scored.
#[derive(Debug, Clone, PartialEq)]
pub struct AlphaSelection {
    pub best: CandidateScore,
    /// Strengths whose fit was numerically singular on at least one fold.
    pub rejected: Vec<f64>,
}

/// Scores one strength across all folds.
pub fn score_candidate(
    x: ArrayView2<f64>,
    y: ArrayView1<f64>,
    splits: &[CvSplit],
    alpha: f64,
) -> Result<CandidateScore, RidgeError> {
    let mut rmse_sum = 0.0;
    let mut r2_sum = 0.0;
    for split in splits {
        let x_train = x.select(Axis(0), &split.train);
        let y_train = y.select(Axis(0), &split.train);
        let fit = fit_ridge(x_train.view(), y_train.view(), alpha)?;

        let x_test = x.select(Axis(0), &split.test);
        let y_test = y.select(Axis(0), &split.test);
        let y_hat = fit.predict(x_test.view());
        let metrics = FitMetrics::evaluate(y_test.view(), y_hat.view());
        rmse_sum += metrics.rmse;
        r2_sum += metrics.r2;
    }
    let folds = splits.len() as f64;
    Ok(CandidateScore {
        alpha,
        rmse: rmse_sum / folds,
        r2: r2_sum / folds,
    })
}

/// Picks the strength with the lowest mean RMSE, breaking ties by higher mean
/// R² and then by the smaller strength.
///
/// A candidate whose solve is singular on any fold is skipped and reported in
/// [`AlphaSelection::rejected`]. Other solver errors abort the search.
pub fn select_alpha(
    x: ArrayView2<f64>,
    y: ArrayView1<f64>,
    splits: &[CvSplit],
    alphas: &[f64],
) -> Result<AlphaSelection, SelectionError> {
    if alphas.is_empty() {
        return Err(SelectionError::EmptyGrid);
    }
    if splits.is_empty() {
        return Err(SelectionError::NoFolds);
    }

    let mut best: Option<CandidateScore> = None;
    let mut rejected = Vec::new();
    let mut last_failure = None;

    for &alpha in alphas {
        match score_candidate(x, y, splits, alpha) {
            Ok(score) => {
                log::debug!(
                    "alpha={alpha}: cv rmse={:.6} r2={:.6}",
                    score.rmse,
                    score.r2
                );
                if best.is_none_or(|current| score.rank(&current).is_lt()) {
                    best = Some(score);
                }
            }
            Err(err) if err.is_numerical() => {
                log::warn!("Rejecting alpha={alpha} during cross-validation: {err}");
                rejected.push(alpha);
                last_failure = Some(err);
            }
            Err(err) => return Err(err.into()),
        }
    }

    match (best, last_failure) {
        (Some(best), _) => Ok(AlphaSelection { best, rejected }),
        (None, Some(last)) => Err(SelectionError::AllCandidatesFailed { rejected, last }),
        (None, None) => Err(SelectionError::EmptyGrid),
    }
}
