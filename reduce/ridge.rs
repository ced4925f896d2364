//! Closed-form ridge regression with an unpenalized intercept.
//!
//! The fit solves the normal equations of the augmented design `[1 | X]`,
//!
//! ```text
//! (AᵀA + R) β = Aᵀy,   R = diag(0, α, …, α)
//! ```
//!
//! through a Cholesky factorization, so the solve only ever touches the
//! `(p + 1) × (p + 1)` normal matrix.

use crate::faer_ndarray::{FaerCholesky, FaerLinalgError, Side};
use ndarray::{Array1, Array2, ArrayView1, ArrayView2, s};
use thiserror::Error;

/// Normal matrices whose squared pivot ratio falls below this are treated as singular.
pub const SINGULAR_PIVOT_RATIO: f64 = 1e-11;

#[derive(Error, Debug)]
pub enum RidgeError {
    #[error("Regularization strength must be finite and non-negative, got {0}")]
    InvalidAlpha(f64),

    #[error("Design has {x_rows} rows but the target has {y_len} values")]
    DimensionMismatch { x_rows: usize, y_len: usize },

    #[error("Cannot fit a model on an empty design matrix")]
    EmptyDesign,

    #[error(
        "Normal equations are singular at alpha = {alpha} (pivot ratio {pivot_ratio:.3e}); the feature set is collinear for these rows"
    )]
    NumericalInstability { alpha: f64, pivot_ratio: f64 },

    #[error("Linear solve failed at alpha = {alpha}: {source}")]
    SolveFailed {
        alpha: f64,
        #[source]
        source: FaerLinalgError,
    },
}

impl RidgeError {
    /// True for the failures caused by the data rather than by the caller.
    pub fn is_numerical(&self) -> bool {
        matches!(
            self,
            RidgeError::NumericalInstability { .. } | RidgeError::SolveFailed { .. }
        )
    }
}

/// Fitted intercept and positional weights over standardized features.
#[derive(Debug, Clone, PartialEq)]
pub struct RidgeFit {
    pub intercept: f64,
    pub weights: Array1<f64>,
    pub alpha: f64,
}

impl RidgeFit {
    pub fn predict(&self, x: ArrayView2<f64>) -> Array1<f64> {
        x.dot(&self.weights) + self.intercept
    }
}

/// Prepends the intercept column of ones.
fn augment(x: ArrayView2<f64>) -> Array2<f64> {
    let mut design = Array2::ones((x.nrows(), x.ncols() + 1));
    design.slice_mut(s![.., 1..]).assign(&x);
    design
}

/// Fits `y ≈ b + Xw` minimizing `‖y − b − Xw‖² + α‖w‖²`.
///
/// Fails with [`RidgeError::NumericalInstability`] when the regularized normal
/// matrix is singular, which can only happen at `α = 0` with collinear or
/// under-determined features. No fallback is attempted.
pub fn fit_ridge(
    x: ArrayView2<f64>,
    y: ArrayView1<f64>,
    alpha: f64,
) -> Result<RidgeFit, RidgeError> {
    if !alpha.is_finite() || alpha < 0.0 {
        return Err(RidgeError::InvalidAlpha(alpha));
    }
    if x.nrows() != y.len() {
        return Err(RidgeError::DimensionMismatch {
            x_rows: x.nrows(),
            y_len: y.len(),
        });
    }
    if x.nrows() == 0 {
        return Err(RidgeError::EmptyDesign);
    }

    let design = augment(x);
    let mut normal = design.t().dot(&design);
    for j in 1..normal.nrows() {
        normal[[j, j]] += alpha;
    }
    let rhs = design.t().dot(&y);

    let factor = normal.cholesky(Side::Lower).map_err(|err| match err {
        FaerLinalgError::Cholesky(_) => RidgeError::NumericalInstability {
            alpha,
            pivot_ratio: 0.0,
        },
        other => RidgeError::SolveFailed {
            alpha,
            source: other,
        },
    })?;

    let pivot_ratio = factor.pivot_ratio();
    if pivot_ratio < SINGULAR_PIVOT_RATIO {
        return Err(RidgeError::NumericalInstability { alpha, pivot_ratio });
    }

    let beta = factor.solve_vec(&rhs);
    if beta.iter().any(|b| !b.is_finite()) {
        return Err(RidgeError::NumericalInstability { alpha, pivot_ratio });
    }

    Ok(RidgeFit {
        intercept: beta[0],
        weights: beta.slice(s![1..]).to_owned(),
        alpha,
    })
}
