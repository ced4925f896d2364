//! Regression error metrics shared by cross-validation and in-sample reporting.

use ndarray::ArrayView1;
use serde::{Deserialize, Serialize};

/// Root-mean-squared error and coefficient of determination of one prediction set.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FitMetrics {
    pub rmse: f64,
    pub r2: f64,
}

impl FitMetrics {
    pub fn evaluate(y_true: ArrayView1<f64>, y_pred: ArrayView1<f64>) -> Self {
        Self {
            rmse: rmse(y_true, y_pred),
            r2: r_squared(y_true, y_pred),
        }
    }
}

pub fn rmse(y_true: ArrayView1<f64>, y_pred: ArrayView1<f64>) -> f64 {
    if y_true.is_empty() {
        return f64::NAN;
    }
    let sse: f64 = y_true
        .iter()
        .zip(y_pred.iter())
        .map(|(&t, &p)| (p - t) * (p - t))
        .sum();
    (sse / y_true.len() as f64).sqrt()
}

/// `1 - SS_res / SS_tot`, with a constant truth vector scoring 1.0.
pub fn r_squared(y_true: ArrayView1<f64>, y_pred: ArrayView1<f64>) -> f64 {
    let Some(&first) = y_true.iter().next() else {
        return f64::NAN;
    };
    // the mean of identical values can round away from them
    if y_true.iter().all(|&t| t == first) {
        return 1.0;
    }
    let mean = y_true.sum() / y_true.len() as f64;
    let (ss_res, ss_tot) = y_true
        .iter()
        .zip(y_pred.iter())
        .fold((0.0, 0.0), |(res, tot), (&t, &p)| {
            (res + (t - p) * (t - p), tot + (t - mean) * (t - mean))
        });
    1.0 - ss_res / ss_tot
}
