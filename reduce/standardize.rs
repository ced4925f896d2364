//! Per-feature z-score standardization.
//!
//! Means and population standard deviations are fitted on exactly the rows a
//! model is trained on and then travel with that model; nothing here is shared
//! between targets.

use ndarray::{Array2, ArrayView1, ArrayView2, Axis};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Fitted location and scale of every input feature, keyed by feature name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Standardization {
    pub mean: BTreeMap<String, f64>,
    pub std: BTreeMap<String, f64>,
}

impl Standardization {
    /// Scale used for `name` at prediction time; degenerate scales fall back to 1.
    pub fn scale_of(&self, name: &str) -> f64 {
        match self.std.get(name) {
            Some(&s) if s.is_finite() && s != 0.0 => s,
            _ => 1.0,
        }
    }

    pub fn mean_of(&self, name: &str) -> f64 {
        match self.mean.get(name) {
            Some(&m) if m.is_finite() => m,
            _ => 0.0,
        }
    }
}

/// Mean and population standard deviation over the non-missing (`NaN`) entries.
///
/// A column with no observed values yields a `NaN` mean.
pub fn column_moments(column: ArrayView1<f64>) -> (f64, f64) {
    let (count, sum) = column
        .iter()
        .filter(|v| !v.is_nan())
        .fold((0usize, 0.0), |(c, s), &v| (c + 1, s + v));
    if count == 0 {
        return (f64::NAN, f64::NAN);
    }
    let mean = sum / count as f64;
    let ss: f64 = column
        .iter()
        .filter(|v| !v.is_nan())
        .map(|&v| (v - mean) * (v - mean))
        .sum();
    (mean, (ss / count as f64).sqrt())
}

/// Standardizes `x` column by column and returns the record needed to repeat it.
///
/// `names[j]` labels column `j`. A zero or non-finite deviation is replaced by
/// 1.0, so such a column is only centered. Row order is preserved.
pub fn standardize(x: ArrayView2<f64>, names: &[String]) -> (Array2<f64>, Standardization) {
    debug_assert_eq!(x.ncols(), names.len());
    let mut out = Array2::zeros(x.raw_dim());
    let mut mean = BTreeMap::new();
    let mut std = BTreeMap::new();

    for (j, (column, name)) in x.axis_iter(Axis(1)).zip(names).enumerate() {
        let (m, mut s) = column_moments(column);
        if !s.is_finite() || s == 0.0 {
            s = 1.0;
        }
        out.column_mut(j).assign(&column.mapv(|v| (v - m) / s));
        mean.insert(name.clone(), m);
        std.insert(name.clone(), s);
    }

    (out, Standardization { mean, std })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    fn names(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("f{i}")).collect()
    }

    #[test]
    fn standardized_columns_have_zero_mean_unit_std() {
        let x = array![
            [1.0, 100.0, -3.0],
            [2.0, 250.0, 0.5],
            [4.0, 175.0, 2.0],
            [8.0, 90.0, 7.25],
            [3.0, 310.0, -1.0]
        ];
        let (z, st) = standardize(x.view(), &names(3));
        for j in 0..3 {
            let (m, s) = column_moments(z.column(j));
            assert_abs_diff_eq!(m, 0.0, epsilon = 1e-12);
            assert_abs_diff_eq!(s, 1.0, epsilon = 1e-12);
        }
        assert_abs_diff_eq!(st.mean["f0"], 3.6, epsilon = 1e-12);
        // population deviation: sqrt(mean((x - 3.6)^2))
        assert_abs_diff_eq!(st.std["f0"], (29.2_f64 / 5.0).sqrt(), epsilon = 1e-12);
    }

    #[test]
    fn constant_column_is_centered_only() {
        let x = array![[5.0, 1.0], [5.0, 2.0], [5.0, 3.0]];
        let (z, st) = standardize(x.view(), &names(2));
        assert_eq!(st.std["f0"], 1.0);
        assert_eq!(st.mean["f0"], 5.0);
        assert!(z.column(0).iter().all(|&v| v == 0.0));
    }

    #[test]
    fn missing_values_are_ignored_in_moments() {
        let x = array![[1.0], [f64::NAN], [3.0]];
        let (z, st) = standardize(x.view(), &names(1));
        assert_abs_diff_eq!(st.mean["f0"], 2.0);
        assert_abs_diff_eq!(st.std["f0"], 1.0);
        assert!(z[[1, 0]].is_nan());
        assert_abs_diff_eq!(z[[0, 0]], -1.0);
    }

    #[test]
    fn row_order_is_preserved() {
        let x = array![[3.0], [1.0], [2.0]];
        let (z, _) = standardize(x.view(), &names(1));
        assert!(z[[0, 0]] > z[[2, 0]] && z[[2, 0]] > z[[1, 0]]);
    }

    #[test]
    fn degenerate_scale_falls_back_at_lookup() {
        let st = Standardization {
            mean: BTreeMap::from([("a".to_string(), 2.0)]),
            std: BTreeMap::from([("a".to_string(), 0.0)]),
        };
        assert_eq!(st.scale_of("a"), 1.0);
        assert_eq!(st.scale_of("missing"), 1.0);
        assert_eq!(st.mean_of("missing"), 0.0);
    }
}
