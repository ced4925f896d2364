//! Pairwise correlations and redundancy clustering.

use crate::records::RecordTable;
use itertools::Itertools;
use ndarray::{Array2, ArrayView1};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;

/// Order in which cluster members are preferred as the one to keep.
pub const REPRESENTATIVE_PREFERENCE: [&str; 15] = [
    "produtividade",
    "estoque_c",
    "densidade",
    "icv",
    "dmg",
    "dmp",
    "rmp",
    "peso_espigas",
    "n_espigas_com",
    "n_espigas",
    "n_plantas",
    "altura",
    "diam_espiga",
    "comp_espiga",
    "na",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CorrelationMethod {
    Pearson,
    Spearman,
}

impl fmt::Display for CorrelationMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CorrelationMethod::Pearson => write!(f, "pearson"),
            CorrelationMethod::Spearman => write!(f, "spearman"),
        }
    }
}

/// Pearson coefficient of two equally long samples. `NaN` when either sample
/// has zero variance or fewer than two points.
pub fn pearson(a: &[f64], b: &[f64]) -> f64 {
    let n = a.len().min(b.len());
    if n < 2 {
        return f64::NAN;
    }
    let mean_a = a[..n].iter().sum::<f64>() / n as f64;
    let mean_b = b[..n].iter().sum::<f64>() / n as f64;
    let (mut sab, mut saa, mut sbb) = (0.0, 0.0, 0.0);
    for (&x, &y) in a.iter().zip(b) {
        let (dx, dy) = (x - mean_a, y - mean_b);
        sab += dx * dy;
        saa += dx * dx;
        sbb += dy * dy;
    }
    if saa == 0.0 || sbb == 0.0 {
        return f64::NAN;
    }
    (sab / (saa.sqrt() * sbb.sqrt())).clamp(-1.0, 1.0)
}

/// 1-based ranks with ties sharing the average of their positions.
pub fn average_ranks(values: &[f64]) -> Vec<f64> {
    let order: Vec<usize> = (0..values.len())
        .sorted_by(|&i, &j| values[i].total_cmp(&values[j]))
        .collect();
    let mut ranks = vec![0.0; values.len()];
    let mut start = 0;
    while start < order.len() {
        let mut end = start + 1;
        while end < order.len() && values[order[end]] == values[order[start]] {
            end += 1;
        }
        // positions start..end hold one tie group; ranks are 1-based
        let rank = (start + end + 1) as f64 / 2.0;
        for &i in &order[start..end] {
            ranks[i] = rank;
        }
        start = end;
    }
    ranks
}

pub fn spearman(a: &[f64], b: &[f64]) -> f64 {
    pearson(&average_ranks(a), &average_ranks(b))
}

/// Rows where both columns are observed.
fn complete_pairs(a: ArrayView1<f64>, b: ArrayView1<f64>) -> (Vec<f64>, Vec<f64>) {
    a.iter()
        .zip(b.iter())
        .filter(|(x, y)| !x.is_nan() && !y.is_nan())
        .map(|(&x, &y)| (x, y))
        .unzip()
}

pub fn correlation(a: ArrayView1<f64>, b: ArrayView1<f64>, method: CorrelationMethod) -> f64 {
    let (xs, ys) = complete_pairs(a, b);
    match method {
        CorrelationMethod::Pearson => pearson(&xs, &ys),
        CorrelationMethod::Spearman => spearman(&xs, &ys),
    }
}

/// Symmetric matrix of pairwise-complete correlations over named variables.
#[derive(Debug, Clone, PartialEq)]
pub struct CorrelationMatrix {
    pub method: CorrelationMethod,
    pub names: Vec<String>,
    pub values: Array2<f64>,
}

impl CorrelationMatrix {
    /// Correlates every pair of `names`. Variables absent from the table get an
    /// all-`NaN` row and column.
    pub fn compute(table: &RecordTable, names: &[String], method: CorrelationMethod) -> Self {
        let p = names.len();
        let mut values = Array2::from_elem((p, p), f64::NAN);
        let columns: Vec<_> = names.iter().map(|n| table.column(n)).collect();
        for i in 0..p {
            for j in i..p {
                if let (Some(a), Some(b)) = (columns[i], columns[j]) {
                    let r = correlation(a, b, method);
                    values[[i, j]] = r;
                    values[[j, i]] = r;
                }
            }
        }
        Self {
            method,
            names: names.to_vec(),
            values,
        }
    }

    pub fn get(&self, a: &str, b: &str) -> Option<f64> {
        let i = self.names.iter().position(|n| n == a)?;
        let j = self.names.iter().position(|n| n == b)?;
        Some(self.values[[i, j]])
    }

    /// CSV text with a leading unnamed index column; `NaN` cells are empty.
    pub fn to_csv(&self) -> Result<String, csv::Error> {
        let mut writer = csv::Writer::from_writer(Vec::new());
        writer.write_record(std::iter::once("").chain(self.names.iter().map(String::as_str)))?;
        for (name, row) in self.names.iter().zip(self.values.rows()) {
            let cells = row
                .iter()
                .map(|v| if v.is_nan() { String::new() } else { v.to_string() });
            writer.write_record(std::iter::once(name.clone()).chain(cells))?;
        }
        let bytes = writer
            .into_inner()
            .map_err(|err| csv::Error::from(err.into_error()))?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HighPair {
    pub var_a: String,
    pub var_b: String,
    pub corr: f64,
    pub abs_corr: f64,
}

/// Upper-triangle pairs with `|r| ≥ threshold`, strongest first. Ties keep
/// matrix order.
pub fn high_pairs(matrix: &CorrelationMatrix, threshold: f64) -> Vec<HighPair> {
    (0..matrix.names.len())
        .tuple_combinations()
        .filter_map(|(i, j)| {
            let r = matrix.values[[i, j]];
            (!r.is_nan() && r.abs() >= threshold).then(|| HighPair {
                var_a: matrix.names[i].clone(),
                var_b: matrix.names[j].clone(),
                corr: r,
                abs_corr: r.abs(),
            })
        })
        .sorted_by(|a, b| b.abs_corr.total_cmp(&a.abs_corr))
        .collect()
}

/// Disjoint-set forest over variable names.
#[derive(Debug, Default)]
struct UnionFind {
    parent: BTreeMap<String, String>,
}

impl UnionFind {
    fn find(&mut self, x: &str) -> String {
        let parent = self
            .parent
            .entry(x.to_string())
            .or_insert_with(|| x.to_string())
            .clone();
        if parent == x {
            return parent;
        }
        let root = self.find(&parent);
        self.parent.insert(x.to_string(), root.clone());
        root
    }

    fn union(&mut self, a: &str, b: &str) {
        let ra = self.find(a);
        let rb = self.find(b);
        if ra != rb {
            self.parent.insert(rb, ra);
        }
    }
}

/// Connected components of the high-correlation graph with at least two
/// members, largest first and then by first member name. Members are sorted.
pub fn redundancy_clusters(pairs: &[HighPair]) -> Vec<Vec<String>> {
    let mut forest = UnionFind::default();
    for pair in pairs {
        forest.union(&pair.var_a, &pair.var_b);
    }
    let names: Vec<String> = forest.parent.keys().cloned().collect();
    let mut groups: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for name in names {
        let root = forest.find(&name);
        groups.entry(root).or_default().push(name);
    }
    groups
        .into_values()
        .filter(|members| members.len() >= 2)
        .map(|members| members.into_iter().sorted().collect::<Vec<_>>())
        .sorted_by(|a, b| match b.len().cmp(&a.len()) {
            Ordering::Equal => a[0].cmp(&b[0]),
            other => other,
        })
        .collect()
}

/// The preferred member of a cluster, else its alphabetically first member.
pub fn representative(cluster: &[String]) -> Option<&str> {
    REPRESENTATIVE_PREFERENCE
        .iter()
        .copied()
        .find(|name| cluster.iter().any(|m| m == name))
        .or_else(|| cluster.iter().map(String::as_str).min())
}
