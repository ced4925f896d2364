//! # Redundancy Audit
//!
//! Looks for measured variables that carry the same information. The audit
//! summarizes each variable's observed range, correlates every pair over the
//! rows where both are present, and groups variables linked by strong
//! correlations into clusters with a suggested representative each.

pub mod correlation;
pub mod report;

use crate::records::{DEPTH_COLUMN, ISPC_VARIABLES, RecordTable};
use correlation::{CorrelationMatrix, CorrelationMethod, HighPair, high_pairs, redundancy_clusters};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const DEFAULT_THRESHOLD: f64 = 0.85;

#[derive(Error, Debug)]
pub enum AuditError {
    #[error("Failed to write audit output: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to encode audit CSV: {0}")]
    Csv(#[from] csv::Error),
    #[error("Failed to encode audit JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Correlation threshold must lie in [0, 1], got {0}")]
    InvalidThreshold(f64),
}

/// Observed range of one variable. Both bounds are absent when it has no values.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Range {
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub count: usize,
}

pub fn summarize(table: &RecordTable, names: &[String]) -> BTreeMap<String, Range> {
    names
        .iter()
        .map(|name| {
            let observed: Vec<f64> = table
                .column(name)
                .map(|col| col.iter().copied().filter(|v| !v.is_nan()).collect())
                .unwrap_or_default();
            let range = Range {
                min: observed.iter().copied().reduce(f64::min),
                max: observed.iter().copied().reduce(f64::max),
                count: observed.len(),
            };
            (name.clone(), range)
        })
        .collect()
}

/// The single depth band present in the table, if there is exactly one.
pub fn single_depth(table: &RecordTable) -> Option<String> {
    let bands: BTreeSet<&str> = table
        .meta_column(DEPTH_COLUMN)?
        .iter()
        .map(|d| d.trim())
        .filter(|d| !d.is_empty())
        .collect();
    match bands.len() {
        1 => bands.into_iter().next().map(str::to_string),
        _ => None,
    }
}

#[derive(Debug, Clone)]
pub struct AuditReport {
    pub method: CorrelationMethod,
    pub threshold: f64,
    pub depth: Option<String>,
    pub ranges: BTreeMap<String, Range>,
    pub matrix: CorrelationMatrix,
    pub pairs: Vec<HighPair>,
    pub clusters: Vec<Vec<String>>,
}

/// Paths written by [`AuditReport::write_to`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditOutputs {
    pub ranges: PathBuf,
    pub correlations: PathBuf,
    pub pairs: PathBuf,
    pub report: PathBuf,
}

impl AuditReport {
    /// Audits the fifteen ISPC variables of `table`.
    pub fn run(
        table: &RecordTable,
        method: CorrelationMethod,
        threshold: f64,
        depth: Option<String>,
    ) -> Result<Self, AuditError> {
        if !(0.0..=1.0).contains(&threshold) {
            return Err(AuditError::InvalidThreshold(threshold));
        }
        let names: Vec<String> = ISPC_VARIABLES.iter().map(|s| s.to_string()).collect();
        let ranges = summarize(table, &names);
        let matrix = CorrelationMatrix::compute(table, &names, method);
        let pairs = high_pairs(&matrix, threshold);
        let clusters = redundancy_clusters(&pairs);
        log::info!(
            "Audit ({method}, |r| >= {threshold}): {} high pairs, {} clusters",
            pairs.len(),
            clusters.len()
        );
        Ok(Self {
            method,
            threshold,
            depth: depth.or_else(|| single_depth(table)),
            ranges,
            matrix,
            pairs,
            clusters,
        })
    }

    pub fn markdown(&self) -> String {
        report::render_report(
            &self.pairs,
            &self.clusters,
            self.depth.as_deref(),
            self.method,
            self.threshold,
        )
    }

    pub fn pairs_csv(&self) -> Result<String, AuditError> {
        let mut writer = csv::Writer::from_writer(Vec::new());
        if self.pairs.is_empty() {
            writer.write_record(["var_a", "var_b", "corr", "abs_corr"])?;
        }
        for pair in &self.pairs {
            writer.serialize(pair)?;
        }
        let bytes = writer
            .into_inner()
            .map_err(|err| csv::Error::from(err.into_error()))?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    /// Writes the range JSON, the correlation and pair CSVs and the markdown
    /// report into `dir`, naming each file after `suffix`.
    pub fn write_to(&self, dir: &Path, suffix: &str) -> Result<AuditOutputs, AuditError> {
        fs::create_dir_all(dir)?;
        let method = self.method;
        let threshold = format!("{:.2}", self.threshold);
        let outputs = AuditOutputs {
            ranges: dir.join(format!("ispc_minmax_{suffix}.json")),
            correlations: dir.join(format!("ispc_correlations_{suffix}_{method}.csv")),
            pairs: dir.join(format!("ispc_high_corr_pairs_{suffix}_{method}_{threshold}.csv")),
            report: dir.join(format!("ispc_reduction_report_{suffix}_{method}_{threshold}.md")),
        };
        fs::write(&outputs.ranges, serde_json::to_string_pretty(&self.ranges)?)?;
        fs::write(&outputs.correlations, self.matrix.to_csv()?)?;
        fs::write(&outputs.pairs, self.pairs_csv()?)?;
        fs::write(&outputs.report, self.markdown())?;
        Ok(outputs)
    }
}
