//! Serialized form of a training run and the inference it supports.
//!
//! The document nests as `by_tag → models → target`. Every map is a `BTreeMap`,
//! so two runs over identical inputs serialize to identical bytes.

use crate::metrics::FitMetrics;
use crate::records::RecordTable;
use crate::standardize::Standardization;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io::{BufWriter, Write};
use std::path::Path;
use thiserror::Error;

pub const ARTIFACT_KIND: &str = "ispc_reduced_ridge";

/// Global name under which the JavaScript bundle registers the artifact.
pub const JS_GLOBAL: &str = "ISPC_ReducedMLModels";

#[derive(Error, Debug)]
pub enum ArtifactError {
    #[error("Failed to read or write model artifact: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to encode or decode model artifact JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Unexpected artifact kind '{found}', expected 'ispc_reduced_ridge'")]
    WrongKind { found: String },
    #[error("Artifact has no models for tag '{0}'")]
    UnknownTag(String),
    #[error("Failed to write estimates table: {0}")]
    Csv(#[from] csv::Error),
    #[error("Input records lack every model input of partition '{tag}': {}", .missing.join(", "))]
    NoModelInputs { tag: String, missing: Vec<String> },
}

/// Why a target has no model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    NotEnoughRows,
    NumericalInstability,
}

/// Cross-validation diagnostics of the selected strength.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CvSummary {
    pub k: usize,
    pub seed: u64,
    pub rmse: f64,
    pub r2: f64,
    /// Grid strengths dropped because their solve was singular on some fold.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub rejected: Vec<f64>,
}

/// A fitted per-target model over named, standardized inputs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainedModel {
    pub ok: bool,
    pub n: usize,
    pub alpha: f64,
    pub cv: CvSummary,
    pub train: FitMetrics,
    pub standardization: Standardization,
    pub intercept: f64,
    pub weights: BTreeMap<String, f64>,
}

impl TrainedModel {
    /// Estimates the target from raw input values keyed by feature name.
    ///
    /// Returns `None` when any weighted feature is absent or not finite, or when
    /// the result itself is not finite.
    pub fn predict(&self, inputs: &BTreeMap<String, f64>) -> Option<f64> {
        let mut y = self.intercept;
        for (name, &weight) in &self.weights {
            let x = *inputs.get(name)?;
            if !x.is_finite() {
                return None;
            }
            let z = (x - self.standardization.mean_of(name)) / self.standardization.scale_of(name);
            y += weight * z;
        }
        y.is_finite().then_some(y)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedTarget {
    pub ok: bool,
    pub reason: SkipReason,
    pub n: usize,
}

impl SkippedTarget {
    pub fn new(reason: SkipReason, n: usize) -> Self {
        Self {
            ok: false,
            reason,
            n,
        }
    }
}

/// Result for one target: a model, or the record of why there is none.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TargetOutcome {
    Trained(TrainedModel),
    Skipped(SkippedTarget),
}

impl TargetOutcome {
    pub fn model(&self) -> Option<&TrainedModel> {
        match self {
            TargetOutcome::Trained(model) => Some(model),
            TargetOutcome::Skipped(_) => None,
        }
    }

    pub fn is_trained(&self) -> bool {
        self.model().is_some()
    }

    pub fn n(&self) -> usize {
        match self {
            TargetOutcome::Trained(model) => model.n,
            TargetOutcome::Skipped(skip) => skip.n,
        }
    }
}

/// All target outcomes for one partition tag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartitionModels {
    pub tag: String,
    pub features: Vec<String>,
    pub targets: Vec<String>,
    pub models: BTreeMap<String, TargetOutcome>,
}

impl PartitionModels {
    /// Model inputs absent from `table`. Rows of a partially covered table
    /// still get estimates where their targets allow it; a table with none of
    /// the inputs is an error.
    pub fn missing_inputs(&self, table: &RecordTable) -> Result<Vec<String>, ArtifactError> {
        let missing = table.missing_columns(self.features.iter().map(String::as_str));
        if !self.features.is_empty() && missing.len() == self.features.len() {
            return Err(ArtifactError::NoModelInputs {
                tag: self.tag.clone(),
                missing,
            });
        }
        Ok(missing)
    }

    /// Estimates every target with a trained model. Targets that are skipped or
    /// not estimable from `inputs` are left out.
    pub fn estimate(&self, inputs: &BTreeMap<String, f64>) -> BTreeMap<String, f64> {
        self.targets
            .iter()
            .filter_map(|target| {
                let model = self.models.get(target)?.model()?;
                model.predict(inputs).map(|y| (target.clone(), y))
            })
            .collect()
    }

    /// Row-by-row [`estimate`](Self::estimate) over a table. Input columns the
    /// table lacks count as missing.
    pub fn estimate_table(&self, table: &RecordTable) -> Vec<BTreeMap<String, f64>> {
        let columns: Vec<_> = self
            .features
            .iter()
            .filter_map(|name| table.column(name).map(|col| (name, col)))
            .collect();
        (0..table.n_rows())
            .map(|row| {
                let inputs = columns
                    .iter()
                    .map(|(name, col)| ((*name).clone(), col[row]))
                    .collect();
                self.estimate(&inputs)
            })
            .collect()
    }
}

/// Tab-separated estimates: a 1-based `row` column, then one column per target
/// with `NA` where no estimate exists.
pub fn estimates_to_tsv(
    targets: &[String],
    rows: &[BTreeMap<String, f64>],
) -> Result<String, ArtifactError> {
    let mut writer = csv::WriterBuilder::new()
        .delimiter(b'\t')
        .from_writer(Vec::new());
    writer.write_record(std::iter::once("row").chain(targets.iter().map(String::as_str)))?;
    for (idx, estimates) in rows.iter().enumerate() {
        let cells = targets.iter().map(|target| match estimates.get(target) {
            Some(value) => value.to_string(),
            None => "NA".to_string(),
        });
        writer.write_record(std::iter::once((idx + 1).to_string()).chain(cells))?;
    }
    let bytes = writer
        .into_inner()
        .map_err(|err| csv::Error::from(err.into_error()))?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelArtifact {
    pub kind: String,
    pub features: Vec<String>,
    pub targets: Vec<String>,
    pub by_tag: BTreeMap<String, PartitionModels>,
}

impl ModelArtifact {
    pub fn new(features: Vec<String>, targets: Vec<String>) -> Self {
        Self {
            kind: ARTIFACT_KIND.to_string(),
            features,
            targets,
            by_tag: BTreeMap::new(),
        }
    }

    pub fn partition(&self, tag: &str) -> Result<&PartitionModels, ArtifactError> {
        self.by_tag
            .get(tag)
            .ok_or_else(|| ArtifactError::UnknownTag(tag.to_string()))
    }

    pub fn to_json_pretty(&self) -> Result<String, ArtifactError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// UMD bundle wrapping the compact JSON payload, usable from a browser
    /// `<script>` tag or from `require`.
    pub fn to_umd_js(&self) -> Result<String, ArtifactError> {
        let payload = serde_json::to_string(self)?;
        Ok(format!(
            "// Reduced-mode ridge models, generated by ispc-reduce\n\
             (function (root, factory) {{\n\
             \x20 if (typeof module === 'object' && module.exports) {{\n\
             \x20   module.exports = factory();\n\
             \x20 }} else {{\n\
             \x20   root.{JS_GLOBAL} = factory();\n\
             \x20 }}\n\
             }})(typeof self !== 'undefined' ? self : this, function () {{\n\
             \x20 return {payload};\n\
             }});\n"
        ))
    }

    pub fn save_json(&self, path: &Path) -> Result<(), ArtifactError> {
        write_with_parents(path, &self.to_json_pretty()?)
    }

    pub fn save_umd_js(&self, path: &Path) -> Result<(), ArtifactError> {
        write_with_parents(path, &self.to_umd_js()?)
    }

    pub fn load_json(path: &Path) -> Result<Self, ArtifactError> {
        let text = fs::read_to_string(path)?;
        let artifact: ModelArtifact = serde_json::from_str(&text)?;
        if artifact.kind != ARTIFACT_KIND {
            return Err(ArtifactError::WrongKind {
                found: artifact.kind,
            });
        }
        Ok(artifact)
    }
}

fn write_with_parents(path: &Path, contents: &str) -> Result<(), ArtifactError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let mut file = BufWriter::new(fs::File::create(path)?);
    file.write_all(contents.as_bytes())?;
    file.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use tempfile::tempdir;

    fn model() -> TrainedModel {
        TrainedModel {
            ok: true,
            n: 20,
            alpha: 0.1,
            cv: CvSummary {
                k: 5,
                seed: 42,
                rmse: 0.4,
                r2: 0.8,
                rejected: Vec::new(),
            },
            train: FitMetrics { rmse: 0.3, r2: 0.9 },
            standardization: Standardization {
                mean: BTreeMap::from([("a".to_string(), 10.0), ("b".to_string(), 1.0)]),
                std: BTreeMap::from([("a".to_string(), 2.0), ("b".to_string(), 0.0)]),
            },
            intercept: 5.0,
            weights: BTreeMap::from([("a".to_string(), 1.5), ("b".to_string(), -0.5)]),
        }
    }

    fn inputs(pairs: &[(&str, f64)]) -> BTreeMap<String, f64> {
        pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    fn artifact() -> ModelArtifact {
        let mut artifact = ModelArtifact::new(
            vec!["a".to_string(), "b".to_string()],
            vec!["t1".to_string(), "t2".to_string()],
        );
        artifact.by_tag.insert(
            "dados_010".to_string(),
            PartitionModels {
                tag: "dados_010".to_string(),
                features: artifact.features.clone(),
                targets: artifact.targets.clone(),
                models: BTreeMap::from([
                    ("t1".to_string(), TargetOutcome::Trained(model())),
                    (
                        "t2".to_string(),
                        TargetOutcome::Skipped(SkippedTarget::new(SkipReason::NotEnoughRows, 4)),
                    ),
                ]),
            },
        );
        artifact
    }

    #[test]
    fn prediction_standardizes_by_name() {
        // a: (14 - 10) / 2 = 2; b has zero std so scale 1: (3 - 1) = 2
        let y = model().predict(&inputs(&[("b", 3.0), ("a", 14.0)])).unwrap();
        assert_abs_diff_eq!(y, 5.0 + 1.5 * 2.0 - 0.5 * 2.0);
    }

    #[test]
    fn missing_or_nan_input_means_no_prediction() {
        assert!(model().predict(&inputs(&[("a", 14.0)])).is_none());
        assert!(model().predict(&inputs(&[("a", 14.0), ("b", f64::NAN)])).is_none());
    }

    #[test]
    fn estimate_skips_untrained_targets() {
        let artifact = artifact();
        let part = artifact.partition("dados_010").unwrap();
        let out = part.estimate(&inputs(&[("a", 10.0), ("b", 1.0)]));
        assert_eq!(out.len(), 1);
        assert_abs_diff_eq!(out["t1"], 5.0);
        assert!(matches!(
            artifact.partition("nope"),
            Err(ArtifactError::UnknownTag(t)) if t == "nope"
        ));
    }

    #[test]
    fn table_estimates_render_as_tsv_with_na() {
        let artifact = artifact();
        let part = artifact.partition("dados_010").unwrap();
        let table = RecordTable::new(2)
            .with_numeric("a", vec![12.0, f64::NAN])
            .unwrap()
            .with_numeric("b", vec![1.0, 1.0])
            .unwrap();
        let rows = part.estimate_table(&table);
        assert_abs_diff_eq!(rows[0]["t1"], 6.5);
        assert!(rows[1].is_empty());
        let tsv = estimates_to_tsv(&part.targets, &rows).unwrap();
        assert_eq!(tsv, "row\tt1\tt2\n1\t6.5\tNA\n2\tNA\tNA\n");
    }

    #[test]
    fn input_coverage_is_checked_against_the_partition() {
        let artifact = artifact();
        let part = artifact.partition("dados_010").unwrap();
        let partial = RecordTable::new(1).with_numeric("a", vec![1.0]).unwrap();
        assert_eq!(part.missing_inputs(&partial).unwrap(), vec!["b"]);

        let unrelated = RecordTable::new(1).with_numeric("dmg", vec![1.0]).unwrap();
        let err = part.missing_inputs(&unrelated).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Input records lack every model input of partition 'dados_010': a, b"
        );
    }

    #[test]
    fn skip_record_serializes_flat() {
        let skip = TargetOutcome::Skipped(SkippedTarget::new(SkipReason::NotEnoughRows, 5));
        let value = serde_json::to_value(&skip).unwrap();
        assert_eq!(
            value,
            serde_json::json!({"ok": false, "reason": "not_enough_rows", "n": 5})
        );
        let value = serde_json::to_value(TargetOutcome::Trained(model())).unwrap();
        assert_eq!(value["ok"], serde_json::json!(true));
        assert_eq!(value["cv"]["k"], serde_json::json!(5));
        assert_eq!(value["standardization"]["std"]["a"], serde_json::json!(2.0));
    }

    #[test]
    fn json_file_reloads_identically() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("models.json");
        let original = artifact();
        original.save_json(&path).unwrap();
        let loaded = ModelArtifact::load_json(&path).unwrap();
        assert_eq!(loaded, original);
        assert!(loaded.by_tag["dados_010"].models["t1"].is_trained());
        assert_eq!(loaded.by_tag["dados_010"].models["t2"].n(), 4);
    }

    #[test]
    fn foreign_kind_is_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("other.json");
        let mut other = artifact();
        other.kind = "something_else".to_string();
        other.save_json(&path).unwrap();
        assert!(matches!(
            ModelArtifact::load_json(&path),
            Err(ArtifactError::WrongKind { found }) if found == "something_else"
        ));
    }

    #[test]
    fn umd_bundle_embeds_compact_payload() {
        let artifact = artifact();
        let js = artifact.to_umd_js().unwrap();
        let payload = serde_json::to_string(&artifact).unwrap();
        assert!(js.contains(&format!("  return {payload};\n")));
        assert!(js.contains("root.ISPC_ReducedMLModels = factory();"));
        assert!(js.contains("module.exports = factory();"));
    }
}
