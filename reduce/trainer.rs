//! Per-target training over one or more partitions of the record table.
//!
//! Each target gets its own usable-row subset, standardization, fold
//! assignment and strength search; nothing is shared between targets or tags.

use crate::artifact::{
    CvSummary, ModelArtifact, PartitionModels, SkipReason, SkippedTarget, TargetOutcome,
    TrainedModel,
};
use crate::config::{ConfigError, TrainerConfig};
use crate::crossval::{CrossValidationError, KFold};
use crate::metrics::FitMetrics;
use crate::records::{DEPTH_COLUMN, FeatureSet, RecordError, RecordTable, depth_for_tag};
use crate::ridge::{RidgeError, fit_ridge};
use crate::selection::{SelectionError, select_alpha};
use crate::standardize::standardize;
use ndarray::Array1;
use rayon::prelude::*;
use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TrainError {
    #[error("Invalid training configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("Records for partition '{tag}' are missing required columns: {}", .missing.join(", "))]
    MissingColumns { tag: String, missing: Vec<String> },

    #[error("No record table was supplied for partition '{0}'")]
    MissingPartition(String),

    #[error(transparent)]
    Records(#[from] RecordError),

    #[error(transparent)]
    CrossValidation(#[from] CrossValidationError),

    #[error(transparent)]
    Selection(#[from] SelectionError),

    #[error(transparent)]
    Ridge(#[from] RidgeError),
}

/// A named subset of the records, optionally restricted to one depth band.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Partition {
    pub tag: String,
    pub depth: Option<String>,
}

impl Partition {
    /// `dados_010` keeps the 0-10 cm band and `dados_1020` the 10-20 cm band;
    /// any other tag keeps every row.
    pub fn from_tag(tag: &str) -> Self {
        Self {
            tag: tag.to_string(),
            depth: depth_for_tag(tag).map(str::to_string),
        }
    }

    pub fn apply(&self, table: &RecordTable) -> RecordTable {
        match &self.depth {
            Some(depth) => table.retain_depth(depth),
            None => table.clone(),
        }
    }
}

pub struct Trainer {
    features: FeatureSet,
    config: TrainerConfig,
}

impl Trainer {
    pub fn new(features: FeatureSet, config: TrainerConfig) -> Result<Self, TrainError> {
        config.validate()?;
        Ok(Self { features, config })
    }

    pub fn features(&self) -> &FeatureSet {
        &self.features
    }

    pub fn config(&self) -> &TrainerConfig {
        &self.config
    }

    /// Fails with [`TrainError::MissingColumns`] unless `table` carries every
    /// input, target and metadata column.
    pub fn check_columns(&self, tag: &str, table: &RecordTable) -> Result<(), TrainError> {
        let required = self.features.required_columns();
        let missing = table.missing_columns(required.iter().map(String::as_str));
        if missing.is_empty() {
            Ok(())
        } else {
            Err(TrainError::MissingColumns {
                tag: tag.to_string(),
                missing,
            })
        }
    }

    /// Trains one target on the rows where it and every input are present.
    ///
    /// Too few rows and numerically singular fits are returned as skip records;
    /// only malformed input is an error.
    pub fn train_target(
        &self,
        table: &RecordTable,
        target: &str,
    ) -> Result<TargetOutcome, TrainError> {
        let mut needed = self.features.inputs.clone();
        needed.push(target.to_string());
        let rows = table.complete_rows(&needed)?;
        let n = rows.len();

        let min_rows = self.config.min_rows();
        if n < min_rows {
            log::warn!("Skipping '{target}': {n} usable rows, need at least {min_rows}");
            return Ok(skipped(SkipReason::NotEnoughRows, n));
        }

        let x_raw = table.select(&self.features.inputs, &rows)?;
        let y: Array1<f64> = table.select(&needed[needed.len() - 1..], &rows)?.column(0).to_owned();
        let (x, standardization) = standardize(x_raw.view(), &self.features.inputs);

        let kfold = KFold::new(self.config.folds, self.config.seed)?;
        let splits = kfold.split(n)?;

        let selection = match select_alpha(x.view(), y.view(), &splits, &self.config.alphas) {
            Ok(selection) => selection,
            Err(SelectionError::AllCandidatesFailed { rejected, last }) => {
                log::warn!(
                    "Skipping '{target}': every strength in {rejected:?} was singular ({last})"
                );
                return Ok(skipped(SkipReason::NumericalInstability, n));
            }
            Err(err) => return Err(err.into()),
        };
        let best = selection.best;
        if !selection.rejected.is_empty() {
            log::info!(
                "'{target}': strengths {:?} were singular in cross-validation",
                selection.rejected
            );
        }

        let fit = match fit_ridge(x.view(), y.view(), best.alpha) {
            Ok(fit) => fit,
            Err(err) if err.is_numerical() => {
                log::warn!("Skipping '{target}': refit on all {n} rows failed ({err})");
                return Ok(skipped(SkipReason::NumericalInstability, n));
            }
            Err(err) => return Err(err.into()),
        };
        let fitted = fit.predict(x.view());
        let train = FitMetrics::evaluate(y.view(), fitted.view());

        log::info!(
            "Trained '{target}' on {n} rows: alpha={} cv_rmse={:.4} cv_r2={:.4} train_r2={:.4}",
            best.alpha,
            best.rmse,
            best.r2,
            train.r2
        );

        let weights: BTreeMap<String, f64> = self
            .features
            .inputs
            .iter()
            .cloned()
            .zip(fit.weights.iter().copied())
            .collect();

        Ok(TargetOutcome::Trained(TrainedModel {
            ok: true,
            n,
            alpha: best.alpha,
            cv: CvSummary {
                k: kfold.folds(),
                seed: kfold.seed(),
                rmse: best.rmse,
                r2: best.r2,
                rejected: selection.rejected,
            },
            train,
            standardization,
            intercept: fit.intercept,
            weights,
        }))
    }

    /// Filters `table` to the partition and trains every target in parallel.
    pub fn train_partition(
        &self,
        partition: &Partition,
        table: &RecordTable,
    ) -> Result<PartitionModels, TrainError> {
        self.check_columns(&partition.tag, table)?;
        let subset = partition.apply(table);
        log::info!(
            "Training partition '{}' on {} of {} rows",
            partition.tag,
            subset.n_rows(),
            table.n_rows()
        );
        if partition.depth.is_some() && subset.meta_column(DEPTH_COLUMN).is_none() {
            log::warn!("Partition '{}' has no depth column to filter on", partition.tag);
        }

        let outcomes = self
            .features
            .targets
            .par_iter()
            .map(|target| {
                self.train_target(&subset, target)
                    .map(|outcome| (target.clone(), outcome))
            })
            .collect::<Result<Vec<_>, TrainError>>()?;

        Ok(PartitionModels {
            tag: partition.tag.clone(),
            features: self.features.inputs.clone(),
            targets: self.features.targets.clone(),
            models: outcomes.into_iter().collect(),
        })
    }

    /// Trains every configured tag. All tables are checked before any training
    /// starts, so a schema problem never leaves a partial artifact behind.
    pub fn train_artifact(
        &self,
        tables: &BTreeMap<String, RecordTable>,
    ) -> Result<ModelArtifact, TrainError> {
        for tag in &self.config.tags {
            let table = tables
                .get(tag)
                .ok_or_else(|| TrainError::MissingPartition(tag.clone()))?;
            self.check_columns(tag, table)?;
        }

        let mut artifact =
            ModelArtifact::new(self.features.inputs.clone(), self.features.targets.clone());
        for tag in &self.config.tags {
            let table = tables
                .get(tag)
                .ok_or_else(|| TrainError::MissingPartition(tag.clone()))?;
            let models = self.train_partition(&Partition::from_tag(tag), table)?;
            artifact.by_tag.insert(tag.clone(), models);
        }
        Ok(artifact)
    }
}

fn skipped(reason: SkipReason, n: usize) -> TargetOutcome {
    TargetOutcome::Skipped(SkippedTarget::new(reason, n))
}
