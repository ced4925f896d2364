#![deny(unused_variables)]
#![deny(dead_code)]
#![deny(unused_imports)]
#![deny(clippy::no_effect_underscore_binding)]
pub mod artifact;
pub mod config;
pub mod crossval;
pub mod faer_ndarray;
pub mod metrics;
pub mod ridge;
pub mod selection;
pub mod standardize;
pub mod trainer;

#[path = "../shared/records.rs"]
pub mod records;

// Correlation redundancy audit over the same record tables
#[path = "../audit/mod.rs"]
pub mod audit;

pub use artifact::{ModelArtifact, PartitionModels, TargetOutcome, TrainedModel};
pub use config::TrainerConfig;
pub use records::{FeatureSet, RecordTable};
pub use trainer::{Partition, TrainError, Trainer};
