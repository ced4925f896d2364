//! Training options: regularization grid, fold count, seed, and partition tags.
//!
//! Options can come from a TOML file; any field left out takes its default.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

pub const DEFAULT_ALPHAS: [f64; 5] = [0.0, 0.01, 0.1, 1.0, 10.0];
pub const DEFAULT_FOLDS: usize = 5;
pub const DEFAULT_SEED: u64 = 42;
pub const DEFAULT_TAGS: [&str; 2] = ["dados_010", "dados_1020"];

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse TOML config file: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("The fold count must be at least 2, got {0}")]
    InvalidFoldCount(usize),
    #[error("The regularization grid is empty")]
    EmptyGrid,
    #[error("Regularization strengths must be finite and non-negative, got {0}")]
    InvalidAlpha(f64),
    #[error("At least one partition tag is required")]
    NoTags,
    #[error("Could not parse '{0}' as a regularization strength")]
    UnparsableAlpha(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainerConfig {
    pub alphas: Vec<f64>,
    pub folds: usize,
    pub seed: u64,
    pub tags: Vec<String>,
}

impl Default for TrainerConfig {
    fn default() -> Self {
        Self {
            alphas: DEFAULT_ALPHAS.to_vec(),
            folds: DEFAULT_FOLDS,
            seed: DEFAULT_SEED,
            tags: DEFAULT_TAGS.iter().map(|t| t.to_string()).collect(),
        }
    }
}

impl TrainerConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path)?;
        let config: TrainerConfig = toml::from_str(&text)?;
        Ok(config)
    }

    /// Minimum usable rows for one target: `max(10, 2k)`.
    pub fn min_rows(&self) -> usize {
        10.max(2 * self.folds)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.folds < 2 {
            return Err(ConfigError::InvalidFoldCount(self.folds));
        }
        if self.alphas.is_empty() {
            return Err(ConfigError::EmptyGrid);
        }
        if let Some(&bad) = self.alphas.iter().find(|a| !a.is_finite() || **a < 0.0) {
            return Err(ConfigError::InvalidAlpha(bad));
        }
        if self.tags.is_empty() {
            return Err(ConfigError::NoTags);
        }
        Ok(())
    }
}

/// Parses a comma-separated list of strengths, skipping empty items.
pub fn parse_alpha_list(text: &str) -> Result<Vec<f64>, ConfigError> {
    text.split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(|item| {
            item.parse::<f64>()
                .map_err(|_| ConfigError::UnparsableAlpha(item.to_string()))
        })
        .collect()
}

/// Parses a comma-separated list of tags, skipping empty items.
pub fn parse_tag_list(text: &str) -> Vec<String> {
    text.split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}
