use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};

/// What `experiment::run` does when a variant fails
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Stop at the first failure and return its error
    #[default]
    Abort,
    /// Log the failure and carry on, the variant gets no result
    Skip,
}

/// Training procedure shared by every variant of one experiment.
///
/// Read from JSON; unknown keys are rejected and `restore_best_weights` has no
/// default, so a misspelt or forgotten rollback switch fails at load time.
///
/// ```rust
///   use overfit::config::ExperimentConfig;
///   let json = r#"{"restore_best_weights": true, "epochs": 5}"#;
///   let config = ExperimentConfig::from_json(json).unwrap();
///   assert_eq!(config.epochs, 5);
///   assert_eq!(config.batch_size, 32);
///   assert!(ExperimentConfig::from_json(r#"{"restore_best_weight": true}"#).is_err());
/// ```
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExperimentConfig {
    #[serde(default = "defaults::epochs")]
    pub epochs: usize,
    #[serde(default = "defaults::batch_size")]
    pub batch_size: usize,
    #[serde(default = "defaults::learning_rate")]
    pub learning_rate: f32,
    /// Share of the training data held out for validation
    #[serde(default = "defaults::validation_split")]
    pub validation_split: f64,
    #[serde(default = "defaults::split_seed")]
    pub split_seed: u64,
    /// Seeds weight initialization, dropout, noise and batch shuffling
    #[serde(default = "defaults::shuffle_seed")]
    pub shuffle_seed: u64,
    /// Early stopping: epochs without improvement before halting
    #[serde(default = "defaults::patience")]
    pub patience: usize,
    #[serde(default)]
    pub min_delta: f32,
    /// Early stopping: roll back to the best epoch's weights
    pub restore_best_weights: bool,
    #[serde(default)]
    pub on_failure: FailurePolicy,
    /// Use only the first rows of the training data
    #[serde(default)]
    pub train_limit: Option<usize>,
}

mod defaults {
    pub(super) fn epochs() -> usize {
        10
    }
    pub(super) fn batch_size() -> usize {
        32
    }
    pub(super) fn learning_rate() -> f32 {
        0.001
    }
    pub(super) fn validation_split() -> f64 {
        0.1
    }
    pub(super) fn split_seed() -> u64 {
        crate::dataset::SPLIT_SEED
    }
    pub(super) fn shuffle_seed() -> u64 {
        1
    }
    pub(super) fn patience() -> usize {
        3
    }
}

impl ExperimentConfig {
    /// Defaults for everything except the rollback switch
    pub fn new(restore_best_weights: bool) -> Self {
        Self {
            epochs: defaults::epochs(),
            batch_size: defaults::batch_size(),
            learning_rate: defaults::learning_rate(),
            validation_split: defaults::validation_split(),
            split_seed: defaults::split_seed(),
            shuffle_seed: defaults::shuffle_seed(),
            patience: defaults::patience(),
            min_delta: 0.,
            restore_best_weights,
            on_failure: FailurePolicy::default(),
            train_limit: None,
        }
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    pub fn from_json(text: &str) -> Result<Self> {
        Self::from_value(serde_json::from_str(text)?)
    }

    /// Builds from an already parsed object, e.g. a file with command line
    /// overrides merged in
    pub fn from_value(value: Value) -> Result<Self> {
        let config: Self =
            serde_json::from_value(value).map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.epochs == 0 {
            return Err(Error::Config("epochs must be positive".into()));
        }
        if self.batch_size == 0 {
            return Err(Error::Config("batch_size must be positive".into()));
        }
        if !(self.learning_rate.is_finite() && self.learning_rate > 0.) {
            return Err(Error::Config(format!(
                "learning_rate must be positive, got {}",
                self.learning_rate
            )));
        }
        if !(self.validation_split > 0. && self.validation_split < 1.) {
            return Err(Error::Config(format!(
                "validation_split must be in (0,1), got {}",
                self.validation_split
            )));
        }
        if !(self.min_delta.is_finite() && self.min_delta >= 0.) {
            return Err(Error::Config(format!(
                "min_delta must be non-negative, got {}",
                self.min_delta
            )));
        }
        if self.train_limit == Some(0) {
            return Err(Error::Config("train_limit must be positive".into()));
        }
        Ok(())
    }
}
