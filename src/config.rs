use std::{num::NonZeroUsize, path::PathBuf, sync::Arc};

use machine_learning::specs::OptimizerSpec;
use serde::{Deserialize, Serialize};

use crate::{
    GazeError, Result,
    features::InputSchema,
    model::{BatchPolicy, GazeModel},
    store::{DirectoryStore, KvStore, MemoryStore},
};

/// Everything a session needs to know, loaded from JSON. Every field has a default so `{}` is a
/// valid configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub sample_interval_ms: u64,
    pub round_ms: u64,
    pub rounds: u64,
    pub train_ratio: f64,
    pub predict_interval_ms: u64,
    pub key_prefix: String,
    pub seed: Option<u64>,
    pub input: InputSchema,
    pub training: TrainingConfig,
    pub store: StoreConfig,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            sample_interval_ms: 1000,
            round_ms: 32000,
            rounds: 2,
            train_ratio: 0.8,
            predict_interval_ms: 100,
            key_prefix: "eyegaze".to_string(),
            seed: None,
            input: InputSchema::default(),
            training: TrainingConfig::default(),
            store: StoreConfig::default(),
        }
    }
}

impl SessionConfig {
    /// Reads and validates a configuration file.
    pub fn from_file(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let bytes = std::fs::read(path)?;
        let config: Self = serde_json::from_slice(&bytes)?;
        config.validate()?;
        Ok(config)
    }

    /// Rejects configurations the pipeline can't run with.
    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: &str| Err(GazeError::InvalidConfig(msg.to_string()));

        if self.sample_interval_ms == 0 || self.predict_interval_ms == 0 {
            return invalid("intervals must be positive");
        }
        if self.round_ms < self.sample_interval_ms {
            return invalid("a round must last at least one sampling tick");
        }
        if self.rounds == 0 {
            return invalid("at least one round is needed");
        }
        if !(self.train_ratio > 0. && self.train_ratio < 1.) {
            return invalid("the train ratio must lie strictly between 0 and 1");
        }
        if self.key_prefix.is_empty() {
            return invalid("the key prefix can't be empty");
        }

        self.training.validate()?;
        GazeModel::layers(self.input)?;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    pub epochs: NonZeroUsize,
    pub batch: BatchPolicy,
    pub optimizer: OptimizerSpec,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            epochs: NonZeroUsize::new(50).unwrap_or(NonZeroUsize::MIN),
            batch: BatchPolicy::default(),
            optimizer: OptimizerSpec::Adam {
                learning_rate: 0.001,
                beta1: 0.9,
                beta2: 0.999,
                epsilon: 1e-7,
            },
        }
    }
}

impl TrainingConfig {
    fn validate(&self) -> Result<()> {
        if let BatchPolicy::Proportional { fraction, min, max } = self.batch {
            if fraction <= 0. || min == 0 || max < min {
                return Err(GazeError::InvalidConfig(format!(
                    "invalid proportional batch policy {fraction} in [{min}, {max}]"
                )));
            }
        }

        let lr = match self.optimizer {
            OptimizerSpec::Adam { learning_rate, .. } => learning_rate,
            OptimizerSpec::GradientDescent { learning_rate } => learning_rate,
        };

        if lr <= 0. {
            return Err(GazeError::InvalidConfig("the learning rate must be positive".into()));
        }

        Ok(())
    }
}

/// Where closed rounds are persisted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreConfig {
    #[default]
    Memory,
    Directory {
        path: PathBuf,
    },
}

impl StoreConfig {
    pub fn open(&self) -> Arc<dyn KvStore> {
        match self {
            Self::Memory => Arc::new(MemoryStore::new()),
            Self::Directory { path } => Arc::new(DirectoryStore::new(path)),
        }
    }
}
