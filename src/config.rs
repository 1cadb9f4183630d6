//! Configuration structures for training
//!
//! This module provides the training configuration read by the trainer:
//! epoch count, batch size, the update rule and its hyper-parameters.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{CnnError, Result};
use crate::utils::SimpleRng;

/// Which update rule the trainer applies after every batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OptimizerKind {
    Sgd,
    Momentum,
    #[default]
    Adam,
}

/// Configuration for a training run.
///
/// # Example
///
/// ```json
/// {
///   "epochs": 10,
///   "learning_rate": 0.001,
///   "pulse": 0.9,
///   "momentum": 0.999,
///   "batch_size": 16,
///   "optimizer": "adam",
///   "threads": 4,
///   "seed": 42
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingConfig {
    /// Full passes over the shuffled sample set (at least 1)
    pub epochs: usize,

    /// Step size of the update rule
    pub learning_rate: f32,

    /// First-moment decay (Adam) or previous-step decay (momentum)
    #[serde(default = "default_pulse")]
    pub pulse: f32,

    /// Second-moment decay (Adam)
    #[serde(default = "default_momentum")]
    pub momentum: f32,

    /// Samples per update (at least 1)
    pub batch_size: usize,

    #[serde(default)]
    pub optimizer: OptimizerKind,

    /// Worker threads for a dedicated pool; the global pool when absent
    #[serde(default)]
    pub threads: Option<usize>,

    /// Seed of the generator returned by [`TrainingConfig::rng`]; seeded
    /// from the clock when absent
    #[serde(default)]
    pub seed: Option<u64>,
}

fn default_pulse() -> f32 {
    0.9
}

fn default_momentum() -> f32 {
    0.999
}

impl TrainingConfig {
    /// Adam configuration with the given hyper-parameters.
    pub fn new(
        epochs: usize,
        learning_rate: f32,
        pulse: f32,
        momentum: f32,
        batch_size: usize,
    ) -> Self {
        Self {
            epochs,
            learning_rate,
            pulse,
            momentum,
            batch_size,
            optimizer: OptimizerKind::Adam,
            threads: None,
            seed: None,
        }
    }

    pub fn with_optimizer(mut self, optimizer: OptimizerKind) -> Self {
        self.optimizer = optimizer;
        self
    }

    pub fn with_threads(mut self, threads: usize) -> Self {
        self.threads = Some(threads);
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Random generator for shuffling (and initialization), reproducible
    /// when a seed is configured.
    pub fn rng(&self) -> SimpleRng {
        match self.seed {
            Some(seed) => SimpleRng::new(seed),
            None => SimpleRng::from_time(),
        }
    }

    /// Checks every field against its valid range.
    pub fn validate(&self) -> Result<()> {
        if self.epochs < 1 {
            return Err(CnnError::config("epochs must be at least 1"));
        }
        if self.batch_size < 1 {
            return Err(CnnError::config("batch_size must be at least 1"));
        }
        if !self.learning_rate.is_finite() || self.learning_rate <= 0.0 {
            return Err(CnnError::config(format!(
                "learning_rate must be positive, got {}",
                self.learning_rate
            )));
        }
        if !(0.0..1.0).contains(&self.pulse) {
            return Err(CnnError::config(format!(
                "pulse must be in [0, 1), got {}",
                self.pulse
            )));
        }
        if !(0.0..1.0).contains(&self.momentum) {
            return Err(CnnError::config(format!(
                "momentum must be in [0, 1), got {}",
                self.momentum
            )));
        }
        if self.threads == Some(0) {
            return Err(CnnError::config("threads must be at least 1"));
        }
        Ok(())
    }
}

/// Loads a training configuration from a JSON file.
///
/// Reads the file at `path`, deserializes it and validates the result.
///
/// # Examples
///
/// ```no_run
/// use rust_cnn::config::load_config;
///
/// let cfg = load_config("config/training.json").unwrap();
/// assert!(cfg.epochs >= 1);
/// ```
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<TrainingConfig> {
    let contents = fs::read_to_string(path)?;
    let config: TrainingConfig = serde_json::from_str(&contents)?;
    config.validate()?;
    Ok(config)
}
