//! Training configuration.

use std::path::{Path, PathBuf};

use anyhow::Context;
use rosetta_core::{Architecture, Sampling};
use serde::{Deserialize, Serialize};

use crate::early_stop::StallCounting;

/// Hyper-parameters and run settings for one training run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    pub architecture: Architecture,
    /// Read only the first `sample_size` corpus lines (`None` reads all).
    pub sample_size: Option<usize>,
    pub batch_size: usize,
    pub embedding_dim: usize,
    pub hidden_units: usize,
    pub epochs: usize,
    pub learning_rate: f64,
    /// Smallest loss decrease that counts as an improvement.
    pub min_delta: f64,
    /// Non-improving epochs tolerated before halting.
    pub patience: usize,
    pub stall_counting: StallCounting,
    /// Fraction of the corpus held out for evaluation (shuffled).
    pub test_fraction: f64,
    /// Fraction of the remaining training rows held out for validation (tail).
    pub validation_fraction: f64,
    pub seed: u64,
    pub drop_remainder: bool,
    /// Log a batch loss line every `log_every` batches.
    pub log_every: usize,
    /// Show a sample translation every `sample_every` evaluated pairs.
    pub sample_every: usize,
    pub sampling: Sampling,
    /// Reload the best checkpoint once training finishes.
    pub restore_best: bool,
    pub use_cuda: bool,
    pub output_dir: PathBuf,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self::attention()
    }
}

impl TrainingConfig {
    /// GRU encoder-decoder with additive attention.
    pub fn attention() -> Self {
        Self {
            architecture: Architecture::Attention,
            sample_size: Some(35_000),
            batch_size: 64,
            embedding_dim: 256,
            hidden_units: 1024,
            epochs: 20,
            learning_rate: 1e-3,
            min_delta: 0.001,
            patience: 5,
            stall_counting: StallCounting::Consecutive,
            test_fraction: 0.0,
            validation_fraction: 0.0,
            seed: 42,
            drop_remainder: true,
            log_every: 100,
            sample_every: 2500,
            sampling: Sampling::default(),
            restore_best: true,
            use_cuda: false,
            output_dir: PathBuf::from("models"),
        }
    }

    /// LSTM encoder-decoder bridged by a repeat vector.
    pub fn vanilla() -> Self {
        Self {
            architecture: Architecture::Vanilla,
            hidden_units: 256,
            epochs: 100,
            test_fraction: 0.2,
            validation_fraction: 0.25,
            drop_remainder: false,
            sampling: Sampling::Greedy,
            ..Self::attention()
        }
    }

    /// Preset for an architecture.
    pub fn for_architecture(architecture: Architecture) -> Self {
        match architecture {
            Architecture::Attention => Self::attention(),
            Architecture::Vanilla => Self::vanilla(),
        }
    }

    /// Reads a JSON config; missing fields take the attention defaults.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        let config: Self = serde_json::from_str(&raw)
            .with_context(|| format!("parsing config {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Rejects settings the training loop cannot run with.
    pub fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(self.batch_size > 0, "batch_size must be positive");
        anyhow::ensure!(self.epochs > 0, "epochs must be positive");
        anyhow::ensure!(self.embedding_dim > 0, "embedding_dim must be positive");
        anyhow::ensure!(self.hidden_units > 0, "hidden_units must be positive");
        anyhow::ensure!(
            (0.0..1.0).contains(&self.test_fraction),
            "test_fraction must be in [0, 1)"
        );
        anyhow::ensure!(
            (0.0..1.0).contains(&self.validation_fraction),
            "validation_fraction must be in [0, 1)"
        );
        anyhow::ensure!(self.learning_rate > 0.0, "learning_rate must be positive");
        Ok(())
    }

    /// Base name of the run's artifacts.
    pub fn run_name(&self) -> String {
        format!("fr_en_{}", self.architecture)
    }

    pub fn with_sample_size(mut self, sample_size: Option<usize>) -> Self {
        self.sample_size = sample_size;
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_embedding_dim(mut self, dim: usize) -> Self {
        self.embedding_dim = dim;
        self
    }

    pub fn with_hidden_units(mut self, units: usize) -> Self {
        self.hidden_units = units;
        self
    }

    pub fn with_epochs(mut self, epochs: usize) -> Self {
        self.epochs = epochs;
        self
    }

    pub fn with_learning_rate(mut self, learning_rate: f64) -> Self {
        self.learning_rate = learning_rate;
        self
    }

    /// Set the early-stopping threshold and patience.
    pub fn with_early_stopping(mut self, min_delta: f64, patience: usize) -> Self {
        self.min_delta = min_delta;
        self.patience = patience;
        self
    }

    pub fn with_stall_counting(mut self, counting: StallCounting) -> Self {
        self.stall_counting = counting;
        self
    }

    /// Set the test and validation fractions.
    pub fn with_split(mut self, test_fraction: f64, validation_fraction: f64) -> Self {
        self.test_fraction = test_fraction;
        self.validation_fraction = validation_fraction;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_drop_remainder(mut self, drop: bool) -> Self {
        self.drop_remainder = drop;
        self
    }

    pub fn with_sampling(mut self, sampling: Sampling) -> Self {
        self.sampling = sampling;
        self
    }

    pub fn with_output_dir<P: Into<PathBuf>>(mut self, dir: P) -> Self {
        self.output_dir = dir.into();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_presets() {
        let attention = TrainingConfig::attention();
        assert_eq!(attention.batch_size, 64);
        assert_eq!(attention.hidden_units, 1024);
        assert_eq!(attention.sample_size, Some(35_000));
        assert!(attention.drop_remainder);

        let vanilla = TrainingConfig::vanilla();
        assert_eq!(vanilla.architecture, Architecture::Vanilla);
        assert_eq!(vanilla.sample_size, Some(35_000));
        assert_eq!(vanilla.hidden_units, 256);
        assert_eq!(vanilla.epochs, 100);
        assert_eq!(vanilla.test_fraction, 0.2);
        assert_eq!(vanilla.validation_fraction, 0.25);
        assert_eq!(vanilla.patience, 5);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"epochs": 3, "sampling": {"kind": "greedy"}}"#).unwrap();

        let config = TrainingConfig::from_json_file(&path).unwrap();
        assert_eq!(config.epochs, 3);
        assert_eq!(config.sampling, Sampling::Greedy);
        assert_eq!(config.batch_size, 64);
    }

    #[test]
    fn test_validate_rejects_bad_fractions() {
        let config = TrainingConfig::vanilla().with_split(1.0, 0.25);
        assert!(config.validate().is_err());
        assert!(TrainingConfig::attention().with_batch_size(0).validate().is_err());
    }
}
