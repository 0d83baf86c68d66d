//! Checkpoint directory: `model.safetensors` plus `checkpoint.json`.

use std::path::Path;

use anyhow::Context;
use candle_core::{DType, Device};
use candle_nn::{VarBuilder, VarMap};
use rosetta_core::Seq2Seq;
use rosetta_core::model::Seq2SeqConfig;
use rosetta_core::vocab::VocabularyIndex;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::config::TrainingConfig;

pub const WEIGHTS_FILE: &str = "model.safetensors";
pub const METADATA_FILE: &str = "checkpoint.json";

/// Everything besides the weights needed to rebuild a trained model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointMetadata {
    pub training: TrainingConfig,
    pub model: Seq2SeqConfig,
    pub source_vocab: VocabularyIndex,
    pub target_vocab: VocabularyIndex,
    /// 1-based epoch the weights were taken from.
    pub epoch: usize,
    pub monitored_loss: f64,
}

/// Writes the weights and metadata into `dir`, creating it if needed.
pub fn save<P: AsRef<Path>>(
    dir: P,
    varmap: &VarMap,
    metadata: &CheckpointMetadata,
) -> anyhow::Result<()> {
    let dir = dir.as_ref();
    std::fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;

    varmap
        .save(dir.join(WEIGHTS_FILE))
        .with_context(|| format!("writing weights to {}", dir.display()))?;
    let json = serde_json::to_string_pretty(metadata)?;
    std::fs::write(dir.join(METADATA_FILE), json)
        .with_context(|| format!("writing checkpoint metadata to {}", dir.display()))?;

    info!(
        "Checkpoint saved to {} (epoch {}, loss {:.4})",
        dir.display(),
        metadata.epoch,
        metadata.monitored_loss
    );
    Ok(())
}

pub fn load_metadata<P: AsRef<Path>>(dir: P) -> anyhow::Result<CheckpointMetadata> {
    let path = dir.as_ref().join(METADATA_FILE);
    let raw =
        std::fs::read_to_string(&path).with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("parsing {}", path.display()))
}

/// Overwrites the variables of `varmap` with the saved weights.
pub fn restore_weights<P: AsRef<Path>>(dir: P, varmap: &mut VarMap) -> anyhow::Result<()> {
    let path = dir.as_ref().join(WEIGHTS_FILE);
    varmap
        .load(&path)
        .with_context(|| format!("loading weights from {}", path.display()))?;
    Ok(())
}

/// A model rebuilt from a checkpoint directory.
pub struct LoadedModel {
    pub metadata: CheckpointMetadata,
    pub model: Seq2Seq,
    pub varmap: VarMap,
}

pub fn load_model<P: AsRef<Path>>(dir: P, device: &Device) -> anyhow::Result<LoadedModel> {
    let dir = dir.as_ref();
    let metadata = load_metadata(dir)?;

    let mut varmap = VarMap::new();
    let vb = VarBuilder::from_varmap(&varmap, DType::F32, device);
    let model = Seq2Seq::new(metadata.model.clone(), vb)?;
    restore_weights(dir, &mut varmap)?;

    info!(
        "Loaded {} model from {} (epoch {})",
        metadata.model.architecture,
        dir.display(),
        metadata.epoch
    );
    Ok(LoadedModel {
        metadata,
        model,
        varmap,
    })
}
