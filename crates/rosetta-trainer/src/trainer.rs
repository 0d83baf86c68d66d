//! Teacher-forced training loop with validation, checkpointing and early
//! stopping.

use std::time::Instant;

use candle_core::{DType, Device};
use candle_nn::{AdamW, Optimizer, ParamsAdamW, VarBuilder, VarMap};
use oorandom::Rand64;
use rosetta_core::Seq2Seq;
use rosetta_core::model::Seq2SeqConfig;
use rosetta_core::model::loss;
use tracing::{debug, info, warn};

use crate::checkpoint::{self, CheckpointMetadata};
use crate::config::TrainingConfig;
use crate::data::{Dataset, PreparedCorpus, Splits};
use crate::early_stop::EarlyStopping;
use crate::metrics::{Accuracy, EpochRecord, TrainingHistory};

/// CUDA device 0 when requested and available, otherwise the CPU.
pub fn select_device(use_cuda: bool) -> anyhow::Result<Device> {
    if use_cuda {
        Ok(Device::cuda_if_available(0)?)
    } else {
        Ok(Device::Cpu)
    }
}

/// Mean teacher-forced loss and token accuracy over a dataset, in order.
pub fn teacher_forced_metrics(
    model: &Seq2Seq,
    dataset: &Dataset,
    batch_size: usize,
) -> anyhow::Result<(f64, Accuracy)> {
    let mut accuracy = Accuracy::default();
    let mut total = 0.0;
    let batches = dataset.batch_indices(batch_size, false, None);
    for rows in &batches {
        let (source, target) = dataset.tensors(rows, model.device())?;
        let forced = model.teacher_forced(&source, &target)?;
        total += f64::from(model.loss_of(&forced)?.to_scalar::<f32>()?);
        accuracy.add(loss::token_accuracy(
            &forced.logits,
            &forced.labels,
            model.masks_padding(),
        )?);
    }
    let mean = if batches.is_empty() {
        0.0
    } else {
        total / batches.len() as f64
    };
    Ok((mean, accuracy))
}

/// Model, parameters and optimizer of one training run.
pub struct TrainingSession {
    config: TrainingConfig,
    varmap: VarMap,
    model: Seq2Seq,
    optimizer: AdamW,
}

impl TrainingSession {
    pub fn new(
        config: TrainingConfig,
        model_config: Seq2SeqConfig,
        device: &Device,
    ) -> anyhow::Result<Self> {
        config.validate()?;
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, device);
        let model = Seq2Seq::new(model_config, vb)?;

        let params = ParamsAdamW {
            lr: config.learning_rate,
            weight_decay: 0.0,
            ..Default::default()
        };
        let optimizer = AdamW::new(varmap.all_vars(), params)?;

        info!(
            "Initialized {} model: embedding {}, units {}, {} parameter tensors",
            model.config().architecture,
            model.config().embedding_dim,
            model.config().hidden_units,
            varmap.all_vars().len()
        );

        Ok(Self {
            config,
            varmap,
            model,
            optimizer,
        })
    }

    pub fn model(&self) -> &Seq2Seq {
        &self.model
    }

    pub fn varmap(&self) -> &VarMap {
        &self.varmap
    }

    pub fn config(&self) -> &TrainingConfig {
        &self.config
    }

    /// One optimizer update; returns the batch loss and accuracy counts.
    pub fn train_batch(
        &mut self,
        dataset: &Dataset,
        rows: &[usize],
    ) -> anyhow::Result<(f64, (usize, usize))> {
        let (source, target) = dataset.tensors(rows, self.model.device())?;
        let forced = self.model.teacher_forced(&source, &target)?;
        let batch_loss = self.model.loss_of(&forced)?;
        self.optimizer.backward_step(&batch_loss)?;

        let counts =
            loss::token_accuracy(&forced.logits, &forced.labels, self.model.masks_padding())?;
        Ok((f64::from(batch_loss.to_scalar::<f32>()?), counts))
    }

    /// Runs the epoch loop until the epoch budget or patience runs out.
    ///
    /// The checkpoint under `output_dir/<run name>` is rewritten whenever the
    /// monitored loss reaches a new minimum, and the best weights are put
    /// back into the model at the end when `restore_best` is set.
    pub fn fit(
        &mut self,
        corpus: &PreparedCorpus,
        splits: &Splits,
    ) -> anyhow::Result<TrainingHistory> {
        let config = self.config.clone();
        let checkpoint_dir = config.output_dir.join(config.run_name());
        let mut rng = Rand64::new(u128::from(config.seed));
        let mut stopper =
            EarlyStopping::new(config.min_delta, config.patience, config.stall_counting);
        let mut history = TrainingHistory::new(config.architecture);

        info!(
            "Training on {} pairs ({} validation) for up to {} epochs",
            splits.train.len(),
            splits.validation.as_ref().map_or(0, Dataset::len),
            config.epochs
        );

        for epoch in 1..=config.epochs {
            let started = Instant::now();
            let batches =
                splits
                    .train
                    .batch_indices(config.batch_size, config.drop_remainder, Some(&mut rng));
            anyhow::ensure!(
                !batches.is_empty(),
                "{} training pairs yield no batch of {}",
                splits.train.len(),
                config.batch_size
            );

            let mut total_loss = 0.0;
            let mut accuracy = Accuracy::default();
            for (index, rows) in batches.iter().enumerate() {
                let (batch_loss, counts) = self.train_batch(&splits.train, rows)?;
                total_loss += batch_loss;
                accuracy.add(counts);

                if config.log_every > 0 && (index + 1) % config.log_every == 0 {
                    info!("Epoch {} Batch {} Loss {:.4}", epoch, index + 1, batch_loss);
                }
            }

            let validation = splits
                .validation
                .as_ref()
                .map(|dataset| teacher_forced_metrics(&self.model, dataset, config.batch_size))
                .transpose()?;

            let record = EpochRecord {
                epoch,
                train_loss: total_loss / batches.len() as f64,
                train_accuracy: accuracy.ratio(),
                validation_loss: validation.map(|(val_loss, _)| val_loss),
                validation_accuracy: validation.map(|(_, val_accuracy)| val_accuracy.ratio()),
                seconds: started.elapsed().as_secs_f64(),
            };
            match (record.validation_loss, record.validation_accuracy) {
                (Some(val_loss), Some(val_accuracy)) => info!(
                    "Epoch {}/{} Loss {:.4} Accuracy {:.4} Val {:.4}/{:.4} ({:.1}s)",
                    epoch,
                    config.epochs,
                    record.train_loss,
                    record.train_accuracy,
                    val_loss,
                    val_accuracy,
                    record.seconds
                ),
                _ => info!(
                    "Epoch {}/{} Loss {:.4} Accuracy {:.4} ({:.1}s)",
                    epoch, config.epochs, record.train_loss, record.train_accuracy, record.seconds
                ),
            }

            let monitored = record.monitored_loss();
            history.push(record);

            let verdict = stopper.record(monitored);
            if verdict.new_best {
                history.best_epoch = Some(epoch);
                let metadata = CheckpointMetadata {
                    training: config.clone(),
                    model: self.model.config().clone(),
                    source_vocab: corpus.source_vocab.clone(),
                    target_vocab: corpus.target_vocab.clone(),
                    epoch,
                    monitored_loss: monitored,
                };
                checkpoint::save(&checkpoint_dir, &self.varmap, &metadata)?;
            }
            if verdict.stalled {
                debug!("Epoch {} did not improve ({} stalled)", epoch, stopper.stalls());
            }
            if verdict.stop {
                warn!(
                    "Early stopping after epoch {} ({} non-improving epochs)",
                    epoch,
                    stopper.stalls()
                );
                history.stopped_early_at = Some(epoch);
                break;
            }
        }

        if config.restore_best {
            if let Some(best) = history.best_epoch {
                checkpoint::restore_weights(&checkpoint_dir, &mut self.varmap)?;
                info!("Restored best weights from epoch {}", best);
            }
        }

        let path = history.save(&config.output_dir, &config.run_name())?;
        info!("Training history written to {}", path.display());
        Ok(history)
    }
}
