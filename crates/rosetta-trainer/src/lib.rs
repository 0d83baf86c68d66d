//! # Rosetta Trainer
//!
//! Corpus preparation, the teacher-forced training loop with early stopping,
//! checkpointing and held-out evaluation for Rosetta translation models.

pub mod checkpoint;
pub mod config;
pub mod data;
pub mod early_stop;
pub mod evaluate;
pub mod metrics;
pub mod trainer;

pub use checkpoint::{CheckpointMetadata, LoadedModel};
pub use config::TrainingConfig;
pub use data::{Dataset, Example, PreparedCorpus, SentencePair, Splits, load_corpus};
pub use early_stop::{EarlyStopping, StallCounting};
pub use evaluate::{EvaluationReport, evaluate};
pub use metrics::{TfidfSimilarity, TrainingHistory};
pub use trainer::{TrainingSession, select_device};
