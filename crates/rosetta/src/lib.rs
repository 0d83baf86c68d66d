//! # Rosetta
//!
//! French to English neural machine translation with recurrent
//! encoder-decoder models. This crate re-exports the model library
//! ([`rosetta_core`]) and the training toolkit ([`rosetta_trainer`]).
//!
//! ```no_run
//! use rosetta::trainer::{PreparedCorpus, TrainingConfig, TrainingSession, load_corpus};
//! use rosetta::{Architecture, Translator};
//!
//! # fn main() -> anyhow::Result<()> {
//! let config = TrainingConfig::attention().with_epochs(2);
//! let pairs = load_corpus("data/fra.txt", config.sample_size)?;
//! let corpus = PreparedCorpus::prepare(&pairs, Architecture::Attention)?;
//! let splits = corpus.split(config.test_fraction, config.validation_fraction, config.seed);
//!
//! let device = candle_core::Device::Cpu;
//! let mut session = TrainingSession::new(config.clone(), corpus.model_config(&config)?, &device)?;
//! session.fit(&corpus, &splits)?;
//!
//! let mut translator = Translator::new(
//!     session.model(),
//!     &corpus.source_vocab,
//!     &corpus.target_vocab,
//!     config.sampling,
//! )?;
//! println!("{}", translator.translate("Je cherche de l'eau.")?.text);
//! # Ok(())
//! # }
//! ```

pub use rosetta_core::*;

/// Corpus preparation, training and evaluation.
pub mod trainer {
    pub use rosetta_trainer::*;
}
