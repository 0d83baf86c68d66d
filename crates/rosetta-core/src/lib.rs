//! # Rosetta Core
//!
//! French to English neural machine translation with recurrent
//! encoder-decoder models. Provides text normalization, vocabulary
//! indexing, two model variants (GRU with additive attention and an LSTM
//! repeat-vector baseline) and an autoregressive translator.
//!
//! ## Quick Start
//!
//! ```rust
//! use rosetta_core::text::TextNormalizer;
//!
//! let normalizer = TextNormalizer::new().unwrap().with_sentinels(true);
//! let sentence = normalizer.normalize("Je cherche de l'eau.").unwrap();
//!
//! assert_eq!(sentence, "<start> je cherche de l ' eau . <end>");
//! ```
pub mod error;
pub mod model;
pub mod text;
pub mod translator;
pub mod vocab;

// Re-export primary API
pub use error::{Result, RosettaError};
pub use model::{Architecture, Sampling, Seq2Seq, Seq2SeqConfig, StopReason};
pub use text::{END_TOKEN, START_TOKEN, TextNormalizer};
pub use translator::{AttentionTrace, Translation, Translator};
pub use vocab::{OrderPolicy, PAD_ID, PAD_TOKEN, SequenceEncoder, VocabularyIndex};
