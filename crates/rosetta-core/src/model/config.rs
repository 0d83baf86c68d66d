use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Result, RosettaError};
use crate::model::state::CellKind;
use crate::text::{END_TOKEN, START_TOKEN};
use crate::vocab::{OrderPolicy, VocabularyIndex};

/// Which encoder-decoder architecture to build.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Architecture {
    /// GRU encoder, additive attention, per-step GRU decoder.
    #[default]
    Attention,
    /// LSTM encoder, repeat-vector bridge, whole-sequence LSTM decoder.
    Vanilla,
}

impl Architecture {
    /// Recurrent cell used by both encoder and decoder.
    pub fn cell(self) -> CellKind {
        match self {
            Self::Attention => CellKind::Gru,
            Self::Vanilla => CellKind::Lstm,
        }
    }

    /// Whether sentences are wrapped in `<start>` / `<end>`.
    pub fn uses_sentinels(self) -> bool {
        matches!(self, Self::Attention)
    }

    /// Whether the encoder carries its state over padded positions.
    pub fn masks_source_padding(self) -> bool {
        matches!(self, Self::Vanilla)
    }

    /// Id ordering of the vocabularies built for this architecture.
    pub fn order_policy(self) -> OrderPolicy {
        match self {
            Self::Attention => OrderPolicy::Sorted,
            Self::Vanilla => OrderPolicy::Frequency,
        }
    }
}

impl fmt::Display for Architecture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Attention => write!(f, "attention"),
            Self::Vanilla => write!(f, "vanilla"),
        }
    }
}

impl FromStr for Architecture {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "attention" | "gru" => Ok(Self::Attention),
            "vanilla" | "lstm" => Ok(Self::Vanilla),
            other => Err(format!("unknown architecture {other:?}")),
        }
    }
}

/// Target-vocabulary ids of the start and end sentinels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sentinels {
    pub start: u32,
    pub end: u32,
}

impl Sentinels {
    /// Resolves both sentinels in a vocabulary.
    ///
    /// # Errors
    ///
    /// Returns `RosettaError::MissingSentinel` if either token is absent.
    pub fn from_vocabulary(vocabulary: &VocabularyIndex) -> Result<Self> {
        let start = vocabulary
            .token_to_id(START_TOKEN)
            .map_err(|_| RosettaError::MissingSentinel(START_TOKEN))?;
        let end = vocabulary
            .token_to_id(END_TOKEN)
            .map_err(|_| RosettaError::MissingSentinel(END_TOKEN))?;
        Ok(Self { start, end })
    }
}

/// Dimensions of a sequence-to-sequence model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Seq2SeqConfig {
    pub architecture: Architecture,
    pub source_vocab_size: usize,
    pub target_vocab_size: usize,
    pub embedding_dim: usize,
    pub hidden_units: usize,
    /// Padded width of source rows.
    pub source_len: usize,
    /// Padded width of target rows, also the decoding length bound.
    pub target_len: usize,
    /// Required by the attention variant.
    pub sentinels: Option<Sentinels>,
}

impl Seq2SeqConfig {
    /// Derives a config from the frozen vocabularies of a corpus.
    pub fn from_vocabularies(
        architecture: Architecture,
        source: &VocabularyIndex,
        target: &VocabularyIndex,
        source_len: usize,
        target_len: usize,
    ) -> Result<Self> {
        let sentinels = if architecture.uses_sentinels() {
            Some(Sentinels::from_vocabulary(target)?)
        } else {
            None
        };

        Ok(Self {
            architecture,
            source_vocab_size: source.vocabulary_size(),
            target_vocab_size: target.vocabulary_size(),
            embedding_dim: 256,
            hidden_units: if architecture == Architecture::Attention {
                1024
            } else {
                256
            },
            source_len,
            target_len,
            sentinels,
        })
    }

    pub fn with_embedding_dim(mut self, dim: usize) -> Self {
        self.embedding_dim = dim;
        self
    }

    pub fn with_hidden_units(mut self, units: usize) -> Self {
        self.hidden_units = units;
        self
    }
}
