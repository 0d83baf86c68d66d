use thiserror::Error;

/// Errors that can occur during Rosetta core operations.
#[derive(Debug, Error)]
pub enum RosettaError {
    /// The input string is empty or contains only whitespace.
    #[error("input is empty or whitespace-only")]
    EmptyInput,

    /// A token is absent from the frozen vocabulary.
    #[error("unknown token: {token:?}")]
    UnknownToken {
        /// The token that could not be mapped.
        token: String,
    },

    /// An id lies outside the vocabulary range.
    #[error("unknown token id {id} (vocabulary size {size})")]
    UnknownId {
        /// The offending id.
        id: u32,
        /// Vocabulary size including the padding entry.
        size: usize,
    },

    /// A sentence has more tokens than the corpus-derived maximum length.
    #[error("sequence of {length} tokens exceeds the maximum length of {max}")]
    SequenceLengthExceeded {
        /// Token count of the rejected sentence.
        length: usize,
        /// Maximum length the tensors were sized for.
        max: usize,
    },

    /// A tensor reached a component boundary with an unexpected shape.
    #[error("shape mismatch in {context}: expected {expected}, got {actual:?}")]
    ShapeMismatch {
        /// Component and argument that was checked.
        context: &'static str,
        /// Human-readable expected shape.
        expected: String,
        /// Actual dimensions.
        actual: Vec<usize>,
    },

    /// A sentinel token required by the attention variant is missing.
    #[error("sentinel token {0:?} is not part of the target vocabulary")]
    MissingSentinel(&'static str),

    /// A serialized vocabulary violates the index invariants.
    #[error("invalid vocabulary: {0}")]
    InvalidVocabulary(String),

    /// The Unicode normalizer pipeline failed.
    #[error("normalization error: {0}")]
    Normalization(String),

    /// A regex pattern failed to compile (should not happen with static patterns).
    #[error("regex compilation error: {0}")]
    Regex(#[from] regex::Error),

    /// Candle tensor framework error.
    #[error("tensor error: {0}")]
    Tensor(#[from] candle_core::Error),
}

/// Result type alias for Rosetta operations.
pub type Result<T> = std::result::Result<T, RosettaError>;
