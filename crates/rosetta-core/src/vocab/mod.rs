pub mod index;
pub mod sequence;

pub use index::{OrderPolicy, PAD_ID, PAD_TOKEN, VocabularyIndex};
pub use sequence::{SequenceEncoder, decode, encode, max_length, to_tensor};
