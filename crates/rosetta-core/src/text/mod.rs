pub mod normalizer;

pub use normalizer::{END_TOKEN, START_TOKEN, TextNormalizer, strip_sentinels};
