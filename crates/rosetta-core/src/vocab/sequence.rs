//! # Sequence Encoder
//!
//! Turns normalized sentences into fixed-width id rows, right-padded with
//! [`PAD_ID`], and back.

use candle_core::{Device, Tensor};

use crate::error::{Result, RosettaError};
use crate::vocab::index::{PAD_ID, VocabularyIndex};

/// Maximum whitespace token count over a sentence set (0 for an empty set).
pub fn max_length<I, S>(sentences: I) -> usize
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    sentences
        .into_iter()
        .map(|s| s.as_ref().split_whitespace().count())
        .max()
        .unwrap_or(0)
}

/// Encodes a sentence into `max_length` ids, right-padded with 0.
///
/// # Errors
///
/// Returns `RosettaError::SequenceLengthExceeded` if the sentence has more
/// than `max_length` tokens and `RosettaError::UnknownToken` if a token is
/// outside the vocabulary.
pub fn encode(sentence: &str, vocabulary: &VocabularyIndex, max_length: usize) -> Result<Vec<u32>> {
    let tokens: Vec<&str> = sentence.split_whitespace().collect();
    if tokens.len() > max_length {
        return Err(RosettaError::SequenceLengthExceeded {
            length: tokens.len(),
            max: max_length,
        });
    }

    let mut ids = Vec::with_capacity(max_length);
    for token in tokens {
        ids.push(vocabulary.token_to_id(token)?);
    }
    ids.resize(max_length, PAD_ID);
    Ok(ids)
}

/// Decodes ids back into tokens, skipping padding.
pub fn decode(ids: &[u32], vocabulary: &VocabularyIndex) -> Result<Vec<String>> {
    ids.iter()
        .filter(|&&id| id != PAD_ID)
        .map(|&id| vocabulary.id_to_token(id).map(str::to_string))
        .collect()
}

/// Stacks equally sized rows into a `[batch, time]` u32 tensor.
///
/// # Errors
///
/// Returns `RosettaError::ShapeMismatch` if the rows differ in width.
pub fn to_tensor(rows: &[Vec<u32>], device: &Device) -> Result<Tensor> {
    let width = rows.first().map(Vec::len).unwrap_or(0);
    if let Some(bad) = rows.iter().find(|row| row.len() != width) {
        return Err(RosettaError::ShapeMismatch {
            context: "sequence batch",
            expected: format!("rows of width {width}"),
            actual: vec![bad.len()],
        });
    }

    let flat: Vec<u32> = rows.iter().flatten().copied().collect();
    Ok(Tensor::from_vec(flat, (rows.len(), width), device)?)
}

/// Sequence encoder bound to one vocabulary and a corpus-derived width.
#[derive(Debug, Clone, Copy)]
pub struct SequenceEncoder<'a> {
    vocabulary: &'a VocabularyIndex,
    max_length: usize,
}

impl<'a> SequenceEncoder<'a> {
    pub fn new(vocabulary: &'a VocabularyIndex, max_length: usize) -> Self {
        Self {
            vocabulary,
            max_length,
        }
    }

    pub fn max_length(&self) -> usize {
        self.max_length
    }

    pub fn vocabulary(&self) -> &'a VocabularyIndex {
        self.vocabulary
    }

    pub fn encode(&self, sentence: &str) -> Result<Vec<u32>> {
        encode(sentence, self.vocabulary, self.max_length)
    }

    pub fn encode_all<I, S>(&self, sentences: I) -> Result<Vec<Vec<u32>>>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        sentences
            .into_iter()
            .map(|s| self.encode(s.as_ref()))
            .collect()
    }

    pub fn decode(&self, ids: &[u32]) -> Result<Vec<String>> {
        decode(ids, self.vocabulary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::text::TextNormalizer;
    use crate::vocab::OrderPolicy;
    use proptest::prelude::*;

    #[test]
    fn test_max_length() {
        assert_eq!(max_length(["a b", "a b c", ""]), 3);
        assert_eq!(max_length(Vec::<&str>::new()), 0);
    }

    #[test]
    fn test_encode_pads_right() {
        let vocab = VocabularyIndex::build(["go .", "run now ."], OrderPolicy::Sorted);
        let encoder = SequenceEncoder::new(&vocab, 3);
        let ids = encoder.encode("go .").unwrap();
        assert_eq!(ids.len(), 3);
        assert_eq!(ids[2], PAD_ID);
        assert_eq!(encoder.decode(&ids).unwrap(), vec!["go", "."]);
    }

    #[test]
    fn test_encode_rejects_long_sentence() {
        let vocab = VocabularyIndex::build(["go now ."], OrderPolicy::Sorted);
        assert!(matches!(
            encode("go now .", &vocab, 2),
            Err(RosettaError::SequenceLengthExceeded { length: 3, max: 2 })
        ));
    }

    #[test]
    fn test_encode_rejects_unknown_token() {
        let vocab = VocabularyIndex::build(["go ."], OrderPolicy::Sorted);
        assert!(matches!(
            encode("stop .", &vocab, 4),
            Err(RosettaError::UnknownToken { .. })
        ));
    }

    #[test]
    fn test_to_tensor_shape() {
        let tensor = to_tensor(&[vec![1, 2, 0], vec![3, 0, 0]], &Device::Cpu).unwrap();
        assert_eq!(tensor.dims(), &[2, 3]);
        assert!(to_tensor(&[vec![1, 2], vec![3]], &Device::Cpu).is_err());
    }

    proptest! {
        #[test]
        fn roundtrip_recovers_normalized_tokens(raw in "[A-Za-zéèàçô0-9 ,.!?'-]{0,40}") {
            let normalizer = TextNormalizer::new().unwrap();
            let normalized = normalizer.normalize(&raw).unwrap();
            let vocab = VocabularyIndex::build([normalized.as_str()], OrderPolicy::FirstSeen);
            let width = max_length([normalized.as_str()]);

            let ids = encode(&normalized, &vocab, width).unwrap();
            let tokens = decode(&ids, &vocab).unwrap();

            let expected: Vec<String> = normalized.split_whitespace().map(str::to_string).collect();
            prop_assert_eq!(tokens, expected);
        }
    }
}
