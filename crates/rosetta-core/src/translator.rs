//! # Translator
//!
//! Normalizes and encodes a source sentence, runs the model's decoder
//! autoregressively and maps the predicted ids back to target tokens.

use std::fmt;

use crate::error::{Result, RosettaError};
use crate::model::{Sampling, Seq2Seq, StopReason, TokenSampler};
use crate::text::{END_TOKEN, TextNormalizer};
use crate::vocab::{self, VocabularyIndex};

/// Attention weights recorded while decoding one sentence.
///
/// `weights` is a fixed `[max_target_len, max_source_len]` buffer; only the
/// first `steps` rows are filled.
#[derive(Debug, Clone, PartialEq)]
pub struct AttentionTrace {
    pub weights: Vec<Vec<f32>>,
    pub steps: usize,
    pub source_tokens: Vec<String>,
    pub predicted_tokens: Vec<String>,
}

impl AttentionTrace {
    /// Rows of predicted tokens, columns of real (non-padded) source tokens.
    pub fn trimmed(&self) -> Vec<Vec<f32>> {
        let rows = self
            .steps
            .min(self.predicted_tokens.len())
            .min(self.weights.len());
        let cols = self.source_tokens.len();
        self.weights[..rows]
            .iter()
            .map(|row| row[..cols.min(row.len())].to_vec())
            .collect()
    }
}

impl fmt::Display for AttentionTrace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label_width = self
            .predicted_tokens
            .iter()
            .map(String::len)
            .max()
            .unwrap_or(0);
        let cell_width = self
            .source_tokens
            .iter()
            .map(String::len)
            .max()
            .unwrap_or(0)
            .max(4);

        write!(f, "{:label_width$}", "")?;
        for token in &self.source_tokens {
            write!(f, " {token:>cell_width$}")?;
        }
        writeln!(f)?;

        for (token, row) in self.predicted_tokens.iter().zip(self.trimmed()) {
            write!(f, "{token:label_width$}")?;
            for weight in row {
                write!(f, " {weight:>cell_width$.2}")?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

/// A translated sentence.
#[derive(Debug, Clone)]
pub struct Translation {
    /// Normalized source as fed to the encoder.
    pub source: String,
    /// Predicted tokens, ending with `<end>` when the sentinel was produced.
    pub tokens: Vec<String>,
    /// Predicted tokens without the end sentinel, space-joined.
    pub text: String,
    pub stop: StopReason,
    pub attention: Option<AttentionTrace>,
}

/// Autoregressive translator over a trained model and its frozen vocabularies.
pub struct Translator<'a> {
    model: &'a Seq2Seq,
    source_vocab: &'a VocabularyIndex,
    target_vocab: &'a VocabularyIndex,
    normalizer: TextNormalizer,
    sampler: TokenSampler,
}

impl<'a> Translator<'a> {
    pub fn new(
        model: &'a Seq2Seq,
        source_vocab: &'a VocabularyIndex,
        target_vocab: &'a VocabularyIndex,
        sampling: Sampling,
    ) -> Result<Self> {
        let normalizer =
            TextNormalizer::new()?.with_sentinels(model.config().architecture.uses_sentinels());
        Ok(Self {
            model,
            source_vocab,
            target_vocab,
            normalizer,
            sampler: TokenSampler::new(sampling),
        })
    }

    /// Translates a raw source sentence.
    ///
    /// # Errors
    ///
    /// Fails with `UnknownToken` for out-of-vocabulary words and with
    /// `SequenceLengthExceeded` when the sentence is longer than the corpus
    /// maximum the model was sized for.
    pub fn translate(&mut self, source_sentence: &str) -> Result<Translation> {
        if source_sentence.trim().is_empty() {
            return Err(RosettaError::EmptyInput);
        }
        let normalized = self.normalizer.normalize(source_sentence)?;
        self.translate_normalized(&normalized)
    }

    /// Translates a sentence that already went through the normalizer.
    pub fn translate_normalized(&mut self, normalized: &str) -> Result<Translation> {
        let config = self.model.config();
        let ids = vocab::encode(normalized, self.source_vocab, config.source_len)?;
        let source = vocab::to_tensor(&[ids], self.model.device())?;

        let generation = self.model.generate(&source, &mut self.sampler)?;

        let tokens = generation
            .ids
            .iter()
            .map(|&id| self.target_vocab.id_to_token(id).map(str::to_string))
            .collect::<Result<Vec<_>>>()?;
        let text = tokens
            .iter()
            .filter(|token| token.as_str() != END_TOKEN)
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join(" ");

        let attention = generation.attention.map(|rows| {
            let mut weights = vec![vec![0.0f32; config.source_len]; config.target_len];
            for (slot, row) in weights.iter_mut().zip(&rows) {
                for (cell, &w) in slot.iter_mut().zip(row) {
                    *cell = w;
                }
            }
            AttentionTrace {
                weights,
                steps: rows.len(),
                source_tokens: normalized.split_whitespace().map(str::to_string).collect(),
                predicted_tokens: tokens.clone(),
            }
        });

        Ok(Translation {
            source: normalized.to_string(),
            tokens,
            text,
            stop: generation.stop,
            attention,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Architecture, Seq2SeqConfig};
    use crate::vocab::OrderPolicy;
    use candle_core::{DType, Device};
    use candle_nn::{VarBuilder, VarMap};

    struct Fixture {
        source: VocabularyIndex,
        target: VocabularyIndex,
        model: Seq2Seq,
        _varmap: VarMap,
    }

    fn fixture(architecture: Architecture) -> Fixture {
        let sentinels = architecture.uses_sentinels();
        let normalizer = TextNormalizer::new().unwrap().with_sentinels(sentinels);
        let sources: Vec<String> = ["Va !", "Je cherche de l'eau."]
            .iter()
            .map(|s| normalizer.normalize(s).unwrap())
            .collect();
        let targets: Vec<String> = ["Go!", "I'm looking for water."]
            .iter()
            .map(|s| normalizer.normalize(s).unwrap())
            .collect();

        let source = VocabularyIndex::build(&sources, OrderPolicy::Sorted);
        let target = VocabularyIndex::build(&targets, OrderPolicy::Sorted);
        let config = Seq2SeqConfig::from_vocabularies(
            architecture,
            &source,
            &target,
            vocab::max_length(&sources),
            vocab::max_length(&targets),
        )
        .unwrap()
        .with_embedding_dim(4)
        .with_hidden_units(8);

        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &Device::Cpu);
        let model = Seq2Seq::new(config, vb).unwrap();
        Fixture {
            source,
            target,
            model,
            _varmap: varmap,
        }
    }

    #[test]
    fn test_translate_with_attention_trace() {
        let f = fixture(Architecture::Attention);
        let mut translator =
            Translator::new(&f.model, &f.source, &f.target, Sampling::default()).unwrap();

        let translation = translator.translate("Je cherche de l'eau.").unwrap();
        assert_eq!(translation.source, "<start> je cherche de l ' eau . <end>");
        assert!(!translation.tokens.is_empty());
        assert!(translation.tokens.len() <= f.model.config().target_len);
        assert!(!translation.text.contains(END_TOKEN));

        let trace = translation.attention.unwrap();
        assert_eq!(trace.weights.len(), f.model.config().target_len);
        assert_eq!(trace.steps, translation.tokens.len());
        let trimmed = trace.trimmed();
        assert_eq!(trimmed.len(), translation.tokens.len());
        for row in &trimmed {
            assert_eq!(row.len(), 9);
            assert!((row.iter().sum::<f32>() - 1.0).abs() < 1e-4);
        }
        assert!(trace.to_string().contains("cherche"));
    }

    #[test]
    fn test_trimmed_clamps_to_recorded_rows() {
        let trace = AttentionTrace {
            weights: vec![vec![0.25, 0.75, 0.0]],
            steps: 3,
            source_tokens: vec!["va".into(), "!".into()],
            predicted_tokens: vec!["go".into(), "!".into(), END_TOKEN.into()],
        };
        assert_eq!(trace.trimmed(), vec![vec![0.25, 0.75]]);
        assert!(trace.to_string().contains("go"));
    }

    #[test]
    fn test_translate_vanilla_is_greedy() {
        let f = fixture(Architecture::Vanilla);
        let mut translator =
            Translator::new(&f.model, &f.source, &f.target, Sampling::default()).unwrap();

        let first = translator.translate("Va !").unwrap();
        let second = translator.translate("Va !").unwrap();
        assert_eq!(first.tokens, second.tokens);
        assert!(first.attention.is_none());
        assert_ne!(first.stop, StopReason::EndSentinel);
    }

    #[test]
    fn test_translate_errors() {
        let f = fixture(Architecture::Attention);
        let mut translator =
            Translator::new(&f.model, &f.source, &f.target, Sampling::Greedy).unwrap();

        assert!(matches!(translator.translate("   "), Err(RosettaError::EmptyInput)));
        assert!(matches!(
            translator.translate("Je cherche le chat."),
            Err(RosettaError::UnknownToken { .. })
        ));
        assert!(matches!(
            translator.translate("Je cherche de l'eau de l'eau."),
            Err(RosettaError::SequenceLengthExceeded { .. })
        ));
    }
}
