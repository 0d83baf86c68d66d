//! Held-out evaluation: TF-IDF similarity of translations and teacher-forced
//! token accuracy.

use rosetta_core::text::strip_sentinels;
use rosetta_core::vocab::VocabularyIndex;
use rosetta_core::{Sampling, Seq2Seq, Translator};
use serde::Serialize;
use tracing::{info, warn};

use crate::data::Dataset;
use crate::metrics::TfidfSimilarity;
use crate::trainer::teacher_forced_metrics;

/// An example that could not be scored.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EvaluationFailure {
    pub index: usize,
    pub source: String,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SampleTranslation {
    pub source: String,
    pub target: String,
    pub result: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EvaluationReport {
    pub examples: usize,
    /// Mean over the examples that were scored.
    pub average_cosine_similarity: f64,
    pub accuracy: f64,
    pub failures: Vec<EvaluationFailure>,
    pub samples: Vec<SampleTranslation>,
}

impl EvaluationReport {
    pub fn scored(&self) -> usize {
        self.examples - self.failures.len()
    }
}

/// Translates every example of `dataset` and compares it to its reference.
///
/// A translation or scoring failure is recorded against its example and
/// does not abort the evaluation. Every `sample_every`-th pair is logged and
/// kept as a sample.
pub fn evaluate(
    model: &Seq2Seq,
    source_vocab: &VocabularyIndex,
    target_vocab: &VocabularyIndex,
    dataset: &Dataset,
    sampling: Sampling,
    batch_size: usize,
    sample_every: usize,
) -> anyhow::Result<EvaluationReport> {
    let similarity = TfidfSimilarity::new()?;
    let mut translator = Translator::new(model, source_vocab, target_vocab, sampling)?;

    let mut failures = Vec::new();
    let mut samples = Vec::new();
    let mut total_similarity = 0.0;
    let mut scored = 0usize;

    for (index, example) in dataset.examples.iter().enumerate() {
        let source = strip_sentinels(&example.source_text);
        let reference = strip_sentinels(&example.target_text);

        let result = translator
            .translate_normalized(&example.source_text)
            .map_err(anyhow::Error::from)
            .and_then(|translation| {
                let score = similarity.cosine(&translation.text, reference)?;
                Ok((translation.text, score))
            });

        match result {
            Ok((text, score)) => {
                total_similarity += score;
                scored += 1;
                if sample_every > 0 && index % sample_every == 0 {
                    info!("source: {}\ntarget: {}\nresult: {}", source, reference, text);
                    samples.push(SampleTranslation {
                        source: source.to_string(),
                        target: reference.to_string(),
                        result: text,
                    });
                }
            }
            Err(err) => {
                warn!("Example {} failed: {}", index, err);
                failures.push(EvaluationFailure {
                    index,
                    source: source.to_string(),
                    reason: err.to_string(),
                });
            }
        }
    }

    let (_, accuracy) = teacher_forced_metrics(model, dataset, batch_size)?;
    let report = EvaluationReport {
        examples: dataset.len(),
        average_cosine_similarity: if scored == 0 {
            0.0
        } else {
            total_similarity / scored as f64
        },
        accuracy: accuracy.ratio(),
        failures,
        samples,
    };

    info!(
        "Evaluated {} pairs: cosine similarity {:.4}, accuracy {:.4}, {} failures",
        report.examples,
        report.average_cosine_similarity,
        report.accuracy,
        report.failures.len()
    );
    Ok(report)
}
