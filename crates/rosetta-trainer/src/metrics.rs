//! Training history and sentence similarity metrics.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::Context;
use regex::Regex;
use rosetta_core::Architecture;
use serde::{Deserialize, Serialize};

/// Running token accuracy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Accuracy {
    pub correct: usize,
    pub total: usize,
}

impl Accuracy {
    pub fn add(&mut self, (correct, total): (usize, usize)) {
        self.correct += correct;
        self.total += total;
    }

    pub fn ratio(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.correct as f64 / self.total as f64
        }
    }
}

/// Per-epoch record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpochRecord {
    pub epoch: usize,
    pub train_loss: f64,
    pub train_accuracy: f64,
    pub validation_loss: Option<f64>,
    pub validation_accuracy: Option<f64>,
    pub seconds: f64,
}

impl EpochRecord {
    /// Loss used for checkpointing and early stopping.
    pub fn monitored_loss(&self) -> f64 {
        self.validation_loss.unwrap_or(self.train_loss)
    }
}

/// Training curve written next to the checkpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingHistory {
    pub architecture: Architecture,
    pub epochs: Vec<EpochRecord>,
    pub best_epoch: Option<usize>,
    pub stopped_early_at: Option<usize>,
}

impl TrainingHistory {
    pub fn new(architecture: Architecture) -> Self {
        Self {
            architecture,
            epochs: Vec::new(),
            best_epoch: None,
            stopped_early_at: None,
        }
    }

    pub fn push(&mut self, record: EpochRecord) {
        self.epochs.push(record);
    }

    pub fn last(&self) -> Option<&EpochRecord> {
        self.epochs.last()
    }

    /// Writes `<name>_progress.json` into `dir` and returns its path.
    pub fn save<P: AsRef<Path>>(&self, dir: P, name: &str) -> anyhow::Result<PathBuf> {
        let dir = dir.as_ref();
        std::fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
        let path = dir.join(format!("{name}_progress.json"));
        std::fs::write(&path, serde_json::to_string_pretty(self)?)
            .with_context(|| format!("writing {}", path.display()))?;
        Ok(path)
    }

    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let raw =
            std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
        Ok(serde_json::from_str(&raw)?)
    }
}

/// Cosine similarity of two sentences under a TF-IDF model fitted on just
/// those two sentences.
pub struct TfidfSimilarity {
    token: Regex,
}

impl TfidfSimilarity {
    pub fn new() -> anyhow::Result<Self> {
        Ok(Self {
            token: Regex::new(r"\b\w\w+\b")?,
        })
    }

    fn counts(&self, text: &str) -> BTreeMap<String, f64> {
        let lower = text.to_lowercase();
        let mut counts = BTreeMap::new();
        for m in self.token.find_iter(&lower) {
            *counts.entry(m.as_str().to_string()).or_insert(0.0) += 1.0;
        }
        counts
    }

    /// Similarity in `[0, 1]`.
    ///
    /// # Errors
    ///
    /// Fails when neither sentence has a token of two or more word
    /// characters.
    pub fn cosine(&self, prediction: &str, reference: &str) -> anyhow::Result<f64> {
        let docs = [self.counts(prediction), self.counts(reference)];
        let mut vocabulary: Vec<&String> = docs.iter().flat_map(BTreeMap::keys).collect();
        vocabulary.sort();
        vocabulary.dedup();
        anyhow::ensure!(
            !vocabulary.is_empty(),
            "empty vocabulary; both sentences lack word tokens"
        );

        let n = docs.len() as f64;
        let vectors: Vec<Vec<f64>> = docs
            .iter()
            .map(|doc| {
                let raw: Vec<f64> = vocabulary
                    .iter()
                    .map(|term| {
                        let df = docs.iter().filter(|d| d.contains_key(*term)).count() as f64;
                        let idf = ((1.0 + n) / (1.0 + df)).ln() + 1.0;
                        doc.get(*term).copied().unwrap_or(0.0) * idf
                    })
                    .collect();
                let norm = raw.iter().map(|x| x * x).sum::<f64>().sqrt();
                if norm == 0.0 {
                    raw
                } else {
                    raw.into_iter().map(|x| x / norm).collect()
                }
            })
            .collect();

        Ok(vectors[0].iter().zip(&vectors[1]).map(|(a, b)| a * b).sum())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identical_sentences() {
        let tfidf = TfidfSimilarity::new().unwrap();
        let score = tfidf.cosine("i am looking for water .", "I am looking for water.").unwrap();
        assert!((score - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_disjoint_and_partial() {
        let tfidf = TfidfSimilarity::new().unwrap();
        assert_eq!(tfidf.cosine("hello there", "goodbye now").unwrap(), 0.0);

        let partial = tfidf.cosine("we want water", "we need water").unwrap();
        assert!(partial > 0.0 && partial < 1.0);
        // shared terms have idf 1, unique terms ln(1.5) + 1
        let unique = (1.5f64).ln() + 1.0;
        let expected = 2.0 / (2.0 + unique * unique);
        assert!((partial - expected).abs() < 1e-9);
    }

    #[test]
    fn test_single_letter_tokens_are_ignored() {
        let tfidf = TfidfSimilarity::new().unwrap();
        assert!(tfidf.cosine("i ' m .", "a !").is_err());
        assert_eq!(tfidf.cosine("i ' m .", "go now").unwrap(), 0.0);
    }

    #[test]
    fn test_history_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let mut history = TrainingHistory::new(Architecture::Vanilla);
        history.push(EpochRecord {
            epoch: 1,
            train_loss: 2.5,
            train_accuracy: 0.4,
            validation_loss: Some(2.7),
            validation_accuracy: Some(0.35),
            seconds: 1.5,
        });
        history.best_epoch = Some(1);

        let path = history.save(dir.path(), "fr_en_vanilla").unwrap();
        assert!(path.ends_with("fr_en_vanilla_progress.json"));
        assert_eq!(TrainingHistory::load(&path).unwrap(), history);
        assert_eq!(history.last().unwrap().monitored_loss(), 2.7);
    }

    #[test]
    fn test_history_reloads_full_precision_losses() {
        let dir = tempfile::tempdir().unwrap();
        let mut history = TrainingHistory::new(Architecture::Attention);
        for (epoch, loss) in [(1, 2.6172035932540894), (2, 1.7309877276420593)] {
            history.push(EpochRecord {
                epoch,
                train_loss: loss,
                train_accuracy: 0.1,
                validation_loss: None,
                validation_accuracy: None,
                seconds: 0.25,
            });
        }

        let path = history.save(dir.path(), "fr_en_attention").unwrap();
        let loaded = TrainingHistory::load(&path).unwrap();
        for (saved, back) in history.epochs.iter().zip(&loaded.epochs) {
            assert_eq!(saved.train_loss.to_bits(), back.train_loss.to_bits());
        }
        assert_eq!(loaded, history);
    }

    #[test]
    fn test_accuracy_ratio() {
        let mut accuracy = Accuracy::default();
        assert_eq!(accuracy.ratio(), 0.0);
        accuracy.add((3, 4));
        accuracy.add((1, 4));
        assert_eq!(accuracy.ratio(), 0.5);
    }
}
