//! Corpus loading, preparation, splitting and batching.
//!
//! The corpus is a tab-separated file with the English sentence in the first
//! column and its French source in the second; any further columns
//! (attribution) are ignored.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use anyhow::Context;
use candle_core::{Device, Tensor};
use oorandom::Rand64;
use rosetta_core::model::Seq2SeqConfig;
use rosetta_core::vocab::{self, SequenceEncoder, VocabularyIndex};
use rosetta_core::{Architecture, TextNormalizer};
use tracing::{debug, info};

use crate::config::TrainingConfig;

/// One raw line of the corpus.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentencePair {
    pub target: String,
    pub source: String,
}

/// Parses one corpus line; `number` is 1-based and only used in errors.
pub fn parse_line(line: &str, number: usize) -> anyhow::Result<SentencePair> {
    let mut fields = line.split('\t');
    match (fields.next(), fields.next()) {
        (Some(target), Some(source)) => Ok(SentencePair {
            target: target.to_string(),
            source: source.to_string(),
        }),
        _ => anyhow::bail!("corpus line {number} has fewer than two tab-separated fields"),
    }
}

/// Reads up to `limit` sentence pairs. Empty lines are skipped.
pub fn load_corpus<P: AsRef<Path>>(
    path: P,
    limit: Option<usize>,
) -> anyhow::Result<Vec<SentencePair>> {
    let path = path.as_ref();
    let file = File::open(path).with_context(|| format!("opening corpus {}", path.display()))?;
    let reader = BufReader::new(file);

    let mut pairs = Vec::new();
    for (index, line) in reader.lines().enumerate() {
        if limit.is_some_and(|limit| pairs.len() >= limit) {
            break;
        }
        let line = line.with_context(|| format!("reading corpus line {}", index + 1))?;
        let line = line.trim_end_matches(['\r', '\n']);
        if line.trim().is_empty() {
            continue;
        }
        pairs.push(parse_line(line, index + 1)?);
    }

    info!("Loaded {} sentence pairs from {}", pairs.len(), path.display());
    Ok(pairs)
}

/// A normalized, encoded sentence pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Example {
    pub source_text: String,
    pub target_text: String,
    pub source_ids: Vec<u32>,
    pub target_ids: Vec<u32>,
}

/// Corpus after normalization, with vocabularies frozen over every pair.
#[derive(Debug, Clone)]
pub struct PreparedCorpus {
    pub architecture: Architecture,
    pub source_vocab: VocabularyIndex,
    pub target_vocab: VocabularyIndex,
    pub source_len: usize,
    pub target_len: usize,
    pub examples: Vec<Example>,
}

impl PreparedCorpus {
    pub fn prepare(pairs: &[SentencePair], architecture: Architecture) -> anyhow::Result<Self> {
        anyhow::ensure!(!pairs.is_empty(), "corpus is empty");

        let normalizer = TextNormalizer::new()?.with_sentinels(architecture.uses_sentinels());
        let mut sources = Vec::with_capacity(pairs.len());
        let mut targets = Vec::with_capacity(pairs.len());
        for pair in pairs {
            sources.push(normalizer.normalize(&pair.source)?);
            targets.push(normalizer.normalize(&pair.target)?);
        }

        let policy = architecture.order_policy();
        let source_vocab = VocabularyIndex::build(&sources, policy);
        let target_vocab = VocabularyIndex::build(&targets, policy);
        let source_len = vocab::max_length(&sources);
        let target_len = vocab::max_length(&targets);
        anyhow::ensure!(
            source_len > 0 && target_len > 0,
            "corpus has no tokens after normalization"
        );

        let source_encoder = SequenceEncoder::new(&source_vocab, source_len);
        let target_encoder = SequenceEncoder::new(&target_vocab, target_len);
        let examples = sources
            .into_iter()
            .zip(targets)
            .map(|(source_text, target_text)| {
                Ok(Example {
                    source_ids: source_encoder.encode(&source_text)?,
                    target_ids: target_encoder.encode(&target_text)?,
                    source_text,
                    target_text,
                })
            })
            .collect::<rosetta_core::Result<Vec<_>>>()?;

        info!(
            "Prepared corpus: {} pairs, source vocab {} (len {}), target vocab {} (len {})",
            examples.len(),
            source_vocab.vocabulary_size(),
            source_len,
            target_vocab.vocabulary_size(),
            target_len
        );

        Ok(Self {
            architecture,
            source_vocab,
            target_vocab,
            source_len,
            target_len,
            examples,
        })
    }

    pub fn len(&self) -> usize {
        self.examples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.examples.is_empty()
    }

    /// Model shape for this corpus and the run's layer sizes.
    pub fn model_config(&self, config: &TrainingConfig) -> rosetta_core::Result<Seq2SeqConfig> {
        Ok(Seq2SeqConfig::from_vocabularies(
            self.architecture,
            &self.source_vocab,
            &self.target_vocab,
            self.source_len,
            self.target_len,
        )?
        .with_embedding_dim(config.embedding_dim)
        .with_hidden_units(config.hidden_units))
    }

    /// Shuffled train/test split, then the unshuffled tail of the training
    /// rows as validation.
    pub fn split(&self, test_fraction: f64, validation_fraction: f64, seed: u64) -> Splits {
        let mut order: Vec<usize> = (0..self.len()).collect();
        let test_count = if test_fraction > 0.0 {
            let mut rng = Rand64::new(u128::from(seed));
            shuffle(&mut order, &mut rng);
            ((self.len() as f64 * test_fraction).ceil() as usize).min(self.len().saturating_sub(1))
        } else {
            0
        };

        let (test_rows, train_rows) = order.split_at(test_count);
        let keep = ((train_rows.len() as f64) * (1.0 - validation_fraction)) as usize;
        let keep = keep.max(1).min(train_rows.len());
        let (train_rows, validation_rows) = train_rows.split_at(keep);

        let pick = |rows: &[usize]| -> Option<Dataset> {
            (!rows.is_empty()).then(|| Dataset {
                examples: rows.iter().map(|&i| self.examples[i].clone()).collect(),
            })
        };

        let splits = Splits {
            train: Dataset {
                examples: train_rows.iter().map(|&i| self.examples[i].clone()).collect(),
            },
            validation: pick(validation_rows),
            test: pick(test_rows),
        };
        debug!(
            "Split sizes: train {}, validation {}, test {}",
            splits.train.len(),
            splits.validation.as_ref().map_or(0, Dataset::len),
            splits.test.as_ref().map_or(0, Dataset::len)
        );
        splits
    }
}

/// Train, validation and test partitions of a prepared corpus.
#[derive(Debug, Clone)]
pub struct Splits {
    pub train: Dataset,
    pub validation: Option<Dataset>,
    pub test: Option<Dataset>,
}

#[derive(Debug, Clone, Default)]
pub struct Dataset {
    pub examples: Vec<Example>,
}

impl Dataset {
    pub fn len(&self) -> usize {
        self.examples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.examples.is_empty()
    }

    /// Row indices grouped into batches, shuffled when `rng` is given.
    pub fn batch_indices(
        &self,
        batch_size: usize,
        drop_remainder: bool,
        rng: Option<&mut Rand64>,
    ) -> Vec<Vec<usize>> {
        let mut order: Vec<usize> = (0..self.len()).collect();
        if let Some(rng) = rng {
            shuffle(&mut order, rng);
        }
        order
            .chunks(batch_size.max(1))
            .filter(|chunk| !drop_remainder || chunk.len() == batch_size)
            .map(<[usize]>::to_vec)
            .collect()
    }

    /// `[batch, source_len]` and `[batch, target_len]` id tensors for a batch.
    pub fn tensors(
        &self,
        rows: &[usize],
        device: &Device,
    ) -> rosetta_core::Result<(Tensor, Tensor)> {
        let sources: Vec<Vec<u32>> = rows
            .iter()
            .map(|&i| self.examples[i].source_ids.clone())
            .collect();
        let targets: Vec<Vec<u32>> = rows
            .iter()
            .map(|&i| self.examples[i].target_ids.clone())
            .collect();
        Ok((
            vocab::to_tensor(&sources, device)?,
            vocab::to_tensor(&targets, device)?,
        ))
    }
}

/// Fisher-Yates shuffle.
fn shuffle(items: &mut [usize], rng: &mut Rand64) {
    for i in (1..items.len()).rev() {
        let j = rng.rand_range(0..(i as u64 + 1)) as usize;
        items.swap(i, j);
    }
}
