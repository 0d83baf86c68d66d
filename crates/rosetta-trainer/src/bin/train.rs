//! Trains a translation model on a tab-separated corpus, evaluates it on the
//! held-out split and translates a few sentences with the trained weights.

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use rosetta_core::{Architecture, Sampling, Translator};
use rosetta_trainer::{
    PreparedCorpus, StallCounting, TrainingConfig, TrainingSession, evaluate, load_corpus,
    select_device,
};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "train")]
#[command(about = "Train a French to English sequence-to-sequence model")]
#[command(version)]
struct Cli {
    /// Corpus file, one `english<TAB>french` pair per line
    #[arg(short, long, env = "ROSETTA_CORPUS", default_value = "data/fra.txt")]
    corpus: PathBuf,

    /// Model variant: attention (GRU) or vanilla (LSTM)
    #[arg(short, long)]
    architecture: Option<Architecture>,

    /// JSON training config; flags below override it
    #[arg(long, env = "ROSETTA_CONFIG")]
    config: Option<PathBuf>,

    /// Number of corpus lines to read
    #[arg(long)]
    sample_size: Option<usize>,

    /// Read the whole corpus
    #[arg(long, conflicts_with = "sample_size")]
    all_lines: bool,

    #[arg(long)]
    epochs: Option<usize>,

    #[arg(long)]
    batch_size: Option<usize>,

    #[arg(long)]
    embedding_dim: Option<usize>,

    #[arg(long)]
    hidden_units: Option<usize>,

    #[arg(long)]
    learning_rate: Option<f64>,

    /// Non-improving epochs tolerated before stopping
    #[arg(long)]
    patience: Option<usize>,

    /// Count stalls against the previous epoch without ever resetting
    #[arg(long)]
    cumulative_stalls: bool,

    #[arg(long)]
    seed: Option<u64>,

    /// Decode with arg-max instead of sampling
    #[arg(long)]
    greedy: bool,

    /// Output directory for checkpoints and progress files
    #[arg(short, long, env = "ROSETTA_OUTPUT_DIR")]
    output_dir: Option<PathBuf>,

    /// Use CUDA device 0 when available
    #[arg(long)]
    cuda: bool,

    /// Sentence to translate after training (repeatable)
    #[arg(short, long = "translate")]
    sentences: Vec<String>,
}

impl Cli {
    fn training_config(&self) -> anyhow::Result<TrainingConfig> {
        let mut config = match (&self.config, self.architecture) {
            (Some(path), architecture) => {
                let mut config = TrainingConfig::from_json_file(path)?;
                if let Some(architecture) = architecture {
                    config.architecture = architecture;
                }
                config
            }
            (None, architecture) => {
                TrainingConfig::for_architecture(architecture.unwrap_or_default())
            }
        };

        if self.all_lines {
            config.sample_size = None;
        } else if let Some(size) = self.sample_size {
            config.sample_size = Some(size);
        }
        if let Some(epochs) = self.epochs {
            config.epochs = epochs;
        }
        if let Some(batch_size) = self.batch_size {
            config.batch_size = batch_size;
        }
        if let Some(dim) = self.embedding_dim {
            config.embedding_dim = dim;
        }
        if let Some(units) = self.hidden_units {
            config.hidden_units = units;
        }
        if let Some(lr) = self.learning_rate {
            config.learning_rate = lr;
        }
        if let Some(patience) = self.patience {
            config.patience = patience;
        }
        if self.cumulative_stalls {
            config.stall_counting = StallCounting::Cumulative;
        }
        if let Some(seed) = self.seed {
            config.seed = seed;
        }
        if self.greedy {
            config.sampling = Sampling::Greedy;
        }
        if let Some(dir) = &self.output_dir {
            config.output_dir = dir.clone();
        }
        config.use_cuda |= self.cuda;

        config.validate()?;
        Ok(config)
    }
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = cli.training_config()?;
    info!("Starting {} training run", config.architecture);

    let device = select_device(config.use_cuda)?;
    let pairs = load_corpus(&cli.corpus, config.sample_size)?;
    let corpus = PreparedCorpus::prepare(&pairs, config.architecture)?;
    let splits = corpus.split(config.test_fraction, config.validation_fraction, config.seed);

    let mut session = TrainingSession::new(config.clone(), corpus.model_config(&config)?, &device)?;
    let history = session.fit(&corpus, &splits)?;
    if let Some(epoch) = history.stopped_early_at {
        info!("Stopped early at epoch {}", epoch);
    }

    if let Some(test) = &splits.test {
        let report = evaluate(
            session.model(),
            &corpus.source_vocab,
            &corpus.target_vocab,
            test,
            config.sampling,
            config.batch_size,
            config.sample_every,
        )?;
        let path = config
            .output_dir
            .join(format!("{}_evaluation.json", config.run_name()));
        std::fs::write(&path, serde_json::to_string_pretty(&report)?)
            .with_context(|| format!("writing {}", path.display()))?;
        println!(
            "Average cosine similarity: {:.4} over {} pairs ({} failed), accuracy {:.4}",
            report.average_cosine_similarity,
            report.scored(),
            report.failures.len(),
            report.accuracy
        );
    }

    let sentences = if cli.sentences.is_empty() {
        vec!["Je cherche de l'eau.".to_string()]
    } else {
        cli.sentences.clone()
    };
    let mut translator = Translator::new(
        session.model(),
        &corpus.source_vocab,
        &corpus.target_vocab,
        config.sampling,
    )?;
    for sentence in &sentences {
        match translator.translate(sentence) {
            Ok(translation) => {
                println!("Input: {}", translation.source);
                println!("Predicted translation: {}", translation.text);
                if let Some(trace) = &translation.attention {
                    println!("{trace}");
                }
            }
            Err(err) => warn!("Could not translate {:?}: {}", sentence, err),
        }
    }

    Ok(())
}
