//! Translates sentences with a saved checkpoint.

use std::path::PathBuf;

use clap::Parser;
use rosetta_core::{Sampling, Translator};
use rosetta_trainer::checkpoint;
use rosetta_trainer::select_device;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "translate")]
#[command(about = "Translate French sentences with a trained checkpoint")]
#[command(version)]
struct Cli {
    /// Checkpoint directory (holds model.safetensors and checkpoint.json)
    #[arg(short, long, env = "ROSETTA_CHECKPOINT", default_value = "models/fr_en_attention")]
    checkpoint: PathBuf,

    /// Decode with arg-max instead of sampling
    #[arg(long)]
    greedy: bool,

    /// Sampling seed
    #[arg(long, conflicts_with = "greedy")]
    seed: Option<u64>,

    /// Sampling temperature
    #[arg(long, conflicts_with = "greedy")]
    temperature: Option<f64>,

    /// Print the attention table of each translation
    #[arg(long)]
    attention: bool,

    #[arg(long)]
    cuda: bool,

    /// French sentences
    #[arg(required = true)]
    sentences: Vec<String>,
}

fn sampling(cli: &Cli, saved: Sampling) -> Sampling {
    if cli.greedy {
        return Sampling::Greedy;
    }
    if cli.seed.is_none() && cli.temperature.is_none() {
        return saved;
    }
    let base = match saved {
        Sampling::Greedy => Sampling::default(),
        multinomial => multinomial,
    };
    match base {
        Sampling::Multinomial { seed, temperature } => Sampling::Multinomial {
            seed: cli.seed.unwrap_or(seed),
            temperature: cli.temperature.unwrap_or(temperature),
        },
        Sampling::Greedy => Sampling::Greedy,
    }
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();
    let device = select_device(cli.cuda)?;
    let loaded = checkpoint::load_model(&cli.checkpoint, &device)?;
    let metadata = &loaded.metadata;

    let mut translator = Translator::new(
        &loaded.model,
        &metadata.source_vocab,
        &metadata.target_vocab,
        sampling(&cli, metadata.training.sampling),
    )?;

    let mut failed = 0usize;
    for sentence in &cli.sentences {
        match translator.translate(sentence) {
            Ok(translation) => {
                println!("{}", translation.text);
                if cli.attention {
                    if let Some(trace) = &translation.attention {
                        println!("{trace}");
                    }
                }
            }
            Err(err) => {
                eprintln!("{sentence}: {err}");
                failed += 1;
            }
        }
    }

    if failed > 0 {
        anyhow::bail!("{failed} of {} sentences could not be translated", cli.sentences.len());
    }
    Ok(())
}
