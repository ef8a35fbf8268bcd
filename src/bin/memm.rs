use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::{Args, Parser, Subcommand};
use env_logger::Env;
use log::info;
use memm::train::{Control, Sampling, Trainer, TrainerParams};
use memm::{store, CatalogConfig, Corpus, Decoder, FeatureCatalog, TagSet, DEFAULT_BEAM_SIZE};
use rand::rngs::StdRng;
use rand::SeedableRng;

#[derive(Debug, Parser)]
#[command(version, about)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Build a feature table from a tagged corpus and train its weights
    Train(TrainArgs),
    /// Tag whitespace-separated sentences, one per line
    Tag(TagArgs),
}

#[derive(Debug, Args)]
struct TrainArgs {
    /// Training corpus, one sentence of `word_tag` tokens per line
    #[arg(short, long)]
    corpus: PathBuf,
    /// Feature table; written on a fresh run, read back when resuming
    #[arg(short, long)]
    features: PathBuf,
    /// Weights file, rewritten after every iteration. When it already exists
    /// training resumes from it against the existing feature table
    #[arg(short, long)]
    weights: PathBuf,
    /// Number of words and tags in a history
    #[arg(short = 'L', long, default_value_t = 2)]
    window: usize,
    /// Outer iterations
    #[arg(short = 'n', long, default_value_t = 30)]
    iterations: usize,
    /// Initial batch size, in sentences
    #[arg(short, long, default_value_t = 200)]
    batch: usize,
    /// L2 regularization coefficient
    #[arg(short, long, default_value_t = 0.5)]
    regularization: f64,
    /// Seed for initialization and sampling
    #[arg(short, long)]
    seed: Option<u64>,
    /// Use every sentence in every iteration
    #[arg(long)]
    full: bool,
}

#[derive(Debug, Args)]
struct TagArgs {
    /// Feature table written by `train`
    #[arg(short, long)]
    features: PathBuf,
    /// Weights written by `train`
    #[arg(short, long)]
    weights: PathBuf,
    /// Number of states kept per position
    #[arg(short, long, default_value_t = DEFAULT_BEAM_SIZE)]
    beam: usize,
    /// Input file; standard input when omitted
    input: Option<PathBuf>,
}

/// Build and save a fresh feature table, or load the one matching the
/// weights being resumed
fn prepare_catalog(args: &TrainArgs, corpus: &Corpus) -> anyhow::Result<(FeatureCatalog, TagSet)> {
    if !args.weights.exists() {
        let histories = corpus.histories(args.window)?;
        let catalog = FeatureCatalog::build(&histories, CatalogConfig::new(args.window))?;
        let tags = corpus.tag_set()?;
        store::write_catalog(&args.features, &catalog, &tags)?;
        return Ok((catalog, tags));
    }

    if !args.features.exists() {
        bail!(
            "cannot resume from {}: feature table {} does not exist",
            args.weights.display(),
            args.features.display()
        );
    }
    let (catalog, tags) = store::read_catalog(&args.features)
        .with_context(|| format!("failed to load {}", args.features.display()))?;
    if catalog.window() != args.window {
        bail!(
            "{} was built with window {}, not {}",
            args.features.display(),
            catalog.window(),
            args.window
        );
    }
    if let Some(tag) = corpus.tag_set()?.tags().iter().find(|t| !tags.contains(t)) {
        bail!("tag {:?} is not in {}", tag, args.features.display());
    }
    info!("resuming with the feature table in {}", args.features.display());
    Ok((catalog, tags))
}

fn train(args: TrainArgs) -> anyhow::Result<()> {
    let corpus = Corpus::open(&args.corpus)
        .with_context(|| format!("failed to read {}", args.corpus.display()))?;
    info!("{} sentences in {}", corpus.len(), args.corpus.display());

    let (catalog, tags) = prepare_catalog(&args, &corpus)?;

    let mut params = TrainerParams::default();
    params.set_max_iterations(args.iterations)?;
    params.set_batch_size(args.batch)?;
    params.set_regularization(args.regularization)?;
    params.set_seed(args.seed);
    if args.full {
        params.set_sampling(Sampling::Full);
    }

    let mut rng = match args.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };
    let weights =
        store::load_or_init_weights(&args.weights, catalog.len(), params.init_std_dev(), &mut rng)?;
    let mut trainer = Trainer::with_weights(&catalog, tags, params, weights)?;
    let weights_path = args.weights.clone();
    trainer.train_with(&corpus, |_, weights| {
        store::write_weights(&weights_path, weights)?;
        Ok(Control::Continue)
    })?;
    info!("write weights to {}", args.weights.display());
    Ok(())
}

fn tag(args: TagArgs) -> anyhow::Result<()> {
    let (catalog, tags) = store::read_catalog(&args.features)
        .with_context(|| format!("failed to load {}", args.features.display()))?;
    let weights = store::read_weights(&args.weights)
        .with_context(|| format!("failed to load {}", args.weights.display()))?;
    let decoder = Decoder::new(&catalog, Arc::from(weights), tags)?.with_beam_size(args.beam)?;

    let reader: Box<dyn BufRead> = match &args.input {
        Some(path) => Box::new(BufReader::new(
            File::open(path).with_context(|| format!("failed to open {}", path.display()))?,
        )),
        None => Box::new(BufReader::new(io::stdin())),
    };
    let stdout = io::stdout();
    let mut out = BufWriter::new(stdout.lock());
    for line in reader.lines() {
        let line = line?;
        let words: Vec<&str> = line.split_whitespace().collect();
        let tags = decoder.decode(&words)?;
        let tokens: Vec<String> = words
            .iter()
            .zip(&tags)
            .map(|(word, tag)| format!("{}_{}", word, tag))
            .collect();
        writeln!(out, "{}", tokens.join(" "))?;
    }
    out.flush()?;
    Ok(())
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    match cli.command {
        Command::Train(args) => train(args),
        Command::Tag(args) => tag(args),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(dir: &std::path::Path, window: usize) -> TrainArgs {
        TrainArgs {
            corpus: dir.join("corpus"),
            features: dir.join("features"),
            weights: dir.join("weights"),
            window,
            iterations: 1,
            batch: 10,
            regularization: 0.5,
            seed: Some(0),
            full: true,
        }
    }

    #[test]
    fn test_resume_keeps_the_stored_feature_table() {
        let dir = tempfile::tempdir().unwrap();
        let first = Corpus::parse(b"A_N b_V
").unwrap();
        let (catalog, tags) = prepare_catalog(&args(dir.path(), 2), &first).unwrap();
        store::write_weights(dir.path().join("weights"), &vec![0.0; catalog.len()]).unwrap();

        // Same tags, different words
        let second = Corpus::parse(b"C_N d_V e_V
").unwrap();
        let (resumed, resumed_tags) = prepare_catalog(&args(dir.path(), 2), &second).unwrap();
        assert_eq!(resumed.len(), catalog.len());
        assert_eq!(resumed_tags, tags);
        for (key, id) in catalog.iter() {
            assert_eq!(resumed.index_of(key), Some(id));
        }

        assert!(prepare_catalog(&args(dir.path(), 3), &second).is_err());
        let new_tag = Corpus::parse(b"A_N b_X
").unwrap();
        assert!(prepare_catalog(&args(dir.path(), 2), &new_tag).is_err());
    }

    #[test]
    fn test_resume_requires_the_feature_table() {
        let dir = tempfile::tempdir().unwrap();
        store::write_weights(dir.path().join("weights"), &[0.0]).unwrap();
        let corpus = Corpus::parse(b"A_N b_V
").unwrap();
        assert!(prepare_catalog(&args(dir.path(), 2), &corpus).is_err());
        assert!(!dir.path().join("features").exists());
    }
}
