use std::{path::PathBuf, process::ExitCode};

use clap::Parser;
use serde_json::{Map, Value};
use tracing_subscriber::EnvFilter;

use overfit::{
    config::ExperimentConfig,
    error::{Error, Result},
    experiment, mnist,
};

/// Trains one MNIST classifier per regularization technique and prints how
/// far each one overfits
#[derive(Debug, Parser)]
#[command(author, version, about)]
struct Cli {
    /// Folder holding the four MNIST IDX files, gzipped or not
    #[arg(long)]
    data: PathBuf,

    /// JSON experiment config, command line values take precedence
    #[arg(long)]
    config: Option<PathBuf>,

    #[arg(long)]
    epochs: Option<usize>,

    #[arg(long)]
    batch_size: Option<usize>,

    /// Roll the early stopping variant back to its best epoch
    #[arg(long)]
    restore_best_weights: Option<bool>,

    /// Only run this variant, can be repeated
    #[arg(long)]
    variant: Vec<String>,

    /// Use only the first N training images
    #[arg(long)]
    limit: Option<usize>,

    /// Leave failed variants out of the report instead of aborting
    #[arg(long)]
    skip_failures: bool,
}

impl Cli {
    fn config(&self) -> Result<ExperimentConfig> {
        let mut map = match &self.config {
            Some(path) => match serde_json::from_str(&std::fs::read_to_string(path)?)? {
                Value::Object(map) => map,
                other => {
                    return Err(Error::Config(format!(
                        "{} must hold a JSON object, found {other}",
                        path.display()
                    )))
                }
            },
            None => Map::new(),
        };

        if let Some(epochs) = self.epochs {
            map.insert("epochs".into(), epochs.into());
        }
        if let Some(batch_size) = self.batch_size {
            map.insert("batch_size".into(), batch_size.into());
        }
        if let Some(restore) = self.restore_best_weights {
            map.insert("restore_best_weights".into(), restore.into());
        }
        if let Some(limit) = self.limit {
            map.insert("train_limit".into(), limit.into());
        }
        if self.skip_failures {
            map.insert("on_failure".into(), "skip".into());
        }
        ExperimentConfig::from_value(Value::Object(map))
    }
}

fn run(cli: &Cli) -> Result<()> {
    let config = cli.config()?;
    let variants = experiment::select_variants(experiment::standard_variants(), &cli.variant)?;

    log::info!("loading MNIST from {}", cli.data.display());
    let data = mnist::load(&cli.data)?;
    let dataset = experiment::prepare(data, &config)?;
    log::info!(
        "{} train, {} validation, {} test rows",
        dataset.train().len(),
        dataset.validation().len(),
        dataset.test().len()
    );

    let report = experiment::run(&dataset, &config, &variants)?;
    println!("{report}");
    Ok(())
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{e}");
            ExitCode::FAILURE
        }
    }
}
