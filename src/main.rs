use std::path::PathBuf;

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use tracing::info;

use covid_net::backend::{backend_name, default_device, TrainingBackend};
use covid_net::logging::{init_logging, LogConfig};
use covid_net::training::{adam, train, RunPaths, TrainingConfig, WeightsSource};
use covid_net::{CovidNetConfig, SamplerConfig};

/// Fine-tune the COVID-Net chest X-ray classifier.
#[derive(Parser, Debug)]
#[command(name = "covid-net", version, about)]
struct Cli {
    /// Number of epochs
    #[arg(long, default_value_t = 10)]
    epochs: usize,

    /// Learning rate
    #[arg(long, default_value_t = 0.00002)]
    lr: f64,

    /// Batch size
    #[arg(long, default_value_t = 8)]
    bs: usize,

    /// Folder holding the checkpoint to start from; a fresh model is used when omitted
    #[arg(long)]
    weightspath: Option<PathBuf>,

    /// Name of the graph definition file inside the weights folder
    #[arg(long, default_value = "model.meta")]
    metaname: String,

    /// Name of the weight snapshot inside the weights folder
    #[arg(long, default_value = "model")]
    ckptname: String,

    /// Training label file
    #[arg(long, default_value = "train_COVIDx2.txt")]
    trainfile: PathBuf,

    /// Test label file
    #[arg(long, default_value = "test_COVIDx2.txt")]
    testfile: PathBuf,

    /// Run name used for the checkpoint folder
    #[arg(long, default_value = "COVIDNet")]
    name: String,

    /// Folder with the train/ and test/ images
    #[arg(long, default_value = "data")]
    datadir: PathBuf,

    /// Loss weight of the COVID-19 class
    #[arg(long, default_value_t = 12.0)]
    covid_weight: f32,

    /// Fraction of each batch drawn from COVID-19 cases
    #[arg(long, default_value_t = 0.3)]
    covid_percent: f64,

    /// Seed for sampling, augmentation and initialization
    #[arg(long, default_value_t = 42)]
    seed: u64,

    /// Root folder for run outputs
    #[arg(long, default_value = "output")]
    output_dir: PathBuf,

    /// Disable training-time augmentation
    #[arg(long)]
    no_augmentation: bool,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(&LogConfig::from_verbosity(cli.verbose)).map_err(|e| anyhow!(e))?;
    info!("Backend: {}", backend_name());

    let sampler = SamplerConfig::new()
        .with_batch_size(cli.bs)
        .with_covid_percent(cli.covid_percent)
        .with_class_weights(vec![1.0, 1.0, cli.covid_weight])
        .with_augmentation(!cli.no_augmentation)
        .with_seed(cli.seed);

    let config = TrainingConfig::new(adam(), sampler, CovidNetConfig::new())
        .with_num_epochs(cli.epochs)
        .with_learning_rate(cli.lr)
        .with_name(cli.name);

    let paths = RunPaths {
        data_dir: cli.datadir,
        train_file: cli.trainfile,
        test_file: cli.testfile,
        output_dir: cli.output_dir,
        weights: cli.weightspath.map(|dir| WeightsSource {
            dir,
            meta_name: cli.metaname,
            ckpt_name: cli.ckptname,
        }),
    };

    let outcome = train::<TrainingBackend>(config, &paths, default_device()).context("Training failed")?;
    info!("Checkpoints written to {}", outcome.run_dir.display());

    Ok(())
}
