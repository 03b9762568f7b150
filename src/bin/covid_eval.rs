use std::path::PathBuf;

use anyhow::{anyhow, Context, Result};
use clap::Parser;

use covid_net::backend::{default_device, DefaultBackend};
use covid_net::labels::read_label_file;
use covid_net::logging::{init_logging, LogConfig};
use covid_net::{evaluate_and_print, restore};

/// Evaluate a COVID-Net checkpoint on a held-out label file.
#[derive(Parser, Debug)]
#[command(name = "covid_eval", version, about)]
struct Cli {
    /// Folder holding the checkpoint
    #[arg(long, default_value = "output")]
    weightspath: PathBuf,

    /// Graph definition file, relative to the weights folder
    #[arg(long, default_value = "COVIDNet-lr2e-5/model.meta")]
    metaname: String,

    /// Weight snapshot, relative to the weights folder
    #[arg(long, default_value = "COVIDNet-lr2e-5/model")]
    ckptname: String,

    /// Test label file
    #[arg(long, default_value = "test_COVIDx.txt")]
    testfile: PathBuf,

    /// Data folder containing the test folder
    #[arg(long, default_value = "data")]
    datadir: PathBuf,

    /// Folder with the test images, relative to the data folder
    #[arg(long, default_value = "test")]
    testfolder: String,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&LogConfig::from_verbosity(cli.verbose)).map_err(|e| anyhow!(e))?;

    let device = default_device();
    let (model, _) = restore::<DefaultBackend>(
        &cli.weightspath.join(&cli.metaname),
        &cli.weightspath.join(&cli.ckptname),
        &device,
    )
    .context("Failed to restore checkpoint")?;

    let records = read_label_file(&cli.testfile)
        .with_context(|| format!("Failed to read {}", cli.testfile.display()))?;

    evaluate_and_print(&model, &records, &cli.datadir.join(&cli.testfolder))?;
    Ok(())
}
