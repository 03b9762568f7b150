use std::path::PathBuf;

use anyhow::{anyhow, bail, Context, Result};
use clap::Parser;
use rayon::prelude::*;

use covid_net::labels::{class_counts, read_label_file, ClassLabel};
use covid_net::logging::{init_logging, LogConfig};
use covid_net::transform::load_rgb;

/// Check that every image referenced by a label file decodes.
#[derive(Parser, Debug)]
#[command(name = "dataset_check", version, about)]
struct Cli {
    /// Label file to check
    #[arg(long)]
    labelfile: PathBuf,

    /// Data folder
    #[arg(long, default_value = "data")]
    datadir: PathBuf,

    /// Image folder relative to the data folder
    #[arg(long, default_value = "train")]
    folder: String,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&LogConfig::default()).map_err(|e| anyhow!(e))?;

    let records = read_label_file(&cli.labelfile)
        .with_context(|| format!("Failed to read {}", cli.labelfile.display()))?;

    println!("Records: {}", records.len());
    for (class, count) in ClassLabel::ALL.iter().zip(class_counts(&records)) {
        println!("  {:<10} {}", class.as_str(), count);
    }

    let image_dir = cli.datadir.join(&cli.folder);
    let failures: Vec<String> = records
        .par_iter()
        .filter_map(|record| load_rgb(&image_dir.join(&record.relative_path)).err())
        .map(|e| e.to_string())
        .collect();

    for failure in &failures {
        eprintln!("{failure}");
    }

    if !failures.is_empty() {
        bail!("{} of {} images could not be read", failures.len(), records.len());
    }

    println!("All images readable");
    Ok(())
}
