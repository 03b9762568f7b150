use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

use burn::{
    data::dataloader::batcher::Batcher,
    module::AutodiffModule,
    optim::{AdamConfig, GradientsParams, Optimizer},
    prelude::*,
    tensor::{activation::log_softmax, backend::AutodiffBackend, ElementConversion},
};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

use crate::{
    checkpoint::{restore, CheckpointStore},
    data::{CxrBatch, CxrBatcher, CxrItem},
    error,
    evaluation::evaluate_and_print,
    labels::read_label_file,
    metrics::EvalReport,
    model::{CovidNet, CovidNetConfig},
    sampler::{BalancedSampler, SamplerConfig},
};

/// Base name for every checkpoint written by a run.
pub const CHECKPOINT_NAME: &str = "model";

#[derive(Config)]
pub struct TrainingConfig {
    pub optimizer: AdamConfig,
    pub sampler: SamplerConfig,
    /// Used only when training starts without restored weights
    pub model: CovidNetConfig,
    #[config(default = 10)]
    pub num_epochs: usize,
    #[config(default = 2e-5)]
    pub learning_rate: f64,
    /// Run name; checkpoints go to `<output_dir>/<name>-lr<rate>`
    #[config(default = "String::from(\"COVIDNet\")")]
    pub name: String,
}

/// Adam with the epsilon of the optimizer the released checkpoints were
/// trained with.
pub fn adam() -> AdamConfig {
    AdamConfig::new().with_epsilon(1e-8)
}

impl TrainingConfig {
    pub fn run_id(&self) -> String {
        format!("{}-lr{:e}", self.name, self.learning_rate)
    }
}

/// Where a pretrained checkpoint lives.
#[derive(Clone, Debug)]
pub struct WeightsSource {
    pub dir: PathBuf,
    pub meta_name: String,
    pub ckpt_name: String,
}

impl WeightsSource {
    pub fn meta_path(&self) -> PathBuf {
        self.dir.join(&self.meta_name)
    }

    pub fn ckpt_path(&self) -> PathBuf {
        self.dir.join(&self.ckpt_name)
    }
}

/// File locations for a training run.
#[derive(Clone, Debug)]
pub struct RunPaths {
    /// Holds the `train/` and `test/` image folders
    pub data_dir: PathBuf,
    pub train_file: PathBuf,
    pub test_file: PathBuf,
    pub output_dir: PathBuf,
    /// Start from scratch when absent
    pub weights: Option<WeightsSource>,
}

impl RunPaths {
    pub fn test_image_dir(&self) -> PathBuf {
        self.data_dir.join("test")
    }
}

pub struct TrainingOutcome<B: AutodiffBackend> {
    pub model: CovidNet<B>,
    pub run_dir: PathBuf,
    /// Loss of the last batch, recomputed after the final epoch's updates
    pub last_loss: Option<f64>,
    pub last_report: EvalReport,
}

/// Mean over the batch of per-sample softmax cross-entropy scaled by the
/// sample weight. Takes unscaled logits.
pub fn weighted_cross_entropy<B: Backend>(
    logits: Tensor<B, 2>,
    targets: Tensor<B, 2>,
    weights: Tensor<B, 1>,
) -> Tensor<B, 1> {
    let per_sample = (log_softmax(logits, 1) * targets)
        .sum_dim(1)
        .squeeze::<1>(1)
        .neg();

    (per_sample * weights).mean()
}

fn batch_loss<B: Backend>(model: &CovidNet<B>, batch: &CxrBatch<B>) -> Tensor<B, 1> {
    let logits = model.forward(batch.images.clone());
    weighted_cross_entropy(logits, batch.targets.clone(), batch.weights.clone())
}

/// Loss of `items` under the current weights, in inference mode (dropout off,
/// no autodiff graph).
fn epoch_loss<B: AutodiffBackend>(model: &CovidNet<B>, items: Vec<CxrItem>, device: &B::Device) -> f64 {
    let batch = CxrBatcher::<B::InnerBackend>::new(device.clone()).batch(items);
    batch_loss(&model.valid(), &batch).into_scalar().elem()
}

pub fn epoch_loss_line(epoch: usize, loss: f64) -> String {
    format!("Epoch: {epoch:04} Minibatch loss= {loss:.9}")
}

fn progress_bar(len: usize) -> ProgressBar {
    let style = ProgressStyle::with_template("{bar:40} {pos}/{len} [{elapsed_precise}]")
        .unwrap_or_else(|_| ProgressStyle::default_bar());
    ProgressBar::new(len as u64).with_style(style)
}

fn load_model<B: AutodiffBackend>(
    config: &TrainingConfig,
    weights: Option<&WeightsSource>,
    device: &B::Device,
) -> error::Result<(CovidNet<B>, CovidNetConfig)> {
    match weights {
        Some(source) => restore::<B>(&source.meta_path(), &source.ckpt_path(), device),
        None => {
            info!("No weights given, initializing a fresh model");
            Ok((config.model.init::<B>(device), config.model.clone()))
        }
    }
}

fn write_report(run_dir: &Path, step: usize, report: &EvalReport) -> error::Result<()> {
    let path = run_dir.join(format!("eval-{step}.json"));
    fs::write(path, serde_json::to_string_pretty(report)?)?;
    Ok(())
}

/// Fine-tune for `num_epochs` passes of the balanced sampler.
///
/// A baseline checkpoint (graph + weights) and a baseline evaluation come
/// first. Every epoch then ends with the last batch's loss, an evaluation of
/// the test list and a weights-only checkpoint `model-<epoch>`. Any error
/// aborts the run.
pub fn train<B: AutodiffBackend>(
    config: TrainingConfig,
    paths: &RunPaths,
    device: B::Device,
) -> error::Result<TrainingOutcome<B>> {
    let run_dir = paths.output_dir.join(config.run_id());
    let store = CheckpointStore::create(&run_dir)?;
    info!("Output: {}", run_dir.display());

    config.save(run_dir.join("config.json"))?;

    B::seed(config.sampler.seed);

    let test_records = read_label_file(&paths.test_file)?;
    let test_dir = paths.test_image_dir();

    let mut sampler =
        BalancedSampler::from_label_file(&paths.data_dir, &paths.train_file, config.sampler.clone())?;
    let (non_covid, covid) = sampler.pool_sizes();
    info!(non_covid, covid, batches = sampler.len(), "Sampler ready");

    let batcher = CxrBatcher::<B>::new(device.clone());

    let (mut model, model_config) = load_model::<B>(&config, paths.weights.as_ref(), &device)?;

    store.save_graph(CHECKPOINT_NAME, &model, &model_config)?;
    info!("Saved baseline checkpoint");
    println!("Baseline eval:");
    let mut last_report = evaluate_and_print(&model.valid(), &test_records, &test_dir)?;

    let mut optimizer = config.optimizer.init::<B, CovidNet<B>>();
    let total_batch = sampler.len();
    let mut last_loss = None;

    println!("Training started");
    let started = Instant::now();
    for epoch in 0..config.num_epochs {
        let progress = progress_bar(total_batch);
        let mut last_items = None;

        for step in 0..total_batch {
            let items = sampler.next_batch()?;
            if step + 1 == total_batch {
                last_items = Some(items.clone());
            }
            let batch = batcher.batch(items);

            let loss = batch_loss(&model, &batch);
            let grads = GradientsParams::from_grads(loss.backward(), &model);
            model = optimizer.step(config.learning_rate, model, grads);

            progress.inc(1);
        }
        progress.finish_and_clear();

        if let Some(items) = last_items {
            let loss = epoch_loss(&model, items, &device);
            println!("{}", epoch_loss_line(epoch + 1, loss));
            last_loss = Some(loss);
        }

        last_report = evaluate_and_print(&model.valid(), &test_records, &test_dir)?;
        write_report(&run_dir, epoch + 1, &last_report)?;

        store.save_weights(CHECKPOINT_NAME, epoch + 1, &model)?;
        info!("Saving checkpoint at epoch {}", epoch + 1);
    }

    let elapsed = started.elapsed().as_secs();
    info!("Training completed in {}m{}s", elapsed / 60, elapsed % 60);
    println!("Optimization Finished!");

    Ok(TrainingOutcome {
        model,
        run_dir,
        last_loss,
        last_report,
    })
}
