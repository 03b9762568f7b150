//! Training and evaluation of a three-class chest X-ray classifier
//! (normal / pneumonia / COVID-19) on the Burn framework.
//!
//! - `sampler`: class-balanced, endlessly reshuffling batch sampler
//! - `evaluation` / `metrics`: confusion matrix, sensitivity and PPV
//! - `training`: weighted cross-entropy fine-tuning with periodic
//!   evaluation and checkpoints
//! - `checkpoint` / `graph`: graph definition, weight snapshots and the
//!   named-tensor signature they must match

pub mod augment;
pub mod backend;
pub mod checkpoint;
pub mod data;
pub mod error;
pub mod evaluation;
pub mod graph;
pub mod labels;
pub mod logging;
pub mod metrics;
pub mod model;
pub mod sampler;
pub mod training;
pub mod transform;

pub use checkpoint::{restore, CheckpointStore, GraphMeta};
pub use data::{CxrBatch, CxrBatcher, CxrItem};
pub use error::{CovidNetError, Result};
pub use evaluation::{evaluate, evaluate_and_print};
pub use graph::{Classifier, GraphSignature};
pub use labels::{ClassLabel, LabelRecord, NUM_CLASSES};
pub use metrics::{ConfusionMatrix, EvalReport};
pub use model::{CovidNet, CovidNetConfig};
pub use sampler::{BalancedSampler, SamplerConfig};
pub use training::{train, RunPaths, TrainingConfig, WeightsSource};
