//! Named tensors of the classification graph.
//!
//! Checkpoints record these names in their meta file and restoring refuses a
//! checkpoint whose names differ, so weights exported for one graph layout are
//! never silently loaded into another.

use burn::prelude::Backend;
use serde::{Deserialize, Serialize};

use crate::data::image_batch;
use crate::error::{CovidNetError, Result};
use crate::labels::NUM_CLASSES;
use crate::model::CovidNet;

pub const INPUT_TENSOR: &str = "input_1:0";
pub const LOGITS_TENSOR: &str = "dense_3/MatMul:0";
pub const SOFTMAX_TENSOR: &str = "dense_3/Softmax:0";
pub const TARGET_TENSOR: &str = "dense_3_target:0";
pub const SAMPLE_WEIGHTS_TENSOR: &str = "dense_3_sample_weights:0";

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphSignature {
    pub input: String,
    pub logits: String,
    pub softmax: String,
    pub targets: String,
    pub sample_weights: String,
}

impl Default for GraphSignature {
    fn default() -> Self {
        Self {
            input: INPUT_TENSOR.to_string(),
            logits: LOGITS_TENSOR.to_string(),
            softmax: SOFTMAX_TENSOR.to_string(),
            targets: TARGET_TENSOR.to_string(),
            sample_weights: SAMPLE_WEIGHTS_TENSOR.to_string(),
        }
    }
}

impl GraphSignature {
    /// Check `self` (read from a checkpoint) against the names this crate feeds
    /// and fetches. The first differing tensor is reported.
    pub fn verify(&self, expected: &GraphSignature) -> Result<()> {
        let pairs = [
            ("input", &self.input, &expected.input),
            ("logits", &self.logits, &expected.logits),
            ("softmax", &self.softmax, &expected.softmax),
            ("targets", &self.targets, &expected.targets),
            ("sample weights", &self.sample_weights, &expected.sample_weights),
        ];

        for (role, found, expected) in pairs {
            if found != expected {
                return Err(CovidNetError::TensorNameMismatch {
                    role,
                    expected: expected.clone(),
                    found: found.clone(),
                });
            }
        }
        Ok(())
    }
}

/// A graph that maps one preprocessed image to class probabilities.
pub trait Classifier {
    /// Softmax output for one channel-last 224x224x3 image.
    fn predict(&self, image: &[f32]) -> Result<[f32; NUM_CLASSES]>;

    fn signature(&self) -> GraphSignature {
        GraphSignature::default()
    }
}

impl<B: Backend> Classifier for CovidNet<B> {
    fn predict(&self, image: &[f32]) -> Result<[f32; NUM_CLASSES]> {
        let input = image_batch::<B>(image.to_vec(), 1, &self.device());
        let probs = self
            .forward_softmax(input)
            .into_data()
            .convert::<f32>()
            .to_vec::<f32>()
            .map_err(|e| CovidNetError::Inference(format!("{e:?}")))?;

        probs.try_into().map_err(|probs: Vec<f32>| {
            CovidNetError::Inference(format!(
                "expected {NUM_CLASSES} class scores, got {}",
                probs.len()
            ))
        })
    }
}

/// Index of the largest score; ties go to the lowest index.
pub fn argmax(scores: &[f32]) -> usize {
    scores
        .iter()
        .enumerate()
        .fold((0, f32::NEG_INFINITY), |(best, best_score), (i, &score)| {
            if score > best_score {
                (i, score)
            } else {
                (best, best_score)
            }
        })
        .0
}
