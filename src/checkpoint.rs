//! Checkpoint store.
//!
//! A checkpoint is a graph definition (`<name>.meta`, JSON holding the tensor
//! signature and the model config) plus weight snapshots written by burn's
//! full-precision named MessagePack recorder (`<name>.mpk`, `<name>-<step>.mpk`).

use std::fs;
use std::path::{Path, PathBuf};

use burn::{
    prelude::*,
    record::{FullPrecisionSettings, NamedMpkFileRecorder},
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{CovidNetError, Result};
use crate::graph::GraphSignature;
use crate::model::{CovidNet, CovidNetConfig};

pub type WeightsRecorder = NamedMpkFileRecorder<FullPrecisionSettings>;

pub const META_EXTENSION: &str = "meta";

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GraphMeta {
    pub signature: GraphSignature,
    pub model: CovidNetConfig,
}

impl GraphMeta {
    pub fn new(model: CovidNetConfig) -> Self {
        Self {
            signature: GraphSignature::default(),
            model,
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&contents)?)
    }
}

fn checkpoint_error(path: &Path, e: impl std::fmt::Debug) -> CovidNetError {
    CovidNetError::Checkpoint {
        path: path.to_path_buf(),
        reason: format!("{e:?}"),
    }
}

/// Writes checkpoints into one run directory.
pub struct CheckpointStore {
    dir: PathBuf,
    recorder: WeightsRecorder,
}

impl CheckpointStore {
    pub fn create(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            recorder: WeightsRecorder::new(),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Write the graph definition and the weights under `name`.
    pub fn save_graph<B: Backend>(
        &self,
        name: &str,
        model: &CovidNet<B>,
        config: &CovidNetConfig,
    ) -> Result<PathBuf> {
        let meta_path = self.dir.join(format!("{name}.{META_EXTENSION}"));
        GraphMeta::new(config.clone()).save(&meta_path)?;
        debug!(path = %meta_path.display(), "Wrote graph definition");

        self.write_weights(name, model)
    }

    /// Write weights only, as `<name>-<step>`.
    pub fn save_weights<B: Backend>(&self, name: &str, step: usize, model: &CovidNet<B>) -> Result<PathBuf> {
        self.write_weights(&format!("{name}-{step}"), model)
    }

    fn write_weights<B: Backend>(&self, file_name: &str, model: &CovidNet<B>) -> Result<PathBuf> {
        let path = self.dir.join(file_name);
        model
            .clone()
            .save_file(path.clone(), &self.recorder)
            .map_err(|e| checkpoint_error(&path, e))?;
        info!(path = %path.display(), "Saved weights");
        Ok(path)
    }
}

/// Rebuild a model from a meta file and a weight snapshot.
///
/// The network is initialized from the stored config first, which fixes every
/// parameter shape, and the snapshot then overwrites the values. A signature
/// that differs from [`GraphSignature::default`] is rejected before any
/// weights are read.
pub fn restore<B: Backend>(
    meta_path: &Path,
    weights_path: &Path,
    device: &B::Device,
) -> Result<(CovidNet<B>, CovidNetConfig)> {
    let meta = GraphMeta::load(meta_path)?;
    meta.signature.verify(&GraphSignature::default())?;

    let model = meta
        .model
        .init::<B>(device)
        .load_file(weights_path.to_path_buf(), &WeightsRecorder::new(), device)
        .map_err(|e| checkpoint_error(weights_path, e))?;

    info!(
        meta = %meta_path.display(),
        weights = %weights_path.display(),
        "Restored checkpoint"
    );
    Ok((model, meta.model))
}
