//! Backend selection. `wgpu` is the default; build with
//! `--no-default-features --features ndarray` for a CPU-only binary.

use burn::backend::Autodiff;
use burn::tensor::backend::Backend;

#[cfg(feature = "wgpu")]
pub type DefaultBackend = burn::backend::Wgpu;

#[cfg(all(not(feature = "wgpu"), feature = "ndarray"))]
pub type DefaultBackend = burn::backend::NdArray;

#[cfg(not(any(feature = "wgpu", feature = "ndarray")))]
compile_error!("Enable the `wgpu` or `ndarray` feature to select a backend");

/// Backend used for training
pub type TrainingBackend = Autodiff<DefaultBackend>;

pub fn default_device() -> <DefaultBackend as Backend>::Device {
    <DefaultBackend as Backend>::Device::default()
}

pub fn backend_name() -> &'static str {
    #[cfg(feature = "wgpu")]
    {
        "WGPU"
    }

    #[cfg(all(not(feature = "wgpu"), feature = "ndarray"))]
    {
        "NdArray (CPU)"
    }
}
