// ============================================================
// Layer 5 — Backend Selection
// ============================================================
// One compute backend per build: NdArray by default, WGPU with
// the `backend-wgpu` feature. Training wraps it in Autodiff.
//
// The device is chosen once per run and passed explicitly to
// every component that creates tensors.

use burn::backend::Autodiff;
use burn::prelude::Backend;

#[cfg(feature = "backend-wgpu")]
pub type ComputeBackend = burn::backend::Wgpu<f32>;
#[cfg(not(feature = "backend-wgpu"))]
pub type ComputeBackend = burn::backend::NdArray<f32>;

/// The training backend.
pub type StandardBackend = Autodiff<ComputeBackend>;

pub type ComputeDevice = <ComputeBackend as Backend>::Device;

/// Pick the device for this run.
pub fn select_device() -> ComputeDevice {
    let device = ComputeDevice::default();
    tracing::info!("Using device {:?}", device);
    device
}
