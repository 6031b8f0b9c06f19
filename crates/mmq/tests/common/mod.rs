//! Shared NPU fixture for integration tests.
//!
//! The targeted ordinal (`MMQ_DEVICE`, default 0) is initialized once per
//! test binary from the environment and never finalized. Tests that exercise
//! finalize or cross-device paths use the next ordinal up, which they
//! initialize and tear down themselves under `#[serial]`.
//!
//! `MMQ_RTOL` / `MMQ_ATOL` override the comparison tolerances of `tolerance`.

#![allow(dead_code)]

use mmq::prelude::*;
use mmq::RuntimeConfig;
use mmq_npu::{NpuConfig, NpuDevice};
use once_cell::sync::Lazy;

pub static RUNTIME: Lazy<RuntimeConfig> =
    Lazy::new(|| RuntimeConfig::from_env().expect("invalid MMQ_* test settings"));

pub static NPU_FIXTURE: Lazy<NpuDevice> = Lazy::new(|| {
    RUNTIME
        .init()
        .unwrap_or_else(|e| panic!("failed to initialize {}: {e}", RUNTIME.device()))
});

/// The shared device, initialized on first use.
pub fn npu() -> Device {
    Lazy::force(&NPU_FIXTURE).device()
}

/// Tolerance for comparing results computed in `dtype`.
pub fn tolerance(dtype: DType) -> Tolerance {
    RUNTIME.tolerance(dtype)
}

/// Ordinal of the device brought up and torn down by individual tests.
pub fn second_ordinal() -> usize {
    RUNTIME.device_ordinal + 1
}

/// Config under which both the shared and the second ordinal are present.
pub fn two_device_config() -> NpuConfig {
    NpuConfig::default()
        .with_visible_devices(vec![RUNTIME.device_ordinal, second_ordinal()])
        .with_memory_mb(64)
}

pub fn host_f64(data: &[f64], dims: &[usize], dtype: DType) -> Tensor {
    Tensor::from_f64_slice(data, dims, dtype, Device::Host).unwrap()
}
