//! Process-wide NPU device contexts.
//!
//! A device must be initialized before any tensor can be moved to it or any
//! kernel launched on it. Initialization is idempotent per ordinal; every
//! caller shares the same [`NpuDevice`] until [`finalize`] tears it down.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use once_cell::sync::Lazy;

use mmq_core::{Device, Error, Result};

use crate::config::NpuConfig;
use crate::device::NpuDevice;

static CONTEXTS: Lazy<Mutex<HashMap<usize, NpuDevice>>> = Lazy::new(|| Mutex::new(HashMap::new()));

fn contexts() -> Result<MutexGuard<'static, HashMap<usize, NpuDevice>>> {
    CONTEXTS
        .lock()
        .map_err(|e| Error::Internal(format!("NPU context registry lock poisoned: {e}")))
}

/// Initialize device `ordinal` with configuration read from the environment.
pub fn init(ordinal: usize) -> Result<NpuDevice> {
    let config = NpuConfig::from_env()?;
    init_with_config(ordinal, config)
}

/// Initialize device `ordinal` with an explicit configuration.
///
/// If the device is already initialized the existing context is returned and
/// `config` is ignored.
pub fn init_with_config(ordinal: usize, config: NpuConfig) -> Result<NpuDevice> {
    let mut map = contexts()?;
    if let Some(existing) = map.get(&ordinal) {
        if existing.config() != &config {
            tracing::warn!(
                ordinal,
                "NPU already initialized with a different config; keeping the existing context"
            );
        }
        return Ok(existing.clone());
    }

    let device = NpuDevice::open(ordinal, config)?;
    tracing::info!(
        ordinal,
        vec_cores = device.config().vec_cores,
        memory_bytes = device.config().memory_bytes,
        tiling_size = device.config().tiling_size,
        "NPU device initialized"
    );
    map.insert(ordinal, device.clone());
    Ok(device)
}

/// Tear down device `ordinal`. Returns `false` if it was not initialized.
///
/// Tensors still resident on the device keep their memory until dropped, but
/// every further copy or kernel launch touching them fails with
/// `DeviceUnavailable`.
pub fn finalize(ordinal: usize) -> Result<bool> {
    let removed = contexts()?.remove(&ordinal);
    match removed {
        Some(device) => {
            device.shutdown();
            tracing::info!(ordinal, "NPU device finalized");
            Ok(true)
        }
        None => Ok(false),
    }
}

/// The context for `ordinal`, or `DeviceUnavailable` if it is not initialized.
pub fn device(ordinal: usize) -> Result<NpuDevice> {
    contexts()?
        .get(&ordinal)
        .cloned()
        .ok_or_else(|| Error::DeviceUnavailable {
            device: Device::Npu(ordinal),
            reason: "device not initialized".to_string(),
        })
}

pub fn is_initialized(ordinal: usize) -> bool {
    contexts().map(|m| m.contains_key(&ordinal)).unwrap_or(false)
}

/// Ordinals with a live context, ascending.
pub fn initialized_devices() -> Vec<usize> {
    let mut ordinals: Vec<usize> = contexts()
        .map(|m| m.keys().copied().collect())
        .unwrap_or_default();
    ordinals.sort_unstable();
    ordinals
}
