//! Moving tensors between host and NPU memory.
//!
//! Every transfer is a deep copy into a fresh buffer, including transfers to
//! the device the tensor already lives on. The source is never modified.

use mmq_core::{Device, Result};
use mmq_npu::NpuStorage;

use crate::tensor::{Storage, Tensor};

/// Copy `src` to `target`, returning a new descriptor with the same shape and dtype.
///
/// Fails with `DeviceUnavailable` if `target` (or the NPU `src` lives on) is
/// absent, not initialized or finalized.
pub fn to_device(src: &Tensor, target: Device) -> Result<Tensor> {
    let storage = match (src.storage(), target) {
        (Storage::Host(s), Device::Host) => Storage::Host(s.clone()),
        (Storage::Host(s), Device::Npu(ordinal)) => {
            let dev = mmq_npu::device(ordinal)?;
            Storage::Npu(NpuStorage::from_host(&dev, s)?)
        }
        (Storage::Npu(s), Device::Host) => Storage::Host(s.to_host()?),
        (Storage::Npu(s), Device::Npu(ordinal)) => {
            let dev = mmq_npu::device(ordinal)?;
            if *s.npu_device() == dev {
                Storage::Npu(s.try_clone()?)
            } else {
                // no peer-to-peer path; stage through the host
                Storage::Npu(NpuStorage::from_host(&dev, &s.to_host()?)?)
            }
        }
    };
    tracing::debug!(
        shape = %src.shape(),
        dtype = %src.dtype(),
        from = %src.device(),
        to = %target,
        bytes = src.size_in_bytes(),
        "transfer"
    );
    Tensor::from_storage(src.shape().clone(), storage)
}

impl Tensor {
    /// Deep copy onto `target`.
    pub fn to_device(&self, target: Device) -> Result<Tensor> {
        to_device(self, target)
    }

    pub fn to_host(&self) -> Result<Tensor> {
        to_device(self, Device::Host)
    }

    pub fn to_npu(&self, ordinal: usize) -> Result<Tensor> {
        to_device(self, Device::Npu(ordinal))
    }
}
