use mmq_core::{Device, Error, Result};

use crate::config::NpuConfig;

/// Capabilities that can be queried per device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceInfo {
    /// Vector cores (the units element-wise kernels run on).
    VectorCoreNum,
    /// Global memory capacity in bytes.
    MemoryCapacity,
}

/// Query one capability of device `ordinal`.
pub fn device_capability(config: &NpuConfig, ordinal: usize, info: DeviceInfo) -> Result<usize> {
    if !config.is_visible(ordinal) {
        return Err(Error::DeviceUnavailable {
            device: Device::Npu(ordinal),
            reason: "device is not present".to_string(),
        });
    }
    let value = match info {
        DeviceInfo::VectorCoreNum => config.vec_cores,
        DeviceInfo::MemoryCapacity => config.memory_bytes,
    };
    tracing::trace!(ordinal, ?info, value, "device capability query");
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reports_configured_capabilities() {
        let config = NpuConfig::default().with_vec_cores(40).with_memory_mb(64);
        assert_eq!(
            device_capability(&config, 0, DeviceInfo::VectorCoreNum).unwrap(),
            40
        );
        assert_eq!(
            device_capability(&config, 0, DeviceInfo::MemoryCapacity).unwrap(),
            64 << 20
        );
    }

    #[test]
    fn test_absent_device() {
        let config = NpuConfig::default();
        assert!(matches!(
            device_capability(&config, 3, DeviceInfo::MemoryCapacity),
            Err(Error::DeviceUnavailable { .. })
        ));
    }
}
