use std::fmt;

/// Where a tensor buffer lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Device {
    /// Host (CPU) memory.
    #[default]
    Host,
    /// Global memory of the NPU with the given ordinal.
    Npu(usize),
}

/// Device class without the ordinal; kernels are registered per kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DeviceKind {
    Host,
    Npu,
}

impl Device {
    pub fn kind(&self) -> DeviceKind {
        match self {
            Device::Host => DeviceKind::Host,
            Device::Npu(_) => DeviceKind::Npu,
        }
    }

    pub fn is_host(&self) -> bool {
        matches!(self, Device::Host)
    }

    pub fn is_npu(&self) -> bool {
        matches!(self, Device::Npu(_))
    }

    /// The NPU ordinal, if applicable.
    pub fn npu_index(&self) -> Option<usize> {
        match self {
            Device::Npu(idx) => Some(*idx),
            Device::Host => None,
        }
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Device::Host => write!(f, "host"),
            Device::Npu(idx) => write!(f, "npu:{idx}"),
        }
    }
}

impl fmt::Display for DeviceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceKind::Host => write!(f, "host"),
            DeviceKind::Npu => write!(f, "npu"),
        }
    }
}
