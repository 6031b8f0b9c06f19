use crate::device::Device;
use crate::dtype::DType;

// Backend storage: the one interface both memory spaces implement
//
// Host buffers (CpuStorage, this crate) and NPU buffers (NpuStorage, in
// mmq-npu) are different types with different residency, but the dispatcher
// and the transfer bridge only need to ask them the same three questions:
// what dtype, how many elements, and where they live.

/// A storage buffer that holds tensor data on a specific device.
pub trait BackendStorage: Send + Sync + 'static {
    /// The data type of the elements in this storage.
    fn dtype(&self) -> DType;

    /// Total number of elements that fit in this storage.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The device whose memory holds this buffer.
    fn device(&self) -> Device;

    /// Buffer size in bytes: element count times dtype width.
    fn size_in_bytes(&self) -> usize {
        self.len() * self.dtype().size_in_bytes()
    }
}

/// Element-wise binary operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    Add,
}

impl BinaryOp {
    /// The name under which the op's kernels are registered.
    pub fn name(&self) -> &'static str {
        match self {
            BinaryOp::Add => "add",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "add" => Some(BinaryOp::Add),
            _ => None,
        }
    }
}
