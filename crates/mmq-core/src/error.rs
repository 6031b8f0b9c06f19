use crate::device::Device;
use crate::dtype::DType;
use crate::shape::Shape;

/// All errors that can occur within mmq.
///
/// Every failure of allocation, transfer, dispatch and comparison maps to one
/// variant here. None of them are retried internally; they propagate to the
/// caller as soon as they are detected.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A shape contains a zero-sized dimension.
    #[error("invalid shape {shape}: every dimension must be positive")]
    InvalidShape { shape: Shape },

    /// The target accelerator is absent, or was never initialized, or was finalized.
    #[error("device {device} unavailable: {reason}")]
    DeviceUnavailable { device: Device, reason: String },

    /// Shape mismatch between two tensors (e.g., trying to add [2,3] + [4,5]).
    #[error("shape mismatch: expected {expected}, got {got}")]
    ShapeMismatch { expected: Shape, got: Shape },

    /// DType mismatch between tensors in a binary operation.
    #[error("dtype mismatch: expected {expected}, got {got}")]
    DTypeMismatch { expected: DType, got: DType },

    /// Inputs of one operation live on different devices.
    #[error("device mismatch: expected {expected}, got {got}")]
    DeviceMismatch { expected: Device, got: Device },

    /// No kernel is registered for the (op, dtype, device) triple.
    #[error("unsupported operation: no `{op}` kernel for {dtype} on {device}")]
    UnsupportedOperation {
        op: String,
        dtype: DType,
        device: Device,
    },

    /// Element count mismatch when creating from a vec.
    #[error("element count mismatch: shape {shape} requires {expected} elements, got {got}")]
    ElementCountMismatch {
        shape: Shape,
        expected: usize,
        got: usize,
    },

    /// A caller-supplied argument is malformed (wrong arity, bad config value, ...).
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Device memory capacity would be exceeded.
    #[error("out of device memory on {device}: requested {requested} bytes, {available} available")]
    OutOfMemory {
        device: Device,
        requested: usize,
        available: usize,
    },

    /// Broken internal invariant (indicates a bug).
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Whether the failure originates in the accelerator runtime rather than
    /// in the caller's inputs.
    pub fn is_device_error(&self) -> bool {
        matches!(
            self,
            Error::DeviceUnavailable { .. } | Error::OutOfMemory { .. } | Error::Internal(_)
        )
    }
}

/// Convenience Result type used throughout mmq.
pub type Result<T> = std::result::Result<T, Error>;
