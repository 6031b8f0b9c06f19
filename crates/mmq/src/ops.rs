use mmq_core::{BinaryOp, Error, Result};

use crate::dispatch::Dispatcher;
use crate::tensor::{Storage, Tensor};

/// Element-wise `x + y`, computed in the inputs' dtype on the inputs' device.
///
/// Fails with `ShapeMismatch`, `DTypeMismatch` or `DeviceMismatch` when the
/// inputs disagree, and with `UnsupportedOperation` if no kernel is registered
/// for their dtype and device.
pub fn add(x: &Tensor, y: &Tensor) -> Result<Tensor> {
    Dispatcher::global()?.dispatch(BinaryOp::Add.name(), &[x, y])
}

/// Element-wise `x + y` written into the preallocated NPU tensor `out`.
///
/// `x`, `y` and `out` must share shape, dtype and device, and that device
/// must be an NPU.
pub fn add_into(out: &mut Tensor, x: &Tensor, y: &Tensor) -> Result<()> {
    for t in [y, &*out] {
        if t.shape() != x.shape() {
            return Err(Error::ShapeMismatch {
                expected: x.shape().clone(),
                got: t.shape().clone(),
            });
        }
    }
    for t in [y, &*out] {
        if t.dtype() != x.dtype() {
            return Err(Error::DTypeMismatch {
                expected: x.dtype(),
                got: t.dtype(),
            });
        }
    }
    for t in [y, &*out] {
        if t.device() != x.device() {
            return Err(Error::DeviceMismatch {
                expected: x.device(),
                got: t.device(),
            });
        }
    }

    let (dtype, device) = (x.dtype(), x.device());
    match (out.storage_mut(), x.storage(), y.storage()) {
        (Storage::Npu(z), Storage::Npu(a), Storage::Npu(b)) => mmq_npu::kernels::add_into(z, a, b),
        _ => Err(Error::UnsupportedOperation {
            op: "add_into".to_string(),
            dtype,
            device,
        }),
    }
}
