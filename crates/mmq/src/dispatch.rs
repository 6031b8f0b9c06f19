//! Runtime registry mapping `(op, dtype, device kind)` to kernels.
//!
//! Kernels register under an op name together with the op's arity. A single
//! process-wide [`Dispatcher`] is built on first use with the host and NPU
//! kernels for every supported dtype; callers may build private dispatchers
//! or register further kernels into the global one.

use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use once_cell::sync::Lazy;

use mmq_core::{BinaryOp, DType, DeviceKind, Error, Result};

use crate::tensor::{Storage, Tensor};

/// A kernel receives inputs that already share shape, dtype and device.
pub type KernelFn = fn(&[&Tensor]) -> Result<Tensor>;

/// Lookup key for one kernel implementation.
pub type KernelKey = (DType, DeviceKind);

struct OpEntry {
    arity: usize,
    kernels: HashMap<KernelKey, KernelFn>,
}

/// Kernel registry keyed by op name, then by `(dtype, device kind)`.
pub struct Dispatcher {
    ops: RwLock<HashMap<String, OpEntry>>,
}

// Error is kept as text: `Error` is not `Clone` and every caller needs its own.
static GLOBAL: Lazy<std::result::Result<Dispatcher, String>> =
    Lazy::new(|| Dispatcher::with_builtin_kernels().map_err(|e| e.to_string()));

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl Dispatcher {
    /// An empty registry.
    pub fn new() -> Self {
        Dispatcher {
            ops: RwLock::new(HashMap::new()),
        }
    }

    /// A registry holding the built-in host and NPU kernels.
    pub fn with_builtin_kernels() -> Result<Self> {
        let dispatcher = Self::new();
        dispatcher.register_builtin_kernels()?;
        Ok(dispatcher)
    }

    /// Register host and NPU `add` for every dtype.
    ///
    /// Fails if `add` is already registered under a different arity.
    pub fn register_builtin_kernels(&self) -> Result<()> {
        for dtype in DType::ALL {
            for (kind, func) in [
                (DeviceKind::Host, host_add as KernelFn),
                (DeviceKind::Npu, npu_add as KernelFn),
            ] {
                self.register(BinaryOp::Add.name(), 2, dtype, kind, func)?;
            }
        }
        Ok(())
    }

    /// The process-wide registry.
    ///
    /// Fails with `Internal` if the built-in kernels could not be registered.
    pub fn global() -> Result<&'static Dispatcher> {
        GLOBAL.as_ref().map_err(|e| {
            Error::Internal(format!("built-in kernel registration failed: {e}"))
        })
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, HashMap<String, OpEntry>>> {
        self.ops
            .read()
            .map_err(|e| Error::Internal(format!("dispatch registry lock poisoned: {e}")))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, HashMap<String, OpEntry>>> {
        self.ops
            .write()
            .map_err(|e| Error::Internal(format!("dispatch registry lock poisoned: {e}")))
    }

    /// Register `func` for `(op, dtype, kind)`. Returns `true` if it replaced
    /// an existing kernel.
    ///
    /// Every kernel of one op must declare the same arity.
    pub fn register(
        &self,
        op: &str,
        arity: usize,
        dtype: DType,
        kind: DeviceKind,
        func: KernelFn,
    ) -> Result<bool> {
        if arity == 0 {
            return Err(Error::InvalidArgument(format!(
                "op `{op}` must take at least one input"
            )));
        }
        let mut ops = self.write()?;
        let entry = ops.entry(op.to_string()).or_insert_with(|| OpEntry {
            arity,
            kernels: HashMap::new(),
        });
        if entry.arity != arity {
            return Err(Error::InvalidArgument(format!(
                "op `{op}` is registered with arity {}, got {arity}",
                entry.arity
            )));
        }
        let replaced = entry.kernels.insert((dtype, kind), func).is_some();
        tracing::debug!(op, %dtype, %kind, replaced, "registered kernel");
        Ok(replaced)
    }

    /// Whether a kernel exists for `(op, dtype, kind)`.
    pub fn supports(&self, op: &str, dtype: DType, kind: DeviceKind) -> bool {
        self.read()
            .map(|ops| {
                ops.get(op)
                    .is_some_and(|e| e.kernels.contains_key(&(dtype, kind)))
            })
            .unwrap_or(false)
    }

    /// Names of all registered ops, sorted.
    pub fn ops(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .read()
            .map(|ops| ops.keys().cloned().collect())
            .unwrap_or_default();
        names.sort();
        names
    }

    /// Validate `inputs` and run the kernel registered for `op`.
    ///
    /// Checks, in order: arity (`InvalidArgument`), shape (`ShapeMismatch`),
    /// dtype (`DTypeMismatch`), device (`DeviceMismatch`), then kernel lookup
    /// (`UnsupportedOperation`).
    pub fn dispatch(&self, op: &str, inputs: &[&Tensor]) -> Result<Tensor> {
        let Some(first) = inputs.first() else {
            return Err(Error::InvalidArgument(format!("op `{op}` called with no inputs")));
        };

        let func = {
            let ops = self.read()?;
            let entry = ops.get(op);
            if let Some(entry) = entry {
                if entry.arity != inputs.len() {
                    return Err(Error::InvalidArgument(format!(
                        "op `{op}` takes {} inputs, got {}",
                        entry.arity,
                        inputs.len()
                    )));
                }
            }

            for t in &inputs[1..] {
                if t.shape() != first.shape() {
                    return Err(Error::ShapeMismatch {
                        expected: first.shape().clone(),
                        got: t.shape().clone(),
                    });
                }
            }
            for t in &inputs[1..] {
                if t.dtype() != first.dtype() {
                    return Err(Error::DTypeMismatch {
                        expected: first.dtype(),
                        got: t.dtype(),
                    });
                }
            }
            for t in &inputs[1..] {
                if t.device() != first.device() {
                    return Err(Error::DeviceMismatch {
                        expected: first.device(),
                        got: t.device(),
                    });
                }
            }

            let key = (first.dtype(), first.device().kind());
            match entry.and_then(|e| e.kernels.get(&key)) {
                Some(func) => *func,
                None => {
                    return Err(Error::UnsupportedOperation {
                        op: op.to_string(),
                        dtype: first.dtype(),
                        device: first.device(),
                    })
                }
            }
        };

        tracing::debug!(
            op,
            shape = %first.shape(),
            dtype = %first.dtype(),
            device = %first.device(),
            "dispatch"
        );
        let out = func(inputs)?;
        if out.shape() != first.shape() || out.dtype() != first.dtype() || out.device() != first.device() {
            return Err(Error::Internal(format!(
                "kernel `{op}` returned {out:?} for inputs {first:?}"
            )));
        }
        Ok(out)
    }
}

// Built-in kernels

fn binary_inputs<'a>(inputs: &[&'a Tensor]) -> Result<(&'a Tensor, &'a Tensor)> {
    match inputs {
        [x, y] => Ok((*x, *y)),
        _ => Err(Error::Internal(format!(
            "binary kernel received {} inputs",
            inputs.len()
        ))),
    }
}

fn host_add(inputs: &[&Tensor]) -> Result<Tensor> {
    let (x, y) = binary_inputs(inputs)?;
    match (x.storage(), y.storage()) {
        (Storage::Host(a), Storage::Host(b)) => {
            let out = a.binary_op(BinaryOp::Add, b)?;
            Tensor::from_storage(x.shape().clone(), Storage::Host(out))
        }
        _ => Err(Error::Internal("host kernel received device storage".into())),
    }
}

fn npu_add(inputs: &[&Tensor]) -> Result<Tensor> {
    let (x, y) = binary_inputs(inputs)?;
    match (x.storage(), y.storage()) {
        (Storage::Npu(a), Storage::Npu(b)) => {
            let out = mmq_npu::kernels::add(a, b)?;
            Tensor::from_storage(x.shape().clone(), Storage::Npu(out))
        }
        _ => Err(Error::Internal("NPU kernel received host storage".into())),
    }
}
