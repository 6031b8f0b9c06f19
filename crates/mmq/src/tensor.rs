use std::fmt;

use mmq_core::{
    BackendStorage, CpuStorage, DType, Device, Error, RandomSource, Result, Shape, WithDType,
};
use mmq_npu::NpuStorage;

// Tensor: descriptor over an owned contiguous buffer
//
// A Tensor pairs a Shape with storage on exactly one device:
//
//   Storage::Host(CpuStorage) : host memory, one Vec per dtype
//   Storage::Npu(NpuStorage)  : NPU global memory, owned by a device context
//
// dtype and device are not stored separately; they are read off the storage
// variant, so a descriptor can never claim a residency its buffer does not
// have. Every constructor checks that the buffer holds exactly
// `shape.elem_count()` elements.
//
// OWNERSHIP:
//
//   Tensors are not Clone. Moving data between devices always goes through
//   the transfer bridge, which produces a new descriptor with its own buffer.

/// Backing buffer of a tensor, tagged by where it lives.
#[derive(Debug)]
pub enum Storage {
    Host(CpuStorage),
    Npu(NpuStorage),
}

impl Storage {
    pub fn dtype(&self) -> DType {
        match self {
            Storage::Host(s) => s.dtype(),
            Storage::Npu(s) => s.dtype(),
        }
    }

    pub fn device(&self) -> Device {
        match self {
            Storage::Host(s) => s.device(),
            Storage::Npu(s) => s.device(),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Storage::Host(s) => s.len(),
            Storage::Npu(s) => s.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Place host data on `device`, copying it if the target is an NPU.
    pub(crate) fn place(host: CpuStorage, device: Device) -> Result<Self> {
        match device {
            Device::Host => Ok(Storage::Host(host)),
            Device::Npu(ordinal) => {
                let dev = mmq_npu::device(ordinal)?;
                Ok(Storage::Npu(NpuStorage::from_host(&dev, &host)?))
            }
        }
    }
}

/// An n-dimensional array with a fixed shape, dtype and device.
///
/// # Example
/// ```ignore
/// use mmq::prelude::*;
///
/// let x = Tensor::from_f64_slice(&[1.0, 2.0, 3.0, 4.0], (2, 2), DType::F32, Device::Host)?;
/// let y = x.to_npu(0)?;
/// let z = mmq::add(&y, &y)?.to_host()?;
/// ```
pub struct Tensor {
    shape: Shape,
    storage: Storage,
}

impl fmt::Debug for Tensor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Tensor(shape={}, dtype={}, device={})",
            self.shape,
            self.dtype(),
            self.device()
        )
    }
}

impl Tensor {
    // Constructors

    /// Wrap existing storage. The storage length must match the shape.
    pub fn from_storage(shape: impl Into<Shape>, storage: Storage) -> Result<Self> {
        let shape = shape.into();
        shape.validate()?;
        if storage.len() != shape.elem_count() {
            return Err(Error::ElementCountMismatch {
                expected: shape.elem_count(),
                got: storage.len(),
                shape,
            });
        }
        Ok(Tensor { shape, storage })
    }

    /// Allocate a zero-filled tensor on `device`.
    ///
    /// Fails with `InvalidShape` if any dimension is zero and with
    /// `DeviceUnavailable` if `device` is an NPU that is not initialized.
    pub fn allocate(shape: impl Into<Shape>, dtype: DType, device: Device) -> Result<Self> {
        let shape = shape.into();
        shape.validate()?;
        let n = shape.elem_count();
        let storage = match device {
            Device::Host => Storage::Host(CpuStorage::zeros(n, dtype)),
            Device::Npu(ordinal) => {
                let dev = mmq_npu::device(ordinal)?;
                Storage::Npu(NpuStorage::zeros(&dev, n, dtype)?)
            }
        };
        tracing::trace!(shape = %shape, dtype = %dtype, device = %device, "allocate");
        Ok(Tensor { shape, storage })
    }

    /// Create a tensor from f64 values, rounded to `dtype`.
    pub fn from_f64_slice(
        data: &[f64],
        shape: impl Into<Shape>,
        dtype: DType,
        device: Device,
    ) -> Result<Self> {
        let shape = shape.into();
        shape.validate()?;
        if data.len() != shape.elem_count() {
            return Err(Error::ElementCountMismatch {
                expected: shape.elem_count(),
                got: data.len(),
                shape,
            });
        }
        let storage = Storage::place(CpuStorage::from_f64_slice(data, dtype), device)?;
        Ok(Tensor { shape, storage })
    }

    /// Create a tensor from a typed vector. The dtype follows `T`.
    pub fn from_vec<T: WithDType>(
        data: Vec<T>,
        shape: impl Into<Shape>,
        device: Device,
    ) -> Result<Self> {
        let storage = Storage::place(CpuStorage::from_vec(data), device)?;
        Self::from_storage(shape, storage)
    }

    /// Standard-normal samples drawn from `rng` on the host, then placed on `device`.
    pub fn randn(
        shape: impl Into<Shape>,
        dtype: DType,
        device: Device,
        rng: &mut impl RandomSource,
    ) -> Result<Self> {
        let shape = shape.into();
        shape.validate()?;
        let host = rng.normal_storage(shape.elem_count(), dtype);
        let storage = Storage::place(host, device)?;
        Ok(Tensor { shape, storage })
    }

    // Accessors

    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    pub fn dims(&self) -> &[usize] {
        self.shape.dims()
    }

    pub fn rank(&self) -> usize {
        self.shape.rank()
    }

    pub fn dtype(&self) -> DType {
        self.storage.dtype()
    }

    pub fn device(&self) -> Device {
        self.storage.device()
    }

    /// Product of the dimensions.
    pub fn elem_count(&self) -> usize {
        self.shape.elem_count()
    }

    pub fn size_in_bytes(&self) -> usize {
        self.elem_count() * self.dtype().size_in_bytes()
    }

    pub fn storage(&self) -> &Storage {
        &self.storage
    }

    pub(crate) fn storage_mut(&mut self) -> &mut Storage {
        &mut self.storage
    }

    // Data extraction

    /// Host copy of the buffer. Reads back from the NPU if needed.
    pub fn to_cpu_storage(&self) -> Result<CpuStorage> {
        match &self.storage {
            Storage::Host(s) => Ok(s.clone()),
            Storage::Npu(s) => s.to_host(),
        }
    }

    /// All elements widened to f64, in row-major order.
    pub fn to_f64_vec(&self) -> Result<Vec<f64>> {
        match &self.storage {
            Storage::Host(s) => Ok(s.to_f64_vec()),
            Storage::Npu(s) => Ok(s.to_host()?.to_f64_vec()),
        }
    }

    /// All elements as `T`. Fails with `DTypeMismatch` if `T` is not the tensor's dtype.
    pub fn to_vec<T: WithDType>(&self) -> Result<Vec<T>> {
        match &self.storage {
            Storage::Host(s) => s.to_vec(),
            Storage::Npu(s) => s.to_host()?.to_vec(),
        }
    }

    /// Overwrite every element with `data`, rounded to the tensor's dtype.
    ///
    /// The buffer stays on its device; NPU tensors are refilled from a host
    /// staging copy.
    pub fn update_data_inplace(&mut self, data: &[f64]) -> Result<()> {
        if data.len() != self.elem_count() {
            return Err(Error::ElementCountMismatch {
                shape: self.shape.clone(),
                expected: self.elem_count(),
                got: data.len(),
            });
        }
        match &mut self.storage {
            Storage::Host(s) => s.copy_from_f64(data),
            Storage::Npu(s) => {
                let staged = CpuStorage::from_f64_slice(data, s.dtype());
                *s = NpuStorage::from_host(s.npu_device(), &staged)?;
                Ok(())
            }
        }
    }

    /// `self + rhs` via the global dispatcher.
    pub fn add(&self, rhs: &Tensor) -> Result<Tensor> {
        crate::ops::add(self, rhs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mmq_core::SeededRandom;

    #[test]
    fn test_allocate_host() {
        let t = Tensor::allocate((3, 4), DType::BF16, Device::Host).unwrap();
        assert_eq!(t.dims(), &[3, 4]);
        assert_eq!(t.elem_count(), 12);
        assert_eq!(t.size_in_bytes(), 24);
        assert_eq!(t.device(), Device::Host);
        assert_eq!(t.to_f64_vec().unwrap(), vec![0.0; 12]);
    }

    #[test]
    fn test_allocate_rejects_zero_dim() {
        let err = Tensor::allocate((3, 0), DType::F32, Device::Host).unwrap_err();
        assert!(matches!(err, Error::InvalidShape { .. }));
    }

    #[test]
    fn test_scalar_shape_has_one_element() {
        let t = Tensor::from_f64_slice(&[2.5], (), DType::F16, Device::Host).unwrap();
        assert_eq!(t.rank(), 0);
        assert_eq!(t.elem_count(), 1);
        assert_eq!(t.to_f64_vec().unwrap(), vec![2.5]);
    }

    #[test]
    fn test_from_vec_checks_length() {
        let err = Tensor::from_vec(vec![1.0f32, 2.0, 3.0], (2, 2), Device::Host).unwrap_err();
        assert!(matches!(
            err,
            Error::ElementCountMismatch {
                expected: 4,
                got: 3,
                ..
            }
        ));
    }

    #[test]
    fn test_to_vec_wrong_type() {
        let t = Tensor::from_vec(vec![1.0f32, 2.0], (2,), Device::Host).unwrap();
        assert_eq!(t.to_vec::<f32>().unwrap(), vec![1.0, 2.0]);
        assert!(matches!(
            t.to_vec::<half::f16>(),
            Err(Error::DTypeMismatch { .. })
        ));
    }

    #[test]
    fn test_randn_is_reproducible() {
        let a = Tensor::randn((4, 5), DType::F32, Device::Host, &mut SeededRandom::new(7)).unwrap();
        let b = Tensor::randn((4, 5), DType::F32, Device::Host, &mut SeededRandom::new(7)).unwrap();
        assert_eq!(a.to_f64_vec().unwrap(), b.to_f64_vec().unwrap());
    }

    #[test]
    fn test_uninitialized_npu_is_unavailable() {
        // no test in this binary initializes ordinal 7
        let err = Tensor::allocate((4,), DType::F32, Device::Npu(7)).unwrap_err();
        assert!(matches!(err, Error::DeviceUnavailable { .. }));
    }

    #[test]
    fn test_update_data_inplace() {
        let mut t = Tensor::allocate((3,), DType::F16, Device::Host).unwrap();
        t.update_data_inplace(&[1.0, 2.0, 3.0]).unwrap();
        assert_eq!(t.to_f64_vec().unwrap(), vec![1.0, 2.0, 3.0]);
        assert!(t.update_data_inplace(&[1.0]).is_err());
    }
}
