use half::{bf16, f16};
use std::fmt;

use crate::backend::{BackendStorage, BinaryOp};
use crate::device::Device;
use crate::dtype::{DType, WithDType};
use crate::error::{Error, Result};
use crate::shape::Shape;

// CpuStorage: Host memory for each supported dtype
//
// Half types are held as the `half` crate's f16/bf16 on the host side; the
// NPU side keeps raw u16 bits. The conversion happens in the transfer bridge.

/// Host-side contiguous buffer.
#[derive(Clone, PartialEq)]
pub enum CpuStorage {
    F32(Vec<f32>),
    F16(Vec<f16>),
    BF16(Vec<bf16>),
}

impl fmt::Debug for CpuStorage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CpuStorage::F32(s) => write!(f, "CpuStorage::F32(len={})", s.len()),
            CpuStorage::F16(s) => write!(f, "CpuStorage::F16(len={})", s.len()),
            CpuStorage::BF16(s) => write!(f, "CpuStorage::BF16(len={})", s.len()),
        }
    }
}

impl BackendStorage for CpuStorage {
    fn dtype(&self) -> DType {
        match self {
            CpuStorage::F32(_) => DType::F32,
            CpuStorage::F16(_) => DType::F16,
            CpuStorage::BF16(_) => DType::BF16,
        }
    }

    fn len(&self) -> usize {
        match self {
            CpuStorage::F32(s) => s.len(),
            CpuStorage::F16(s) => s.len(),
            CpuStorage::BF16(s) => s.len(),
        }
    }

    fn device(&self) -> Device {
        Device::Host
    }
}

impl CpuStorage {
    /// Allocate `n` zeroed elements.
    pub fn zeros(n: usize, dtype: DType) -> Self {
        match dtype {
            DType::F32 => CpuStorage::F32(vec![0.0; n]),
            DType::F16 => CpuStorage::F16(vec![f16::ZERO; n]),
            DType::BF16 => CpuStorage::BF16(vec![bf16::ZERO; n]),
        }
    }

    /// Create storage from f64 values, rounding to the target dtype.
    pub fn from_f64_slice(data: &[f64], dtype: DType) -> Self {
        match dtype {
            DType::F32 => CpuStorage::F32(data.iter().map(|&v| v as f32).collect()),
            DType::F16 => CpuStorage::F16(data.iter().map(|&v| f16::from_f64(v)).collect()),
            DType::BF16 => CpuStorage::BF16(data.iter().map(|&v| bf16::from_f64(v)).collect()),
        }
    }

    /// Take ownership of a typed vector.
    pub fn from_vec<T: WithDType>(data: Vec<T>) -> Self {
        match T::DTYPE {
            DType::F32 => {
                CpuStorage::F32(data.into_iter().map(|v| v.to_f64() as f32).collect())
            }
            DType::F16 => {
                CpuStorage::F16(data.into_iter().map(|v| f16::from_f64(v.to_f64())).collect())
            }
            DType::BF16 => {
                CpuStorage::BF16(data.into_iter().map(|v| bf16::from_f64(v.to_f64())).collect())
            }
        }
    }

    /// Element `i` widened to f64.
    pub fn get_f64(&self, i: usize) -> Option<f64> {
        match self {
            CpuStorage::F32(s) => s.get(i).map(|&v| v as f64),
            CpuStorage::F16(s) => s.get(i).map(|v| v.to_f64()),
            CpuStorage::BF16(s) => s.get(i).map(|v| v.to_f64()),
        }
    }

    /// Copy every element out as f64 (for inspection and tests).
    pub fn to_f64_vec(&self) -> Vec<f64> {
        match self {
            CpuStorage::F32(s) => s.iter().map(|&v| v as f64).collect(),
            CpuStorage::F16(s) => s.iter().map(|v| v.to_f64()).collect(),
            CpuStorage::BF16(s) => s.iter().map(|v| v.to_f64()).collect(),
        }
    }

    /// Copy out as a typed vector; `T` must match the storage dtype.
    pub fn to_vec<T: WithDType>(&self) -> Result<Vec<T>> {
        if T::DTYPE != self.dtype() {
            return Err(Error::DTypeMismatch {
                expected: self.dtype(),
                got: T::DTYPE,
            });
        }
        Ok(self
            .to_f64_vec()
            .into_iter()
            .map(T::from_f64)
            .collect())
    }

    /// Overwrite the contents with f64 values rounded to the storage dtype.
    pub fn copy_from_f64(&mut self, data: &[f64]) -> Result<()> {
        if data.len() != self.len() {
            return Err(Error::ElementCountMismatch {
                shape: Shape::from(self.len()),
                expected: self.len(),
                got: data.len(),
            });
        }
        *self = CpuStorage::from_f64_slice(data, self.dtype());
        Ok(())
    }

    /// Apply a binary op element-wise: result[i] = op(self[i], rhs[i]).
    ///
    /// Half types compute through the `half` crate's operators, which
    /// widen to f32 and round the result back to nearest-even.
    pub fn binary_op(&self, op: BinaryOp, rhs: &CpuStorage) -> Result<CpuStorage> {
        if self.len() != rhs.len() {
            return Err(Error::ElementCountMismatch {
                shape: Shape::from(self.len()),
                expected: self.len(),
                got: rhs.len(),
            });
        }
        match (self, rhs) {
            (CpuStorage::F32(a), CpuStorage::F32(b)) => Ok(CpuStorage::F32(zip_map(a, b, op))),
            (CpuStorage::F16(a), CpuStorage::F16(b)) => Ok(CpuStorage::F16(zip_map(a, b, op))),
            (CpuStorage::BF16(a), CpuStorage::BF16(b)) => Ok(CpuStorage::BF16(zip_map(a, b, op))),
            _ => Err(Error::DTypeMismatch {
                expected: self.dtype(),
                got: rhs.dtype(),
            }),
        }
    }
}

fn zip_map<T>(a: &[T], b: &[T], op: BinaryOp) -> Vec<T>
where
    T: Copy + std::ops::Add<Output = T>,
{
    match op {
        BinaryOp::Add => a.iter().zip(b.iter()).map(|(&x, &y)| x + y).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zeros_and_len() {
        let s = CpuStorage::zeros(6, DType::BF16);
        assert_eq!(s.dtype(), DType::BF16);
        assert_eq!(s.len(), 6);
        assert_eq!(s.size_in_bytes(), 12);
        assert_eq!(s.to_f64_vec(), vec![0.0; 6]);
    }

    #[test]
    fn test_add_f32_exact() {
        let a = CpuStorage::from_f64_slice(&[1.0, 2.0, 3.0, 4.0], DType::F32);
        let b = CpuStorage::from_f64_slice(&[5.0, 6.0, 7.0, 8.0], DType::F32);
        let c = a.binary_op(BinaryOp::Add, &b).unwrap();
        assert_eq!(c.to_f64_vec(), vec![6.0, 8.0, 10.0, 12.0]);
    }

    #[test]
    fn test_add_bf16_rounds() {
        // 256 + 1 is not representable in bf16 (8 significant bits); ties go to even.
        let a = CpuStorage::from_f64_slice(&[256.0], DType::BF16);
        let b = CpuStorage::from_f64_slice(&[1.0], DType::BF16);
        let c = a.binary_op(BinaryOp::Add, &b).unwrap();
        assert_eq!(c.to_f64_vec(), vec![256.0]);
    }

    #[test]
    fn test_add_dtype_mismatch() {
        let a = CpuStorage::zeros(2, DType::F32);
        let b = CpuStorage::zeros(2, DType::F16);
        assert!(matches!(
            a.binary_op(BinaryOp::Add, &b),
            Err(Error::DTypeMismatch { .. })
        ));
    }

    #[test]
    fn test_to_vec_checks_dtype() {
        let s = CpuStorage::from_vec(vec![f16::from_f32(1.5), f16::from_f32(-2.0)]);
        assert_eq!(s.dtype(), DType::F16);
        assert_eq!(
            s.to_vec::<f16>().unwrap(),
            vec![f16::from_f32(1.5), f16::from_f32(-2.0)]
        );
        assert!(s.to_vec::<f32>().is_err());
    }

    #[test]
    fn test_copy_from_f64_len_checked() {
        let mut s = CpuStorage::zeros(3, DType::F32);
        s.copy_from_f64(&[1.0, 2.0, 3.0]).unwrap();
        assert_eq!(s.get_f64(2), Some(3.0));
        assert!(s.copy_from_f64(&[1.0]).is_err());
    }
}
