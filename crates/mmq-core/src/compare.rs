use crate::dtype::DType;
use crate::error::{Error, Result};
use crate::shape::Shape;
use crate::storage::CpuStorage;
use crate::backend::BackendStorage;

// Numerical equivalence
//
// Two buffers are "close" when every element pair (x, y) satisfies
//
//     |x - y| <= atol + rtol * |y|
//
// with `y` taken from the reference (right-hand) side. Equal values,
// including equal infinities, are always close; NaN is never close to
// anything unless `equal_nan` is set.
//
// Default tolerances scale with mantissa width: a 16-bit result may differ
// from its reference by an ulp or so, which is ~1e-3 relative for f16 and
// ~1e-2 for bf16.

/// Relative and absolute tolerance for element-wise comparison.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Tolerance {
    pub rtol: f64,
    pub atol: f64,
    pub equal_nan: bool,
}

impl Tolerance {
    pub fn new(rtol: f64, atol: f64) -> Self {
        Tolerance {
            rtol,
            atol,
            equal_nan: false,
        }
    }

    /// Default tolerance for results computed in `dtype`.
    pub fn for_dtype(dtype: DType) -> Self {
        match dtype {
            DType::F32 => Tolerance::new(1.3e-6, 1e-5),
            DType::F16 => Tolerance::new(1e-3, 1e-5),
            DType::BF16 => Tolerance::new(1.6e-2, 1e-5),
        }
    }

    /// The looser of two dtypes' defaults.
    pub fn for_dtypes(a: DType, b: DType) -> Self {
        let ta = Tolerance::for_dtype(a);
        let tb = Tolerance::for_dtype(b);
        Tolerance::new(ta.rtol.max(tb.rtol), ta.atol.max(tb.atol))
    }

    pub fn with_equal_nan(mut self, equal_nan: bool) -> Self {
        self.equal_nan = equal_nan;
        self
    }

    /// Whether a single pair is within tolerance.
    pub fn is_close(&self, x: f64, y: f64) -> bool {
        if x == y {
            return true;
        }
        if x.is_nan() || y.is_nan() {
            return self.equal_nan && x.is_nan() && y.is_nan();
        }
        if x.is_infinite() || y.is_infinite() {
            return false;
        }
        (x - y).abs() <= self.atol + self.rtol * y.abs()
    }
}

/// Outcome of comparing two buffers.
#[derive(Debug, Clone, PartialEq)]
pub struct CloseReport {
    /// Number of element pairs outside tolerance.
    pub mismatches: usize,
    /// First failing pair as (index, actual, expected).
    pub first_mismatch: Option<(usize, f64, f64)>,
    /// Largest |x - y| over pairs that are both finite.
    pub max_abs_diff: f64,
}

impl CloseReport {
    pub fn all_close(&self) -> bool {
        self.mismatches == 0
    }
}

/// Compare two host buffers of the given shapes element by element.
///
/// Fails with `ShapeMismatch` when the shapes differ. Storage dtypes may
/// differ; values are compared after widening to f64.
pub fn compare(
    lhs_shape: &Shape,
    lhs: &CpuStorage,
    rhs_shape: &Shape,
    rhs: &CpuStorage,
    tol: Tolerance,
) -> Result<CloseReport> {
    if lhs_shape != rhs_shape {
        return Err(Error::ShapeMismatch {
            expected: lhs_shape.clone(),
            got: rhs_shape.clone(),
        });
    }
    if lhs.len() != rhs.len() {
        return Err(Error::Internal(format!(
            "storage lengths {} and {} disagree with shape {}",
            lhs.len(),
            rhs.len(),
            lhs_shape
        )));
    }

    let mut report = CloseReport {
        mismatches: 0,
        first_mismatch: None,
        max_abs_diff: 0.0,
    };
    for i in 0..lhs.len() {
        let (Some(x), Some(y)) = (lhs.get_f64(i), rhs.get_f64(i)) else {
            break;
        };
        if x.is_finite() && y.is_finite() {
            report.max_abs_diff = report.max_abs_diff.max((x - y).abs());
        }
        if !tol.is_close(x, y) {
            report.mismatches += 1;
            if report.first_mismatch.is_none() {
                report.first_mismatch = Some((i, x, y));
            }
        }
    }
    Ok(report)
}

/// `true` iff every pair satisfies `|x - y| <= atol + rtol * |y|`.
pub fn all_close(
    lhs_shape: &Shape,
    lhs: &CpuStorage,
    rhs_shape: &Shape,
    rhs: &CpuStorage,
    tol: Tolerance,
) -> Result<bool> {
    Ok(compare(lhs_shape, lhs, rhs_shape, rhs, tol)?.all_close())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn f32s(v: &[f64]) -> CpuStorage {
        CpuStorage::from_f64_slice(v, DType::F32)
    }

    #[test]
    fn test_half_defaults_are_looser() {
        let f32_tol = Tolerance::for_dtype(DType::F32);
        let f16_tol = Tolerance::for_dtype(DType::F16);
        let bf16_tol = Tolerance::for_dtype(DType::BF16);
        assert!(f16_tol.rtol > f32_tol.rtol);
        assert!(bf16_tol.rtol > f16_tol.rtol);
        assert_eq!(Tolerance::for_dtypes(DType::F32, DType::BF16), Tolerance::new(1.6e-2, 1e-5));
    }

    #[test]
    fn test_is_close_relative_to_rhs() {
        let tol = Tolerance::new(0.1, 0.0);
        assert!(tol.is_close(10.9, 10.0));
        assert!(!tol.is_close(11.1, 10.0));
        // asymmetric: bound uses |y|
        let loose = Tolerance::new(1.0, 0.0);
        assert!(loose.is_close(0.0, 1.0));
        assert!(!loose.is_close(1.0, 0.0));
    }

    #[test]
    fn test_special_values() {
        let tol = Tolerance::new(1e-5, 1e-8);
        assert!(tol.is_close(f64::INFINITY, f64::INFINITY));
        assert!(!tol.is_close(f64::INFINITY, f64::NEG_INFINITY));
        assert!(!tol.is_close(f64::INFINITY, 1e300));
        assert!(!tol.is_close(f64::NAN, f64::NAN));
        assert!(tol.with_equal_nan(true).is_close(f64::NAN, f64::NAN));
        assert!(!tol.with_equal_nan(true).is_close(f64::NAN, 1.0));
    }

    #[test]
    fn test_compare_reports_first_mismatch() {
        let shape = Shape::from(4);
        let a = f32s(&[1.0, 2.0, 3.5, 4.0]);
        let b = f32s(&[1.0, 2.0, 3.0, 5.0]);
        let report = compare(&shape, &a, &shape, &b, Tolerance::for_dtype(DType::F32)).unwrap();
        assert_eq!(report.mismatches, 2);
        assert_eq!(report.first_mismatch, Some((2, 3.5, 3.0)));
        assert_eq!(report.max_abs_diff, 1.0);
        assert!(!report.all_close());
    }

    #[test]
    fn test_shape_mismatch() {
        let a = f32s(&[1.0, 2.0, 3.0, 4.0]);
        let r = all_close(
            &Shape::from((2, 2)),
            &a,
            &Shape::from(4),
            &a,
            Tolerance::for_dtype(DType::F32),
        );
        assert!(matches!(r, Err(Error::ShapeMismatch { .. })));
    }
}
