//! Numerical equivalence of tensors.
//!
//! Device tensors are read back to the host before comparing. Values are
//! widened to f64, so tensors of different dtypes can be compared directly
//! (e.g. an NPU bf16 result against an f32 reference).

use std::borrow::Cow;

use mmq_core::{compare, CloseReport, CpuStorage, Error, Result, Tolerance};

use crate::tensor::{Storage, Tensor};

fn host_view(t: &Tensor) -> Result<Cow<'_, CpuStorage>> {
    match t.storage() {
        Storage::Host(s) => Ok(Cow::Borrowed(s)),
        Storage::Npu(s) => Ok(Cow::Owned(s.to_host()?)),
    }
}

/// Element-wise comparison of `actual` against `expected` with `tol`.
///
/// Fails with `ShapeMismatch` if the shapes differ; nothing is copied off
/// the device in that case.
pub fn close_report(actual: &Tensor, expected: &Tensor, tol: Tolerance) -> Result<CloseReport> {
    if actual.shape() != expected.shape() {
        return Err(Error::ShapeMismatch {
            expected: expected.shape().clone(),
            got: actual.shape().clone(),
        });
    }
    let lhs = host_view(actual)?;
    let rhs = host_view(expected)?;
    let report = compare(actual.shape(), &lhs, expected.shape(), &rhs, tol)?;
    if let Some((idx, x, y)) = report.first_mismatch {
        tracing::debug!(
            mismatches = report.mismatches,
            idx,
            actual = x,
            expected = y,
            max_abs_diff = report.max_abs_diff,
            "tensors not close"
        );
    }
    Ok(report)
}

/// `true` iff every pair satisfies `|x - y| <= atol + rtol * |y|`, where `y`
/// comes from `expected`.
pub fn allclose(actual: &Tensor, expected: &Tensor, rtol: f64, atol: f64) -> Result<bool> {
    Ok(close_report(actual, expected, Tolerance::new(rtol, atol))?.all_close())
}

/// [`allclose`] with the default tolerances for the looser of the two dtypes.
pub fn allclose_default(actual: &Tensor, expected: &Tensor) -> Result<bool> {
    let tol = Tolerance::for_dtypes(actual.dtype(), expected.dtype());
    Ok(close_report(actual, expected, tol)?.all_close())
}
