mod common;

use common::{host_f64, npu};
use mmq::prelude::*;
use proptest::prelude::*;

#[test]
fn test_shape_mismatch_is_an_error() {
    let a = host_f64(&[1.0; 6], &[2, 3], DType::F32);
    let b = host_f64(&[1.0; 6], &[3, 2], DType::F32);
    assert!(matches!(
        mmq::allclose(&a, &b, 1e-5, 1e-8),
        Err(Error::ShapeMismatch { .. })
    ));
}

#[test]
fn test_npu_and_host_compare_directly() {
    let a = host_f64(&[1.0, 2.0, 3.0], &[3], DType::BF16);
    let b = a.to_device(npu()).unwrap();
    assert!(mmq::allclose(&b, &a, 0.0, 0.0).unwrap());
}

#[test]
fn test_relative_term_uses_expected() {
    let actual = host_f64(&[0.0], &[1], DType::F32);
    let expected = host_f64(&[100.0], &[1], DType::F32);
    // |0 - 100| <= 1.0 * |100|
    assert!(mmq::allclose(&actual, &expected, 1.0, 0.0).unwrap());
    assert!(!mmq::allclose(&expected, &actual, 1.0, 0.0).unwrap());
}

#[test]
fn test_bf16_default_absorbs_one_ulp() {
    // 1.0078125 is one bf16 ulp above 1.0
    let actual = host_f64(&[1.0078125], &[1], DType::BF16);
    let expected = host_f64(&[1.0], &[1], DType::F32);
    assert!(mmq::allclose_default(&actual, &expected).unwrap());
    let tight = host_f64(&[1.0078125], &[1], DType::F32);
    assert!(!mmq::allclose_default(&tight, &expected).unwrap());
}

#[test]
fn test_nan_never_close() {
    let a = host_f64(&[f64::NAN], &[1], DType::F32);
    assert!(!mmq::allclose(&a, &a, 1.0, 1.0).unwrap());
    let report = mmq::close_report(&a, &a, Tolerance::new(1.0, 1.0).with_equal_nan(true)).unwrap();
    assert!(report.all_close());
}

proptest! {
    #[test]
    fn prop_tensor_is_close_to_itself(values in prop::collection::vec(-1e6f64..1e6, 1..64)) {
        let a = host_f64(&values, &[values.len()], DType::F32);
        prop_assert!(mmq::allclose(&a, &a, 0.0, 0.0).unwrap());
    }

    #[test]
    fn prop_within_atol_is_close(
        values in prop::collection::vec(-1e3f64..1e3, 1..32),
        shift in 0.0f64..0.25
    ) {
        let shifted: Vec<f64> = values.iter().map(|v| v + shift).collect();
        let a = host_f64(&shifted, &[values.len()], DType::F32);
        let b = host_f64(&values, &[values.len()], DType::F32);
        // f32 rounding of both sides stays far below the 0.25 margin
        prop_assert!(mmq::allclose(&a, &b, 0.0, 0.5).unwrap());
    }

    #[test]
    fn prop_looser_tolerance_never_fails_more(
        values in prop::collection::vec(-10.0f64..10.0, 1..32),
        noise in prop::collection::vec(-0.1f64..0.1, 32)
    ) {
        let noisy: Vec<f64> = values.iter().zip(&noise).map(|(v, n)| v + n).collect();
        let a = host_f64(&noisy, &[values.len()], DType::F32);
        let b = host_f64(&values, &[values.len()], DType::F32);
        let tight = mmq::close_report(&a, &b, Tolerance::new(1e-3, 1e-3)).unwrap();
        let loose = mmq::close_report(&a, &b, Tolerance::new(1e-2, 1e-2)).unwrap();
        prop_assert!(loose.mismatches <= tight.mismatches);
    }
}
