mod common;

use common::{host_f64, npu, second_ordinal, two_device_config};
use mmq::prelude::*;
use mmq::Dispatcher;
use serial_test::serial;

fn double(inputs: &[&Tensor]) -> Result<Tensor> {
    let data: Vec<f64> = inputs[0].to_f64_vec()?.iter().map(|v| 2.0 * v).collect();
    Tensor::from_f64_slice(&data, inputs[0].shape().clone(), inputs[0].dtype(), inputs[0].device())
}

#[test]
fn test_shape_mismatch() {
    let x = Tensor::allocate((3, 4), DType::F32, npu()).unwrap();
    let y = Tensor::allocate((4, 3), DType::F32, npu()).unwrap();
    assert!(matches!(
        mmq::add(&x, &y),
        Err(Error::ShapeMismatch { .. })
    ));
}

#[test]
fn test_dtype_mismatch() {
    let x = Tensor::allocate((3, 4), DType::F16, npu()).unwrap();
    let y = Tensor::allocate((3, 4), DType::BF16, npu()).unwrap();
    assert!(matches!(
        mmq::add(&x, &y),
        Err(Error::DTypeMismatch {
            expected: DType::F16,
            got: DType::BF16
        })
    ));
}

#[test]
fn test_host_npu_device_mismatch() {
    let x = Tensor::allocate((2, 2), DType::F32, npu()).unwrap();
    let y = Tensor::allocate((2, 2), DType::F32, Device::Host).unwrap();
    let err = mmq::add(&x, &y).unwrap_err();
    assert!(matches!(err, Error::DeviceMismatch { .. }));
    assert!(!err.is_device_error());
}

#[test]
#[serial]
fn test_npu_npu_device_mismatch() {
    mmq_npu::init_with_config(second_ordinal(), two_device_config()).unwrap();
    let x = Tensor::allocate((2, 2), DType::F32, npu()).unwrap();
    let y = Tensor::allocate((2, 2), DType::F32, Device::Npu(second_ordinal())).unwrap();
    assert!(matches!(
        mmq::add(&x, &y),
        Err(Error::DeviceMismatch { .. })
    ));
    drop(y);
    mmq_npu::finalize(second_ordinal()).unwrap();
}

#[test]
fn test_unsupported_operation() {
    let x = Tensor::allocate((2, 2), DType::F32, npu()).unwrap();
    assert!(matches!(
        Dispatcher::global().unwrap().dispatch("mul", &[&x, &x]),
        Err(Error::UnsupportedOperation { .. })
    ));

    let d = Dispatcher::new();
    d.register("double", 1, DType::F32, DeviceKind::Host, double).unwrap();
    assert!(matches!(
        d.dispatch("double", &[&x]),
        Err(Error::UnsupportedOperation { .. })
    ));
    let host = host_f64(&[1.0, 2.0], &[2], DType::F32);
    assert_eq!(d.dispatch("double", &[&host]).unwrap().to_f64_vec().unwrap(), vec![2.0, 4.0]);
}

#[test]
fn test_wrong_arity() {
    let x = Tensor::allocate((2, 2), DType::F32, npu()).unwrap();
    assert!(matches!(
        Dispatcher::global().unwrap().dispatch("add", &[&x]),
        Err(Error::InvalidArgument(_))
    ));
}

#[test]
fn test_output_inherits_inputs() {
    for dtype in DType::ALL {
        let x = Tensor::allocate((5, 7), dtype, npu()).unwrap();
        let z = Dispatcher::global().unwrap().dispatch("add", &[&x, &x]).unwrap();
        assert_eq!(z.dims(), &[5, 7]);
        assert_eq!(z.dtype(), dtype);
        assert_eq!(z.device(), npu());
    }
}

#[test]
fn test_global_registry_is_populated() {
    let d = Dispatcher::global().unwrap();
    for dtype in DType::ALL {
        for kind in [DeviceKind::Host, DeviceKind::Npu] {
            assert!(d.supports("add", dtype, kind), "add/{dtype}/{kind}");
        }
    }
}

#[test]
fn test_uninitialized_device_rejected_before_dispatch() {
    assert!(matches!(
        Tensor::allocate((2, 2), DType::F32, Device::Npu(5)),
        Err(Error::DeviceUnavailable { .. })
    ));
}
