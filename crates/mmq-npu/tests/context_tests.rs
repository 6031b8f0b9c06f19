// Device-context lifecycle tests
//
// Contexts are process-wide, so every test here runs under #[serial] and
// leaves the registry as it found it.

use mmq_core::{CpuStorage, DType, Error};
use mmq_npu::{NpuConfig, NpuStorage};
use serial_test::serial;

fn two_devices() -> NpuConfig {
    NpuConfig::default()
        .with_visible_devices(vec![0, 1])
        .with_vec_cores(8)
        .with_memory_mb(16)
}

#[test]
#[serial]
fn test_uninitialized_device_is_unavailable() {
    assert!(!mmq_npu::is_initialized(1));
    assert!(matches!(
        mmq_npu::device(1),
        Err(Error::DeviceUnavailable { .. })
    ));
}

#[test]
#[serial]
fn test_init_is_idempotent() {
    let a = mmq_npu::init_with_config(1, two_devices()).unwrap();
    let b = mmq_npu::init_with_config(1, two_devices().with_vec_cores(2)).unwrap();
    assert_eq!(a, b);
    // the first config wins
    assert_eq!(b.num_vec_cores().unwrap(), 8);
    assert_eq!(mmq_npu::device(1).unwrap(), a);
    assert!(mmq_npu::initialized_devices().contains(&1));
    assert!(mmq_npu::finalize(1).unwrap());
}

#[test]
#[serial]
fn test_invisible_device_fails_to_init() {
    let err = mmq_npu::init_with_config(5, two_devices()).unwrap_err();
    assert!(matches!(err, Error::DeviceUnavailable { .. }));
    assert!(err.is_device_error());
    assert!(!mmq_npu::is_initialized(5));
}

#[test]
#[serial]
fn test_finalize_invalidates_resident_buffers() {
    let dev = mmq_npu::init_with_config(1, two_devices()).unwrap();
    let host = CpuStorage::from_f64_slice(&[1.0, 2.0, 3.0], DType::F32);
    let x = NpuStorage::from_host(&dev, &host).unwrap();

    assert!(mmq_npu::finalize(1).unwrap());
    assert!(!mmq_npu::finalize(1).unwrap());
    assert!(!mmq_npu::is_initialized(1));

    assert!(matches!(x.to_host(), Err(Error::DeviceUnavailable { .. })));
    assert!(matches!(
        mmq_npu::kernels::add(&x, &x),
        Err(Error::DeviceUnavailable { .. })
    ));
}

#[test]
#[serial]
fn test_reinit_after_finalize_gives_fresh_context() {
    let old = mmq_npu::init_with_config(1, two_devices()).unwrap();
    mmq_npu::finalize(1).unwrap();
    let new = mmq_npu::init_with_config(1, two_devices()).unwrap();
    assert_ne!(old, new);
    assert!(new.is_active());
    assert!(!old.is_active());
    mmq_npu::finalize(1).unwrap();
}

#[test]
#[serial]
fn test_add_through_context() {
    let dev = mmq_npu::init_with_config(1, two_devices()).unwrap();
    let hx = CpuStorage::from_f64_slice(&[1.0, 2.0, 3.0, 4.0], DType::BF16);
    let hy = CpuStorage::from_f64_slice(&[0.5, 0.25, -3.0, 4.0], DType::BF16);
    let x = NpuStorage::from_host(&dev, &hx).unwrap();
    let y = NpuStorage::from_host(&dev, &hy).unwrap();
    let z = mmq_npu::kernels::add(&x, &y).unwrap();
    assert_eq!(z.to_host().unwrap().to_f64_vec(), vec![1.5, 2.25, 0.0, 8.0]);

    drop((x, y, z));
    // cached buffers still count against capacity
    assert!(dev.pool_stats().cached_bytes > 0);
    let (free, total) = dev.memory_info();
    assert!(free < total);
    dev.empty_cache();
    assert_eq!(dev.memory_info(), (total, total));
    mmq_npu::finalize(1).unwrap();
}
