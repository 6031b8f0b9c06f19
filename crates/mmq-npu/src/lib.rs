// NPU runtime: host-emulated vector-core accelerator
//
// This crate owns everything that lives "on the device" for mmq:
//
// ARCHITECTURE:
// - NpuConfig describes the visible devices, their vector-core count,
//   memory capacity and tile size (read from MMQ_NPU_* variables)
// - context keeps one NpuDevice per initialized ordinal, process-wide
// - NpuDevice owns the memory accounting and a caching pool; NpuSlice<T>
//   is a device buffer only this crate can read or write
// - NpuStorage is an enum over NpuSlice<T> per dtype. F16 and BF16 are
//   stored as NpuSlice<u16>
// - kernels partitions work with AddTiling and runs one block per vector
//   core; bf16 is computed through f32 scratch buffers
//
// USAGE:
//   let dev = mmq_npu::init(0)?;
//   let x = NpuStorage::from_host(&dev, &host_x)?;
//   let y = NpuStorage::from_host(&dev, &host_y)?;
//   let z = mmq_npu::kernels::add(&x, &y)?.to_host()?;

pub mod config;
pub mod context;
pub mod device;
pub mod kernels;
pub mod pool;
pub mod system_info;
pub mod tiling;

pub use config::NpuConfig;
pub use context::{device, finalize, init, init_with_config, initialized_devices, is_initialized};
pub use device::{NpuDevice, NpuSlice, NpuStorage};
pub use pool::PoolStats;
pub use system_info::{device_capability, DeviceInfo};
pub use tiling::AddTiling;
