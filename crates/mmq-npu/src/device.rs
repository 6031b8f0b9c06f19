// NPU device memory
//
// NpuDevice is a cheap handle (Arc) to one initialized device: its config,
// its capacity accounting and its caching pool. NpuSlice<T> is a buffer in
// that device's global memory. The host never reads an NpuSlice directly;
// data crosses the boundary only through htod_copy / dtoh_copy.
//
// Capacity accounting: bytes are charged when the device allocator hands out
// a new buffer and stay charged while the buffer sits in the pool cache.
// They are released when the cache is drained, or when a buffer is dropped
// after its device was finalized.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use half::{bf16, f16};
use once_cell::sync::OnceCell;

use mmq_core::{BackendStorage, CpuStorage, DType, Device, Error, Result};

use crate::config::NpuConfig;
use crate::pool::{NpuMemPool, PoolElem, PoolStats};
use crate::system_info::{device_capability, DeviceInfo};

struct DeviceInner {
    ordinal: usize,
    config: NpuConfig,
    vec_cores: OnceCell<usize>,
    active: AtomicBool,
    allocated: AtomicUsize,
    peak: AtomicUsize,
    pool: NpuMemPool,
}

/// Handle to an initialized NPU. Clonable (uses Arc internally).
#[derive(Clone)]
pub struct NpuDevice {
    inner: Arc<DeviceInner>,
}

impl fmt::Debug for NpuDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NpuDevice(npu:{})", self.inner.ordinal)
    }
}

impl PartialEq for NpuDevice {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl NpuDevice {
    /// Bring up a device context. Only [`crate::context`] calls this; everyone
    /// else goes through the process-wide registry.
    pub(crate) fn open(ordinal: usize, config: NpuConfig) -> Result<Self> {
        config.validate()?;
        // Presence check doubles as the capacity query.
        device_capability(&config, ordinal, DeviceInfo::MemoryCapacity)?;
        Ok(NpuDevice {
            inner: Arc::new(DeviceInner {
                ordinal,
                config,
                vec_cores: OnceCell::new(),
                active: AtomicBool::new(true),
                allocated: AtomicUsize::new(0),
                peak: AtomicUsize::new(0),
                pool: NpuMemPool::new(),
            }),
        })
    }

    pub fn ordinal(&self) -> usize {
        self.inner.ordinal
    }

    /// The device tag for tensors resident here.
    pub fn device(&self) -> Device {
        Device::Npu(self.inner.ordinal)
    }

    pub fn config(&self) -> &NpuConfig {
        &self.inner.config
    }

    /// Whether the device is still initialized (not finalized).
    pub fn is_active(&self) -> bool {
        self.inner.active.load(Ordering::Acquire)
    }

    /// Fail with `DeviceUnavailable` if the device was finalized.
    pub fn ensure_active(&self) -> Result<()> {
        if self.is_active() {
            Ok(())
        } else {
            Err(Error::DeviceUnavailable {
                device: self.device(),
                reason: "device context was finalized".to_string(),
            })
        }
    }

    /// Number of vector cores. Queried once per device, then cached.
    pub fn num_vec_cores(&self) -> Result<usize> {
        self.inner
            .vec_cores
            .get_or_try_init(|| {
                device_capability(&self.inner.config, self.inner.ordinal, DeviceInfo::VectorCoreNum)
            })
            .copied()
    }

    /// `(free, total)` device memory in bytes. Cached pool buffers count as used.
    pub fn memory_info(&self) -> (usize, usize) {
        let total = self.inner.config.memory_bytes;
        let used = self.inner.allocated.load(Ordering::Acquire);
        (total.saturating_sub(used), total)
    }

    /// High-water mark of charged bytes since init.
    pub fn peak_allocated(&self) -> usize {
        self.inner.peak.load(Ordering::Acquire)
    }

    pub fn pool_stats(&self) -> PoolStats {
        self.inner.pool.stats()
    }

    /// Release all cached buffers back to the device allocator.
    pub fn empty_cache(&self) {
        let released = self.inner.pool.drain();
        self.inner.allocated.fetch_sub(released, Ordering::AcqRel);
        tracing::debug!(ordinal = self.inner.ordinal, released, "emptied device cache");
    }

    /// Called by `context::finalize`; later allocations and copies fail.
    pub(crate) fn shutdown(&self) {
        self.inner.active.store(false, Ordering::Release);
        self.empty_cache();
    }

    fn charge(&self, bytes: usize) -> Result<()> {
        let capacity = self.inner.config.memory_bytes;
        let mut current = self.inner.allocated.load(Ordering::Acquire);
        loop {
            let next = current.saturating_add(bytes);
            if next > capacity {
                return Err(Error::OutOfMemory {
                    device: self.device(),
                    requested: bytes,
                    available: capacity.saturating_sub(current),
                });
            }
            match self.inner.allocated.compare_exchange_weak(
                current,
                next,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => {
                    self.inner.peak.fetch_max(next, Ordering::AcqRel);
                    return Ok(());
                }
                Err(actual) => current = actual,
            }
        }
    }

    fn release(&self, bytes: usize) {
        self.inner.allocated.fetch_sub(bytes, Ordering::AcqRel);
    }

    /// Allocate `n` elements. Content is **undefined** when served from the cache.
    pub fn alloc<T: PoolElem>(&self, n: usize) -> Result<NpuSlice<T>> {
        self.ensure_active()?;
        if let Some(data) = self.inner.pool.take::<T>(n) {
            return Ok(NpuSlice {
                data,
                device: self.clone(),
            });
        }

        let bytes = n * std::mem::size_of::<T>();
        if let Err(err) = self.charge(bytes) {
            // Retry once with the cache released, like a caching allocator would.
            self.empty_cache();
            self.charge(bytes).map_err(|_| {
                tracing::warn!(ordinal = self.inner.ordinal, bytes, "device allocation failed");
                err
            })?;
        }
        tracing::trace!(ordinal = self.inner.ordinal, bytes, "device allocation");
        Ok(NpuSlice {
            data: vec![T::default(); n],
            device: self.clone(),
        })
    }

    /// Allocate `n` zeroed elements.
    pub fn alloc_zeros<T: PoolElem>(&self, n: usize) -> Result<NpuSlice<T>> {
        let mut slice = self.alloc::<T>(n)?;
        slice.data.fill(T::default());
        Ok(slice)
    }

    /// Copy host data into a new device buffer.
    pub fn htod_copy<T: PoolElem>(&self, src: &[T]) -> Result<NpuSlice<T>> {
        let mut slice = self.alloc::<T>(src.len())?;
        slice.data.copy_from_slice(src);
        Ok(slice)
    }

    /// Copy a device buffer back into host memory.
    pub fn dtoh_copy<T: PoolElem>(&self, src: &NpuSlice<T>) -> Result<Vec<T>> {
        self.ensure_active()?;
        self.check_owner(src)?;
        Ok(src.data.clone())
    }

    /// Copy a device buffer into a new buffer on the same device.
    pub fn dtod_copy<T: PoolElem>(&self, src: &NpuSlice<T>) -> Result<NpuSlice<T>> {
        self.check_owner(src)?;
        let mut dst = self.alloc::<T>(src.len())?;
        dst.data.copy_from_slice(&src.data);
        Ok(dst)
    }

    fn check_owner<T: PoolElem>(&self, slice: &NpuSlice<T>) -> Result<()> {
        if slice.device != *self {
            return Err(Error::DeviceMismatch {
                expected: self.device(),
                got: slice.device.device(),
            });
        }
        Ok(())
    }
}

/// A typed buffer in NPU global memory.
pub struct NpuSlice<T: PoolElem> {
    data: Vec<T>,
    device: NpuDevice,
}

impl<T: PoolElem> NpuSlice<T> {
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// The device this buffer was allocated on.
    pub fn npu_device(&self) -> &NpuDevice {
        &self.device
    }

    /// Global-memory view for kernels.
    pub(crate) fn as_slice(&self) -> &[T] {
        &self.data
    }

    pub(crate) fn as_mut_slice(&mut self) -> &mut [T] {
        &mut self.data
    }
}

impl<T: PoolElem> Drop for NpuSlice<T> {
    fn drop(&mut self) {
        let data = std::mem::take(&mut self.data);
        if data.is_empty() {
            return;
        }
        if self.device.is_active() {
            self.device.inner.pool.reclaim(data);
        } else {
            self.device.release(data.len() * std::mem::size_of::<T>());
        }
    }
}

impl<T: PoolElem> fmt::Debug for NpuSlice<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NpuSlice(len={}, npu:{})", self.data.len(), self.device.ordinal())
    }
}

// NpuStorage: Device memory for each supported dtype

/// NPU-side storage. F16 and BF16 are stored as raw u16 bit patterns.
#[derive(Debug)]
pub enum NpuStorage {
    F32(NpuSlice<f32>),
    F16(NpuSlice<u16>),
    BF16(NpuSlice<u16>),
}

impl BackendStorage for NpuStorage {
    fn dtype(&self) -> DType {
        match self {
            NpuStorage::F32(_) => DType::F32,
            NpuStorage::F16(_) => DType::F16,
            NpuStorage::BF16(_) => DType::BF16,
        }
    }

    fn len(&self) -> usize {
        match self {
            NpuStorage::F32(s) => s.len(),
            NpuStorage::F16(s) => s.len(),
            NpuStorage::BF16(s) => s.len(),
        }
    }

    fn device(&self) -> Device {
        self.npu_device().device()
    }
}

impl NpuStorage {
    /// The device holding this buffer.
    pub fn npu_device(&self) -> &NpuDevice {
        match self {
            NpuStorage::F32(s) => s.npu_device(),
            NpuStorage::F16(s) => s.npu_device(),
            NpuStorage::BF16(s) => s.npu_device(),
        }
    }

    /// Allocate `n` zeroed elements of `dtype`.
    pub fn zeros(device: &NpuDevice, n: usize, dtype: DType) -> Result<Self> {
        Ok(match dtype {
            DType::F32 => NpuStorage::F32(device.alloc_zeros(n)?),
            DType::F16 => NpuStorage::F16(device.alloc_zeros(n)?),
            DType::BF16 => NpuStorage::BF16(device.alloc_zeros(n)?),
        })
    }

    /// Allocate `n` elements of `dtype` without initializing them.
    pub fn uninit(device: &NpuDevice, n: usize, dtype: DType) -> Result<Self> {
        Ok(match dtype {
            DType::F32 => NpuStorage::F32(device.alloc(n)?),
            DType::F16 => NpuStorage::F16(device.alloc(n)?),
            DType::BF16 => NpuStorage::BF16(device.alloc(n)?),
        })
    }

    /// Host → device copy.
    pub fn from_host(device: &NpuDevice, src: &CpuStorage) -> Result<Self> {
        let storage = match src {
            CpuStorage::F32(v) => NpuStorage::F32(device.htod_copy(v)?),
            CpuStorage::F16(v) => {
                let bits: Vec<u16> = v.iter().map(|x| x.to_bits()).collect();
                NpuStorage::F16(device.htod_copy(&bits)?)
            }
            CpuStorage::BF16(v) => {
                let bits: Vec<u16> = v.iter().map(|x| x.to_bits()).collect();
                NpuStorage::BF16(device.htod_copy(&bits)?)
            }
        };
        tracing::trace!(
            ordinal = device.ordinal(),
            bytes = storage.size_in_bytes(),
            "htod copy"
        );
        Ok(storage)
    }

    /// Device → host copy.
    pub fn to_host(&self) -> Result<CpuStorage> {
        let dev = self.npu_device();
        let storage = match self {
            NpuStorage::F32(s) => CpuStorage::F32(dev.dtoh_copy(s)?),
            NpuStorage::F16(s) => {
                CpuStorage::F16(dev.dtoh_copy(s)?.into_iter().map(f16::from_bits).collect())
            }
            NpuStorage::BF16(s) => {
                CpuStorage::BF16(dev.dtoh_copy(s)?.into_iter().map(bf16::from_bits).collect())
            }
        };
        tracing::trace!(
            ordinal = dev.ordinal(),
            bytes = storage.size_in_bytes(),
            "dtoh copy"
        );
        Ok(storage)
    }

    /// Deep copy into a fresh buffer on the same device.
    pub fn try_clone(&self) -> Result<Self> {
        let dev = self.npu_device();
        Ok(match self {
            NpuStorage::F32(s) => NpuStorage::F32(dev.dtod_copy(s)?),
            NpuStorage::F16(s) => NpuStorage::F16(dev.dtod_copy(s)?),
            NpuStorage::BF16(s) => NpuStorage::BF16(dev.dtod_copy(s)?),
        })
    }
}
