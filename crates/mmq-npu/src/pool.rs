// NPU Memory Pool: Caching allocator for device buffer reuse
//
// Freed device buffers are not returned to the device allocator; they are
// cached per element type and element count. A later allocation of the same
// type and count reuses the cached buffer. Cached buffers stay charged
// against device capacity until `drain` releases them.
//
// f16 and bf16 buffers share the u16 free list (they are stored as raw bits).

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

/// Snapshot of the pool's allocation statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStats {
    /// Total bytes currently held in the cache (not in use by tensors).
    pub cached_bytes: usize,
    /// Number of individual buffers currently in the cache.
    pub cached_buffers: usize,
    /// Cumulative cache hits (allocations served from the cache).
    pub hits: u64,
    /// Cumulative cache misses (allocations that went to the device allocator).
    pub misses: u64,
}

/// A per-type free-list: maps element count → stack of free buffers.
struct TypedPool<T> {
    buckets: Mutex<HashMap<usize, Vec<Vec<T>>>>,
}

impl<T> TypedPool<T> {
    fn new() -> Self {
        TypedPool {
            buckets: Mutex::new(HashMap::new()),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<usize, Vec<Vec<T>>>> {
        // A panic while holding the lock leaves the map itself consistent.
        self.buckets.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Try to pop a cached buffer of exactly `n` elements.
    fn try_pop(&self, n: usize) -> Option<Vec<T>> {
        self.lock().get_mut(&n).and_then(|stack| stack.pop())
    }

    /// Push a buffer back into the cache.
    fn push(&self, buf: Vec<T>) {
        let n = buf.len();
        self.lock().entry(n).or_default().push(buf);
    }

    /// Drain all cached buffers, returning the count and total elements freed.
    fn drain(&self) -> (usize, usize) {
        let mut map = self.lock();
        let mut count = 0usize;
        let mut elems = 0usize;
        for (n, stack) in map.drain() {
            count += stack.len();
            elems += n * stack.len();
        }
        (count, elems)
    }

    /// Count of cached buffers and total cached elements.
    fn stats(&self) -> (usize, usize) {
        let map = self.lock();
        let mut count = 0usize;
        let mut elems = 0usize;
        for (n, stack) in map.iter() {
            count += stack.len();
            elems += *n * stack.len();
        }
        (count, elems)
    }
}

/// Element types that have a free list in [`NpuMemPool`].
pub trait PoolElem: Copy + Default + Send + Sync + 'static {
    fn typed_pool(pool: &NpuMemPool) -> &TypedPoolHandle<Self>;
}

/// Opaque handle to one typed free list.
pub struct TypedPoolHandle<T>(TypedPool<T>);

impl PoolElem for u16 {
    fn typed_pool(pool: &NpuMemPool) -> &TypedPoolHandle<Self> {
        &pool.pool_u16
    }
}

impl PoolElem for f32 {
    fn typed_pool(pool: &NpuMemPool) -> &TypedPoolHandle<Self> {
        &pool.pool_f32
    }
}

/// Device-side caching allocator.
pub struct NpuMemPool {
    pool_u16: TypedPoolHandle<u16>,
    pool_f32: TypedPoolHandle<f32>,

    // hit/miss counters
    hits: AtomicU64,
    misses: AtomicU64,
}

impl Default for NpuMemPool {
    fn default() -> Self {
        Self::new()
    }
}

impl NpuMemPool {
    /// Create a new empty memory pool.
    pub fn new() -> Self {
        NpuMemPool {
            pool_u16: TypedPoolHandle(TypedPool::new()),
            pool_f32: TypedPoolHandle(TypedPool::new()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Pop a cached buffer of `n` elements, counting the hit or miss.
    /// The returned buffer content is **undefined** (stale data from its last use).
    pub fn take<T: PoolElem>(&self, n: usize) -> Option<Vec<T>> {
        match T::typed_pool(self).0.try_pop(n) {
            Some(buf) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(buf)
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Return a buffer to the cache.
    pub fn reclaim<T: PoolElem>(&self, buf: Vec<T>) {
        T::typed_pool(self).0.push(buf);
    }

    /// Drop all cached buffers. Returns the number of bytes released.
    pub fn drain(&self) -> usize {
        let (_, e16) = self.pool_u16.0.drain();
        let (_, e32) = self.pool_f32.0.drain();
        e16 * 2 + e32 * 4
    }

    pub fn stats(&self) -> PoolStats {
        let (c16, e16) = self.pool_u16.0.stats();
        let (c32, e32) = self.pool_f32.0.stats();
        PoolStats {
            cached_bytes: e16 * 2 + e32 * 4,
            cached_buffers: c16 + c32,
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }
}
