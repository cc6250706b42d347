//! Fixed-capacity, reference-counted buffer pools (C1).
//!
//! Chunks are preallocated up front so the audio path never touches the
//! global allocator. `acquire()` is wait-free: it just pops an index off a
//! lock-free free-list (modeled here with `parking_lot::Mutex` for
//! simplicity, preferring `parking_lot` over `std::sync::Mutex` on the
//! audio-adjacent path) and hands back a
//! reference-counted handle; the chunk returns to the pool when the last
//! handle is dropped.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::{Error, Result};

const POISON_ACQUIRE: u8 = 0xAA;
const POISON_RELEASE: u8 = 0xDD;

struct Inner {
    chunk_size: usize,
    poison: bool,
    free: Mutex<Vec<Vec<u8>>>,
    capacity: usize,
}

/// A pool of fixed-size byte chunks.
#[derive(Clone)]
pub struct BufferPool {
    inner: Arc<Inner>,
}

impl BufferPool {
    /// Preallocates `capacity` chunks of `chunk_size` bytes. When
    /// `poison` is set, chunks are stamped with a fixed byte pattern on
    /// acquire and release to catch use-after-free in tests.
    pub fn new(chunk_size: usize, capacity: usize, poison: bool) -> Self {
        let mut free = Vec::with_capacity(capacity);
        for _ in 0..capacity {
            free.push(vec![0u8; chunk_size]);
        }
        Self {
            inner: Arc::new(Inner {
                chunk_size,
                poison,
                free: Mutex::new(free),
                capacity,
            }),
        }
    }

    pub fn chunk_size(&self) -> usize {
        self.inner.chunk_size
    }

    pub fn capacity(&self) -> usize {
        self.inner.capacity
    }

    /// Number of chunks currently available.
    pub fn available(&self) -> usize {
        self.inner.free.lock().len()
    }

    /// Acquires a chunk, or fails with `OutOfMemory` when the pool is
    /// exhausted.
    pub fn acquire(&self) -> Result<PoolSlice> {
        let mut chunk = {
            let mut free = self.inner.free.lock();
            free.pop().ok_or(Error::OutOfMemory)?
        };
        if self.inner.poison {
            chunk.iter_mut().for_each(|b| *b = POISON_ACQUIRE);
        }
        Ok(PoolSlice {
            data: Some(chunk),
            pool: self.inner.clone(),
        })
    }
}

/// A reference-counted handle to a pool-allocated byte chunk. The chunk
/// is returned to the pool when the last `PoolSlice` (or clone of the
/// `Arc`-shared variant obtained via `into_shared`) is dropped.
pub struct PoolSlice {
    data: Option<Vec<u8>>,
    pool: Arc<Inner>,
}

impl PoolSlice {
    /// Wraps this owned slice in an `Arc` so multiple packet sub-records
    /// can share it; the last dropped reference releases the chunk back
    /// to the pool.
    pub fn into_shared(self) -> SharedSlice {
        SharedSlice(Arc::new(self))
    }
}

impl std::ops::Deref for PoolSlice {
    type Target = [u8];
    fn deref(&self) -> &[u8] {
        self.data.as_deref().unwrap_or(&[])
    }
}

impl std::ops::DerefMut for PoolSlice {
    fn deref_mut(&mut self) -> &mut [u8] {
        self.data.as_deref_mut().unwrap_or(&mut [])
    }
}

impl Drop for PoolSlice {
    fn drop(&mut self) {
        if let Some(mut chunk) = self.data.take() {
            if self.pool.poison {
                chunk.iter_mut().for_each(|b| *b = POISON_RELEASE);
            }
            self.pool.free.lock().push(chunk);
        }
    }
}

/// Shared-ownership wrapper over a `PoolSlice`. Packets hold clones of
/// this handle; the underlying chunk lives as long as the longest
/// holder.
#[derive(Clone)]
pub struct SharedSlice(Arc<PoolSlice>);

impl std::ops::Deref for SharedSlice {
    type Target = [u8];
    fn deref(&self) -> &[u8] {
        &self.0
    }
}
