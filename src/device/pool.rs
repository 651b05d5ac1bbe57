use std::collections::HashMap;
use std::ops::{Deref, DerefMut};
use std::sync::{Arc, Mutex, MutexGuard};

/// Pool configuration for retained pixel buffers.
#[derive(Debug, Clone, Copy)]
pub struct BufferPoolOpts {
    /// Maximum bytes retained across all buckets.
    pub max_pool_bytes: usize,
    /// Maximum number of retained buffers per byte-length bucket.
    pub max_buffers_per_bucket: usize,
}

impl Default for BufferPoolOpts {
    fn default() -> Self {
        Self {
            // An 8x8 movie of a few hundred frames is well under this.
            max_pool_bytes: 1024 * 1024,
            max_buffers_per_bucket: 8,
        }
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct BufferPoolStats {
    pub retained_buffers: usize,
    pub retained_bytes: usize,
    pub alloc_buffers: u64,
    pub alloc_bytes: u64,
    pub reused_buffers: u64,
    pub dropped_on_release: u64,
}

struct PoolState {
    opts: BufferPoolOpts,
    stats: BufferPoolStats,
    buckets: HashMap<usize, Vec<Vec<u8>>>,
}

/// Bounded, size-keyed pool of byte buffers shared between request handlers and the worker.
///
/// Buffers come back automatically when their [`PooledBuffer`] is dropped, so a job that is
/// cancelled or fails still returns its pixels.
#[derive(Clone)]
pub struct BufferPool {
    state: Arc<Mutex<PoolState>>,
}

impl Default for BufferPool {
    fn default() -> Self {
        Self::new(BufferPoolOpts::default())
    }
}

impl std::fmt::Debug for BufferPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BufferPool")
            .field("stats", &self.stats())
            .finish()
    }
}

impl BufferPool {
    pub fn new(opts: BufferPoolOpts) -> Self {
        Self {
            state: Arc::new(Mutex::new(PoolState {
                opts,
                stats: BufferPoolStats::default(),
                buckets: HashMap::new(),
            })),
        }
    }

    // A panic while holding the lock cannot leave the bookkeeping half-updated in a way that
    // matters; keep serving.
    fn lock(&self) -> MutexGuard<'_, PoolState> {
        self.state.lock().unwrap_or_else(|p| p.into_inner())
    }

    pub fn stats(&self) -> BufferPoolStats {
        self.lock().stats.clone()
    }

    /// Borrow a zero-filled buffer of exactly `len` bytes.
    pub fn acquire(&self, len: usize) -> PooledBuffer {
        let reused = {
            let mut st = self.lock();
            let popped = st.buckets.get_mut(&len).and_then(Vec::pop);
            if popped.is_some() {
                st.stats.retained_buffers = st.stats.retained_buffers.saturating_sub(1);
                st.stats.retained_bytes = st.stats.retained_bytes.saturating_sub(len);
                st.stats.reused_buffers = st.stats.reused_buffers.saturating_add(1);
            } else {
                st.stats.alloc_buffers = st.stats.alloc_buffers.saturating_add(1);
                st.stats.alloc_bytes = st.stats.alloc_bytes.saturating_add(len as u64);
            }
            popped
        };

        let data = match reused {
            Some(mut buf) => {
                buf.fill(0);
                buf
            }
            None => vec![0u8; len],
        };

        PooledBuffer {
            data,
            pool: Some(self.clone()),
        }
    }

    fn release(&self, buf: Vec<u8>) {
        let len = buf.len();
        let mut guard = self.lock();
        let st = &mut *guard;
        if len == 0 || st.opts.max_pool_bytes == 0 || st.opts.max_buffers_per_bucket == 0 {
            st.stats.dropped_on_release = st.stats.dropped_on_release.saturating_add(1);
            return;
        }

        if st.stats.retained_bytes.saturating_add(len) > st.opts.max_pool_bytes {
            st.stats.dropped_on_release = st.stats.dropped_on_release.saturating_add(1);
            return;
        }

        let cap = st.opts.max_buffers_per_bucket;
        let bucket = st.buckets.entry(len).or_default();
        if bucket.len() >= cap {
            st.stats.dropped_on_release = st.stats.dropped_on_release.saturating_add(1);
            return;
        }

        bucket.push(buf);
        st.stats.retained_buffers = st.stats.retained_buffers.saturating_add(1);
        st.stats.retained_bytes = st.stats.retained_bytes.saturating_add(len);
    }
}

/// Byte buffer on loan from a [`BufferPool`]; returned on drop.
pub struct PooledBuffer {
    data: Vec<u8>,
    pool: Option<BufferPool>,
}

impl PooledBuffer {
    /// A zero-filled buffer that is simply freed on drop.
    pub fn detached(len: usize) -> Self {
        Self {
            data: vec![0u8; len],
            pool: None,
        }
    }

    pub fn is_pooled(&self) -> bool {
        self.pool.is_some()
    }
}

impl Deref for PooledBuffer {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.data
    }
}

impl DerefMut for PooledBuffer {
    fn deref_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }
}

impl std::fmt::Debug for PooledBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PooledBuffer")
            .field("len", &self.data.len())
            .field("pooled", &self.pool.is_some())
            .finish()
    }
}

impl Drop for PooledBuffer {
    fn drop(&mut self) {
        if let Some(pool) = self.pool.take() {
            pool.release(std::mem::take(&mut self.data));
        }
    }
}
