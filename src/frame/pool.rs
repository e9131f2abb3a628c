//! Frame pool and shared frame references

use std::ops::Deref;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use super::buffer::Frame;

/// Payload capacity given to freshly allocated frames
pub const DEFAULT_FRAME_CAPACITY: usize = 512;

/// Idle frames kept for reuse before extra frames are freed
pub const DEFAULT_MAX_IDLE: usize = 256;

/// Reuse pool for [`Frame`] allocations
///
/// Cheap to clone; clones share the same idle list.
#[derive(Clone)]
pub struct FramePool {
    inner: Arc<PoolInner>,
}

struct PoolInner {
    idle: Mutex<Vec<Frame>>,
    capacity_hint: usize,
    max_idle: usize,
    allocated: AtomicU64,
    reused: AtomicU64,
    reclaimed: AtomicU64,
}

/// Pool counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FramePoolStats {
    /// Frames allocated because the idle list was empty
    pub allocated: u64,
    /// Frames handed out from the idle list
    pub reused: u64,
    /// Frames returned to the pool
    pub reclaimed: u64,
    /// Frames currently idle
    pub idle: usize,
}

impl FramePool {
    /// Create a pool with default sizing
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_FRAME_CAPACITY, DEFAULT_MAX_IDLE)
    }

    /// Create a pool whose new frames reserve `capacity_hint` payload bytes
    /// and which keeps at most `max_idle` frames around
    pub fn with_capacity(capacity_hint: usize, max_idle: usize) -> Self {
        Self {
            inner: Arc::new(PoolInner {
                idle: Mutex::new(Vec::new()),
                capacity_hint,
                max_idle,
                allocated: AtomicU64::new(0),
                reused: AtomicU64::new(0),
                reclaimed: AtomicU64::new(0),
            }),
        }
    }

    /// Take an empty frame from the pool, allocating if none is idle
    pub fn acquire(&self) -> Frame {
        let reused = self.idle().pop();
        match reused {
            Some(mut frame) => {
                frame.reset();
                self.inner.reused.fetch_add(1, Ordering::Relaxed);
                frame
            }
            None => {
                self.inner.allocated.fetch_add(1, Ordering::Relaxed);
                Frame::with_capacity(self.inner.capacity_hint)
            }
        }
    }

    /// Return a frame nobody references any more
    pub fn release(&self, mut frame: Frame) {
        frame.reset();
        self.inner.reclaimed.fetch_add(1, Ordering::Relaxed);

        let mut idle = self.idle();
        if idle.len() < self.inner.max_idle {
            idle.push(frame);
        }
    }

    /// Publish a finished frame, holding the first reference
    pub fn share(&self, frame: Frame) -> FrameRef {
        FrameRef {
            shared: Arc::new(Shared {
                frame,
                refs: AtomicUsize::new(1),
                pool: self.clone(),
            }),
            counted: true,
        }
    }

    /// Snapshot of the pool counters
    pub fn stats(&self) -> FramePoolStats {
        FramePoolStats {
            allocated: self.inner.allocated.load(Ordering::Relaxed),
            reused: self.inner.reused.load(Ordering::Relaxed),
            reclaimed: self.inner.reclaimed.load(Ordering::Relaxed),
            idle: self.idle().len(),
        }
    }

    fn idle(&self) -> MutexGuard<'_, Vec<Frame>> {
        // The list holds plain data, a panic elsewhere cannot leave it inconsistent
        self.inner
            .idle
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for FramePool {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for FramePool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FramePool")
            .field("capacity_hint", &self.inner.capacity_hint)
            .field("max_idle", &self.inner.max_idle)
            .field("stats", &self.stats())
            .finish()
    }
}

struct Shared {
    frame: Frame,
    refs: AtomicUsize,
    pool: FramePool,
}

impl Drop for Shared {
    // Runs exactly once, when the last FrameRef goes away
    fn drop(&mut self) {
        let frame = std::mem::take(&mut self.frame);
        self.pool.release(frame);
    }
}

/// A counted, read-only holder of a published frame
///
/// `retain()` registers a new holder (+1); dropping or `release()`-ing a
/// holder unregisters it (-1). When the count reaches zero the frame goes back
/// to the pool it was shared from.
pub struct FrameRef {
    shared: Arc<Shared>,
    counted: bool,
}

impl FrameRef {
    /// Register another holder of this frame
    pub fn retain(&self) -> FrameRef {
        self.shared.refs.fetch_add(1, Ordering::AcqRel);
        FrameRef {
            shared: Arc::clone(&self.shared),
            counted: true,
        }
    }

    /// Give up this holder's reference, returning how many remain
    pub fn release(mut self) -> usize {
        self.counted = false;
        self.shared.refs.fetch_sub(1, Ordering::AcqRel) - 1
    }

    /// Current number of holders
    pub fn refs(&self) -> usize {
        self.shared.refs.load(Ordering::Acquire)
    }
}

impl Deref for FrameRef {
    type Target = Frame;

    fn deref(&self) -> &Frame {
        &self.shared.frame
    }
}

impl Drop for FrameRef {
    fn drop(&mut self) {
        if self.counted {
            self.shared.refs.fetch_sub(1, Ordering::AcqRel);
        }
    }
}

impl std::fmt::Debug for FrameRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameRef")
            .field("chunk_stream_id", &self.chunk_stream_id)
            .field("message_type_id", &self.message_type_id)
            .field("timestamp", &self.timestamp)
            .field("len", &self.payload.len())
            .field("refs", &self.refs())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filled(pool: &FramePool, data: &[u8]) -> Frame {
        let mut frame = pool.acquire();
        frame.message_length = data.len() as u32;
        frame.append(data, 12);
        frame
    }

    #[test]
    fn test_acquire_allocates_then_reuses() {
        let pool = FramePool::with_capacity(64, 4);

        let frame = filled(&pool, b"hello");
        pool.release(frame);

        let frame = pool.acquire();
        assert!(frame.payload.is_empty());
        assert_eq!(frame.header_length, 0);

        let stats = pool.stats();
        assert_eq!(stats.allocated, 1);
        assert_eq!(stats.reused, 1);
        assert_eq!(stats.reclaimed, 1);
    }

    #[test]
    fn test_idle_list_bounded() {
        let pool = FramePool::with_capacity(8, 2);
        let frames: Vec<Frame> = (0..5).map(|_| pool.acquire()).collect();
        for frame in frames {
            pool.release(frame);
        }

        let stats = pool.stats();
        assert_eq!(stats.reclaimed, 5);
        assert_eq!(stats.idle, 2);
    }

    #[test]
    fn test_single_holder_reclaimed_on_drop() {
        let pool = FramePool::new();
        let shared = pool.share(filled(&pool, b"abc"));
        assert_eq!(shared.refs(), 1);
        assert_eq!(&shared.payload[..], b"abc");

        drop(shared);
        assert_eq!(pool.stats().reclaimed, 1);
        assert_eq!(pool.stats().idle, 1);
    }

    #[test]
    fn test_reclaimed_only_after_last_release() {
        let pool = FramePool::new();
        let producer = pool.share(filled(&pool, b"abc"));

        let holders: Vec<FrameRef> = (0..3).map(|_| producer.retain()).collect();
        assert_eq!(producer.refs(), 4);

        // Producer lets go of its own reference
        assert_eq!(producer.release(), 3);
        assert_eq!(pool.stats().reclaimed, 0);

        let mut remaining = Vec::new();
        for holder in holders {
            remaining.push(holder.release());
        }
        assert_eq!(remaining, vec![2, 1, 0]);
        assert_eq!(pool.stats().reclaimed, 1);
    }

    #[test]
    fn test_concurrent_release() {
        let pool = FramePool::new();
        let producer = pool.share(filled(&pool, &[7u8; 100]));

        let threads: Vec<_> = (0..8)
            .map(|_| {
                let holder = producer.retain();
                std::thread::spawn(move || {
                    assert_eq!(holder.payload.len(), 100);
                    drop(holder);
                })
            })
            .collect();
        drop(producer);

        for t in threads {
            t.join().unwrap();
        }
        assert_eq!(pool.stats().reclaimed, 1);
    }
}
