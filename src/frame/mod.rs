//! Pooled, reference-counted frames
//!
//! A [`Frame`] is one reassembled message plus the chunk metadata it arrived
//! with. Frames are hot-path allocations (one per message, shared by every
//! subscriber), so they are recycled through a [`FramePool`] instead of being
//! freed.
//!
//! # Lifecycle
//!
//! ```text
//!   FramePool::acquire() ──► Frame (owned, mutable)
//!                               │  decoder appends payload
//!                               ▼
//!   FramePool::share(frame) ──► FrameRef (refs = 1, held by the producer)
//!                               │
//!          ┌────────────────────┼────────────────────┐
//!          ▼                    ▼                    ▼
//!     retain() +1          retain() +1          retain() +1     (one per session)
//!          │                    │                    │
//!        drop -1              drop -1              drop -1
//!          └──────────► refs == 0 ──► FramePool::release(frame)
//! ```
//!
//! The producer's own reference is dropped once fan-out finishes, so a frame
//! published to nobody goes straight back to the pool.

pub mod buffer;
pub mod pool;

pub use buffer::Frame;
pub use pool::{FramePool, FramePoolStats, FrameRef};
