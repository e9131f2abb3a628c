//! Fan-out of assembled frames to downstream subscribers
//!
//! One coordinating task owns the registry of sessions; each session owns a
//! bounded queue and the tasks that drain it. Frames are shared, not copied:
//! every enqueue takes a reference and every session gives it back once the
//! write is done, at which point the frame returns to its pool.
//!
//! # Architecture
//!
//! ```text
//!   ingest ──push_frame()──► inbound queue (64)
//!                                  │
//!        append() ──► join (16) ──►│
//!        remove() ──► leave (16) ─►│
//!        stop() ────► watch ──────►│
//!                                  ▼
//!                        ┌───────────────────┐
//!                        │ DistributionPool  │
//!                        │   run() loop      │
//!                        │ sessions: HashMap │
//!                        └─────────┬─────────┘
//!             retain() + try_send  │  (full queue: drop, count)
//!         ┌────────────────────────┼────────────────────────┐
//!         ▼                        ▼                        ▼
//!   [queue (64)]             [queue (64)]             [queue (64)]
//!   delivery task            delivery task            delivery task
//!     write + keepalive        write + keepalive        write + keepalive
//!   receive task             receive task             receive task
//!         │                        │                        │
//!         └── on error: leave ─────┴────────────────────────┘
//! ```
//!
//! A slow subscriber loses frames; it never stalls the pool or its peers.

pub mod config;
pub mod pool;
pub mod session;
pub mod transport;

pub use config::{DeliveryFormat, KeepaliveFailure, PoolConfig};
pub use pool::{DistributionPool, PoolHandle};
pub use session::SubscriberId;
pub use transport::{MessageKind, SubscriberConn};
