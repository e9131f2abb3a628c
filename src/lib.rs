//! RTMP chunk-stream ingest with pooled frame fan-out
//!
//! `chunkcast` reads the chunked message stream an RTMP publisher sends,
//! reassembles each message into a pooled [`Frame`], and hands every frame to
//! any number of live subscribers without copying it.
//!
//! ```text
//!   publisher ──TCP──► IngestServer ──► ChunkDecoder ──► FrameRef
//!                                                          │
//!                                                          ▼
//!                                               DistributionPool ──► subscriber
//!                                                          ├──────► subscriber
//!                                                          └──────► subscriber
//! ```
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use chunkcast::distribution::{DistributionPool, PoolConfig, SubscriberConn};
//! use chunkcast::ingest::{IngestConfig, IngestServer};
//!
//! async fn serve<C: SubscriberConn>(subscribers: Vec<Arc<C>>) -> chunkcast::Result<()> {
//!     let pool = DistributionPool::<C>::with_config(PoolConfig::default());
//!     let handle = pool.handle();
//!     tokio::spawn(pool.run());
//!
//!     for conn in subscribers {
//!         handle.append(conn).await?;
//!     }
//!
//!     IngestServer::new(IngestConfig::default(), handle).run().await
//! }
//! ```

pub mod distribution;
pub mod error;
pub mod frame;
pub mod ingest;
pub mod protocol;
pub mod stats;

pub use distribution::{DistributionPool, PoolConfig, PoolHandle, SubscriberConn, SubscriberId};
pub use error::{ChunkError, Error, Result, TransportError};
pub use frame::{Frame, FramePool, FrameRef};
pub use ingest::{FrameSink, IngestConfig, IngestServer};
pub use protocol::{encode_chunk, ChunkDecoder, ChunkEncoder, ChunkHeader, ChunkType};
