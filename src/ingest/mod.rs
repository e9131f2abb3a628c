//! Upstream ingest
//!
//! Turns a publisher's chunk stream into frames and hands each completed
//! message to a [`FrameSink`], normally a [`PoolHandle`].
//!
//! ```text
//!   TcpStream ──► accept_handshake ──► ingest_stream ──► FrameSink
//!                                        │    ▲
//!                                        ▼    │ Set Chunk Size / Abort
//!                                      ChunkDecoder
//! ```
//!
//! Protocol control messages that change how the chunk stream is read
//! (Set Chunk Size, Abort) are applied here and never reach the sink.
//! Command handling (connect, publish) is left to the application.

pub mod config;
pub mod connection;
pub mod listener;

use std::future::Future;

use crate::distribution::{PoolHandle, SubscriberConn};
use crate::error::Result;
use crate::frame::FrameRef;

pub use config::IngestConfig;
pub use connection::{ingest_stream, IngestSummary};
pub use listener::IngestServer;

/// Receiver of assembled frames
///
/// Called once per completed message, in arrival order. The sink takes over
/// the caller's reference.
pub trait FrameSink: Send + Sync + 'static {
    fn on_frame_assembled(&self, frame: FrameRef) -> impl Future<Output = Result<()>> + Send;
}

impl<C: SubscriberConn> FrameSink for PoolHandle<C> {
    async fn on_frame_assembled(&self, frame: FrameRef) -> Result<()> {
        self.push_frame(frame).await
    }
}
