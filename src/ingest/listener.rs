//! Ingest listener
//!
//! Handles the TCP accept loop and spawns one read loop per publisher.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Semaphore;
use tokio::time::timeout;

use super::config::IngestConfig;
use super::connection::{ingest_stream, IngestSummary};
use super::FrameSink;
use crate::error::{HandshakeError, Result};
use crate::frame::FramePool;
use crate::protocol::{accept_handshake, ChunkDecoder};

/// Accepts publishers and feeds their frames into a sink
pub struct IngestServer<S: FrameSink> {
    config: IngestConfig,
    sink: Arc<S>,
    frame_pool: FramePool,
    next_connection_id: AtomicU64,
    connection_semaphore: Option<Arc<Semaphore>>,
}

impl<S: FrameSink> IngestServer<S> {
    /// Create a new server with the given configuration and sink
    pub fn new(config: IngestConfig, sink: S) -> Self {
        Self::with_frame_pool(config, sink, FramePool::new())
    }

    /// Create a new server drawing frames from an existing pool
    pub fn with_frame_pool(config: IngestConfig, sink: S, frame_pool: FramePool) -> Self {
        let connection_semaphore = if config.max_connections > 0 {
            Some(Arc::new(Semaphore::new(config.max_connections)))
        } else {
            None
        };

        Self {
            config,
            sink: Arc::new(sink),
            frame_pool,
            next_connection_id: AtomicU64::new(1),
            connection_semaphore,
        }
    }

    /// The pool publisher frames are drawn from
    pub fn frame_pool(&self) -> &FramePool {
        &self.frame_pool
    }

    /// Get the bind address
    pub fn bind_addr(&self) -> SocketAddr {
        self.config.bind_addr
    }

    /// Run the server
    ///
    /// This method blocks until the listener fails to bind.
    pub async fn run(&self) -> Result<()> {
        let listener = TcpListener::bind(self.config.bind_addr).await?;
        tracing::info!(addr = %self.config.bind_addr, "Ingest listening");
        self.accept_loop(&listener).await
    }

    /// Run the server with graceful shutdown
    pub async fn run_until<F>(&self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        let listener = TcpListener::bind(self.config.bind_addr).await?;
        tracing::info!(addr = %self.config.bind_addr, "Ingest listening");
        self.serve_until(listener, shutdown).await
    }

    /// Accept on an already bound listener until `shutdown` resolves
    pub async fn serve_until<F>(&self, listener: TcpListener, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        tokio::select! {
            _ = shutdown => {
                tracing::info!("Shutdown signal received");
                Ok(())
            }
            result = self.accept_loop(&listener) => result,
        }
    }

    async fn accept_loop(&self, listener: &TcpListener) -> Result<()> {
        loop {
            match listener.accept().await {
                Ok((socket, peer_addr)) => {
                    self.handle_connection(socket, peer_addr);
                }
                Err(e) => {
                    tracing::error!(error = %e, "Failed to accept connection");
                }
            }
        }
    }

    fn handle_connection(&self, socket: TcpStream, peer_addr: SocketAddr) {
        // Check connection limit
        let permit = match &self.connection_semaphore {
            Some(sem) => match Arc::clone(sem).try_acquire_owned() {
                Ok(permit) => Some(permit),
                Err(_) => {
                    tracing::warn!(peer = %peer_addr, "Connection rejected: limit reached");
                    return;
                }
            },
            None => None,
        };

        let connection_id = self.next_connection_id.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(
            connection_id = connection_id,
            peer = %peer_addr,
            "New publisher connection"
        );

        if self.config.tcp_nodelay {
            if let Err(e) = socket.set_nodelay(true) {
                tracing::error!(error = %e, "Failed to configure socket");
                return;
            }
        }

        let config = self.config.clone();
        let sink = Arc::clone(&self.sink);
        let frame_pool = self.frame_pool.clone();

        tokio::spawn(async move {
            // Held for the lifetime of the connection
            let _permit = permit;

            match serve_publisher(socket, &config, sink.as_ref(), frame_pool).await {
                Ok(summary) => tracing::info!(
                    connection_id = connection_id,
                    peer = %peer_addr,
                    frames = summary.frames,
                    bytes = summary.bytes_read,
                    "Publisher disconnected"
                ),
                Err(e) => tracing::warn!(
                    connection_id = connection_id,
                    peer = %peer_addr,
                    error = %e,
                    "Publisher connection error"
                ),
            }
        });
    }
}

async fn serve_publisher<S: FrameSink>(
    mut socket: TcpStream,
    config: &IngestConfig,
    sink: &S,
    frame_pool: FramePool,
) -> Result<IngestSummary> {
    timeout(config.handshake_timeout, accept_handshake(&mut socket))
        .await
        .map_err(|_| HandshakeError::Timeout)??;

    let mut decoder = ChunkDecoder::new(frame_pool).capture_wire(config.capture_wire);
    decoder.set_max_chunk_size(config.chunk_size)?;

    ingest_stream(&mut socket, &mut decoder, sink, config.read_buffer_size).await
}
