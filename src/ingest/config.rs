//! Ingest listener configuration

use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;

use crate::protocol::constants::*;

/// Ingest listener options
#[derive(Debug, Clone)]
pub struct IngestConfig {
    /// Address to bind to
    pub bind_addr: SocketAddr,

    /// Maximum concurrent publishers (0 = unlimited)
    pub max_connections: usize,

    /// Incoming chunk size assumed until the publisher sends Set Chunk Size
    pub chunk_size: u32,

    /// Handshake must complete within this time
    pub handshake_timeout: Duration,

    /// Enable TCP_NODELAY (disable Nagle's algorithm)
    pub tcp_nodelay: bool,

    /// Application-level read buffer size
    pub read_buffer_size: usize,

    /// Keep raw chunk bytes on every frame (for wire delivery)
    pub capture_wire: bool,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from((Ipv4Addr::UNSPECIFIED, 1935)),
            max_connections: 0, // Unlimited
            chunk_size: DEFAULT_CHUNK_SIZE,
            handshake_timeout: Duration::from_secs(10),
            tcp_nodelay: true,
            read_buffer_size: 64 * 1024, // 64KB
            capture_wire: false,
        }
    }
}

impl IngestConfig {
    /// Create a new config with custom bind address
    pub fn with_addr(addr: SocketAddr) -> Self {
        Self {
            bind_addr: addr,
            ..Default::default()
        }
    }

    /// Set the bind address
    pub fn bind(mut self, addr: SocketAddr) -> Self {
        self.bind_addr = addr;
        self
    }

    /// Set maximum connections
    pub fn max_connections(mut self, max: usize) -> Self {
        self.max_connections = max;
        self
    }

    /// Set the initial incoming chunk size
    pub fn chunk_size(mut self, size: u32) -> Self {
        self.chunk_size = size.clamp(1, MAX_CHUNK_SIZE);
        self
    }

    /// Set handshake timeout
    pub fn handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    /// Keep raw chunk bytes on frames
    pub fn capture_wire(mut self, enabled: bool) -> Self {
        self.capture_wire = enabled;
        self
    }
}
