//! Error types
//!
//! Errors are split by the layer that raises them:
//!
//! - [`ChunkError`]: malformed input to the chunk encoder, or malformed /
//!   truncated wire data seen by the decoder. Decode errors are terminal for
//!   the ingesting connection.
//! - [`TransportError`]: a downstream subscriber connection failed. Always
//!   terminal for that one session, never for the pool.
//! - [`HandshakeError`]: the upstream peer failed the handshake.

use std::fmt;
use std::io;

/// Crate result alias
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error type
#[derive(Debug)]
pub enum Error {
    /// I/O error on an upstream socket
    Io(io::Error),
    /// Chunk encoding or decoding failed
    Chunk(ChunkError),
    /// Downstream transport failure
    Transport(TransportError),
    /// Handshake failure
    Handshake(HandshakeError),
    /// The distribution pool is no longer accepting events
    PoolClosed,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Io(e) => write!(f, "I/O error: {}", e),
            Error::Chunk(e) => write!(f, "Chunk error: {}", e),
            Error::Transport(e) => write!(f, "Transport error: {}", e),
            Error::Handshake(e) => write!(f, "Handshake error: {}", e),
            Error::PoolClosed => write!(f, "Distribution pool closed"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(e) => Some(e),
            Error::Chunk(e) => Some(e),
            Error::Transport(e) => Some(e),
            Error::Handshake(e) => Some(e),
            Error::PoolClosed => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Error::Io(e)
    }
}

impl From<ChunkError> for Error {
    fn from(e: ChunkError) -> Self {
        Error::Chunk(e)
    }
}

impl From<TransportError> for Error {
    fn from(e: TransportError) -> Self {
        Error::Transport(e)
    }
}

impl From<HandshakeError> for Error {
    fn from(e: HandshakeError) -> Self {
        Error::Handshake(e)
    }
}

/// Chunk codec errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChunkError {
    /// Encoder was given an empty payload
    EmptyPayload,
    /// Chunk size is zero or above the protocol maximum
    InvalidChunkSize(usize),
    /// Message length does not fit the 3-byte length field
    MessageTooLong(usize),
    /// Chunk stream ids 0-2 belong to the basic header escape scheme
    ReservedChunkStreamId(u32),
    /// Chunk stream id does not fit the 3-byte basic header
    ChunkStreamIdOutOfRange(u32),
    /// A header-compressed chunk referenced a chunk stream with no prior full header
    UnknownChunkStream(u32),
    /// More payload arrived than the message header declared
    MessageLengthExceeded {
        chunk_stream_id: u32,
        declared: u32,
        received: usize,
    },
    /// A new message header arrived while a message was half assembled
    InterruptedMessage(u32),
    /// Input ended inside a chunk or a message
    Truncated,
}

impl ChunkError {
    /// Whether this error was raised by the encoder (a caller bug) rather
    /// than by malformed wire data
    pub fn is_encoding(&self) -> bool {
        matches!(
            self,
            ChunkError::EmptyPayload
                | ChunkError::InvalidChunkSize(_)
                | ChunkError::MessageTooLong(_)
                | ChunkError::ReservedChunkStreamId(_)
                | ChunkError::ChunkStreamIdOutOfRange(_)
        )
    }
}

impl fmt::Display for ChunkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChunkError::EmptyPayload => write!(f, "empty payload"),
            ChunkError::InvalidChunkSize(size) => write!(f, "invalid chunk size: {}", size),
            ChunkError::MessageTooLong(len) => write!(f, "message too long: {} bytes", len),
            ChunkError::ReservedChunkStreamId(id) => {
                write!(f, "reserved chunk stream id: {}", id)
            }
            ChunkError::ChunkStreamIdOutOfRange(id) => {
                write!(f, "chunk stream id out of range: {}", id)
            }
            ChunkError::UnknownChunkStream(id) => {
                write!(f, "no full header seen on chunk stream {}", id)
            }
            ChunkError::MessageLengthExceeded {
                chunk_stream_id,
                declared,
                received,
            } => write!(
                f,
                "chunk stream {}: received {} bytes for a {} byte message",
                chunk_stream_id, received, declared
            ),
            ChunkError::InterruptedMessage(id) => {
                write!(f, "chunk stream {}: new header before message completed", id)
            }
            ChunkError::Truncated => write!(f, "truncated chunk stream"),
        }
    }
}

impl std::error::Error for ChunkError {}

/// Downstream transport errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// Reading from the subscriber failed
    Read(String),
    /// Writing to the subscriber failed
    Write(String),
    /// A write did not complete within the write deadline
    WriteTimeout,
    /// The connection is already closed
    Closed,
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportError::Read(msg) => write!(f, "read failed: {}", msg),
            TransportError::Write(msg) => write!(f, "write failed: {}", msg),
            TransportError::WriteTimeout => write!(f, "write deadline exceeded"),
            TransportError::Closed => write!(f, "connection closed"),
        }
    }
}

impl std::error::Error for TransportError {}

/// Handshake errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandshakeError {
    /// Peer announced a protocol version below 3
    InvalidVersion(u8),
    /// Handshake did not complete in time
    Timeout,
}

impl fmt::Display for HandshakeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HandshakeError::InvalidVersion(v) => write!(f, "invalid version: {}", v),
            HandshakeError::Timeout => write!(f, "handshake timed out"),
        }
    }
}

impl std::error::Error for HandshakeError {}
