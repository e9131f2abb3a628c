//! Chunk protocol
//!
//! - [`chunk`]: header types and the chunk encoder
//! - [`decoder`]: reassembly of chunks into frames
//! - [`handshake`]: the server side of the connection handshake
//! - [`constants`]: sizes, sentinels and message type ids

pub mod chunk;
pub mod constants;
pub mod decoder;
pub mod handshake;

pub use chunk::{encode_chunk, ChunkEncoder, ChunkHeader, ChunkType};
pub use decoder::ChunkDecoder;
pub use handshake::accept_handshake;
