//! Protocol constants

/// Handshake protocol version (C0/S0)
pub const RTMP_VERSION: u8 = 3;

/// Size of C1/S1/C2/S2 handshake packets
pub const HANDSHAKE_SIZE: usize = 1536;

/// Chunk size every connection starts with
pub const DEFAULT_CHUNK_SIZE: u32 = 128;

/// Chunk size commonly negotiated by encoders
pub const RECOMMENDED_CHUNK_SIZE: u32 = 4096;

/// Largest chunk size accepted (message lengths are 24-bit)
pub const MAX_CHUNK_SIZE: u32 = 0xFF_FFFF;

/// Timestamp field value that signals an extended timestamp follows
pub const EXTENDED_TIMESTAMP_SENTINEL: u32 = 0xFF_FFFF;

/// Largest message length representable in the 24-bit length field
pub const MAX_MESSAGE_LENGTH: u32 = 0xFF_FFFF;

/// Chunk stream ids below this are basic header escape codes
pub const MIN_CHUNK_STREAM_ID: u32 = 3;

/// Largest id that fits in the one-byte basic header
pub const MAX_INLINE_CHUNK_STREAM_ID: u32 = 63;

/// Largest id that fits in the two-byte basic header
pub const MAX_TWO_BYTE_CHUNK_STREAM_ID: u32 = 319;

/// Largest id that fits in the three-byte basic header
pub const MAX_CHUNK_STREAM_ID: u32 = 65599;

/// Chunk stream used for protocol control messages
pub const CSID_PROTOCOL_CONTROL: u32 = 2;

/// Message type ids (protocol control)
pub const MSG_SET_CHUNK_SIZE: u8 = 1;
pub const MSG_ABORT: u8 = 2;
pub const MSG_ACKNOWLEDGEMENT: u8 = 3;
pub const MSG_USER_CONTROL: u8 = 4;
pub const MSG_WINDOW_ACK_SIZE: u8 = 5;
pub const MSG_SET_PEER_BANDWIDTH: u8 = 6;

/// Message type ids (media and data)
pub const MSG_AUDIO: u8 = 8;
pub const MSG_VIDEO: u8 = 9;
pub const MSG_DATA_AMF0: u8 = 18;
pub const MSG_COMMAND_AMF0: u8 = 20;
