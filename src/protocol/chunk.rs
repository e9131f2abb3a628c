//! Chunk wire format and encoding
//!
//! Every message is sent as one or more chunks. A chunk is a basic header, a
//! message header whose size depends on the 2-bit chunk type, an optional
//! extended timestamp, and at most one chunk-size worth of payload:
//!
//! ```text
//! +--------------+----------------+--------------------+--------------+
//! | Basic Header | Message Header | Extended Timestamp | Chunk Data   |
//! | (1-3 bytes)  | (0/3/7/11)     | (0 or 4 bytes)     | (<= chunk sz)|
//! +--------------+----------------+--------------------+--------------+
//!
//! Type 0 (11 bytes): timestamp(3) length(3) type id(1) stream id(4, LE)
//! Type 1 (7 bytes):  delta(3) length(3) type id(1)
//! Type 2 (3 bytes):  delta(3)
//! Type 3 (0 bytes):  everything inherited from the chunk stream
//! ```
//!
//! A timestamp or delta of 0xFFFFFF or more is written as the 0xFFFFFF
//! sentinel followed by the full 32-bit value in the extended timestamp field.

use std::collections::HashMap;

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::ChunkError;
use crate::protocol::constants::*;

/// Chunk header type, the top two bits of the basic header
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ChunkType {
    /// Type 0: full message header
    #[default]
    Full = 0,
    /// Type 1: no message stream id
    NoStreamId = 1,
    /// Type 2: timestamp delta only
    TimestampDelta = 2,
    /// Type 3: no message header
    Continuation = 3,
}

impl ChunkType {
    /// Decode from the two type bits
    pub fn from_bits(bits: u8) -> Self {
        match bits & 0x03 {
            0 => ChunkType::Full,
            1 => ChunkType::NoStreamId,
            2 => ChunkType::TimestampDelta,
            _ => ChunkType::Continuation,
        }
    }

    /// The two type bits
    pub fn bits(self) -> u8 {
        self as u8
    }

    /// Message header length for this type
    pub fn message_header_len(self) -> usize {
        match self {
            ChunkType::Full => 11,
            ChunkType::NoStreamId => 7,
            ChunkType::TimestampDelta => 3,
            ChunkType::Continuation => 0,
        }
    }
}

/// Message-level header fields carried (or inherited) by a chunk
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ChunkHeader {
    /// Chunk stream id (3..=65599)
    pub chunk_stream_id: u32,
    /// Absolute timestamp for type 0, delta otherwise
    pub timestamp: u32,
    /// Message length in bytes
    pub message_length: u32,
    /// Message type id
    pub message_type_id: u8,
    /// Message stream id
    pub message_stream_id: u32,
}

impl ChunkHeader {
    /// Create a header
    pub fn new(
        chunk_stream_id: u32,
        timestamp: u32,
        message_length: u32,
        message_type_id: u8,
        message_stream_id: u32,
    ) -> Self {
        Self {
            chunk_stream_id,
            timestamp,
            message_length,
            message_type_id,
            message_stream_id,
        }
    }

    /// Value written to the 24-bit timestamp field
    pub fn timestamp_field(&self) -> u32 {
        self.timestamp.min(EXTENDED_TIMESTAMP_SENTINEL)
    }

    /// Whether the timestamp needs the extended field
    pub fn has_extended_timestamp(&self) -> bool {
        self.timestamp >= EXTENDED_TIMESTAMP_SENTINEL
    }
}

/// Length of the basic header for a chunk stream id
pub fn basic_header_len(chunk_stream_id: u32) -> Result<usize, ChunkError> {
    match chunk_stream_id {
        0..=2 => Err(ChunkError::ReservedChunkStreamId(chunk_stream_id)),
        3..=MAX_INLINE_CHUNK_STREAM_ID => Ok(1),
        64..=MAX_TWO_BYTE_CHUNK_STREAM_ID => Ok(2),
        320..=MAX_CHUNK_STREAM_ID => Ok(3),
        _ => Err(ChunkError::ChunkStreamIdOutOfRange(chunk_stream_id)),
    }
}

/// Number of chunks a message of `len` bytes needs at `chunk_size`
pub fn chunk_count(len: usize, chunk_size: usize) -> usize {
    if len == 0 {
        1
    } else {
        len.div_ceil(chunk_size)
    }
}

/// Encode one chunk
///
/// Writes the headers for `chunk_type` and up to `max_chunk_size` bytes of
/// `payload`. Returns the encoded chunk and the payload bytes that did not
/// fit; the caller sends those as [`ChunkType::Continuation`] chunks with the
/// same header. Nothing is produced on error.
pub fn encode_chunk<'a>(
    header: &ChunkHeader,
    chunk_type: ChunkType,
    payload: &'a [u8],
    max_chunk_size: usize,
) -> Result<(Bytes, &'a [u8]), ChunkError> {
    if payload.is_empty() {
        return Err(ChunkError::EmptyPayload);
    }
    if max_chunk_size == 0 || max_chunk_size > MAX_CHUNK_SIZE as usize {
        return Err(ChunkError::InvalidChunkSize(max_chunk_size));
    }
    if header.message_length > MAX_MESSAGE_LENGTH {
        return Err(ChunkError::MessageTooLong(header.message_length as usize));
    }
    let basic_len = basic_header_len(header.chunk_stream_id)?;

    let split = payload.len().min(max_chunk_size);
    let extended_len = if header.has_extended_timestamp() { 4 } else { 0 };
    let mut buf =
        BytesMut::with_capacity(basic_len + chunk_type.message_header_len() + extended_len + split);

    put_basic_header(&mut buf, chunk_type, header.chunk_stream_id);
    put_message_header(&mut buf, header, chunk_type);
    buf.put_slice(&payload[..split]);

    Ok((buf.freeze(), &payload[split..]))
}

fn put_basic_header(buf: &mut BytesMut, chunk_type: ChunkType, chunk_stream_id: u32) {
    let fmt = chunk_type.bits() << 6;
    match chunk_stream_id {
        3..=MAX_INLINE_CHUNK_STREAM_ID => buf.put_u8(fmt | chunk_stream_id as u8),
        64..=MAX_TWO_BYTE_CHUNK_STREAM_ID => {
            buf.put_u8(fmt);
            buf.put_u8((chunk_stream_id - 64) as u8);
        }
        _ => {
            buf.put_u8(fmt | 1);
            buf.put_u16_le((chunk_stream_id - 64) as u16);
        }
    }
}

fn put_message_header(buf: &mut BytesMut, header: &ChunkHeader, chunk_type: ChunkType) {
    match chunk_type {
        ChunkType::Full => {
            buf.put_uint(header.timestamp_field() as u64, 3);
            buf.put_uint(header.message_length as u64, 3);
            buf.put_u8(header.message_type_id);
            // Message stream id is the one little-endian field
            buf.put_u32_le(header.message_stream_id);
        }
        ChunkType::NoStreamId => {
            buf.put_uint(header.timestamp_field() as u64, 3);
            buf.put_uint(header.message_length as u64, 3);
            buf.put_u8(header.message_type_id);
        }
        ChunkType::TimestampDelta => {
            buf.put_uint(header.timestamp_field() as u64, 3);
        }
        ChunkType::Continuation => {}
    }

    if header.has_extended_timestamp() {
        buf.put_u32(header.timestamp);
    }
}

/// Last header sent on a chunk stream
#[derive(Debug, Clone, Copy)]
struct SentState {
    /// Header as written (timestamp field holds absolute or delta)
    header: ChunkHeader,
    /// Absolute timestamp of the last message
    timestamp: u32,
    /// Delta a type 3 chunk opening a new message would repeat
    delta: u32,
}

/// Stateful message encoder
///
/// Splits whole messages into chunks and compresses headers against the last
/// header sent on the same chunk stream.
#[derive(Debug)]
pub struct ChunkEncoder {
    chunk_size: usize,
    streams: HashMap<u32, SentState>,
}

impl ChunkEncoder {
    /// Create an encoder using the default chunk size
    pub fn new() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE as usize,
            streams: HashMap::new(),
        }
    }

    /// Current outgoing chunk size
    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Change the outgoing chunk size
    pub fn set_chunk_size(&mut self, size: u32) -> Result<(), ChunkError> {
        if size == 0 || size > MAX_CHUNK_SIZE {
            return Err(ChunkError::InvalidChunkSize(size as usize));
        }
        self.chunk_size = size as usize;
        Ok(())
    }

    /// Encode a whole message into its chunks
    ///
    /// `header.timestamp` is the absolute message timestamp; the message
    /// length is taken from `payload`. Payloads longer than
    /// [`MAX_MESSAGE_LENGTH`] are rejected and leave the encoder untouched.
    pub fn encode_message(
        &mut self,
        header: &ChunkHeader,
        payload: &[u8],
    ) -> Result<Vec<Bytes>, ChunkError> {
        if payload.len() > MAX_MESSAGE_LENGTH as usize {
            return Err(ChunkError::MessageTooLong(payload.len()));
        }

        let mut message = *header;
        message.message_length = payload.len() as u32;

        let (chunk_type, sent) = self.select_header(&message);

        let mut chunks = Vec::with_capacity(chunk_count(payload.len(), self.chunk_size));
        let (first, mut rest) = encode_chunk(&sent.header, chunk_type, payload, self.chunk_size)?;
        chunks.push(first);
        while !rest.is_empty() {
            let (chunk, remainder) =
                encode_chunk(&sent.header, ChunkType::Continuation, rest, self.chunk_size)?;
            chunks.push(chunk);
            rest = remainder;
        }

        self.streams.insert(message.chunk_stream_id, sent);
        Ok(chunks)
    }

    /// Pick the smallest header type the receiver can expand correctly
    fn select_header(&self, message: &ChunkHeader) -> (ChunkType, SentState) {
        let full = SentState {
            header: *message,
            timestamp: message.timestamp,
            delta: 0,
        };

        let Some(prev) = self.streams.get(&message.chunk_stream_id) else {
            return (ChunkType::Full, full);
        };
        if prev.header.message_stream_id != message.message_stream_id
            || message.timestamp < prev.timestamp
        {
            return (ChunkType::Full, full);
        }

        let delta = message.timestamp - prev.timestamp;
        let mut header = *message;
        header.timestamp = delta;
        let sent = SentState {
            header,
            timestamp: message.timestamp,
            delta,
        };

        if prev.header.message_length != message.message_length
            || prev.header.message_type_id != message.message_type_id
        {
            (ChunkType::NoStreamId, sent)
        } else if delta != prev.delta {
            (ChunkType::TimestampDelta, sent)
        } else {
            // Repeat the previous header verbatim so extended-timestamp
            // presence matches what the receiver stored
            (
                ChunkType::Continuation,
                SentState {
                    header: prev.header,
                    ..sent
                },
            )
        }
    }
}

impl Default for ChunkEncoder {
    fn default() -> Self {
        Self::new()
    }
}
