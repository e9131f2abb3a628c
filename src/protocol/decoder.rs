//! Chunk stream reassembly
//!
//! The decoder keeps one context per chunk stream id: the last header seen
//! (types 1-3 inherit omitted fields from it), the resolved absolute
//! timestamp, and the message being assembled. Input is consumed one whole
//! chunk at a time, so a buffer that ends mid-chunk is left untouched until
//! more bytes arrive.

use std::collections::HashMap;

use bytes::{Buf, BytesMut};

use crate::error::ChunkError;
use crate::frame::{Frame, FramePool};
use crate::protocol::chunk::{ChunkHeader, ChunkType};
use crate::protocol::constants::*;

/// Per chunk stream state
#[derive(Debug)]
struct StreamContext {
    /// Last header; timestamp holds the absolute value or delta it carried
    header: ChunkHeader,
    /// 24-bit timestamp field of the last type 0-2 header
    timestamp_field: u32,
    /// Absolute timestamp of the current message
    timestamp: u32,
    /// Delta re-applied when a type 3 chunk opens a new message
    delta: u32,
    /// Message being assembled
    frame: Option<Frame>,
}

/// A chunk parsed far enough to know it is complete in the buffer
struct ParsedChunk {
    chunk_type: ChunkType,
    header: ChunkHeader,
    timestamp_field: u32,
    header_len: usize,
    payload_len: usize,
}

/// Streaming chunk decoder
#[derive(Debug)]
pub struct ChunkDecoder {
    streams: HashMap<u32, StreamContext>,
    max_chunk_size: usize,
    pool: FramePool,
    capture_wire: bool,
}

impl ChunkDecoder {
    /// Create a decoder drawing frames from `pool`
    pub fn new(pool: FramePool) -> Self {
        Self {
            streams: HashMap::new(),
            max_chunk_size: DEFAULT_CHUNK_SIZE as usize,
            pool,
            capture_wire: false,
        }
    }

    /// Also keep the raw chunk bytes of every message in [`Frame::wire`]
    pub fn capture_wire(mut self, enabled: bool) -> Self {
        self.capture_wire = enabled;
        self
    }

    /// The pool frames are drawn from
    pub fn pool(&self) -> &FramePool {
        &self.pool
    }

    /// Negotiated incoming chunk size
    pub fn max_chunk_size(&self) -> usize {
        self.max_chunk_size
    }

    /// Apply a Set Chunk Size from the peer
    pub fn set_max_chunk_size(&mut self, size: u32) -> Result<(), ChunkError> {
        if size == 0 || size > MAX_CHUNK_SIZE {
            return Err(ChunkError::InvalidChunkSize(size as usize));
        }
        self.max_chunk_size = size as usize;
        Ok(())
    }

    /// Drop the partially assembled message on a chunk stream
    pub fn abort(&mut self, chunk_stream_id: u32) {
        if let Some(frame) = self
            .streams
            .get_mut(&chunk_stream_id)
            .and_then(|ctx| ctx.frame.take())
        {
            self.pool.release(frame);
        }
    }

    /// Whether any chunk stream holds a half-assembled message
    pub fn has_partial(&self) -> bool {
        self.streams.values().any(|ctx| ctx.frame.is_some())
    }

    /// Check that the input ended on a message boundary
    pub fn finish(&self, leftover: &[u8]) -> Result<(), ChunkError> {
        if !leftover.is_empty() || self.has_partial() {
            return Err(ChunkError::Truncated);
        }
        Ok(())
    }

    /// Decode chunks from `buf` until a message completes
    ///
    /// Returns `Ok(None)` when the buffer holds no further complete chunk.
    pub fn decode(&mut self, buf: &mut BytesMut) -> Result<Option<Frame>, ChunkError> {
        loop {
            let Some(chunk) = self.parse(buf)? else {
                return Ok(None);
            };
            if let Some(frame) = self.commit(chunk, buf) {
                return Ok(Some(frame));
            }
        }
    }

    /// Parse the next chunk header without consuming anything
    fn parse(&self, input: &[u8]) -> Result<Option<ParsedChunk>, ChunkError> {
        let Some(&first) = input.first() else {
            return Ok(None);
        };
        let chunk_type = ChunkType::from_bits(first >> 6);

        let (chunk_stream_id, mut pos) = match first & 0x3F {
            0 => match input.get(1) {
                Some(&b) => (64 + b as u32, 2),
                None => return Ok(None),
            },
            1 => match (input.get(1), input.get(2)) {
                (Some(&lo), Some(&hi)) => (64 + u16::from_le_bytes([lo, hi]) as u32, 3),
                _ => return Ok(None),
            },
            id => (id as u32, 1),
        };

        let ctx = self.streams.get(&chunk_stream_id);
        if chunk_type != ChunkType::Full && ctx.is_none() {
            return Err(ChunkError::UnknownChunkStream(chunk_stream_id));
        }

        let header_end = pos + chunk_type.message_header_len();
        if input.len() < header_end {
            return Ok(None);
        }

        let mut fields = &input[pos..header_end];
        let mut header = ctx.map(|c| c.header).unwrap_or_default();
        header.chunk_stream_id = chunk_stream_id;
        let timestamp_field = match chunk_type {
            ChunkType::Full => {
                let ts = fields.get_uint(3) as u32;
                header.message_length = fields.get_uint(3) as u32;
                header.message_type_id = fields.get_u8();
                header.message_stream_id = fields.get_u32_le();
                ts
            }
            ChunkType::NoStreamId => {
                let ts = fields.get_uint(3) as u32;
                header.message_length = fields.get_uint(3) as u32;
                header.message_type_id = fields.get_u8();
                ts
            }
            ChunkType::TimestampDelta => fields.get_uint(3) as u32,
            ChunkType::Continuation => ctx.map(|c| c.timestamp_field).unwrap_or(0),
        };
        pos = header_end;

        if timestamp_field == EXTENDED_TIMESTAMP_SENTINEL {
            let Some(mut ext) = input.get(pos..pos + 4) else {
                return Ok(None);
            };
            let extended = ext.get_u32();
            if chunk_type != ChunkType::Continuation {
                header.timestamp = extended;
            }
            pos += 4;
        } else if chunk_type != ChunkType::Continuation {
            header.timestamp = timestamp_field;
        }

        let in_progress = ctx.and_then(|c| c.frame.as_ref());
        let remaining = match in_progress {
            Some(frame) if chunk_type != ChunkType::Continuation => {
                let received = frame.payload.len();
                return Err(if (header.message_length as usize) < received {
                    ChunkError::MessageLengthExceeded {
                        chunk_stream_id,
                        declared: header.message_length,
                        received,
                    }
                } else {
                    ChunkError::InterruptedMessage(chunk_stream_id)
                });
            }
            Some(frame) => frame.remaining(),
            None => header.message_length as usize,
        };

        let payload_len = remaining.min(self.max_chunk_size);
        if input.len() < pos + payload_len {
            return Ok(None);
        }

        Ok(Some(ParsedChunk {
            chunk_type,
            header,
            timestamp_field,
            header_len: pos,
            payload_len,
        }))
    }

    /// Consume a parsed chunk, returning the frame it completed
    fn commit(&mut self, chunk: ParsedChunk, buf: &mut BytesMut) -> Option<Frame> {
        let ParsedChunk {
            chunk_type,
            header,
            timestamp_field,
            header_len,
            payload_len,
        } = chunk;
        let wire = buf.split_to(header_len + payload_len);

        let ctx = self
            .streams
            .entry(header.chunk_stream_id)
            .or_insert_with(|| StreamContext {
                header,
                timestamp_field,
                timestamp: 0,
                delta: 0,
                frame: None,
            });

        let mut frame = match ctx.frame.take() {
            Some(frame) => frame,
            None => {
                match chunk_type {
                    ChunkType::Full => {
                        ctx.timestamp = header.timestamp;
                        ctx.delta = 0;
                    }
                    ChunkType::NoStreamId | ChunkType::TimestampDelta => {
                        ctx.delta = header.timestamp;
                        ctx.timestamp = ctx.timestamp.wrapping_add(ctx.delta);
                    }
                    ChunkType::Continuation => {
                        ctx.timestamp = ctx.timestamp.wrapping_add(ctx.delta);
                    }
                }
                let mut frame = self.pool.acquire();
                frame.assign(&header, chunk_type, ctx.timestamp);
                frame
            }
        };

        if chunk_type != ChunkType::Continuation {
            ctx.timestamp_field = timestamp_field;
        }
        ctx.header = header;

        frame.append(&wire[header_len..], header_len);
        if self.capture_wire {
            frame.wire.extend_from_slice(&wire);
        }

        if frame.is_complete() {
            Some(frame)
        } else {
            ctx.frame = Some(frame);
            None
        }
    }
}
