//! Reassembled frame

use bytes::BytesMut;

use crate::protocol::chunk::{ChunkHeader, ChunkType};

/// One reassembled message
#[derive(Debug, Default)]
pub struct Frame {
    /// Chunk stream the message arrived on
    pub chunk_stream_id: u32,
    /// Header type of the chunk that opened the message
    pub chunk_type: ChunkType,
    /// Absolute timestamp in milliseconds
    pub timestamp: u32,
    /// Declared message length
    pub message_length: u32,
    /// Message type id
    pub message_type_id: u8,
    /// Message stream id
    pub message_stream_id: u32,
    /// Raw extended timestamp of the opening chunk (0 when absent)
    pub extended_timestamp: u32,
    /// Header bytes (basic + message + extended) across all chunks
    pub header_length: usize,
    /// Message payload
    pub payload: BytesMut,
    /// Exact chunk bytes, headers included (only filled when wire capture is on)
    pub wire: BytesMut,
}

impl Frame {
    /// Create an empty frame with room for `capacity` payload bytes
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            payload: BytesMut::with_capacity(capacity),
            ..Default::default()
        }
    }

    /// Copy message metadata from the header that opened the message
    pub fn assign(&mut self, header: &ChunkHeader, chunk_type: ChunkType, timestamp: u32) {
        self.chunk_stream_id = header.chunk_stream_id;
        self.chunk_type = chunk_type;
        self.timestamp = timestamp;
        self.message_length = header.message_length;
        self.message_type_id = header.message_type_id;
        self.message_stream_id = header.message_stream_id;
        self.extended_timestamp = if header.has_extended_timestamp() {
            header.timestamp
        } else {
            0
        };
    }

    /// Append payload bytes, counting `header_bytes` of chunk header overhead
    pub fn append(&mut self, payload: &[u8], header_bytes: usize) {
        self.payload.extend_from_slice(payload);
        self.header_length += header_bytes;
    }

    /// Bytes still missing before the message is complete
    pub fn remaining(&self) -> usize {
        (self.message_length as usize).saturating_sub(self.payload.len())
    }

    /// Whether the whole declared message has been received
    pub fn is_complete(&self) -> bool {
        self.payload.len() >= self.message_length as usize
    }

    /// Clear data and counters, keeping allocated capacity
    pub fn reset(&mut self) {
        self.payload.clear();
        self.wire.clear();
        self.header_length = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_append_tracks_header_bytes() {
        let mut frame = Frame::with_capacity(16);
        frame.message_length = 6;

        frame.append(b"abc", 12);
        assert_eq!(frame.remaining(), 3);
        assert!(!frame.is_complete());

        frame.append(b"def", 1);
        assert!(frame.is_complete());
        assert_eq!(frame.header_length, 13);
        assert_eq!(&frame.payload[..], b"abcdef");
    }

    #[test]
    fn test_reset_keeps_capacity() {
        let mut frame = Frame::with_capacity(64);
        frame.append(&[1u8; 32], 12);
        frame.wire.extend_from_slice(&[0u8; 44]);

        frame.reset();

        assert!(frame.payload.is_empty());
        assert!(frame.wire.is_empty());
        assert_eq!(frame.header_length, 0);
        assert!(frame.payload.capacity() >= 64);
    }

    #[test]
    fn test_assign_extended_timestamp() {
        let header = ChunkHeader::new(4, 0x0100_0000, 9, 8, 1);
        let mut frame = Frame::default();
        frame.assign(&header, ChunkType::Full, header.timestamp);

        assert_eq!(frame.chunk_stream_id, 4);
        assert_eq!(frame.extended_timestamp, 0x0100_0000);

        let header = ChunkHeader::new(4, 100, 9, 8, 1);
        frame.assign(&header, ChunkType::Full, 100);
        assert_eq!(frame.extended_timestamp, 0);
    }
}
