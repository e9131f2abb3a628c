//! Per-publisher read loop

use bytes::{Buf, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt};

use super::FrameSink;
use crate::error::Result;
use crate::frame::Frame;
use crate::protocol::constants::{MSG_ABORT, MSG_SET_CHUNK_SIZE};
use crate::protocol::ChunkDecoder;

/// Totals for one ingested stream
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestSummary {
    /// Frames handed to the sink
    pub frames: u64,
    /// Set Chunk Size and Abort messages applied
    pub control_messages: u64,
    /// Bytes read from the publisher
    pub bytes_read: u64,
}

/// Read a chunk stream to its end, handing every completed message to `sink`
///
/// Returns when the reader reaches EOF on a message boundary. A decode error,
/// a read error, a sink error or EOF in the middle of a chunk or message ends
/// the stream with an error; the caller is expected to drop the connection.
pub async fn ingest_stream<R, S>(
    reader: &mut R,
    decoder: &mut ChunkDecoder,
    sink: &S,
    read_buffer_size: usize,
) -> Result<IngestSummary>
where
    R: AsyncRead + Unpin,
    S: FrameSink,
{
    let mut buf = BytesMut::with_capacity(read_buffer_size.max(1));
    let mut summary = IngestSummary::default();

    loop {
        let n = reader.read_buf(&mut buf).await?;
        if n == 0 {
            decoder.finish(&buf)?;
            tracing::debug!(
                frames = summary.frames,
                bytes = summary.bytes_read,
                "Publisher stream ended"
            );
            return Ok(summary);
        }
        summary.bytes_read += n as u64;

        while let Some(frame) = decoder.decode(&mut buf)? {
            match frame.message_type_id {
                MSG_SET_CHUNK_SIZE | MSG_ABORT => {
                    apply_control(decoder, &frame)?;
                    decoder.pool().release(frame);
                    summary.control_messages += 1;
                }
                _ => {
                    let shared = decoder.pool().share(frame);
                    sink.on_frame_assembled(shared).await?;
                    summary.frames += 1;
                }
            }
        }
    }
}

fn apply_control(decoder: &mut ChunkDecoder, frame: &Frame) -> Result<()> {
    let mut payload = &frame.payload[..];
    if payload.len() < 4 {
        tracing::warn!(
            message_type = frame.message_type_id,
            len = payload.len(),
            "Short protocol control message ignored"
        );
        return Ok(());
    }
    let value = payload.get_u32();

    if frame.message_type_id == MSG_SET_CHUNK_SIZE {
        // Top bit is reserved
        let size = value & 0x7FFF_FFFF;
        decoder.set_max_chunk_size(size)?;
        tracing::debug!(chunk_size = size, "Peer chunk size changed");
    } else {
        decoder.abort(value);
        tracing::debug!(chunk_stream_id = value, "Peer aborted message");
    }
    Ok(())
}
