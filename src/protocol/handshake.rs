//! Server-side handshake
//!
//! ```text
//! Publisher                                 chunkcast
//!   |------- C0 (1 byte: version) --------->|
//!   |------- C1 (1536 bytes) -------------->|
//!   |<------ S0 + S1 + S2 ------------------|
//!   |------- C2 (1536 bytes: echo S1) ----->|
//!   |        [chunk stream begins]          |
//! ```
//!
//! Only the simple (digest-free) form is spoken. C2 is read and discarded
//! without checking it echoes S1, since several encoders get it wrong.

use std::time::{SystemTime, UNIX_EPOCH};

use bytes::{BufMut, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::{HandshakeError, Result};
use crate::protocol::constants::{HANDSHAKE_SIZE, RTMP_VERSION};

/// Run the server side of the handshake on `stream`
pub async fn accept_handshake<S>(stream: &mut S) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let version = stream.read_u8().await?;
    // Lenient: anything from 3 upwards is accepted
    if version < RTMP_VERSION {
        return Err(HandshakeError::InvalidVersion(version).into());
    }

    let mut c1 = [0u8; HANDSHAKE_SIZE];
    stream.read_exact(&mut c1).await?;

    stream.write_all(&server_response(&c1)).await?;
    stream.flush().await?;

    let mut c2 = [0u8; HANDSHAKE_SIZE];
    stream.read_exact(&mut c2).await?;

    tracing::trace!(version = version, "Handshake complete");
    Ok(())
}

/// Build S0 + S1 + S2 for a received C1
fn server_response(c1: &[u8; HANDSHAKE_SIZE]) -> BytesMut {
    let mut response = BytesMut::with_capacity(1 + HANDSHAKE_SIZE * 2);
    response.put_u8(RTMP_VERSION);
    response.put_slice(&generate_packet());
    response.put_slice(&generate_echo(c1));
    response
}

fn now_millis() -> u32 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u32)
        .unwrap_or(0)
}

/// S1: timestamp(4) + zero(4) + filler(1528)
fn generate_packet() -> [u8; HANDSHAKE_SIZE] {
    let mut packet = [0u8; HANDSHAKE_SIZE];
    let timestamp = now_millis();
    packet[0..4].copy_from_slice(&timestamp.to_be_bytes());

    // Filler only has to be unpredictable enough to not look constant
    let mut seed = timestamp as u64 | 1;
    for chunk in packet[8..].chunks_mut(8) {
        seed = seed.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
        let bytes = seed.to_le_bytes();
        chunk.copy_from_slice(&bytes[..chunk.len()]);
    }
    packet
}

/// S2: the peer's C1 with our read time in bytes 4-7
fn generate_echo(peer: &[u8; HANDSHAKE_SIZE]) -> [u8; HANDSHAKE_SIZE] {
    let mut echo = *peer;
    echo[4..8].copy_from_slice(&now_millis().to_be_bytes());
    echo
}

#[cfg(test)]
mod tests {
    use tokio_test::io::Builder;

    use super::*;
    use crate::error::Error;

    #[tokio::test]
    async fn test_accept_handshake() {
        let (mut client, mut server) = tokio::io::duplex(8 * HANDSHAKE_SIZE);
        let c1 = [7u8; HANDSHAKE_SIZE];

        let server_task = tokio::spawn(async move {
            accept_handshake(&mut server).await.map(|_| server)
        });

        client.write_u8(RTMP_VERSION).await.unwrap();
        client.write_all(&c1).await.unwrap();

        let mut s0s1s2 = vec![0u8; 1 + HANDSHAKE_SIZE * 2];
        client.read_exact(&mut s0s1s2).await.unwrap();
        assert_eq!(s0s1s2[0], RTMP_VERSION);

        // S2 echoes C1 apart from our receive time in bytes 4-7
        let s2 = &s0s1s2[1 + HANDSHAKE_SIZE..];
        assert_eq!(&s2[0..4], &c1[0..4]);
        assert_eq!(&s2[8..], &c1[8..]);

        let s1 = &s0s1s2[1..1 + HANDSHAKE_SIZE];
        client.write_all(s1).await.unwrap();

        assert!(server_task.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn test_invalid_version_rejected() {
        let mut stream = Builder::new().read(&[2]).build();
        let result = accept_handshake(&mut stream).await;
        assert!(matches!(
            result,
            Err(Error::Handshake(HandshakeError::InvalidVersion(2)))
        ));
    }

    #[tokio::test]
    async fn test_truncated_c1() {
        let mut stream = Builder::new().read(&[RTMP_VERSION]).read(&[0u8; 100]).build();
        let result = accept_handshake(&mut stream).await;
        assert!(matches!(result, Err(Error::Io(_))));
    }

    #[test]
    fn test_packet_layout() {
        let packet = generate_packet();
        assert_eq!(&packet[4..8], &[0, 0, 0, 0]);
        assert!(packet[8..100].iter().any(|&b| b != 0));
    }
}
