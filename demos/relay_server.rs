//! Relay Server - ingests one RTMP chunk stream and relays every message to TCP subscribers
//!
//! Run with: cargo run --example relay_server -- [ingest_addr] [subscriber_addr]
//!
//! This example demonstrates:
//! - Running a `DistributionPool` on its own task
//! - Implementing `SubscriberConn` for a custom transport
//! - Feeding the pool from an `IngestServer`
//!
//! # Subscriber wire format
//!
//! ```text
//! +-----------+----------------+------------------+
//! | kind (1)  | length (4, BE) | data (length)    |
//! +-----------+----------------+------------------+
//!   0 = binary, 1 = text, 2 = ping, 3 = pong, 4 = close
//! ```
//!
//! Try it with `nc localhost 1936 | xxd` while publishing with ffmpeg:
//! `ffmpeg -re -i input.flv -c copy -f flv rtmp://localhost/live/test`
//!
//! No RTMP commands are answered, so clients that wait for `connect` and
//! `publish` responses will stall after the handshake.

use std::net::SocketAddr;
use std::sync::Arc;

use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex;

use chunkcast::distribution::{DistributionPool, MessageKind, PoolConfig, PoolHandle, SubscriberConn};
use chunkcast::ingest::{IngestConfig, IngestServer};
use chunkcast::TransportError;

/// Largest message a subscriber may send us
const MAX_INBOUND_MESSAGE: usize = 64 * 1024;

/// Length-prefixed messages over a plain TCP connection
struct TcpSubscriber {
    peer: SocketAddr,
    reader: Mutex<OwnedReadHalf>,
    writer: Mutex<OwnedWriteHalf>,
}

impl TcpSubscriber {
    fn new(stream: TcpStream, peer: SocketAddr) -> Self {
        let (reader, writer) = stream.into_split();
        Self {
            peer,
            reader: Mutex::new(reader),
            writer: Mutex::new(writer),
        }
    }
}

fn kind_to_byte(kind: MessageKind) -> u8 {
    match kind {
        MessageKind::Binary => 0,
        MessageKind::Text => 1,
        MessageKind::Ping => 2,
        MessageKind::Pong => 3,
        MessageKind::Close => 4,
    }
}

fn kind_from_byte(byte: u8) -> Option<MessageKind> {
    match byte {
        0 => Some(MessageKind::Binary),
        1 => Some(MessageKind::Text),
        2 => Some(MessageKind::Ping),
        3 => Some(MessageKind::Pong),
        4 => Some(MessageKind::Close),
        _ => None,
    }
}

impl SubscriberConn for TcpSubscriber {
    async fn read_message(&self) -> Result<(MessageKind, Bytes), TransportError> {
        let mut reader = self.reader.lock().await;

        let mut header = [0u8; 5];
        reader
            .read_exact(&mut header)
            .await
            .map_err(|e| TransportError::Read(e.to_string()))?;
        let mut fields = &header[..];
        let kind = kind_from_byte(fields.get_u8())
            .ok_or_else(|| TransportError::Read(format!("unknown message kind {}", header[0])))?;
        let len = fields.get_u32() as usize;
        if len > MAX_INBOUND_MESSAGE {
            return Err(TransportError::Read(format!("message too large: {}", len)));
        }

        let mut data = vec![0u8; len];
        reader
            .read_exact(&mut data)
            .await
            .map_err(|e| TransportError::Read(e.to_string()))?;
        Ok((kind, Bytes::from(data)))
    }

    async fn write_message(&self, kind: MessageKind, data: &[u8]) -> Result<(), TransportError> {
        let mut message = BytesMut::with_capacity(5 + data.len());
        message.put_u8(kind_to_byte(kind));
        message.put_u32(data.len() as u32);
        message.put_slice(data);

        let mut writer = self.writer.lock().await;
        writer
            .write_all(&message)
            .await
            .map_err(|e| TransportError::Write(e.to_string()))
    }

    fn remote_addr(&self) -> String {
        self.peer.to_string()
    }

    async fn close(&self) {
        let mut writer = self.writer.lock().await;
        let _ = writer.shutdown().await;
    }
}

async fn accept_subscribers(listener: TcpListener, handle: PoolHandle<TcpSubscriber>) {
    loop {
        match listener.accept().await {
            Ok((stream, peer)) => {
                let _ = stream.set_nodelay(true);
                let conn = Arc::new(TcpSubscriber::new(stream, peer));
                if handle.append(conn).await.is_err() {
                    tracing::info!("Pool closed, no longer accepting subscribers");
                    return;
                }
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to accept subscriber");
            }
        }
    }
}

fn print_usage() {
    eprintln!("Usage: relay_server [ingest_addr] [subscriber_addr]");
    eprintln!();
    eprintln!("  ingest_addr       RTMP publisher address (default 0.0.0.0:1935)");
    eprintln!("  subscriber_addr   TCP subscriber address (default 0.0.0.0:1936)");
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = std::env::args().collect();

    if args.iter().any(|a| a == "--help" || a == "-h") {
        print_usage();
        return Ok(());
    }

    let ingest_addr: SocketAddr = args.get(1).map(String::as_str).unwrap_or("0.0.0.0:1935").parse()?;
    let subscriber_addr: SocketAddr =
        args.get(2).map(String::as_str).unwrap_or("0.0.0.0:1936").parse()?;

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("chunkcast=debug".parse()?)
                .add_directive("relay_server=debug".parse()?),
        )
        .init();

    let pool = DistributionPool::<TcpSubscriber>::with_config(PoolConfig::default());
    let handle = pool.handle();
    let pool_task = tokio::spawn(pool.run());

    let subscribers = TcpListener::bind(subscriber_addr).await?;
    tracing::info!(addr = %subscriber_addr, "Subscribers listening");
    tokio::spawn(accept_subscribers(subscribers, handle.clone()));

    let server = IngestServer::new(IngestConfig::with_addr(ingest_addr), handle.clone());
    server
        .run_until(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;

    handle.stop();
    pool_task.await?;

    let stats = handle.stats();
    tracing::info!(
        frames_in = stats.frames_in,
        fanned_out = stats.frames_fanned_out,
        dropped = stats.frames_dropped,
        "Relay stopped"
    );
    Ok(())
}
