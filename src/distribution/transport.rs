//! Downstream transport seam
//!
//! The pool is generic over the connection type its subscribers arrive on.
//! Implementations wrap a message-oriented transport (a WebSocket after the
//! upgrade, for instance) and must allow one reader and one writer to use the
//! connection concurrently.

use std::future::Future;

use bytes::Bytes;

use crate::error::TransportError;

/// Kind of a transport message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    /// Frame data
    Binary,
    /// Text signalling
    Text,
    /// Keepalive ping
    Ping,
    /// Keepalive answer
    Pong,
    /// Peer is closing
    Close,
}

/// A downstream subscriber connection
///
/// Write deadlines are applied by the session around `write_message`.
pub trait SubscriberConn: Send + Sync + 'static {
    /// Read the next message
    fn read_message(
        &self,
    ) -> impl Future<Output = Result<(MessageKind, Bytes), TransportError>> + Send;

    /// Write one message
    fn write_message(
        &self,
        kind: MessageKind,
        data: &[u8],
    ) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Remote address, for logging
    fn remote_addr(&self) -> String;

    /// Close the connection
    fn close(&self) -> impl Future<Output = ()> + Send;
}
