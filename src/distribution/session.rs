//! Per-subscriber session tasks
//!
//! Every registered subscriber runs two tasks:
//!
//! - the delivery task drains the session's bounded queue and writes each frame
//!   under the write deadline, interleaving keepalive pings
//! - the receive task reads (and discards) whatever the subscriber sends, which
//!   is how a vanished peer is noticed
//!
//! Whichever task stops first marks the session closed and asks the pool to
//! remove it. The connection is closed once and the pool is asked once,
//! however many paths race to do it.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tokio::time::{interval_at, timeout, Instant, MissedTickBehavior};

use super::config::{DeliveryFormat, KeepaliveFailure, PoolConfig, MIN_TIMER_PERIOD};
use super::transport::{MessageKind, SubscriberConn};
use crate::error::TransportError;
use crate::frame::FrameRef;
use crate::protocol::ChunkType;
use crate::stats::{SessionCounters, SessionStats};

/// Identity of a registered subscriber
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriberId(pub(crate) u64);

impl SubscriberId {
    /// Raw numeric value of the id
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// State shared between a session's tasks and the pool
pub(crate) struct SessionShared {
    closed: watch::Sender<bool>,
    leave_sent: AtomicBool,
    conn_closed: AtomicBool,
    pub(crate) counters: SessionCounters,
}

impl SessionShared {
    fn new() -> Self {
        let (closed, _) = watch::channel(false);
        Self {
            closed,
            leave_sent: AtomicBool::new(false),
            conn_closed: AtomicBool::new(false),
            counters: SessionCounters::new(),
        }
    }

    pub(crate) fn is_closed(&self) -> bool {
        *self.closed.borrow()
    }

    /// Signal both tasks to stop; idempotent
    pub(crate) fn mark_closed(&self) {
        self.closed.send_replace(true);
    }

    async fn wait_closed(&self) {
        let mut rx = self.closed.subscribe();
        while !*rx.borrow_and_update() {
            if rx.changed().await.is_err() {
                return;
            }
        }
    }

    pub(crate) fn stats(&self) -> SessionStats {
        self.counters.snapshot()
    }
}

/// The pool's record of a live session
pub(crate) struct SessionEntry<C> {
    pub(crate) conn: Arc<C>,
    pub(crate) remote_addr: String,
    pub(crate) queue: mpsc::Sender<FrameRef>,
    pub(crate) shared: Arc<SessionShared>,
}

struct SubscriberSession<C> {
    id: SubscriberId,
    conn: Arc<C>,
    remote_addr: String,
    config: PoolConfig,
    shared: Arc<SessionShared>,
    leave_tx: mpsc::Sender<SubscriberId>,
}

/// Start the tasks for a newly registered subscriber
///
/// Must be called from within a tokio runtime.
pub(crate) fn spawn<C: SubscriberConn>(
    id: SubscriberId,
    conn: Arc<C>,
    config: &PoolConfig,
    leave_tx: mpsc::Sender<SubscriberId>,
) -> SessionEntry<C> {
    let remote_addr = conn.remote_addr();
    let (queue, rx) = mpsc::channel(config.session_queue_capacity);
    let shared = Arc::new(SessionShared::new());

    let session = Arc::new(SubscriberSession {
        id,
        conn: Arc::clone(&conn),
        remote_addr: remote_addr.clone(),
        config: config.clone(),
        shared: Arc::clone(&shared),
        leave_tx,
    });

    tokio::spawn(Arc::clone(&session).delivery_loop(rx));
    tokio::spawn(session.receive_loop());

    SessionEntry {
        conn,
        remote_addr,
        queue,
        shared,
    }
}

impl<C: SubscriberConn> SubscriberSession<C> {
    async fn delivery_loop(self: Arc<Self>, mut rx: mpsc::Receiver<FrameRef>) {
        // Config fields are public, so a zero period can bypass the builder
        let period = self.config.keepalive_interval.max(MIN_TIMER_PERIOD);
        let mut keepalive = interval_at(Instant::now() + period, period);
        keepalive.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut awaiting_full_header = self.config.await_full_header;

        loop {
            tokio::select! {
                _ = self.shared.wait_closed() => break,
                _ = keepalive.tick() => {
                    if !self.send_keepalive().await {
                        break;
                    }
                }
                frame = rx.recv() => match frame {
                    Some(frame) => {
                        if !self.deliver(frame, &mut awaiting_full_header).await {
                            break;
                        }
                    }
                    None => {
                        tracing::debug!(id = %self.id, "Delivery queue closed");
                        break;
                    }
                }
            }
        }

        // Whatever is still queued is released, not delivered
        rx.close();
        let mut discarded = 0usize;
        while let Ok(frame) = rx.try_recv() {
            drop(frame);
            discarded += 1;
        }

        self.shared.mark_closed();
        self.close_conn().await;
        self.request_leave().await;

        tracing::debug!(
            id = %self.id,
            subscriber = %self.remote_addr,
            discarded = discarded,
            "Delivery stopped"
        );
    }

    /// Write one frame; false when the session should end
    async fn deliver(&self, frame: FrameRef, awaiting_full_header: &mut bool) -> bool {
        if *awaiting_full_header {
            if frame.chunk_type != ChunkType::Full {
                self.shared.counters.on_skipped();
                return true;
            }
            *awaiting_full_header = false;
        }

        let data: &[u8] = match self.config.delivery_format {
            DeliveryFormat::Payload => &frame.payload,
            DeliveryFormat::Wire => &frame.wire,
        };

        match self.write(MessageKind::Binary, data).await {
            Ok(()) => {
                let sent = self.shared.counters.on_sent(data.len());
                let every = self.config.stats_log_interval;
                if every > 0 && sent % every == 0 {
                    let stats = self.shared.stats();
                    tracing::debug!(
                        id = %self.id,
                        subscriber = %self.remote_addr,
                        frames = stats.frames_sent,
                        bytes = stats.bytes_sent,
                        dropped = stats.frames_dropped,
                        last_len = data.len(),
                        "Delivery stats"
                    );
                }
                true
            }
            Err(e) => {
                tracing::warn!(
                    id = %self.id,
                    subscriber = %self.remote_addr,
                    error = %e,
                    "Frame write failed"
                );
                false
            }
        }
    }

    /// Ping the subscriber; false when the session should end
    async fn send_keepalive(&self) -> bool {
        match self.write(MessageKind::Ping, &[]).await {
            Ok(()) => {
                self.shared.counters.on_keepalive(true);
                tracing::trace!(id = %self.id, "Keepalive sent");
                true
            }
            Err(e) => {
                self.shared.counters.on_keepalive(false);
                match self.config.keepalive_failure {
                    KeepaliveFailure::Log => {
                        tracing::warn!(
                            id = %self.id,
                            subscriber = %self.remote_addr,
                            error = %e,
                            "Keepalive failed"
                        );
                        true
                    }
                    KeepaliveFailure::Close => {
                        tracing::warn!(
                            id = %self.id,
                            subscriber = %self.remote_addr,
                            error = %e,
                            "Keepalive failed, closing session"
                        );
                        false
                    }
                }
            }
        }
    }

    async fn write(&self, kind: MessageKind, data: &[u8]) -> Result<(), TransportError> {
        let deadline = self.config.write_timeout.max(MIN_TIMER_PERIOD);
        match timeout(deadline, self.conn.write_message(kind, data)).await {
            Ok(result) => result,
            Err(_) => Err(TransportError::WriteTimeout),
        }
    }

    async fn receive_loop(self: Arc<Self>) {
        loop {
            tokio::select! {
                _ = self.shared.wait_closed() => break,
                result = self.conn.read_message() => match result {
                    Ok((MessageKind::Close, _)) => {
                        tracing::debug!(id = %self.id, "Subscriber sent close");
                        break;
                    }
                    Ok((kind, data)) => {
                        self.shared.counters.on_received(data.len());
                        tracing::trace!(id = %self.id, kind = ?kind, len = data.len(), "Subscriber message ignored");
                    }
                    Err(e) => {
                        tracing::debug!(id = %self.id, error = %e, "Subscriber read ended");
                        break;
                    }
                }
            }
        }

        self.shared.mark_closed();
        self.request_leave().await;
    }

    async fn close_conn(&self) {
        if !self.shared.conn_closed.swap(true, Ordering::AcqRel) {
            self.conn.close().await;
        }
    }

    async fn request_leave(&self) {
        if !self.shared.leave_sent.swap(true, Ordering::AcqRel) {
            // The pool may already be gone; nothing left to deregister from
            let _ = self.leave_tx.send(self.id).await;
        }
    }
}
