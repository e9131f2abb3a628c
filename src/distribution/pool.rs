//! Distribution pool
//!
//! A single coordinating task owns the session registry. Joins, leaves,
//! inbound frames and the stop signal all arrive over channels and are handled
//! one at a time, so the registry needs no lock. Handles are cheap to clone
//! and may be used from any task.

use std::any::Any;
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::{oneshot, watch};

use super::config::PoolConfig;
use super::session::{self, SessionEntry, SubscriberId};
use super::transport::SubscriberConn;
use crate::error::{Error, Result};
use crate::frame::FrameRef;
use crate::stats::{PoolCounters, PoolStats};

/// A connection waiting to be registered, with the caller waiting on its id
struct JoinRequest<C> {
    conn: Arc<C>,
    reply: oneshot::Sender<SubscriberId>,
}

enum PoolEvent<C> {
    Join(JoinRequest<C>),
    Leave(SubscriberId),
    Frame(FrameRef),
    Stop,
}

/// Fan-out of assembled frames to registered subscribers
///
/// Create it, take a [`PoolHandle`], then drive it with [`run`](Self::run)
/// (normally on its own task).
pub struct DistributionPool<C: SubscriberConn> {
    config: PoolConfig,
    sessions: HashMap<SubscriberId, SessionEntry<C>>,
    next_id: u64,
    join_rx: mpsc::Receiver<JoinRequest<C>>,
    leave_rx: mpsc::Receiver<SubscriberId>,
    frame_rx: mpsc::Receiver<FrameRef>,
    stop_rx: watch::Receiver<bool>,
    leave_tx: mpsc::Sender<SubscriberId>,
    handle: PoolHandle<C>,
}

impl<C: SubscriberConn> DistributionPool<C> {
    /// Create a pool with default configuration
    pub fn new() -> Self {
        Self::with_config(PoolConfig::default())
    }

    /// Create a pool with custom configuration
    pub fn with_config(config: PoolConfig) -> Self {
        let (join_tx, join_rx) = mpsc::channel(config.join_capacity.max(1));
        let (leave_tx, leave_rx) = mpsc::channel(config.leave_capacity.max(1));
        let (frame_tx, frame_rx) = mpsc::channel(config.inbound_capacity.max(1));
        let (stop_tx, stop_rx) = watch::channel(false);

        let handle = PoolHandle {
            join_tx,
            leave_tx: leave_tx.clone(),
            frame_tx,
            stop_tx: Arc::new(stop_tx),
            counters: Arc::new(PoolCounters::new()),
        };

        Self {
            config,
            sessions: HashMap::new(),
            next_id: 1,
            join_rx,
            leave_rx,
            frame_rx,
            stop_rx,
            leave_tx,
            handle,
        }
    }

    /// Get the pool configuration
    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    /// A handle for submitting work to this pool
    pub fn handle(&self) -> PoolHandle<C> {
        self.handle.clone()
    }

    /// Process events until stopped
    ///
    /// On stop every session is closed and any frames still queued are
    /// released.
    pub async fn run(mut self) {
        tracing::info!(
            inbound_capacity = self.config.inbound_capacity,
            session_queue_capacity = self.config.session_queue_capacity,
            "Distribution pool started"
        );

        loop {
            let event = tokio::select! {
                Some(request) = self.join_rx.recv() => PoolEvent::Join(request),
                Some(id) = self.leave_rx.recv() => PoolEvent::Leave(id),
                Some(frame) = self.frame_rx.recv() => PoolEvent::Frame(frame),
                _ = self.stop_rx.changed() => PoolEvent::Stop,
                else => PoolEvent::Stop,
            };

            if matches!(event, PoolEvent::Stop) {
                break;
            }

            // A bad event must not take the whole pool down
            let outcome = catch_unwind(AssertUnwindSafe(|| self.handle_event(event)));
            if let Err(panic) = outcome {
                tracing::error!(
                    panic = %panic_message(panic.as_ref()),
                    "Recovered from panic while handling pool event"
                );
            }
        }

        self.shutdown().await;
    }

    fn handle_event(&mut self, event: PoolEvent<C>) {
        match event {
            PoolEvent::Join(request) => self.on_join(request),
            PoolEvent::Leave(id) => self.on_leave(id),
            PoolEvent::Frame(frame) => self.on_frame(frame),
            PoolEvent::Stop => {}
        }
    }

    fn on_join(&mut self, request: JoinRequest<C>) {
        let JoinRequest { conn, reply } = request;

        if let Some(existing) = self
            .sessions
            .iter()
            .find(|(_, entry)| Arc::ptr_eq(&entry.conn, &conn))
            .map(|(id, _)| *id)
        {
            tracing::debug!(id = %existing, "Connection already registered, join ignored");
            let _ = reply.send(existing);
            return;
        }

        let id = SubscriberId(self.next_id);
        self.next_id += 1;
        // The caller gets its id even if starting the session fails below
        let _ = reply.send(id);

        let entry = session::spawn(id, conn, &self.config, self.leave_tx.clone());
        let subscriber = entry.remote_addr.clone();
        self.sessions.insert(id, entry);

        let live = self.sessions.len();
        self.handle.counters.on_join();
        self.handle.counters.set_live_sessions(live);

        tracing::info!(id = %id, subscriber = %subscriber, live = live, "Subscriber joined");
    }

    fn on_leave(&mut self, id: SubscriberId) {
        let Some(entry) = self.sessions.remove(&id) else {
            tracing::debug!(id = %id, "Leave for unknown subscriber ignored");
            return;
        };

        // Dropping the entry drops the queue sender too
        entry.shared.mark_closed();

        let live = self.sessions.len();
        self.handle.counters.on_leave();
        self.handle.counters.set_live_sessions(live);

        let stats = entry.shared.stats();
        tracing::info!(
            id = %id,
            subscriber = %entry.remote_addr,
            live = live,
            frames_sent = stats.frames_sent,
            frames_dropped = stats.frames_dropped,
            duration_secs = stats.duration.as_secs(),
            "Subscriber left"
        );
    }

    fn on_frame(&mut self, frame: FrameRef) {
        let mut delivered = 0u64;
        let mut dropped = 0u64;

        for (id, entry) in &self.sessions {
            if entry.shared.is_closed() {
                continue;
            }
            match entry.queue.try_send(frame.retain()) {
                Ok(()) => delivered += 1,
                Err(TrySendError::Full(rejected)) => {
                    drop(rejected);
                    entry.shared.counters.on_dropped();
                    dropped += 1;
                    tracing::debug!(id = %id, "Delivery queue full, frame dropped");
                }
                Err(TrySendError::Closed(rejected)) => drop(rejected),
            }
        }

        self.handle.counters.on_frame(delivered, dropped);
        // The pool's own reference; with no sessions this reclaims the frame
        drop(frame);
    }

    async fn shutdown(&mut self) {
        self.join_rx.close();
        self.leave_rx.close();
        self.frame_rx.close();

        let sessions = self.sessions.len();
        for (_, entry) in self.sessions.drain() {
            entry.shared.mark_closed();
        }
        self.handle.counters.set_live_sessions(0);

        let mut released = 0usize;
        while let Ok(frame) = self.frame_rx.try_recv() {
            drop(frame);
            released += 1;
        }

        // Connections that never made it into the registry
        while let Ok(request) = self.join_rx.try_recv() {
            request.conn.close().await;
        }

        tracing::info!(
            sessions = sessions,
            released_frames = released,
            "Distribution pool stopped"
        );
    }
}

impl<C: SubscriberConn> Default for DistributionPool<C> {
    fn default() -> Self {
        Self::new()
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Cloneable handle to a running [`DistributionPool`]
pub struct PoolHandle<C> {
    join_tx: mpsc::Sender<JoinRequest<C>>,
    leave_tx: mpsc::Sender<SubscriberId>,
    frame_tx: mpsc::Sender<FrameRef>,
    stop_tx: Arc<watch::Sender<bool>>,
    counters: Arc<PoolCounters>,
}

impl<C> Clone for PoolHandle<C> {
    fn clone(&self) -> Self {
        Self {
            join_tx: self.join_tx.clone(),
            leave_tx: self.leave_tx.clone(),
            frame_tx: self.frame_tx.clone(),
            stop_tx: Arc::clone(&self.stop_tx),
            counters: Arc::clone(&self.counters),
        }
    }
}

impl<C: SubscriberConn> PoolHandle<C> {
    /// Register a subscriber connection
    ///
    /// Waits for the pool task to assign the id. A connection that is already
    /// live is not registered again; its existing id is returned instead.
    pub async fn append(&self, conn: Arc<C>) -> Result<SubscriberId> {
        let (reply, id) = oneshot::channel();
        self.join_tx
            .send(JoinRequest { conn, reply })
            .await
            .map_err(|_| Error::PoolClosed)?;
        // Dropped unanswered only when the pool stopped first
        id.await.map_err(|_| Error::PoolClosed)
    }

    /// Deregister a subscriber; unknown or already removed ids are ignored
    pub async fn remove(&self, id: SubscriberId) -> Result<()> {
        self.leave_tx.send(id).await.map_err(|_| Error::PoolClosed)
    }

    /// Hand an assembled frame to the pool
    ///
    /// Waits while the inbound queue is full. If the pool is gone the frame
    /// is released and `PoolClosed` returned.
    pub async fn push_frame(&self, frame: FrameRef) -> Result<()> {
        self.frame_tx.send(frame).await.map_err(|_| Error::PoolClosed)
    }

    /// Ask the pool to stop
    pub fn stop(&self) {
        self.stop_tx.send_replace(true);
    }

    /// Whether stop has been requested
    pub fn is_stopped(&self) -> bool {
        *self.stop_tx.borrow()
    }

    /// Number of sessions currently registered
    pub fn live_session_count(&self) -> usize {
        self.counters.live_sessions()
    }

    /// Pool-wide counters
    pub fn stats(&self) -> PoolStats {
        self.counters.snapshot()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use bytes::Bytes;
    use tokio::sync::Semaphore;
    use tokio::task::JoinHandle;

    use super::*;
    use crate::distribution::config::{DeliveryFormat, KeepaliveFailure};
    use crate::distribution::transport::mock::{MockConn, MockPeer};
    use crate::distribution::transport::MessageKind;
    use crate::frame::{Frame, FramePool};
    use crate::protocol::{ChunkHeader, ChunkType};

    fn test_config() -> PoolConfig {
        PoolConfig::default()
            .keepalive_interval(Duration::from_secs(3600))
            .write_timeout(Duration::from_millis(200))
    }

    fn start(config: PoolConfig) -> (PoolHandle<MockConn>, JoinHandle<()>) {
        let pool = DistributionPool::with_config(config);
        let handle = pool.handle();
        (handle, tokio::spawn(pool.run()))
    }

    fn make_frame(pool: &FramePool, chunk_type: ChunkType, payload: &[u8]) -> FrameRef {
        let header = ChunkHeader::new(6, 40, payload.len() as u32, 9, 1);
        let mut frame = pool.acquire();
        frame.assign(&header, chunk_type, 40);
        frame.append(payload, 11);
        pool.share(frame)
    }

    async fn wait_until(mut condition: impl FnMut() -> bool) {
        for _ in 0..400 {
            if condition() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("condition not reached in time");
    }

    async fn next_written(peer: &mut MockPeer) -> (MessageKind, Bytes) {
        tokio::time::timeout(Duration::from_secs(2), peer.written.recv())
            .await
            .expect("timed out waiting for a write")
            .expect("connection dropped")
    }

    async fn join(handle: &PoolHandle<MockConn>, conn: MockConn) -> (Arc<MockConn>, SubscriberId) {
        let conn = Arc::new(conn);
        let id = handle.append(Arc::clone(&conn)).await.unwrap();
        (conn, id)
    }

    #[tokio::test]
    async fn test_fan_out_to_all_sessions() {
        let (handle, _task) = start(test_config());
        let frames = FramePool::new();

        let mut peers = Vec::new();
        for i in 0..3 {
            let (conn, peer) = MockConn::new(&format!("10.0.0.{}:4000", i));
            join(&handle, conn).await;
            peers.push(peer);
        }
        wait_until(|| handle.live_session_count() == 3).await;

        for i in 0..5u8 {
            handle
                .push_frame(make_frame(&frames, ChunkType::Full, &[i; 4]))
                .await
                .unwrap();
        }

        for peer in &mut peers {
            for i in 0..5u8 {
                let (kind, data) = next_written(peer).await;
                assert_eq!(kind, MessageKind::Binary);
                assert_eq!(&data[..], &[i; 4]);
            }
        }

        wait_until(|| frames.stats().reclaimed == 5).await;
        let stats = handle.stats();
        assert_eq!(stats.frames_in, 5);
        assert_eq!(stats.frames_fanned_out, 15);
        assert_eq!(stats.frames_dropped, 0);
    }

    #[tokio::test]
    async fn test_frame_without_sessions_is_reclaimed() {
        let (handle, _task) = start(test_config());
        let frames = FramePool::new();

        handle
            .push_frame(make_frame(&frames, ChunkType::Full, b"nobody"))
            .await
            .unwrap();

        wait_until(|| frames.stats().reclaimed == 1).await;
        assert_eq!(frames.stats().idle, 1);
    }

    #[tokio::test]
    async fn test_reclaimed_after_every_session_releases() {
        let (handle, _task) = start(test_config());
        let frames = FramePool::new();
        let gate = Arc::new(Semaphore::new(0));

        let mut peers = Vec::new();
        for i in 0..2 {
            let (conn, peer) = MockConn::new(&format!("10.0.1.{}:4000", i));
            join(&handle, conn.gated(Arc::clone(&gate))).await;
            peers.push(peer);
        }
        wait_until(|| handle.live_session_count() == 2).await;

        let frame = make_frame(&frames, ChunkType::Full, b"shared");
        let held = frame.retain();
        handle.push_frame(frame).await.unwrap();

        // Our reference plus one per session; the pool has dropped its own
        wait_until(|| held.refs() == 3).await;
        assert_eq!(frames.stats().reclaimed, 0);

        gate.add_permits(2);
        for peer in &mut peers {
            assert_eq!(&next_written(peer).await.1[..], b"shared");
        }
        wait_until(|| held.refs() == 1).await;
        assert_eq!(frames.stats().reclaimed, 0);

        assert_eq!(held.release(), 0);
        assert_eq!(frames.stats().reclaimed, 1);
    }

    #[tokio::test]
    async fn test_failing_session_does_not_affect_others() {
        let (handle, _task) = start(test_config());
        let frames = FramePool::new();

        let (good_a, mut peer_a) = MockConn::new("10.0.2.1:4000");
        let (bad, _peer_bad) = MockConn::new("10.0.2.2:4000");
        let (good_b, mut peer_b) = MockConn::new("10.0.2.3:4000");
        join(&handle, good_a).await;
        let (bad, _) = join(&handle, bad.failing_writes()).await;
        join(&handle, good_b).await;
        wait_until(|| handle.live_session_count() == 3).await;

        for i in 0..10u8 {
            handle
                .push_frame(make_frame(&frames, ChunkType::Full, &[i]))
                .await
                .unwrap();
        }

        for peer in [&mut peer_a, &mut peer_b] {
            for i in 0..10u8 {
                assert_eq!(&next_written(peer).await.1[..], &[i]);
            }
        }

        wait_until(|| handle.live_session_count() == 2).await;
        wait_until(|| frames.stats().reclaimed == 10).await;
        assert_eq!(bad.close_count(), 1);
    }

    #[tokio::test]
    async fn test_remove_is_idempotent() {
        let (handle, _task) = start(test_config());

        let (conn, _peer) = MockConn::new("10.0.3.1:4000");
        let (conn, id) = join(&handle, conn).await;
        wait_until(|| handle.live_session_count() == 1).await;

        handle.remove(id).await.unwrap();
        handle.remove(id).await.unwrap();
        handle.remove(SubscriberId(9999)).await.unwrap();

        wait_until(|| handle.live_session_count() == 0).await;
        wait_until(|| conn.close_count() == 1).await;
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(conn.close_count(), 1);
        assert_eq!(handle.stats().sessions_left, 1);
    }

    #[tokio::test]
    async fn test_duplicate_append_registers_once() {
        let (handle, _task) = start(test_config());

        let (conn, _peer) = MockConn::new("10.0.3.2:4000");
        let (conn, first) = join(&handle, conn).await;
        let second = handle.append(Arc::clone(&conn)).await.unwrap();
        assert_eq!(second, first);

        wait_until(|| handle.stats().sessions_joined == 1).await;
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(handle.live_session_count(), 1);
        assert_eq!(handle.stats().sessions_joined, 1);

        // Either returned id removes the one session
        handle.remove(second).await.unwrap();
        wait_until(|| handle.live_session_count() == 0).await;
        wait_until(|| conn.close_count() == 1).await;
        assert_eq!(handle.stats().sessions_left, 1);
    }

    #[tokio::test]
    async fn test_ids_are_unique_per_connection() {
        let (handle, _task) = start(test_config());

        let (a, _peer_a) = MockConn::new("10.0.3.3:4000");
        let (b, _peer_b) = MockConn::new("10.0.3.4:4000");
        let (_, id_a) = join(&handle, a).await;
        let (_, id_b) = join(&handle, b).await;

        assert_ne!(id_a, id_b);
        wait_until(|| handle.live_session_count() == 2).await;
    }

    #[tokio::test]
    async fn test_full_queue_drops_without_blocking() {
        let (handle, _task) = start(test_config().session_queue_capacity(1));
        let frames = FramePool::new();
        let gate = Arc::new(Semaphore::new(0));

        let (conn, mut peer) = MockConn::new("10.0.4.1:4000");
        join(&handle, conn.gated(Arc::clone(&gate))).await;
        wait_until(|| handle.live_session_count() == 1).await;

        let push = async {
            for i in 0..5u8 {
                handle
                    .push_frame(make_frame(&frames, ChunkType::Full, &[i]))
                    .await
                    .unwrap();
            }
        };
        tokio::time::timeout(Duration::from_secs(1), push)
            .await
            .expect("producer blocked by a slow subscriber");

        wait_until(|| handle.stats().frames_in == 5).await;
        let stats = handle.stats();
        // At most one in flight plus one queued
        assert!(stats.frames_dropped >= 3);
        assert_eq!(stats.frames_fanned_out + stats.frames_dropped, 5);

        gate.add_permits(5);
        for _ in 0..stats.frames_fanned_out {
            next_written(&mut peer).await;
        }
        wait_until(|| frames.stats().reclaimed == 5).await;
    }

    #[tokio::test]
    async fn test_keepalive_pings() {
        let (handle, _task) = start(test_config().keepalive_interval(Duration::from_millis(20)));

        let (conn, mut peer) = MockConn::new("10.0.5.1:4000");
        join(&handle, conn).await;

        let (kind, data) = next_written(&mut peer).await;
        assert_eq!(kind, MessageKind::Ping);
        assert!(data.is_empty());
    }

    #[tokio::test]
    async fn test_keepalive_failure_logged_keeps_session() {
        let config = test_config()
            .keepalive_interval(Duration::from_millis(20))
            .keepalive_failure(KeepaliveFailure::Log);
        let (handle, _task) = start(config);
        let frames = FramePool::new();

        let (conn, mut peer) = MockConn::new("10.0.5.2:4000");
        let (conn, _) = join(&handle, conn.failing_pings()).await;
        wait_until(|| handle.live_session_count() == 1).await;

        tokio::time::sleep(Duration::from_millis(120)).await;
        assert_eq!(handle.live_session_count(), 1);
        assert_eq!(conn.close_count(), 0);

        handle
            .push_frame(make_frame(&frames, ChunkType::Full, b"still here"))
            .await
            .unwrap();
        assert_eq!(&next_written(&mut peer).await.1[..], b"still here");
    }

    #[tokio::test]
    async fn test_keepalive_failure_closes_session() {
        let config = test_config()
            .keepalive_interval(Duration::from_millis(20))
            .keepalive_failure(KeepaliveFailure::Close);
        let (handle, _task) = start(config);

        let (conn, _peer) = MockConn::new("10.0.5.3:4000");
        let (conn, _) = join(&handle, conn.failing_pings()).await;

        wait_until(|| handle.stats().sessions_joined == 1).await;
        wait_until(|| handle.live_session_count() == 0).await;
        assert_eq!(conn.close_count(), 1);
    }

    #[tokio::test]
    async fn test_panic_during_join_is_recovered() {
        let (handle, _task) = start(test_config());
        let frames = FramePool::new();

        let (broken, _broken_peer) = MockConn::new("unused");
        join(&handle, broken.panicking()).await;

        let (conn, mut peer) = MockConn::new("10.0.6.1:4000");
        join(&handle, conn).await;
        wait_until(|| handle.live_session_count() == 1).await;

        handle
            .push_frame(make_frame(&frames, ChunkType::Full, b"alive"))
            .await
            .unwrap();
        assert_eq!(&next_written(&mut peer).await.1[..], b"alive");
    }

    #[tokio::test]
    async fn test_zero_keepalive_interval_still_closes_on_disconnect() {
        let config = PoolConfig::default().keepalive_interval(Duration::ZERO);
        let (handle, _task) = start(config);

        let (conn, mut peer) = MockConn::new("10.0.6.3:4000");
        let (conn, _) = join(&handle, conn).await;
        wait_until(|| handle.live_session_count() == 1).await;

        peer.inbound.take();

        wait_until(|| handle.live_session_count() == 0).await;
        wait_until(|| conn.close_count() == 1).await;
    }

    #[tokio::test]
    async fn test_subscriber_disconnect_removes_session() {
        let (handle, _task) = start(test_config());

        let (conn, mut peer) = MockConn::new("10.0.6.2:4000");
        let (conn, _) = join(&handle, conn).await;
        wait_until(|| handle.live_session_count() == 1).await;

        peer.inbound.take();

        wait_until(|| handle.live_session_count() == 0).await;
        wait_until(|| conn.close_count() == 1).await;
    }

    #[tokio::test]
    async fn test_stop_closes_sessions_and_releases_frames() {
        let (handle, task) = start(test_config());
        let frames = FramePool::new();
        let gate = Arc::new(Semaphore::new(0));

        let mut conns = Vec::new();
        let mut peers = Vec::new();
        for i in 0..2 {
            let (conn, peer) = MockConn::new(&format!("10.0.7.{}:4000", i));
            let (conn, _) = join(&handle, conn.gated(Arc::clone(&gate))).await;
            conns.push(conn);
            peers.push(peer);
        }
        wait_until(|| handle.live_session_count() == 2).await;

        for i in 0..4u8 {
            handle
                .push_frame(make_frame(&frames, ChunkType::Full, &[i]))
                .await
                .unwrap();
        }
        wait_until(|| handle.stats().frames_in == 4).await;

        handle.stop();
        assert!(handle.is_stopped());
        tokio::time::timeout(Duration::from_secs(2), task)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(handle.live_session_count(), 0);

        // Blocked writes hit the deadline, then everything is released
        wait_until(|| frames.stats().reclaimed == 4).await;
        for conn in &conns {
            wait_until(|| conn.close_count() == 1).await;
        }

        let (late, _late_peer) = MockConn::new("10.0.7.9:4000");
        assert!(matches!(
            handle.append(Arc::new(late)).await,
            Err(Error::PoolClosed)
        ));
        assert!(matches!(
            handle
                .push_frame(make_frame(&frames, ChunkType::Full, b"late"))
                .await,
            Err(Error::PoolClosed)
        ));
        assert_eq!(frames.stats().reclaimed, 5);
    }

    #[tokio::test]
    async fn test_await_full_header_skips_leading_frames() {
        let (handle, _task) = start(test_config().await_full_header(true));
        let frames = FramePool::new();

        let (conn, mut peer) = MockConn::new("10.0.8.1:4000");
        join(&handle, conn).await;
        wait_until(|| handle.live_session_count() == 1).await;

        handle
            .push_frame(make_frame(&frames, ChunkType::NoStreamId, b"delta"))
            .await
            .unwrap();
        handle
            .push_frame(make_frame(&frames, ChunkType::Continuation, b"more"))
            .await
            .unwrap();
        handle
            .push_frame(make_frame(&frames, ChunkType::Full, b"key"))
            .await
            .unwrap();
        handle
            .push_frame(make_frame(&frames, ChunkType::TimestampDelta, b"after"))
            .await
            .unwrap();

        assert_eq!(&next_written(&mut peer).await.1[..], b"key");
        assert_eq!(&next_written(&mut peer).await.1[..], b"after");
        wait_until(|| frames.stats().reclaimed == 4).await;
    }

    #[tokio::test]
    async fn test_wire_delivery_format() {
        let (handle, _task) = start(test_config().delivery_format(DeliveryFormat::Wire));
        let frames = FramePool::new();

        let (conn, mut peer) = MockConn::new("10.0.8.2:4000");
        join(&handle, conn).await;
        wait_until(|| handle.live_session_count() == 1).await;

        let mut frame = Frame::default();
        frame.assign(&ChunkHeader::new(4, 0, 2, 8, 1), ChunkType::Full, 0);
        frame.append(b"ab", 12);
        frame.wire.extend_from_slice(b"\x04\x00\x00\x00\x00\x00\x02\x08\x01\x00\x00\x00ab");
        handle.push_frame(frames.share(frame)).await.unwrap();

        let (_, data) = next_written(&mut peer).await;
        assert_eq!(data.len(), 14);
        assert_eq!(&data[12..], b"ab");
    }
}
