//! Statistics for subscriber sessions and the distribution pool

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

/// Live counters for one subscriber session
///
/// Updated by the session's own tasks and by the pool (drops), read by anyone.
#[derive(Debug)]
pub struct SessionCounters {
    started_at: Instant,
    frames_sent: AtomicU64,
    bytes_sent: AtomicU64,
    messages_received: AtomicU64,
    bytes_received: AtomicU64,
    frames_dropped: AtomicU64,
    frames_skipped: AtomicU64,
    keepalives_sent: AtomicU64,
    keepalive_failures: AtomicU64,
}

impl SessionCounters {
    /// Create zeroed counters; the session clock starts now
    pub fn new() -> Self {
        Self {
            started_at: Instant::now(),
            frames_sent: AtomicU64::new(0),
            bytes_sent: AtomicU64::new(0),
            messages_received: AtomicU64::new(0),
            bytes_received: AtomicU64::new(0),
            frames_dropped: AtomicU64::new(0),
            frames_skipped: AtomicU64::new(0),
            keepalives_sent: AtomicU64::new(0),
            keepalive_failures: AtomicU64::new(0),
        }
    }

    /// Record a delivered frame, returning the new delivered count
    pub fn on_sent(&self, bytes: usize) -> u64 {
        self.bytes_sent.fetch_add(bytes as u64, Ordering::Relaxed);
        self.frames_sent.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Record a message read from the subscriber
    pub fn on_received(&self, bytes: usize) {
        self.messages_received.fetch_add(1, Ordering::Relaxed);
        self.bytes_received.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    /// Record a frame dropped on a full delivery queue
    pub fn on_dropped(&self) {
        self.frames_dropped.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a frame skipped while waiting for a full header
    pub fn on_skipped(&self) {
        self.frames_skipped.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a keepalive ping and whether it was written
    pub fn on_keepalive(&self, ok: bool) {
        if ok {
            self.keepalives_sent.fetch_add(1, Ordering::Relaxed);
        } else {
            self.keepalive_failures.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Point-in-time copy of the counters
    pub fn snapshot(&self) -> SessionStats {
        SessionStats {
            frames_sent: self.frames_sent.load(Ordering::Relaxed),
            bytes_sent: self.bytes_sent.load(Ordering::Relaxed),
            messages_received: self.messages_received.load(Ordering::Relaxed),
            bytes_received: self.bytes_received.load(Ordering::Relaxed),
            frames_dropped: self.frames_dropped.load(Ordering::Relaxed),
            frames_skipped: self.frames_skipped.load(Ordering::Relaxed),
            keepalives_sent: self.keepalives_sent.load(Ordering::Relaxed),
            keepalive_failures: self.keepalive_failures.load(Ordering::Relaxed),
            duration: self.started_at.elapsed(),
        }
    }
}

impl Default for SessionCounters {
    fn default() -> Self {
        Self::new()
    }
}

/// Session-level statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionStats {
    /// Frames written to the subscriber
    pub frames_sent: u64,
    /// Bytes written to the subscriber (frames only)
    pub bytes_sent: u64,
    /// Messages read from the subscriber
    pub messages_received: u64,
    /// Bytes read from the subscriber
    pub bytes_received: u64,
    /// Frames dropped because the delivery queue was full
    pub frames_dropped: u64,
    /// Frames skipped while waiting for a full-header frame
    pub frames_skipped: u64,
    /// Keepalive pings written
    pub keepalives_sent: u64,
    /// Keepalive pings that failed
    pub keepalive_failures: u64,
    /// Session age
    pub duration: Duration,
}

impl SessionStats {
    /// Outgoing bitrate in bits per second
    pub fn bitrate(&self) -> u64 {
        let secs = self.duration.as_secs();
        if secs > 0 {
            (self.bytes_sent * 8) / secs
        } else {
            0
        }
    }
}

/// Live counters for the distribution pool
#[derive(Debug, Default)]
pub struct PoolCounters {
    live_sessions: AtomicUsize,
    frames_in: AtomicU64,
    frames_fanned_out: AtomicU64,
    frames_dropped: AtomicU64,
    sessions_joined: AtomicU64,
    sessions_left: AtomicU64,
}

impl PoolCounters {
    /// Create zeroed counters
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish the current registry size
    pub fn set_live_sessions(&self, count: usize) {
        self.live_sessions.store(count, Ordering::Release);
    }

    /// Sessions currently registered
    pub fn live_sessions(&self) -> usize {
        self.live_sessions.load(Ordering::Acquire)
    }

    /// Record one inbound frame and how it was distributed
    pub fn on_frame(&self, delivered: u64, dropped: u64) {
        self.frames_in.fetch_add(1, Ordering::Relaxed);
        self.frames_fanned_out.fetch_add(delivered, Ordering::Relaxed);
        self.frames_dropped.fetch_add(dropped, Ordering::Relaxed);
    }

    /// Record a registered session
    pub fn on_join(&self) {
        self.sessions_joined.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a removed session
    pub fn on_leave(&self) {
        self.sessions_left.fetch_add(1, Ordering::Relaxed);
    }

    /// Point-in-time copy of the counters
    pub fn snapshot(&self) -> PoolStats {
        PoolStats {
            live_sessions: self.live_sessions(),
            frames_in: self.frames_in.load(Ordering::Relaxed),
            frames_fanned_out: self.frames_fanned_out.load(Ordering::Relaxed),
            frames_dropped: self.frames_dropped.load(Ordering::Relaxed),
            sessions_joined: self.sessions_joined.load(Ordering::Relaxed),
            sessions_left: self.sessions_left.load(Ordering::Relaxed),
        }
    }
}

/// Pool-wide statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Sessions currently registered
    pub live_sessions: usize,
    /// Frames received from the protocol layer
    pub frames_in: u64,
    /// Frame references enqueued to sessions
    pub frames_fanned_out: u64,
    /// Frame references dropped on full queues
    pub frames_dropped: u64,
    /// Sessions ever registered
    pub sessions_joined: u64,
    /// Sessions removed
    pub sessions_left: u64,
}
