//! Distribution pool configuration

use std::time::Duration;

/// Shortest keepalive period or write deadline a pool accepts
pub const MIN_TIMER_PERIOD: Duration = Duration::from_millis(1);

/// What a failed keepalive ping does to its session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeepaliveFailure {
    /// Log the failure and keep the session
    Log,
    /// Close the session
    Close,
}

/// Which bytes of a frame are written downstream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryFormat {
    /// The reassembled message payload
    Payload,
    /// The raw chunk bytes, headers included (needs wire capture on the decoder)
    Wire,
}

/// Configuration for the distribution pool and its sessions
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Join queue capacity
    pub join_capacity: usize,

    /// Leave queue capacity
    pub leave_capacity: usize,

    /// Inbound frame queue capacity (the producer waits when it is full)
    pub inbound_capacity: usize,

    /// Per-session delivery queue capacity (frames are dropped when full)
    pub session_queue_capacity: usize,

    /// Period between keepalive pings
    pub keepalive_interval: Duration,

    /// Deadline for every downstream write
    pub write_timeout: Duration,

    /// Keepalive failure policy
    pub keepalive_failure: KeepaliveFailure,

    /// Bytes written per frame
    pub delivery_format: DeliveryFormat,

    /// Skip frames until the first one opened by a full (type 0) header
    pub await_full_header: bool,

    /// Log delivery stats every N frames per session (0 = never)
    pub stats_log_interval: u64,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            join_capacity: 16,
            leave_capacity: 16,
            inbound_capacity: 64,
            session_queue_capacity: 64,
            // 9/10 of a 60s pong wait
            keepalive_interval: Duration::from_secs(54),
            write_timeout: Duration::from_secs(10),
            keepalive_failure: KeepaliveFailure::Log,
            delivery_format: DeliveryFormat::Payload,
            await_full_header: false,
            stats_log_interval: 100,
        }
    }
}

impl PoolConfig {
    /// Set the inbound frame queue capacity
    pub fn inbound_capacity(mut self, capacity: usize) -> Self {
        self.inbound_capacity = capacity.max(1);
        self
    }

    /// Set the per-session delivery queue capacity
    pub fn session_queue_capacity(mut self, capacity: usize) -> Self {
        self.session_queue_capacity = capacity.max(1);
        self
    }

    /// Set the keepalive period (raised to [`MIN_TIMER_PERIOD`] if shorter)
    pub fn keepalive_interval(mut self, interval: Duration) -> Self {
        self.keepalive_interval = interval.max(MIN_TIMER_PERIOD);
        self
    }

    /// Set the downstream write deadline (raised to [`MIN_TIMER_PERIOD`] if shorter)
    pub fn write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout = timeout.max(MIN_TIMER_PERIOD);
        self
    }

    /// Set the keepalive failure policy
    pub fn keepalive_failure(mut self, policy: KeepaliveFailure) -> Self {
        self.keepalive_failure = policy;
        self
    }

    /// Set which frame bytes are delivered
    pub fn delivery_format(mut self, format: DeliveryFormat) -> Self {
        self.delivery_format = format;
        self
    }

    /// Hold back delivery until a full-header frame arrives
    pub fn await_full_header(mut self, enabled: bool) -> Self {
        self.await_full_header = enabled;
        self
    }

    /// Set the stats log interval
    pub fn stats_log_interval(mut self, frames: u64) -> Self {
        self.stats_log_interval = frames;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = PoolConfig::default();

        assert_eq!(config.join_capacity, 16);
        assert_eq!(config.leave_capacity, 16);
        assert_eq!(config.inbound_capacity, 64);
        assert_eq!(config.session_queue_capacity, 64);
        assert_eq!(config.keepalive_interval, Duration::from_secs(54));
        assert_eq!(config.keepalive_failure, KeepaliveFailure::Log);
        assert_eq!(config.delivery_format, DeliveryFormat::Payload);
        assert!(!config.await_full_header);
    }

    #[test]
    fn test_builder_chaining() {
        let config = PoolConfig::default()
            .inbound_capacity(8)
            .session_queue_capacity(0)
            .keepalive_interval(Duration::from_millis(500))
            .write_timeout(Duration::from_secs(1))
            .keepalive_failure(KeepaliveFailure::Close)
            .delivery_format(DeliveryFormat::Wire)
            .await_full_header(true)
            .stats_log_interval(0);

        assert_eq!(config.inbound_capacity, 8);
        // Queues need room for at least one frame
        assert_eq!(config.session_queue_capacity, 1);
        assert_eq!(config.keepalive_interval, Duration::from_millis(500));
        assert_eq!(config.write_timeout, Duration::from_secs(1));
        assert_eq!(config.keepalive_failure, KeepaliveFailure::Close);
        assert_eq!(config.delivery_format, DeliveryFormat::Wire);
        assert!(config.await_full_header);
        assert_eq!(config.stats_log_interval, 0);
    }

    #[test]
    fn test_zero_timers_are_clamped() {
        let config = PoolConfig::default()
            .keepalive_interval(Duration::ZERO)
            .write_timeout(Duration::ZERO);

        assert_eq!(config.keepalive_interval, MIN_TIMER_PERIOD);
        assert_eq!(config.write_timeout, MIN_TIMER_PERIOD);
    }
}
