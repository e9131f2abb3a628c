//! Statistics and metrics

pub mod metrics;

pub use metrics::{PoolCounters, PoolStats, SessionCounters, SessionStats};
