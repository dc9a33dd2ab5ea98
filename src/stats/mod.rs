//! Relay statistics

pub mod metrics;

pub use metrics::{ChannelStats, RelayStats, SessionCounters, SessionStats};
