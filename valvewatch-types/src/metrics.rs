//! Connection-level metrics published by the connection manager.

use alloc::string::String;

/// Average latency (ms) above which the link is rated `Good` rather than `Excellent`.
pub const GOOD_LATENCY_MS: u64 = 100;

/// Average latency (ms) above which the link is rated `Poor`.
pub const POOR_LATENCY_MS: u64 = 200;

/// Reconnect attempts above which the link is rated `Critical`.
pub const CRITICAL_RECONNECT_ATTEMPTS: u32 = 5;

/// Coarse rating of the link, degrading before a full disconnect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum ConnectionQuality {
    #[default]
    Excellent,
    Good,
    Poor,
    Critical,
}

impl ConnectionQuality {
    /// Rate the link from the rolling latency average and reconnect count.
    ///
    /// Reconnect pressure outranks latency.
    pub fn from_signals(avg_latency_ms: u64, reconnect_attempts: u32) -> Self {
        if reconnect_attempts > CRITICAL_RECONNECT_ATTEMPTS {
            ConnectionQuality::Critical
        } else if avg_latency_ms > POOR_LATENCY_MS {
            ConnectionQuality::Poor
        } else if avg_latency_ms > GOOD_LATENCY_MS {
            ConnectionQuality::Good
        } else {
            ConnectionQuality::Excellent
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionQuality::Excellent => "excellent",
            ConnectionQuality::Good => "good",
            ConnectionQuality::Poor => "poor",
            ConnectionQuality::Critical => "critical",
        }
    }
}

/// Point-in-time view of the connection's health.
///
/// Owned and updated by the connection manager; consumers only ever see
/// copies of it.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ConnectionMetrics {
    /// Readings delivered to the display window since startup.
    pub total_messages: u64,
    /// Reconnects scheduled against the current endpoint.
    pub reconnect_attempts: u32,
    /// Seconds since the current connection opened.
    pub uptime_secs: u64,
    /// Unix timestamp (ms) of the last flushed batch, `0` if none yet.
    pub last_message_time_ms: i64,
    /// Rolling average heartbeat round trip, in milliseconds.
    pub avg_latency_ms: u64,
    /// Accepted readings per second over the last ten seconds.
    pub messages_per_sec: f64,
    /// Estimated memory held by buffered readings, in KiB.
    pub memory_usage_kb: u64,
    pub quality: ConnectionQuality,
    /// Endpoint currently in use.
    pub active_endpoint: String,
    /// Records rejected by the content scanner since startup.
    pub security_violations: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quality_degrades_with_latency() {
        assert_eq!(ConnectionQuality::from_signals(20, 0), ConnectionQuality::Excellent);
        assert_eq!(ConnectionQuality::from_signals(100, 0), ConnectionQuality::Excellent);
        assert_eq!(ConnectionQuality::from_signals(101, 0), ConnectionQuality::Good);
        assert_eq!(ConnectionQuality::from_signals(201, 0), ConnectionQuality::Poor);
    }

    #[test]
    fn reconnect_pressure_overrides_latency() {
        assert_eq!(ConnectionQuality::from_signals(10, 5), ConnectionQuality::Excellent);
        assert_eq!(ConnectionQuality::from_signals(10, 6), ConnectionQuality::Critical);
        assert_eq!(ConnectionQuality::from_signals(500, 6), ConnectionQuality::Critical);
    }

    #[test]
    fn default_metrics_are_excellent_and_empty() {
        let metrics = ConnectionMetrics::default();
        assert_eq!(metrics.quality, ConnectionQuality::Excellent);
        assert_eq!(metrics.total_messages, 0);
        assert!(metrics.active_endpoint.is_empty());
    }
}
