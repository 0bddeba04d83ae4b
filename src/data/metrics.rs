//! Rolling connection metrics.

use std::collections::VecDeque;
use std::mem::size_of;
use std::time::{Duration, Instant};

use valvewatch_types::{CanonicalReading, ConnectionMetrics, ConnectionQuality};

/// Heartbeat round trips kept for the latency average.
pub const LATENCY_SAMPLES: usize = 50;

/// Window over which the message rate is measured.
pub const RATE_WINDOW: Duration = Duration::from_secs(10);

/// Buffered-reading estimate above which memory pressure is reported.
pub const HIGH_MEMORY_KB: u64 = 100 * 1024;

/// Accumulates the signals behind [`ConnectionMetrics`].
#[derive(Debug, Default)]
pub struct MetricsRecorder {
    latencies: VecDeque<u64>,
    arrivals: VecDeque<Instant>,
    total_messages: u64,
    last_message_time_ms: i64,
    reconnect_attempts: u32,
    connected_at: Option<Instant>,
    memory_usage_kb: u64,
    active_endpoint: String,
    security_violations: u64,
}

impl MetricsRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_latency(&mut self, latency_ms: u64) {
        self.latencies.push_back(latency_ms);
        while self.latencies.len() > LATENCY_SAMPLES {
            self.latencies.pop_front();
        }
    }

    /// Rounded mean of the retained latency samples.
    pub fn avg_latency_ms(&self) -> u64 {
        if self.latencies.is_empty() {
            return 0;
        }
        let sum: u64 = self.latencies.iter().sum();
        (sum as f64 / self.latencies.len() as f64).round() as u64
    }

    /// Note an accepted reading for the rate calculation.
    pub fn record_arrival(&mut self, now: Instant) {
        self.arrivals.push_back(now);
        self.prune_arrivals(now);
    }

    fn prune_arrivals(&mut self, now: Instant) {
        while let Some(oldest) = self.arrivals.front() {
            if now.saturating_duration_since(*oldest) > RATE_WINDOW {
                self.arrivals.pop_front();
            } else {
                break;
            }
        }
    }

    /// Readings per second over the last ten seconds, two decimals.
    pub fn messages_per_sec(&self, now: Instant) -> f64 {
        let recent = self
            .arrivals
            .iter()
            .filter(|t| now.saturating_duration_since(**t) <= RATE_WINDOW)
            .count();
        let rate = recent as f64 / RATE_WINDOW.as_secs_f64();
        (rate * 100.0).round() / 100.0
    }

    /// Account for a flushed batch.
    pub fn record_batch(&mut self, size: usize, now_ms: i64) {
        if size == 0 {
            return;
        }
        self.total_messages += size as u64;
        self.last_message_time_ms = now_ms;
    }

    /// Update the memory estimate for `buffered` readings.
    ///
    /// Returns `true` when the estimate exceeds [`HIGH_MEMORY_KB`].
    pub fn record_buffered(&mut self, buffered: usize) -> bool {
        self.memory_usage_kb = (buffered * size_of::<CanonicalReading>()) as u64 / 1024;
        self.memory_usage_kb > HIGH_MEMORY_KB
    }

    pub fn set_reconnect_attempts(&mut self, attempts: u32) {
        self.reconnect_attempts = attempts;
    }

    pub fn set_active_endpoint(&mut self, endpoint: &str) {
        self.active_endpoint = endpoint.to_string();
    }

    pub fn set_security_violations(&mut self, violations: u64) {
        self.security_violations = violations;
    }

    pub fn mark_connected(&mut self, now: Instant) {
        self.connected_at = Some(now);
    }

    pub fn mark_disconnected(&mut self) {
        self.connected_at = None;
    }

    pub fn quality(&self) -> ConnectionQuality {
        ConnectionQuality::from_signals(self.avg_latency_ms(), self.reconnect_attempts)
    }

    pub fn snapshot(&self, now: Instant) -> ConnectionMetrics {
        ConnectionMetrics {
            total_messages: self.total_messages,
            reconnect_attempts: self.reconnect_attempts,
            uptime_secs: self
                .connected_at
                .map_or(0, |t| now.saturating_duration_since(t).as_secs()),
            last_message_time_ms: self.last_message_time_ms,
            avg_latency_ms: self.avg_latency_ms(),
            messages_per_sec: self.messages_per_sec(now),
            memory_usage_kb: self.memory_usage_kb,
            quality: self.quality(),
            active_endpoint: self.active_endpoint.clone(),
            security_violations: self.security_violations,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_latency_ring_keeps_last_fifty() {
        let mut recorder = MetricsRecorder::new();
        for _ in 0..50 {
            recorder.record_latency(1000);
        }
        for _ in 0..50 {
            recorder.record_latency(10);
        }
        assert_eq!(recorder.avg_latency_ms(), 10);
    }

    #[test]
    fn test_latency_average_rounds() {
        let mut recorder = MetricsRecorder::new();
        recorder.record_latency(10);
        recorder.record_latency(11);
        assert_eq!(recorder.avg_latency_ms(), 11);
    }

    #[test]
    fn test_message_rate_window() {
        let mut recorder = MetricsRecorder::new();
        let start = Instant::now();
        for i in 0..25 {
            recorder.record_arrival(start + Duration::from_millis(i * 100));
        }
        let now = start + Duration::from_millis(2400);
        assert_eq!(recorder.messages_per_sec(now), 2.5);

        // Everything has aged out of the window.
        assert_eq!(recorder.messages_per_sec(now + Duration::from_secs(11)), 0.0);
    }

    #[test]
    fn test_quality_degrades() {
        let mut recorder = MetricsRecorder::new();
        assert_eq!(recorder.quality(), ConnectionQuality::Excellent);

        recorder.record_latency(150);
        assert_eq!(recorder.quality(), ConnectionQuality::Good);

        recorder.record_latency(450);
        assert_eq!(recorder.quality(), ConnectionQuality::Poor);

        recorder.set_reconnect_attempts(6);
        assert_eq!(recorder.quality(), ConnectionQuality::Critical);
    }

    #[test]
    fn test_batch_and_uptime() {
        let mut recorder = MetricsRecorder::new();
        let start = Instant::now();
        recorder.mark_connected(start);
        recorder.record_batch(5, 1234);
        recorder.record_batch(0, 9999);

        let snapshot = recorder.snapshot(start + Duration::from_secs(42));
        assert_eq!(snapshot.total_messages, 5);
        assert_eq!(snapshot.last_message_time_ms, 1234);
        assert_eq!(snapshot.uptime_secs, 42);

        recorder.mark_disconnected();
        assert_eq!(recorder.snapshot(start).uptime_secs, 0);
    }

    #[test]
    fn test_memory_estimate() {
        let mut recorder = MetricsRecorder::new();
        assert!(!recorder.record_buffered(150));
        let huge = (HIGH_MEMORY_KB as usize + 1) * 1024 / size_of::<CanonicalReading>() + 1;
        assert!(recorder.record_buffered(huge));
    }
}
