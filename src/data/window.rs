//! Rolling display window of recent readings.

use std::collections::VecDeque;

use valvewatch_types::{CanonicalReading, ReadingStatus};

/// Readings considered by [`RollingWindow::stats`].
const STATS_SAMPLE: usize = 20;

/// Fewest readings for which statistics are reported.
const STATS_MIN_READINGS: usize = 3;

/// Bounded FIFO of the most recent readings.
#[derive(Debug, Clone)]
pub struct RollingWindow {
    readings: VecDeque<CanonicalReading>,
    capacity: usize,
    received_any: bool,
}

/// Summary of the latest readings in the window.
#[derive(Debug, Clone, PartialEq)]
pub struct WindowStats {
    pub samples: usize,
    pub avg_temperature: f64,
    pub avg_inlet_pressure: f64,
    pub avg_outlet_pressure_1: f64,
    pub avg_outlet_pressure_2: f64,
    /// Fraction of readings with the switch flag set.
    pub avg_switching: f64,
    /// Readings whose status is not normal.
    pub alert_count: usize,
    /// Share of normal readings, 0-100.
    pub health_score: u8,
}

impl RollingWindow {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            readings: VecDeque::with_capacity(capacity),
            capacity,
            received_any: false,
        }
    }

    /// Append a batch, evicting the oldest readings past capacity.
    ///
    /// Returns `true` the first time a non-empty batch arrives.
    pub fn extend(&mut self, batch: &[CanonicalReading]) -> bool {
        self.readings.extend(batch.iter().cloned());
        while self.readings.len() > self.capacity {
            self.readings.pop_front();
        }

        let first = !self.received_any && !batch.is_empty();
        self.received_any |= !batch.is_empty();
        first
    }

    pub fn len(&self) -> usize {
        self.readings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.readings.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn latest(&self) -> Option<&CanonicalReading> {
        self.readings.back()
    }

    /// Readings oldest first.
    pub fn snapshot(&self) -> Vec<CanonicalReading> {
        self.readings.iter().cloned().collect()
    }

    /// Empty the window. The "first batch" marker is kept.
    pub fn clear(&mut self) {
        self.readings.clear();
    }

    /// Averages and health over the latest readings, once there are enough.
    pub fn stats(&self) -> Option<WindowStats> {
        if self.readings.len() < STATS_MIN_READINGS {
            return None;
        }

        let skip = self.readings.len().saturating_sub(STATS_SAMPLE);
        let recent: Vec<&CanonicalReading> = self.readings.iter().skip(skip).collect();
        let n = recent.len() as f64;
        let avg = |f: fn(&CanonicalReading) -> f64| recent.iter().map(|r| f(r)).sum::<f64>() / n;

        let alert_count = recent
            .iter()
            .filter(|r| r.status != ReadingStatus::Normal)
            .count();

        Some(WindowStats {
            samples: recent.len(),
            avg_temperature: avg(|r| r.temperature),
            avg_inlet_pressure: avg(|r| r.inlet_pressure),
            avg_outlet_pressure_1: avg(|r| r.outlet_pressure_1),
            avg_outlet_pressure_2: avg(|r| r.outlet_pressure_2),
            avg_switching: avg(|r| f64::from(r.valve_switch)),
            alert_count,
            health_score: (((n - alert_count as f64) / n) * 100.0).round() as u8,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reading(temperature: f64) -> CanonicalReading {
        CanonicalReading {
            temperature,
            ..Default::default()
        }
    }

    fn batch(range: std::ops::Range<u32>) -> Vec<CanonicalReading> {
        range.map(|i| reading(f64::from(i))).collect()
    }

    #[test]
    fn test_never_exceeds_capacity() {
        let mut window = RollingWindow::new(150);
        for chunk in 0..20 {
            window.extend(&batch(chunk * 37..(chunk + 1) * 37));
            assert!(window.len() <= 150);
        }
        assert_eq!(window.len(), 150);
    }

    #[test]
    fn test_eviction_is_oldest_first() {
        let mut window = RollingWindow::new(5);
        window.extend(&batch(0..4));
        window.extend(&batch(4..8));

        let temps: Vec<_> = window.snapshot().iter().map(|r| r.temperature).collect();
        assert_eq!(temps, vec![3.0, 4.0, 5.0, 6.0, 7.0]);
        assert_eq!(window.latest().unwrap().temperature, 7.0);
    }

    #[test]
    fn test_first_batch_reported_once() {
        let mut window = RollingWindow::new(10);
        assert!(!window.extend(&[]));
        assert!(window.extend(&batch(0..2)));
        assert!(!window.extend(&batch(2..3)));
        window.clear();
        assert!(!window.extend(&batch(3..4)));
    }

    #[test]
    fn test_stats_need_three_readings() {
        let mut window = RollingWindow::new(10);
        window.extend(&batch(0..2));
        assert!(window.stats().is_none());
    }

    #[test]
    fn test_stats_over_latest_twenty() {
        let mut window = RollingWindow::new(100);
        window.extend(&batch(0..30));
        let mut flagged = reading(100.0);
        flagged.status = ReadingStatus::Warning;
        flagged.valve_switch = 1;
        window.extend(&[flagged]);

        let stats = window.stats().unwrap();
        assert_eq!(stats.samples, 20);
        // Readings 11..=29 plus the flagged 100.0.
        let expected = ((11..30).sum::<u32>() as f64 + 100.0) / 20.0;
        assert!((stats.avg_temperature - expected).abs() < 1e-9);
        assert_eq!(stats.alert_count, 1);
        assert_eq!(stats.health_score, 95);
        assert!((stats.avg_switching - 0.05).abs() < 1e-9);
    }
}
