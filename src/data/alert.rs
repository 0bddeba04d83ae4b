//! Threshold alerts for readings.

use serde::Serialize;
use valvewatch_types::{CanonicalReading, HealthStatus, Severity};

/// Bounds for one monitored channel.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ChannelThresholds {
    pub min: f64,
    pub max: f64,
    pub critical: f64,
}

impl ChannelThresholds {
    pub const fn new(min: f64, max: f64, critical: f64) -> Self {
        Self { min, max, critical }
    }
}

/// Alert bounds for every monitored channel.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct AlertThresholds {
    pub temperature: ChannelThresholds,
    pub inlet_pressure: ChannelThresholds,
    /// Shared by both outlet channels.
    pub outlet_pressure: ChannelThresholds,
}

impl Default for AlertThresholds {
    fn default() -> Self {
        Self {
            temperature: ChannelThresholds::new(-10.0, 45.0, 50.0),
            inlet_pressure: ChannelThresholds::new(0.1, 12.0, 15.0),
            outlet_pressure: ChannelThresholds::new(0.5, 18.0, 22.0),
        }
    }
}

/// Health of a single value against its channel bounds.
///
/// `check_low` adds the below-minimum check, which only temperature uses.
pub fn classify(value: f64, thresholds: &ChannelThresholds, check_low: bool) -> HealthStatus {
    if value > thresholds.critical {
        HealthStatus::Critical
    } else if value > thresholds.max || (check_low && value < thresholds.min) {
        HealthStatus::Warning
    } else {
        HealthStatus::Healthy
    }
}

/// One alert raised for a reading.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AlertEvent {
    pub severity: Severity,
    /// Individual channel messages, in channel order.
    pub messages: Vec<String>,
    pub device_id: String,
    pub timestamp_ms: i64,
}

impl AlertEvent {
    /// All channel messages joined into one line.
    pub fn summary(&self) -> String {
        self.messages.join(" | ")
    }
}

struct Channel {
    name: &'static str,
    unit: &'static str,
    value: fn(&CanonicalReading) -> f64,
    thresholds: fn(&AlertThresholds) -> ChannelThresholds,
    check_low: bool,
}

const CHANNELS: &[Channel] = &[
    Channel {
        name: "temperature",
        unit: "°C",
        value: |r| r.temperature,
        thresholds: |t| t.temperature,
        check_low: true,
    },
    Channel {
        name: "inlet pressure",
        unit: " bar",
        value: |r| r.inlet_pressure,
        thresholds: |t| t.inlet_pressure,
        check_low: false,
    },
    Channel {
        name: "outlet pressure 1",
        unit: " bar",
        value: |r| r.outlet_pressure_1,
        thresholds: |t| t.outlet_pressure,
        check_low: false,
    },
    Channel {
        name: "outlet pressure 2",
        unit: " bar",
        value: |r| r.outlet_pressure_2,
        thresholds: |t| t.outlet_pressure,
        check_low: false,
    },
];

#[derive(Debug)]
pub struct AlertEvaluator {
    thresholds: AlertThresholds,
    enabled: bool,
    evaluated: u64,
}

impl AlertEvaluator {
    pub fn new(thresholds: AlertThresholds, enabled: bool) -> Self {
        Self {
            thresholds,
            enabled,
            evaluated: 0,
        }
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn thresholds(&self) -> &AlertThresholds {
        &self.thresholds
    }

    /// Readings evaluated while alerting was enabled.
    pub fn evaluated(&self) -> u64 {
        self.evaluated
    }

    /// Check a reading against every channel.
    pub fn evaluate(&mut self, reading: &CanonicalReading) -> Option<AlertEvent> {
        if !self.enabled {
            return None;
        }
        self.evaluated += 1;

        let mut messages = Vec::new();
        let mut severity = Severity::Warning;

        for channel in CHANNELS {
            let value = (channel.value)(reading);
            let thresholds = (channel.thresholds)(&self.thresholds);

            let message = if value > thresholds.critical {
                severity = Severity::Critical;
                format!("Critical {}: {:.1}{}", channel.name, value, channel.unit)
            } else if value > thresholds.max {
                format!("High {}: {:.1}{}", channel.name, value, channel.unit)
            } else if channel.check_low && value < thresholds.min {
                format!("Low {}: {:.1}{}", channel.name, value, channel.unit)
            } else {
                continue;
            };
            messages.push(message);
        }

        if messages.is_empty() {
            return None;
        }

        Some(AlertEvent {
            severity,
            messages,
            device_id: reading.device_id.clone(),
            timestamp_ms: reading.timestamp_ms,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reading(temperature: f64, inlet: f64, outlet_1: f64, outlet_2: f64) -> CanonicalReading {
        CanonicalReading {
            temperature,
            inlet_pressure: inlet,
            outlet_pressure_1: outlet_1,
            outlet_pressure_2: outlet_2,
            ..Default::default()
        }
    }

    fn evaluator() -> AlertEvaluator {
        AlertEvaluator::new(AlertThresholds::default(), true)
    }

    #[test]
    fn test_nominal_reading_raises_nothing() {
        assert!(evaluator().evaluate(&reading(25.0, 6.0, 4.0, 4.0)).is_none());
    }

    #[test]
    fn test_warning_messages_combined() {
        let alert = evaluator().evaluate(&reading(46.0, 13.0, 4.0, 4.0)).unwrap();
        assert_eq!(alert.severity, Severity::Warning);
        assert_eq!(
            alert.summary(),
            "High temperature: 46.0°C | High inlet pressure: 13.0 bar"
        );
    }

    #[test]
    fn test_any_critical_escalates() {
        let alert = evaluator().evaluate(&reading(20.0, 6.0, 19.0, 23.0)).unwrap();
        assert_eq!(alert.severity, Severity::Critical);
        assert_eq!(alert.messages.len(), 2);
        assert!(alert.messages[1].starts_with("Critical outlet pressure 2"));
    }

    #[test]
    fn test_low_only_applies_to_temperature() {
        let alert = evaluator().evaluate(&reading(-12.0, 0.0, 0.0, 0.0)).unwrap();
        assert_eq!(alert.messages, vec!["Low temperature: -12.0°C".to_string()]);
    }

    #[test]
    fn test_disabled_is_noop() {
        let mut evaluator = AlertEvaluator::new(AlertThresholds::default(), false);
        assert!(evaluator.evaluate(&reading(99.0, 99.0, 99.0, 99.0)).is_none());
        assert_eq!(evaluator.evaluated(), 0);
    }

    #[test]
    fn test_classify() {
        let t = AlertThresholds::default();
        assert_eq!(classify(51.0, &t.temperature, true), HealthStatus::Critical);
        assert_eq!(classify(-11.0, &t.temperature, true), HealthStatus::Warning);
        assert_eq!(classify(0.0, &t.inlet_pressure, false), HealthStatus::Healthy);
        assert_eq!(classify(12.5, &t.inlet_pressure, false), HealthStatus::Warning);
    }
}
