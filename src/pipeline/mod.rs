//! Message processing from decoded envelope to flushed batch.
//!
//! [`Pipeline`] is synchronous and owns no I/O or timers: the connection
//! manager feeds it decoded envelopes and clock readings and acts on what it
//! returns. Every outcome, accepted or dropped, leaves an entry in the
//! pipeline's [`DebugLog`].
//!
//! ## Submodules
//!
//! - [`normalize`]: Envelope shape detection
//! - [`coerce`]: Loose number/label coercion
//! - [`canonical`]: Reading construction, switch flag and status derivation
//! - [`validate`]: Schema bounds and content scanning
//! - [`coil`]: Committed coil/actuator labels under the configured policy

pub mod canonical;
pub mod coerce;
pub mod coil;
pub mod normalize;
pub mod validate;

use std::time::{Duration, Instant};

use serde_json::{json, Value};
use valvewatch_types::{CanonicalReading, EventCategory};

use crate::config::ClientConfig;
use crate::data::{AlertEvaluator, AlertEvent, AlertThresholds, BatchBuffer, MetricsRecorder, RollingWindow};
use crate::error::ValidationError;
use crate::events::DebugLog;

pub use coil::{CoilState, CoilTracker, Observation};
pub use normalize::{normalize, Normalized, Payload, Shape};
pub use validate::Validator;

/// Reading construction slower than this is reported.
const SLOW_BUILD: Duration = Duration::from_millis(20);

/// What happened to one inbound envelope.
#[derive(Debug, Clone, PartialEq)]
pub enum Ingest {
    /// The reading is queued for the next flush. When a coil change is
    /// waiting out its hold, `coil_hold` says when to call
    /// [`Pipeline::commit_coil`].
    Queued { coil_hold: Option<Duration> },
    /// The envelope was rejected and logged.
    Dropped,
}

/// Output of one flush.
#[derive(Debug, Clone, PartialEq)]
pub struct Flushed {
    /// Readings moved into the window, in arrival order.
    pub readings: Vec<CanonicalReading>,
    /// Alerts raised by those readings, in the same order.
    pub alerts: Vec<AlertEvent>,
}

#[derive(Debug)]
pub struct Pipeline {
    validator: Validator,
    coil: CoilTracker,
    batch: BatchBuffer,
    window: RollingWindow,
    alerts: AlertEvaluator,
    metrics: MetricsRecorder,
    log: DebugLog,
    high_water_mark: usize,
}

impl Pipeline {
    pub fn new(config: &ClientConfig) -> Self {
        Self::with_thresholds(config, AlertThresholds::default())
    }

    pub fn with_thresholds(config: &ClientConfig, thresholds: AlertThresholds) -> Self {
        Self {
            validator: Validator::new(config.enable_validation, config.enable_security),
            coil: CoilTracker::new(config.coil.policy, config.coil_hold()),
            batch: BatchBuffer::new(),
            window: RollingWindow::new(config.max_data_points),
            alerts: AlertEvaluator::new(thresholds, config.alerts_enabled),
            metrics: MetricsRecorder::new(),
            log: DebugLog::default(),
            high_water_mark: config.high_water_mark().max(1),
        }
    }

    /// Run one decoded envelope through normalization, construction and
    /// validation, queueing the reading on success.
    pub fn ingest(&mut self, envelope: &Value, now: Instant, now_ms: i64) -> Ingest {
        let started = Instant::now();

        let Normalized { shape, payload } = match normalize(envelope) {
            Ok(normalized) => normalized,
            Err(e) => {
                self.log.record(
                    EventCategory::Error,
                    e.severity(),
                    format!("Envelope rejected: {}", e),
                    Some(envelope.clone()),
                );
                return Ingest::Dropped;
            }
        };
        self.log.info_with(
            EventCategory::Data,
            format!("Envelope normalized from {}", shape.describe()),
            json!({ "fields": payload.keys().collect::<Vec<_>>() }),
        );

        let mut reading = match canonical::build(&payload, now_ms) {
            Ok(reading) => reading,
            Err(e) => {
                self.reject(&e, Value::Object(payload));
                return Ingest::Dropped;
            }
        };

        let wire = canonical::wire_record(&reading);
        if let Err(e) = self.validator.validate(&wire) {
            self.metrics.set_security_violations(self.validator.violations());
            self.reject(&e, wire);
            return Ingest::Dropped;
        }

        let incoming = CoilState::new(reading.coil_in_use.clone(), reading.actuator_state.clone());
        let coil_hold = self.observe_coil(incoming, now);
        let displayed = self.coil.displayed();
        reading.coil_in_use = displayed.coil;
        reading.actuator_state = displayed.actuator;
        reading.status = canonical::derive_status(&reading.quality, &reading.actuator_state);

        let elapsed = started.elapsed();
        if elapsed > SLOW_BUILD {
            self.log.warn(
                EventCategory::Performance,
                format!("Slow reading construction: {:.2}ms", elapsed.as_secs_f64() * 1000.0),
                Value::Object(payload),
            );
        }

        self.metrics.record_arrival(now);
        self.batch.push(reading);
        Ingest::Queued { coil_hold }
    }

    fn reject(&mut self, error: &ValidationError, data: Value) {
        let (category, severity) = error.classify();
        let data = match error {
            ValidationError::Suspicious { pattern, violations } => {
                json!({ "pattern": pattern, "violations": violations })
            }
            _ => data,
        };
        self.log.record(category, severity, format!("Reading rejected: {}", error), Some(data));
    }

    fn observe_coil(&mut self, incoming: CoilState, now: Instant) -> Option<Duration> {
        match self.coil.observe(incoming, now) {
            Observation::Unchanged => None,
            Observation::Committed { from, to } => {
                self.log.info_with(EventCategory::Data, "Coil state changed", transition(&from, &to));
                None
            }
            Observation::Pending { to, hold } => {
                let from = self.coil.displayed();
                self.log.info_with(
                    EventCategory::Data,
                    format!("Coil state change held for {}ms", hold.as_millis()),
                    transition(&from, &to),
                );
                Some(hold)
            }
        }
    }

    /// Commit a held coil change whose hold has elapsed.
    pub fn commit_coil(&mut self, now: Instant) -> bool {
        match self.coil.commit_due(now) {
            Some((from, to)) => {
                self.log.info_with(EventCategory::Data, "Coil state committed", transition(&from, &to));
                true
            }
            None => false,
        }
    }

    /// Move every queued reading into the window and evaluate alerts.
    pub fn flush(&mut self, now_ms: i64) -> Option<Flushed> {
        if self.batch.is_empty() {
            return None;
        }

        let readings = self.batch.drain();
        if self.window.extend(&readings) {
            self.log.info_with(
                EventCategory::Data,
                "Data reception started",
                json!({ "batch": readings.len() }),
            );
        }

        let mut alerts = Vec::new();
        for reading in &readings {
            if let Some(alert) = self.alerts.evaluate(reading) {
                self.log.record(
                    EventCategory::Error,
                    alert.severity,
                    alert.summary(),
                    Some(json!({
                        "deviceId": alert.device_id,
                        "timestamp": alert.timestamp_ms,
                    })),
                );
                alerts.push(alert);
            }
        }

        self.metrics.record_batch(readings.len(), now_ms);
        Some(Flushed { readings, alerts })
    }

    /// Whether the queue has crossed its high-water mark.
    pub fn needs_relief(&self) -> bool {
        self.batch.len() >= self.high_water_mark
    }

    /// Refresh the memory estimate, reporting pressure.
    pub fn sample_memory(&mut self) {
        let buffered = self.window.len() + self.batch.len();
        if self.metrics.record_buffered(buffered) {
            self.log.warn(
                EventCategory::Performance,
                "High memory usage",
                json!({ "buffered": buffered }),
            );
        }
    }

    /// Drop queued and displayed readings.
    pub fn clear_data(&mut self) {
        self.batch.clear();
        self.window.clear();
        self.log.info(EventCategory::Data, "Data cleared");
    }

    pub fn set_alerts_enabled(&mut self, enabled: bool) {
        self.alerts.set_enabled(enabled);
        self.log.info(
            EventCategory::Config,
            format!("Alerts {}", if enabled { "enabled" } else { "disabled" }),
        );
    }

    pub fn queued(&self) -> usize {
        self.batch.len()
    }

    pub fn window(&self) -> &RollingWindow {
        &self.window
    }

    pub fn metrics(&self) -> &MetricsRecorder {
        &self.metrics
    }

    pub fn metrics_mut(&mut self) -> &mut MetricsRecorder {
        &mut self.metrics
    }

    pub fn log(&self) -> &DebugLog {
        &self.log
    }

    pub fn log_mut(&mut self) -> &mut DebugLog {
        &mut self.log
    }

    pub fn alerts(&self) -> &AlertEvaluator {
        &self.alerts
    }

    pub fn security_violations(&self) -> u64 {
        self.validator.violations()
    }
}

fn transition(from: &CoilState, to: &CoilState) -> Value {
    json!({
        "from": { "coil": from.coil, "actuator": from.actuator },
        "to": { "coil": to.coil, "actuator": to.actuator },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CoilPolicy;
    use valvewatch_types::{ReadingStatus, Severity};

    fn config() -> ClientConfig {
        ClientConfig::default()
    }

    fn doc(temperature: f64) -> Value {
        json!({
            "temperatura": temperature,
            "pressaoEntrada": 6.0,
            "pressaoSaida1": 4.0,
            "bobinaUtilizada": "left",
            "situacaoAtuador": "forward",
            "qualidade": "normal",
            "deviceId": "esp32-01",
            "timestamp": 1_700_000_000_000i64
        })
    }

    fn queued(outcome: &Ingest) -> bool {
        matches!(outcome, Ingest::Queued { .. })
    }

    #[test]
    fn test_every_shape_reaches_the_batch() {
        let mut pipeline = Pipeline::new(&config());
        let now = Instant::now();
        let text = doc(20.0).to_string();

        assert!(queued(&pipeline.ingest(&json!({ "payload": text }), now, 0)));
        assert!(queued(&pipeline.ingest(&json!({ "parsed": { "payload": text } }), now, 0)));
        assert!(queued(&pipeline.ingest(&doc(20.0), now, 0)));

        let flushed = pipeline.flush(1).unwrap();
        assert_eq!(flushed.readings.len(), 3);
        assert!(flushed.readings.windows(2).all(|w| w[0] == w[1]));
        assert_eq!(flushed.readings[0].valve_switch, 1);
    }

    #[test]
    fn test_malformed_payload_is_dropped_and_logged() {
        let mut pipeline = Pipeline::new(&config());
        let outcome = pipeline.ingest(&json!({ "payload": "{oops" }), Instant::now(), 0);

        assert_eq!(outcome, Ingest::Dropped);
        assert_eq!(pipeline.queued(), 0);
        let last = pipeline.log().entries().last().unwrap();
        assert_eq!(last.category, EventCategory::Error);
        assert_eq!(last.severity, Severity::Error);
    }

    #[test]
    fn test_out_of_range_is_dropped() {
        let mut pipeline = Pipeline::new(&config());
        assert_eq!(pipeline.ingest(&doc(150.0), Instant::now(), 0), Ingest::Dropped);
    }

    #[test]
    fn test_script_content_counts_violation() {
        let mut pipeline = Pipeline::new(&config());
        let mut envelope = doc(20.0);
        envelope["deviceId"] = json!("<script>x</script>");

        assert_eq!(pipeline.ingest(&envelope, Instant::now(), 0), Ingest::Dropped);
        assert_eq!(pipeline.security_violations(), 1);
        assert_eq!(pipeline.metrics().snapshot(Instant::now()).security_violations, 1);

        let last = pipeline.log().entries().last().unwrap();
        assert_eq!(last.category, EventCategory::Security);
        assert_eq!(last.severity, Severity::Critical);
    }

    #[test]
    fn test_flush_evaluates_each_reading_in_order() {
        let mut pipeline = Pipeline::new(&config());
        let now = Instant::now();
        let temperatures = [46.0, 47.0, 48.0, 49.0, 51.0];
        for t in temperatures {
            pipeline.ingest(&doc(t), now, 0);
        }

        let flushed = pipeline.flush(1).unwrap();
        assert_eq!(pipeline.alerts().evaluated(), 5);
        let reported: Vec<_> = flushed.alerts.iter().map(|a| a.messages[0].clone()).collect();
        let expected: Vec<_> = temperatures
            .iter()
            .map(|t| {
                let kind = if *t > 50.0 { "Critical" } else { "High" };
                format!("{} temperature: {:.1}°C", kind, t)
            })
            .collect();
        assert_eq!(reported, expected);
        assert_eq!(flushed.alerts[4].severity, Severity::Critical);
        assert_eq!(pipeline.metrics().snapshot(now).total_messages, 5);
    }

    #[test]
    fn test_empty_flush_is_none() {
        let mut pipeline = Pipeline::new(&config());
        assert!(pipeline.flush(0).is_none());
    }

    #[test]
    fn test_first_batch_logs_reception_started() {
        let mut pipeline = Pipeline::new(&config());
        pipeline.ingest(&doc(20.0), Instant::now(), 0);
        pipeline.flush(0);

        assert!(pipeline
            .log()
            .entries()
            .any(|e| e.message == "Data reception started"));
    }

    #[test]
    fn test_high_water_mark() {
        let mut config = config();
        config.max_queue_size = 5;
        let mut pipeline = Pipeline::new(&config);
        let now = Instant::now();

        for _ in 0..3 {
            pipeline.ingest(&doc(20.0), now, 0);
        }
        assert!(!pipeline.needs_relief());
        pipeline.ingest(&doc(20.0), now, 0);
        assert!(pipeline.needs_relief());
    }

    #[test]
    fn test_debounced_labels_shown_until_committed() {
        let mut config = config();
        config.coil.policy = CoilPolicy::Debounce;
        let mut pipeline = Pipeline::new(&config);
        let start = Instant::now();

        pipeline.ingest(&doc(20.0), start, 0);
        let mut changed = doc(20.0);
        changed["bobinaUtilizada"] = json!("right");
        let outcome = pipeline.ingest(&changed, start, 0);
        assert_eq!(outcome, Ingest::Queued { coil_hold: Some(config.coil_hold()) });

        let flushed = pipeline.flush(0).unwrap();
        assert_eq!(flushed.readings[1].coil_in_use, "left");

        assert!(pipeline.commit_coil(start + config.coil_hold()));
        pipeline.ingest(&changed, start + config.coil_hold(), 0);
        let flushed = pipeline.flush(0).unwrap();
        assert_eq!(flushed.readings[0].coil_in_use, "right");
    }

    #[test]
    fn test_status_follows_committed_actuator() {
        let mut config = config();
        config.coil.policy = CoilPolicy::Debounce;
        let mut pipeline = Pipeline::new(&config);
        let start = Instant::now();

        pipeline.ingest(&doc(20.0), start, 0);
        let mut failing = doc(20.0);
        failing["situacaoAtuador"] = json!("falha");
        pipeline.ingest(&failing, start, 0);

        let flushed = pipeline.flush(0).unwrap();
        let held = &flushed.readings[1];
        assert_eq!(held.actuator_state, "forward");
        assert_eq!(held.status, ReadingStatus::Normal);
        assert_eq!(held.status, canonical::derive_status(&held.quality, &held.actuator_state));

        let later = start + config.coil_hold();
        assert!(pipeline.commit_coil(later));
        pipeline.ingest(&failing, later, 0);
        let flushed = pipeline.flush(0).unwrap();
        assert_eq!(flushed.readings[0].actuator_state, "falha");
        assert_eq!(flushed.readings[0].status, ReadingStatus::Error);
    }

    #[test]
    fn test_clear_data_empties_queue_and_window() {
        let mut pipeline = Pipeline::new(&config());
        pipeline.ingest(&doc(20.0), Instant::now(), 0);
        pipeline.flush(0);
        pipeline.ingest(&doc(20.0), Instant::now(), 0);

        pipeline.clear_data();
        assert_eq!(pipeline.queued(), 0);
        assert!(pipeline.window().is_empty());
    }
}
