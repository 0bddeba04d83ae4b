//! Diagnostic event log.
//!
//! Every component reports what it did (or refused to do) here. The log is a
//! fixed-size ring buffer: once it is full the oldest entry is evicted. Each
//! entry is mirrored to `tracing` and queued for delivery to the consumer.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::Serialize;
use serde_json::Value;
use valvewatch_types::{EventCategory, Severity};

/// Maximum number of retained diagnostic events.
pub const DEBUG_LOG_CAPACITY: usize = 100;

const ID_ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// A single timestamped diagnostic entry.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DebugEvent {
    /// `<epoch-ms>-<12 random base36 chars>`.
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub category: EventCategory,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    pub severity: Severity,
}

impl DebugEvent {
    fn new(category: EventCategory, severity: Severity, message: String, data: Option<Value>) -> Self {
        let timestamp = Utc::now();
        Self {
            id: event_id(timestamp.timestamp_millis()),
            timestamp,
            category,
            message,
            data,
            severity,
        }
    }
}

fn event_id(millis: i64) -> String {
    let mut rng = rand::thread_rng();
    let suffix: String = (0..12)
        .map(|_| ID_ALPHABET[rng.gen_range(0..ID_ALPHABET.len())] as char)
        .collect();
    format!("{}-{}", millis, suffix)
}

/// Append-only ring buffer of diagnostic events.
#[derive(Debug)]
pub struct DebugLog {
    entries: VecDeque<DebugEvent>,
    capacity: usize,
    /// Entries recorded since the last `take_unpublished` call.
    unpublished: Vec<DebugEvent>,
}

impl Default for DebugLog {
    fn default() -> Self {
        Self::new(DEBUG_LOG_CAPACITY)
    }
}

impl DebugLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity: capacity.max(1),
            unpublished: Vec::new(),
        }
    }

    /// Record an event, mirror it to `tracing` and queue it for the consumer.
    pub fn record(
        &mut self,
        category: EventCategory,
        severity: Severity,
        message: impl Into<String>,
        data: Option<Value>,
    ) {
        let event = DebugEvent::new(category, severity, message.into(), data);
        emit(&event);

        self.entries.push_back(event.clone());
        while self.entries.len() > self.capacity {
            self.entries.pop_front();
        }
        self.unpublished.push(event);
    }

    pub fn info(&mut self, category: EventCategory, message: impl Into<String>) {
        self.record(category, Severity::Info, message, None);
    }

    pub fn info_with(&mut self, category: EventCategory, message: impl Into<String>, data: Value) {
        self.record(category, Severity::Info, message, Some(data));
    }

    pub fn warn(&mut self, category: EventCategory, message: impl Into<String>, data: Value) {
        self.record(category, Severity::Warning, message, Some(data));
    }

    pub fn error(&mut self, category: EventCategory, message: impl Into<String>, data: Value) {
        self.record(category, Severity::Error, message, Some(data));
    }

    pub fn critical(&mut self, category: EventCategory, message: impl Into<String>, data: Value) {
        self.record(category, Severity::Critical, message, Some(data));
    }

    /// Retained entries, oldest first.
    pub fn entries(&self) -> impl DoubleEndedIterator<Item = &DebugEvent> + ExactSizeIterator {
        self.entries.iter()
    }

    /// Retained entries, newest first.
    pub fn newest_first(&self) -> Vec<DebugEvent> {
        self.entries.iter().rev().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drain the events recorded since the previous call.
    pub fn take_unpublished(&mut self) -> Vec<DebugEvent> {
        std::mem::take(&mut self.unpublished)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

fn emit(event: &DebugEvent) {
    let category = event.category.as_str();
    let data = event.data.as_ref().map(|d| d.to_string());
    match event.severity {
        Severity::Info => {
            tracing::info!(category, data = data.as_deref(), "{}", event.message)
        }
        Severity::Warning => {
            tracing::warn!(category, data = data.as_deref(), "{}", event.message)
        }
        Severity::Error => {
            tracing::error!(category, data = data.as_deref(), "{}", event.message)
        }
        Severity::Critical => {
            tracing::error!(category, critical = true, data = data.as_deref(), "{}", event.message)
        }
    }
}
