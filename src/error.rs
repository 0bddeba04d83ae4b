//! Error types for the ingestion client.
//!
//! None of these escape the connection manager: each one is converted into a
//! categorized debug event at the boundary where it happens and the
//! offending message is dropped.

use thiserror::Error;
use valvewatch_types::{EventCategory, Severity};

/// Errors that can occur while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The layered configuration could not be read or deserialized.
    #[error("Failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    /// Reading or writing the persisted endpoint file failed.
    #[error("Persisted endpoint I/O failed: {0}")]
    Persist(#[from] std::io::Error),

    /// A value was present but unusable.
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Why an envelope could not be turned into a payload.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum NormalizeError {
    /// The decoded message was not a JSON object.
    #[error("message is not an object (got {0})")]
    NotAnObject(&'static str),

    /// A string `payload` field did not contain valid JSON.
    #[error("invalid JSON in '{field}' field: {reason}")]
    MalformedInner { field: &'static str, reason: String },

    /// The inner document decoded but lacks the temperature key.
    #[error("inner payload from '{field}' wrapper is missing 'temperatura'")]
    MissingTemperature { field: &'static str },

    /// Nothing matched any known envelope shape.
    #[error("message does not match 'payload' string, 'parsed.payload' string, or flat structure")]
    Unrecognized,
}

impl NormalizeError {
    pub fn severity(&self) -> Severity {
        match self {
            NormalizeError::NotAnObject(_) | NormalizeError::Unrecognized => Severity::Warning,
            _ => Severity::Error,
        }
    }
}

/// Why a candidate record failed schema or content checks.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("candidate is not an object")]
    NotAnObject,

    #[error("required field missing: {0}")]
    MissingField(&'static str),

    #[error("invalid number for field: {0}")]
    NotANumber(&'static str),

    #[error("value out of bounds for {field}: {value} ({min}-{max})")]
    OutOfRange {
        field: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },

    /// Serialized content matched an injection-style pattern.
    #[error("security violation detected in data (pattern {pattern})")]
    Suspicious { pattern: String, violations: u64 },
}

impl ValidationError {
    /// Category and severity the failure is logged under.
    pub fn classify(&self) -> (EventCategory, Severity) {
        match self {
            ValidationError::MissingField(_) => (EventCategory::Error, Severity::Error),
            ValidationError::Suspicious { .. } => (EventCategory::Security, Severity::Critical),
            _ => (EventCategory::Error, Severity::Warning),
        }
    }
}

/// Errors raised by a transport while connecting or exchanging frames.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TransportError {
    #[error("Connection failed: {0}")]
    Connect(String),

    #[error("Transport I/O failed: {0}")]
    Io(String),
}

/// Rejected endpoint changes.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EndpointError {
    #[error("Invalid WebSocket URL format: {0}")]
    InvalidScheme(String),

    #[error("URL already exists in configuration: {0}")]
    Duplicate(String),

    #[error(transparent)]
    Stopped(#[from] Stopped),
}

/// The connection manager has already shut down.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("Connection manager is not running")]
pub struct Stopped;
