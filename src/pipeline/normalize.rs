//! Envelope normalization.
//!
//! Devices reach the broker through several generations of middleware, so a
//! reading can arrive in one of three envelopes:
//!
//! 1. `{ "payload": "<json string>" }` (current wire format)
//! 2. `{ "parsed": { "payload": "<json string>" } }` (older wrapper)
//! 3. a flat object carrying `temperatura` and `pressaoEntrada` directly
//!
//! Shapes are tried in that order and the first one that applies decides the
//! outcome. A wrapper whose string does not hold a usable document is a
//! rejection, not a cue to try the next shape.

use serde_json::{Map, Value};

use crate::error::NormalizeError;

/// Key that identifies a sensor document.
pub const TEMPERATURE_KEY: &str = "temperatura";
/// Second key required for the flat envelope.
pub const INLET_PRESSURE_KEY: &str = "pressaoEntrada";

/// A flat sensor document extracted from an envelope.
pub type Payload = Map<String, Value>;

/// Which envelope a payload was extracted from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shape {
    RootPayload,
    ParsedPayload,
    Flat,
}

impl Shape {
    pub fn describe(&self) -> &'static str {
        match self {
            Shape::RootPayload => "payload string",
            Shape::ParsedPayload => "parsed.payload string",
            Shape::Flat => "flat structure",
        }
    }
}

/// A successfully normalized envelope.
#[derive(Debug, Clone, PartialEq)]
pub struct Normalized {
    pub shape: Shape,
    pub payload: Payload,
}

/// Result of trying one envelope shape.
#[derive(Debug)]
enum Attempt {
    Matched(Payload),
    Rejected(NormalizeError),
    NotApplicable,
}

type Decoder = fn(&Map<String, Value>) -> Attempt;

/// Envelope decoders in priority order.
const DECODERS: &[(Shape, Decoder)] = &[
    (Shape::RootPayload, root_payload),
    (Shape::ParsedPayload, parsed_payload),
    (Shape::Flat, flat),
];

/// Extract the sensor document from a decoded envelope.
pub fn normalize(raw: &Value) -> Result<Normalized, NormalizeError> {
    let Value::Object(envelope) = raw else {
        return Err(NormalizeError::NotAnObject(type_name(raw)));
    };

    for (shape, decode) in DECODERS {
        match decode(envelope) {
            Attempt::Matched(payload) => {
                return Ok(Normalized {
                    shape: *shape,
                    payload,
                })
            }
            Attempt::Rejected(err) => return Err(err),
            Attempt::NotApplicable => continue,
        }
    }

    Err(NormalizeError::Unrecognized)
}

fn root_payload(envelope: &Map<String, Value>) -> Attempt {
    match envelope.get("payload") {
        Some(Value::String(inner)) => decode_inner(inner, "payload"),
        _ => Attempt::NotApplicable,
    }
}

fn parsed_payload(envelope: &Map<String, Value>) -> Attempt {
    match envelope.get("parsed").and_then(|p| p.get("payload")) {
        Some(Value::String(inner)) => decode_inner(inner, "parsed.payload"),
        _ => Attempt::NotApplicable,
    }
}

fn flat(envelope: &Map<String, Value>) -> Attempt {
    if envelope.contains_key(TEMPERATURE_KEY) && envelope.contains_key(INLET_PRESSURE_KEY) {
        Attempt::Matched(envelope.clone())
    } else {
        Attempt::NotApplicable
    }
}

fn decode_inner(inner: &str, field: &'static str) -> Attempt {
    match serde_json::from_str::<Value>(inner) {
        Ok(Value::Object(doc)) if doc.contains_key(TEMPERATURE_KEY) => Attempt::Matched(doc),
        Ok(_) => Attempt::Rejected(NormalizeError::MissingTemperature { field }),
        Err(e) => Attempt::Rejected(NormalizeError::MalformedInner {
            field,
            reason: e.to_string(),
        }),
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
