//! Reading construction from a normalized payload.
//!
//! Numeric fields are coerced loosely (anything unusable becomes `0`) and
//! labels fall back to sentinels, so the only hard requirement on a payload
//! is that it carries temperature and inlet pressure at all.

use chrono::{Local, TimeZone};
use serde_json::{json, Value};
use valvewatch_types::{CanonicalReading, ReadingStatus, UNKNOWN_COIL, UNKNOWN_LABEL};

use super::coerce::{label_or, number_or_zero};
use super::normalize::{Payload, INLET_PRESSURE_KEY, TEMPERATURE_KEY};
use crate::error::ValidationError;

/// Coil labels naming a physical solenoid position.
const COIL_POSITIONS: &[&str] = &["left", "right", "esquerda", "direita"];

/// Actuator labels meaning the valve has moved.
const ACTIVE_ACTUATOR: &[&str] = &["forward", "advanced", "active", "avançado", "ativo"];

const FORWARD_MARKERS: &[&str] = &["forward", "advanced", "avançado"];
const ALERT_MARKERS: &[&str] = &["alert"];
const FAILURE_MARKERS: &[&str] = &["erro", "error", "failure", "falha"];

/// Build a reading from a payload.
///
/// Coil and actuator labels on the returned reading are the incoming ones;
/// the caller decides which labels are actually displayed.
pub fn build(payload: &Payload, now_ms: i64) -> Result<CanonicalReading, ValidationError> {
    for key in [TEMPERATURE_KEY, INLET_PRESSURE_KEY] {
        if payload.get(key).map_or(true, Value::is_null) {
            return Err(ValidationError::MissingField(key));
        }
    }

    let coil_in_use = label_or(payload.get("bobinaUtilizada"), UNKNOWN_COIL);
    let actuator_state = label_or(payload.get("situacaoAtuador"), UNKNOWN_LABEL);
    let quality = label_or(payload.get("qualidade"), UNKNOWN_LABEL);
    let switching_time_ms = number_or_zero(payload.get("tempoComutacao")) as i64;

    let timestamp_ms = match number_or_zero(payload.get("timestamp")) as i64 {
        0 => now_ms,
        ts => ts,
    };

    Ok(CanonicalReading {
        temperature: number_or_zero(payload.get(TEMPERATURE_KEY)),
        inlet_pressure: number_or_zero(payload.get(INLET_PRESSURE_KEY)),
        outlet_pressure_1: number_or_zero(payload.get("pressaoSaida1")),
        outlet_pressure_2: number_or_zero(payload.get("pressaoSaida2")),
        valve_switch: switch_flag(&coil_in_use, &actuator_state, switching_time_ms),
        status: derive_status(&quality, &actuator_state),
        device_id: label_or(payload.get("deviceId"), UNKNOWN_LABEL),
        time_of_day: time_of_day(timestamp_ms),
        coil_in_use,
        actuator_state,
        switching_time_ms,
        quality,
        timestamp_ms,
    })
}

/// `1` when the labels or switching time show the valve moving.
pub fn switch_flag(coil: &str, actuator: &str, switching_time_ms: i64) -> u8 {
    let coil = coil.to_lowercase();
    let actuator = actuator.to_lowercase();

    let switching = COIL_POSITIONS.contains(&coil.as_str())
        || ACTIVE_ACTUATOR.contains(&actuator.as_str())
        || switching_time_ms > 0;
    u8::from(switching)
}

/// Derive the reading status. Rules are checked in order; first match wins.
pub fn derive_status(quality: &str, actuator: &str) -> ReadingStatus {
    let quality = quality.to_lowercase();
    let actuator = actuator.to_lowercase();
    let has = |markers: &[&str]| markers.iter().any(|m| actuator.contains(m));

    if quality == "normal" && has(FORWARD_MARKERS) {
        ReadingStatus::Normal
    } else if quality == "warning" || has(ALERT_MARKERS) {
        ReadingStatus::Warning
    } else if quality == "error" || has(FAILURE_MARKERS) {
        ReadingStatus::Error
    } else if quality == "normal" {
        ReadingStatus::Normal
    } else {
        ReadingStatus::Warning
    }
}

/// Local `HH:MM:SS` for a unix timestamp in milliseconds.
pub fn time_of_day(timestamp_ms: i64) -> String {
    Local
        .timestamp_millis_opt(timestamp_ms)
        .single()
        .map(|t| t.format("%H:%M:%S").to_string())
        .unwrap_or_else(|| "--:--:--".to_string())
}

/// Wire-format view of a reading, as checked by the validator.
pub fn wire_record(reading: &CanonicalReading) -> Value {
    json!({
        "temperatura": reading.temperature,
        "pressaoEntrada": reading.inlet_pressure,
        "pressaoSaida1": reading.outlet_pressure_1,
        "pressaoSaida2": reading.outlet_pressure_2,
        "comutacaoValvula": reading.valve_switch,
        "bobinaUtilizada": reading.coil_in_use,
        "situacaoAtuador": reading.actuator_state,
        "tempoComutacao": reading.switching_time_ms,
        "deviceId": reading.device_id,
        "qualidade": reading.quality,
        "timestamp": reading.timestamp_ms,
    })
}
