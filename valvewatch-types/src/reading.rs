//! The canonical sensor record produced by the ingestion pipeline.

use alloc::string::String;

/// Label used when the device did not report which coil is energized.
pub const UNKNOWN_COIL: &str = "none";

/// Label used for any other string field the device left out.
pub const UNKNOWN_LABEL: &str = "unknown";

/// Derived condition of a single reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum ReadingStatus {
    #[default]
    Normal,
    Warning,
    Error,
}

impl ReadingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReadingStatus::Normal => "normal",
            ReadingStatus::Warning => "warning",
            ReadingStatus::Error => "error",
        }
    }
}

/// One normalized sensor sample.
///
/// Temperature and inlet pressure are always backed by a real measurement;
/// every other numeric field falls back to `0` and every label to a sentinel
/// when the device omits it.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CanonicalReading {
    /// Temperature in °C.
    pub temperature: f64,
    /// Inlet pressure in bar.
    pub inlet_pressure: f64,
    /// First outlet pressure in bar.
    pub outlet_pressure_1: f64,
    /// Second outlet pressure in bar.
    pub outlet_pressure_2: f64,
    /// `1` when the valve is switching, derived from coil/actuator labels.
    pub valve_switch: u8,
    /// Which solenoid coil is in use (e.g. "left", "right", "none").
    pub coil_in_use: String,
    /// Free-text actuator motion label (e.g. "forward", "retracted").
    pub actuator_state: String,
    /// Reported switching time in milliseconds.
    pub switching_time_ms: i64,
    /// Reporting device.
    pub device_id: String,
    /// Quality label attached by the device or broker.
    pub quality: String,
    /// Unix timestamp in milliseconds.
    pub timestamp_ms: i64,
    /// Local time of day, `HH:MM:SS`.
    pub time_of_day: String,
    pub status: ReadingStatus,
}

impl Default for CanonicalReading {
    fn default() -> Self {
        Self {
            temperature: 0.0,
            inlet_pressure: 0.0,
            outlet_pressure_1: 0.0,
            outlet_pressure_2: 0.0,
            valve_switch: 0,
            coil_in_use: String::from(UNKNOWN_COIL),
            actuator_state: String::from(UNKNOWN_LABEL),
            switching_time_ms: 0,
            device_id: String::from(UNKNOWN_LABEL),
            quality: String::from(UNKNOWN_LABEL),
            timestamp_ms: 0,
            time_of_day: String::from("--:--:--"),
            status: ReadingStatus::Normal,
        }
    }
}

impl CanonicalReading {
    /// Whether the valve was reported as switching.
    pub fn is_switching(&self) -> bool {
        self.valve_switch == 1
    }
}
