//! Field schema checks and content scanning for candidate records.

use regex::Regex;
use serde_json::Value;

use super::coerce::to_number;
use crate::error::ValidationError;

/// Declared bounds for one numeric wire field.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FieldRule {
    pub field: &'static str,
    pub min: f64,
    pub max: f64,
    pub required: bool,
}

/// Numeric wire fields and their accepted ranges.
pub const SCHEMA: &[FieldRule] = &[
    FieldRule { field: "temperatura", min: -50.0, max: 100.0, required: true },
    FieldRule { field: "pressaoEntrada", min: 0.0, max: 50.0, required: true },
    FieldRule { field: "pressaoSaida1", min: 0.0, max: 30.0, required: true },
    FieldRule { field: "pressaoSaida2", min: 0.0, max: 30.0, required: false },
    FieldRule { field: "comutacaoValvula", min: 0.0, max: 1.0, required: false },
];

/// Injection-style content that is never legitimate in a sensor record.
const SUSPICIOUS_PATTERNS: &[&str] = &[
    r"(?i)<script",
    r"(?i)javascript:",
    r"(?i)eval\(",
    r"(?i)function\s*\(",
    r"(?i)alert\(",
];

/// Schema validator with an optional content scan.
#[derive(Debug)]
pub struct Validator {
    enabled: bool,
    security: bool,
    patterns: Vec<Regex>,
    violations: u64,
}

impl Validator {
    pub fn new(enabled: bool, security: bool) -> Self {
        Self {
            enabled,
            security,
            patterns: SUSPICIOUS_PATTERNS
                .iter()
                .filter_map(|p| Regex::new(p).ok())
                .collect(),
            violations: 0,
        }
    }

    /// Check a candidate record. Always passes when validation is disabled.
    pub fn validate(&mut self, candidate: &Value) -> Result<(), ValidationError> {
        if !self.enabled {
            return Ok(());
        }

        let Value::Object(record) = candidate else {
            return Err(ValidationError::NotAnObject);
        };

        for rule in SCHEMA {
            let value = match record.get(rule.field) {
                None | Some(Value::Null) if rule.required => {
                    return Err(ValidationError::MissingField(rule.field))
                }
                None | Some(Value::Null) => continue,
                Some(value) => value,
            };

            let number = to_number(value);
            if number.is_nan() {
                return Err(ValidationError::NotANumber(rule.field));
            }
            if number < rule.min || number > rule.max {
                return Err(ValidationError::OutOfRange {
                    field: rule.field,
                    value: number,
                    min: rule.min,
                    max: rule.max,
                });
            }
        }

        if self.security {
            let text = candidate.to_string();
            if let Some(pattern) = self.patterns.iter().find(|p| p.is_match(&text)) {
                self.violations += 1;
                return Err(ValidationError::Suspicious {
                    pattern: pattern.as_str().to_string(),
                    violations: self.violations,
                });
            }
        }

        Ok(())
    }

    /// Records rejected by the content scan so far.
    pub fn violations(&self) -> u64 {
        self.violations
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn conforming() -> Value {
        json!({
            "temperatura": 25.0,
            "pressaoEntrada": 6.0,
            "pressaoSaida1": 4.0,
            "pressaoSaida2": 3.5,
            "comutacaoValvula": 1
        })
    }

    #[test]
    fn test_accepts_conforming_record() {
        let mut validator = Validator::new(true, true);
        assert!(validator.validate(&conforming()).is_ok());
    }

    #[test]
    fn test_rejects_missing_inlet_pressure() {
        let mut validator = Validator::new(true, true);
        let mut record = conforming();
        record.as_object_mut().unwrap().remove("pressaoEntrada");

        assert_eq!(
            validator.validate(&record),
            Err(ValidationError::MissingField("pressaoEntrada"))
        );
    }

    #[test]
    fn test_rejects_non_numeric_temperature() {
        let mut validator = Validator::new(true, true);
        let mut record = conforming();
        record["temperatura"] = json!("abc");

        assert_eq!(
            validator.validate(&record),
            Err(ValidationError::NotANumber("temperatura"))
        );
    }

    #[test]
    fn test_rejects_out_of_range() {
        let mut validator = Validator::new(true, false);
        let mut record = conforming();
        record["pressaoSaida2"] = json!(31);

        assert!(matches!(
            validator.validate(&record),
            Err(ValidationError::OutOfRange { field: "pressaoSaida2", .. })
        ));
    }

    #[test]
    fn test_optional_fields_may_be_absent() {
        let mut validator = Validator::new(true, true);
        let record = json!({ "temperatura": 0, "pressaoEntrada": "1.5", "pressaoSaida1": 0 });
        assert!(validator.validate(&record).is_ok());
    }

    #[test]
    fn test_disabled_accepts_anything() {
        let mut validator = Validator::new(false, true);
        assert!(validator.validate(&json!("not even an object")).is_ok());
        assert!(validator.validate(&json!({ "temperatura": "abc" })).is_ok());
    }

    #[test]
    fn test_script_tag_counts_one_violation() {
        let mut validator = Validator::new(true, true);
        let mut record = conforming();
        record["deviceId"] = json!("<script>alert(1)</script>");

        let err = validator.validate(&record).unwrap_err();
        assert!(matches!(err, ValidationError::Suspicious { violations: 1, .. }));
        assert_eq!(validator.violations(), 1);
    }

    #[test]
    fn test_security_scan_can_be_disabled() {
        let mut validator = Validator::new(true, false);
        let mut record = conforming();
        record["deviceId"] = json!("javascript:void(0)");

        assert!(validator.validate(&record).is_ok());
        assert_eq!(validator.violations(), 0);
    }
}
