//! Clinical range checks for decoded measurements.
//!
//! Validation is pure and deterministic. Errors mark a reading as
//! physiologically implausible (most likely a bad measurement); warnings flag
//! plausible readings that deserve attention.
//!
//! # Example
//!
//! ```
//! use medlink_core::validation::{ValidationIssue, validate_glucose};
//! use medlink_types::GlucoseReading;
//!
//! let reading = GlucoseReading {
//!     value: 69.0,
//!     sequence_number: 1,
//!     timestamp: time::OffsetDateTime::UNIX_EPOCH,
//!     device_id: "meter".into(),
//!     meal_context: None,
//! };
//!
//! let result = validate_glucose(&reading);
//! assert!(result.is_valid);
//! assert_eq!(result.warnings, vec![ValidationIssue::Hypoglycemia { value: 69.0 }]);
//! ```

use serde::{Deserialize, Serialize};

use medlink_types::{
    BloodPressureReading, GlucoseReading, MealContext, Measurement, PulseOximetryReading,
    WeightReading,
};

/// Plausible systolic range (mmHg).
pub const SYSTOLIC_RANGE: (f32, f32) = (60.0, 250.0);
/// Plausible diastolic range (mmHg).
pub const DIASTOLIC_RANGE: (f32, f32) = (40.0, 150.0);
/// Expected resting pulse range for blood pressure monitors (bpm).
pub const BP_PULSE_RANGE: (f32, f32) = (30.0, 200.0);
/// Measurable glucose range (mg/dL).
pub const GLUCOSE_RANGE: (f32, f32) = (10.0, 600.0);
/// Below this glucose value a hypoglycemia warning is raised (mg/dL).
pub const HYPOGLYCEMIA_THRESHOLD: f32 = 70.0;
/// Above this glucose value, outside a post-meal sample, a warning is raised (mg/dL).
pub const HYPERGLYCEMIA_THRESHOLD: f32 = 180.0;
/// Plausible SpO2 range (%).
pub const SPO2_RANGE: (f32, f32) = (50.0, 100.0);
/// Plausible pulse oximeter pulse range (bpm).
pub const OXIMETER_PULSE_RANGE: (f32, f32) = (30.0, 250.0);
/// Below this SpO2 a low-saturation warning is raised (%).
pub const LOW_SPO2_THRESHOLD: f32 = 90.0;
/// Plausible body weight range (kg).
pub const WEIGHT_RANGE: (f32, f32) = (2.0, 500.0);

/// A single validation finding.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new checks
/// in future versions without breaking downstream code.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "issue", rename_all = "snake_case")]
#[non_exhaustive]
pub enum ValidationIssue {
    /// Systolic pressure outside the plausible range.
    SystolicOutOfRange { value: f32 },
    /// Diastolic pressure outside the plausible range.
    DiastolicOutOfRange { value: f32 },
    /// Diastolic pressure is not below systolic.
    DiastolicNotBelowSystolic { systolic: f32, diastolic: f32 },
    /// Pulse rate outside the expected range.
    PulseOutOfRange { value: f32 },
    /// The monitor detected body movement.
    MovementDetected,
    /// The monitor detected an irregular pulse.
    IrregularPulse,
    /// Glucose concentration outside the measurable range.
    GlucoseOutOfRange { value: f32 },
    /// Glucose below the hypoglycemia threshold.
    Hypoglycemia { value: f32 },
    /// Glucose above the hyperglycemia threshold outside a post-meal sample.
    HyperglycemiaRisk { value: f32 },
    /// SpO2 outside the plausible range.
    Spo2OutOfRange { value: f32 },
    /// SpO2 below the low-saturation threshold.
    LowOxygenSaturation { value: f32 },
    /// Body weight outside the plausible range.
    WeightOutOfRange { value: f32 },
}

impl std::fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValidationIssue::SystolicOutOfRange { value } => write!(
                f,
                "Systolic {} mmHg is outside {}-{} mmHg",
                value, SYSTOLIC_RANGE.0, SYSTOLIC_RANGE.1
            ),
            ValidationIssue::DiastolicOutOfRange { value } => write!(
                f,
                "Diastolic {} mmHg is outside {}-{} mmHg",
                value, DIASTOLIC_RANGE.0, DIASTOLIC_RANGE.1
            ),
            ValidationIssue::DiastolicNotBelowSystolic {
                systolic,
                diastolic,
            } => write!(
                f,
                "Diastolic {} mmHg must be below systolic {} mmHg",
                diastolic, systolic
            ),
            ValidationIssue::PulseOutOfRange { value } => {
                write!(f, "Pulse {} bpm is outside the expected range", value)
            }
            ValidationIssue::MovementDetected => {
                write!(f, "Body movement detected during measurement")
            }
            ValidationIssue::IrregularPulse => write!(f, "Irregular pulse detected"),
            ValidationIssue::GlucoseOutOfRange { value } => write!(
                f,
                "Glucose {} mg/dL is outside {}-{} mg/dL",
                value, GLUCOSE_RANGE.0, GLUCOSE_RANGE.1
            ),
            ValidationIssue::Hypoglycemia { value } => {
                write!(f, "Glucose {} mg/dL indicates hypoglycemia", value)
            }
            ValidationIssue::HyperglycemiaRisk { value } => {
                write!(f, "Glucose {} mg/dL indicates hyperglycemia risk", value)
            }
            ValidationIssue::Spo2OutOfRange { value } => {
                write!(f, "SpO2 {}% is outside the plausible range", value)
            }
            ValidationIssue::LowOxygenSaturation { value } => {
                write!(f, "SpO2 {}% is below {}%", value, LOW_SPO2_THRESHOLD)
            }
            ValidationIssue::WeightOutOfRange { value } => {
                write!(f, "Weight {} kg is outside the plausible range", value)
            }
        }
    }
}

/// Result of validating a measurement.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ValidationResult {
    /// Whether the measurement has no errors.
    pub is_valid: bool,
    /// Findings that make the measurement implausible.
    pub errors: Vec<ValidationIssue>,
    /// Findings that are worth surfacing but do not invalidate it.
    pub warnings: Vec<ValidationIssue>,
}

impl ValidationResult {
    fn from_issues(errors: Vec<ValidationIssue>, warnings: Vec<ValidationIssue>) -> Self {
        Self {
            is_valid: errors.is_empty(),
            errors,
            warnings,
        }
    }

    /// Check if there are any warnings.
    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }
}

fn outside(value: f32, (min, max): (f32, f32)) -> bool {
    value < min || value > max
}

/// Validate a blood pressure reading.
pub fn validate_blood_pressure(reading: &BloodPressureReading) -> ValidationResult {
    let mut errors = Vec::new();
    let mut warnings = Vec::new();

    if outside(reading.systolic, SYSTOLIC_RANGE) {
        errors.push(ValidationIssue::SystolicOutOfRange {
            value: reading.systolic,
        });
    }
    if outside(reading.diastolic, DIASTOLIC_RANGE) {
        errors.push(ValidationIssue::DiastolicOutOfRange {
            value: reading.diastolic,
        });
    }
    if reading.diastolic >= reading.systolic {
        errors.push(ValidationIssue::DiastolicNotBelowSystolic {
            systolic: reading.systolic,
            diastolic: reading.diastolic,
        });
    }

    if let Some(pulse) = reading.pulse
        && outside(pulse, BP_PULSE_RANGE)
    {
        warnings.push(ValidationIssue::PulseOutOfRange { value: pulse });
    }
    if reading.movement_detected {
        warnings.push(ValidationIssue::MovementDetected);
    }
    if reading.irregular_pulse {
        warnings.push(ValidationIssue::IrregularPulse);
    }

    ValidationResult::from_issues(errors, warnings)
}

/// Validate a glucose reading.
pub fn validate_glucose(reading: &GlucoseReading) -> ValidationResult {
    let mut errors = Vec::new();
    let mut warnings = Vec::new();
    let value = reading.value;

    if outside(value, GLUCOSE_RANGE) {
        errors.push(ValidationIssue::GlucoseOutOfRange { value });
    }
    if value < HYPOGLYCEMIA_THRESHOLD {
        warnings.push(ValidationIssue::Hypoglycemia { value });
    }
    if value > HYPERGLYCEMIA_THRESHOLD && reading.meal_context != Some(MealContext::AfterMeal) {
        warnings.push(ValidationIssue::HyperglycemiaRisk { value });
    }

    ValidationResult::from_issues(errors, warnings)
}

/// Validate a pulse oximetry reading.
pub fn validate_pulse_oximetry(reading: &PulseOximetryReading) -> ValidationResult {
    let mut errors = Vec::new();
    let mut warnings = Vec::new();

    if outside(reading.spo2, SPO2_RANGE) {
        errors.push(ValidationIssue::Spo2OutOfRange {
            value: reading.spo2,
        });
    }
    if outside(reading.pulse_rate, OXIMETER_PULSE_RANGE) {
        errors.push(ValidationIssue::PulseOutOfRange {
            value: reading.pulse_rate,
        });
    }
    if reading.spo2 < LOW_SPO2_THRESHOLD {
        warnings.push(ValidationIssue::LowOxygenSaturation {
            value: reading.spo2,
        });
    }

    ValidationResult::from_issues(errors, warnings)
}

/// Validate a weight reading.
pub fn validate_weight(reading: &WeightReading) -> ValidationResult {
    let mut errors = Vec::new();
    if outside(reading.kilograms, WEIGHT_RANGE) {
        errors.push(ValidationIssue::WeightOutOfRange {
            value: reading.kilograms,
        });
    }
    ValidationResult::from_issues(errors, Vec::new())
}

/// Validate any measurement.
pub fn validate(measurement: &Measurement) -> ValidationResult {
    match measurement {
        Measurement::BloodPressure(r) => validate_blood_pressure(r),
        Measurement::Glucose(r) => validate_glucose(r),
        Measurement::PulseOximetry(r) => validate_pulse_oximetry(r),
        Measurement::Weight(r) => validate_weight(r),
        _ => ValidationResult::from_issues(Vec::new(), Vec::new()),
    }
}


#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;
    use time::OffsetDateTime;

    fn reading(systolic: f32, diastolic: f32) -> BloodPressureReading {
        BloodPressureReading {
            systolic,
            diastolic,
            mean_arterial_pressure: 0.0,
            pulse: None,
            user_id: None,
            timestamp: OffsetDateTime::UNIX_EPOCH,
            device_id: "bp".to_string(),
            irregular_pulse: false,
            movement_detected: false,
        }
    }

    proptest! {
        #[test]
        fn diastolic_at_or_above_systolic_is_invalid(systolic in 0.0f32..300.0, delta in 0.0f32..100.0) {
            let result = validate_blood_pressure(&reading(systolic, systolic + delta));
            prop_assert!(!result.is_valid);
        }

        #[test]
        fn validity_matches_error_list(systolic in 0.0f32..300.0, diastolic in 0.0f32..300.0) {
            let result = validate_blood_pressure(&reading(systolic, diastolic));
            prop_assert_eq!(result.is_valid, result.errors.is_empty());
        }

        #[test]
        fn glucose_validity_matches_range(value in 0.0f32..800.0) {
            let reading = GlucoseReading {
                value,
                sequence_number: 0,
                timestamp: OffsetDateTime::UNIX_EPOCH,
                device_id: "meter".to_string(),
                meal_context: None,
            };
            let in_range = (GLUCOSE_RANGE.0..=GLUCOSE_RANGE.1).contains(&value);
            prop_assert_eq!(validate_glucose(&reading).is_valid, in_range);
        }
    }
}
