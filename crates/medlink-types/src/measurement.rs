//! Physiological readings decoded from device notifications.

use core::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::types::DeviceKind;

/// Meal context attached to a glucose reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum MealContext {
    /// Fasting sample.
    Fasting,
    /// Sample taken before a meal.
    BeforeMeal,
    /// Sample taken after a meal.
    AfterMeal,
}

impl MealContext {
    /// Map the sample-type nibble of a glucose measurement to a meal context.
    pub fn from_nibble(nibble: u8) -> Option<Self> {
        match nibble {
            1 => Some(MealContext::Fasting),
            2 => Some(MealContext::BeforeMeal),
            3 => Some(MealContext::AfterMeal),
            _ => None,
        }
    }
}

impl fmt::Display for MealContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MealContext::Fasting => write!(f, "fasting"),
            MealContext::BeforeMeal => write!(f, "before meal"),
            MealContext::AfterMeal => write!(f, "after meal"),
        }
    }
}

/// Blood pressure reading (values in mmHg).
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct BloodPressureReading {
    /// Systolic pressure in mmHg.
    pub systolic: f32,
    /// Diastolic pressure in mmHg.
    pub diastolic: f32,
    /// Mean arterial pressure in mmHg.
    pub mean_arterial_pressure: f32,
    /// Pulse rate in beats per minute, if reported.
    pub pulse: Option<f32>,
    /// Device-side user index, if reported.
    pub user_id: Option<u8>,
    /// When the measurement was taken.
    #[cfg_attr(feature = "serde", serde(with = "time::serde::rfc3339"))]
    pub timestamp: OffsetDateTime,
    /// Identifier of the device that produced the reading.
    pub device_id: String,
    /// Irregular pulse detected during the measurement.
    pub irregular_pulse: bool,
    /// Body movement detected during the measurement.
    pub movement_detected: bool,
}

/// Glucose reading.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct GlucoseReading {
    /// Concentration in mg/dL.
    pub value: f32,
    /// Record sequence number assigned by the meter.
    pub sequence_number: u16,
    /// When the sample was taken.
    #[cfg_attr(feature = "serde", serde(with = "time::serde::rfc3339"))]
    pub timestamp: OffsetDateTime,
    /// Identifier of the device that produced the reading.
    pub device_id: String,
    /// Meal context, if reported.
    pub meal_context: Option<MealContext>,
}

/// Pulse oximetry spot-check reading.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PulseOximetryReading {
    /// Oxygen saturation in percent.
    pub spo2: f32,
    /// Pulse rate in beats per minute.
    pub pulse_rate: f32,
    /// When the measurement was taken.
    #[cfg_attr(feature = "serde", serde(with = "time::serde::rfc3339"))]
    pub timestamp: OffsetDateTime,
    /// Identifier of the device that produced the reading.
    pub device_id: String,
}

/// Body weight reading.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct WeightReading {
    /// Weight in kilograms.
    pub kilograms: f32,
    /// When the measurement was taken.
    #[cfg_attr(feature = "serde", serde(with = "time::serde::rfc3339"))]
    pub timestamp: OffsetDateTime,
    /// Identifier of the device that produced the reading.
    pub device_id: String,
}

/// A decoded measurement, one per notification.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(tag = "type", rename_all = "snake_case"))]
#[non_exhaustive]
pub enum Measurement {
    /// Blood pressure reading.
    BloodPressure(BloodPressureReading),
    /// Glucose reading.
    Glucose(GlucoseReading),
    /// Pulse oximetry reading.
    PulseOximetry(PulseOximetryReading),
    /// Weight reading.
    Weight(WeightReading),
}

impl Measurement {
    /// Identifier of the device that produced the measurement.
    pub fn device_id(&self) -> &str {
        match self {
            Measurement::BloodPressure(r) => &r.device_id,
            Measurement::Glucose(r) => &r.device_id,
            Measurement::PulseOximetry(r) => &r.device_id,
            Measurement::Weight(r) => &r.device_id,
        }
    }

    /// When the measurement was taken.
    pub fn timestamp(&self) -> OffsetDateTime {
        match self {
            Measurement::BloodPressure(r) => r.timestamp,
            Measurement::Glucose(r) => r.timestamp,
            Measurement::PulseOximetry(r) => r.timestamp,
            Measurement::Weight(r) => r.timestamp,
        }
    }

    /// The device kind this measurement comes from.
    pub fn kind(&self) -> DeviceKind {
        match self {
            Measurement::BloodPressure(_) => DeviceKind::BloodPressure,
            Measurement::Glucose(_) => DeviceKind::Glucose,
            Measurement::PulseOximetry(_) => DeviceKind::PulseOximeter,
            Measurement::Weight(_) => DeviceKind::Scale,
        }
    }
}

impl fmt::Display for Measurement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Measurement::BloodPressure(r) => {
                write!(f, "{:.0}/{:.0} mmHg", r.systolic, r.diastolic)?;
                if let Some(pulse) = r.pulse {
                    write!(f, ", pulse {:.0} bpm", pulse)?;
                }
                Ok(())
            }
            Measurement::Glucose(r) => {
                write!(f, "{:.0} mg/dL", r.value)?;
                if let Some(ctx) = r.meal_context {
                    write!(f, " ({})", ctx)?;
                }
                Ok(())
            }
            Measurement::PulseOximetry(r) => {
                write!(f, "SpO2 {:.0}%, pulse {:.0} bpm", r.spo2, r.pulse_rate)
            }
            Measurement::Weight(r) => write!(f, "{:.2} kg", r.kilograms),
        }
    }
}
