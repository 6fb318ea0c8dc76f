//! Decoders for GATT measurement characteristics.
//!
//! Every decoder walks the payload with a bounds-checked cursor that only
//! visits the fields the flags byte declares present. Short or malformed
//! payloads produce a [`DecodeError`] carrying the raw bytes; decoding never
//! panics.

use bytes::Buf;
use time::{Date, Month, OffsetDateTime, PrimitiveDateTime, Time};

use crate::error::{DecodeError, DecodeErrorKind};
use crate::measurement::{
    BloodPressureReading, GlucoseReading, MealContext, PulseOximetryReading, WeightReading,
};
use crate::sfloat;

/// Size of a SIG date-time field (year u16 + five u8 components).
pub const DATE_TIME_LEN: usize = 7;

/// Kilograms per pound.
const KILOGRAMS_PER_POUND: f64 = 0.453_592_37;

/// mg/dL per mol/L of glucose (molar mass 180.156 g/mol).
const MG_DL_PER_MOL_L: f64 = 18_015.6;

/// mg/dL per kg/L.
const MG_DL_PER_KG_L: f64 = 100_000.0;

/// Scaling applied to raw blood pressure fields.
///
/// mmHg values are `raw / mmhg_divisor`; kPa values are converted to mmHg as
/// `raw / kpa_divisor`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PressureScale {
    /// Divisor applied to mmHg fields.
    pub mmhg_divisor: f64,
    /// Divisor applied to kPa fields to obtain mmHg.
    pub kpa_divisor: f64,
}

impl PressureScale {
    /// Tenths of a unit, as sent by most monitors.
    pub const STANDARD: PressureScale = PressureScale {
        mmhg_divisor: 10.0,
        kpa_divisor: 1.333_22,
    };

    /// Omron monitors report kPa in hundredths.
    pub const OMRON: PressureScale = PressureScale {
        mmhg_divisor: 10.0,
        kpa_divisor: 13.332_2,
    };
}

impl Default for PressureScale {
    fn default() -> Self {
        Self::STANDARD
    }
}

/// Per-notification context supplied to the decoders.
#[derive(Debug, Clone, Copy)]
pub struct DecodeContext<'a> {
    /// Identifier of the device the payload came from.
    pub device_id: &'a str,
    /// Reception time, used when the payload carries no usable timestamp.
    pub received_at: OffsetDateTime,
    /// Blood pressure scaling for the device profile.
    pub pressure_scale: PressureScale,
}

impl<'a> DecodeContext<'a> {
    /// Context stamped with the current time and standard scaling.
    pub fn new(device_id: &'a str) -> Self {
        Self {
            device_id,
            received_at: OffsetDateTime::now_utc(),
            pressure_scale: PressureScale::STANDARD,
        }
    }

    /// Override the reception time.
    #[must_use]
    pub fn with_received_at(mut self, received_at: OffsetDateTime) -> Self {
        self.received_at = received_at;
        self
    }

    /// Override the blood pressure scaling.
    #[must_use]
    pub fn with_pressure_scale(mut self, scale: PressureScale) -> Self {
        self.pressure_scale = scale;
        self
    }
}

/// Bounds-checked reader over a characteristic payload.
struct Cursor<'a> {
    raw: &'a [u8],
    buf: &'a [u8],
}

impl<'a> Cursor<'a> {
    fn new(raw: &'a [u8]) -> Result<Self, DecodeError> {
        if raw.is_empty() {
            return Err(DecodeError::new(DecodeErrorKind::Empty, raw));
        }
        Ok(Self { raw, buf: raw })
    }

    fn error(&self, kind: DecodeErrorKind) -> DecodeError {
        DecodeError::new(kind, self.raw)
    }

    fn need(&self, field: &'static str, needed: usize) -> Result<(), DecodeError> {
        let remaining = self.buf.remaining();
        if remaining < needed {
            return Err(self.error(DecodeErrorKind::Truncated {
                field,
                needed,
                remaining,
            }));
        }
        Ok(())
    }

    fn has_remaining(&self) -> bool {
        self.buf.has_remaining()
    }

    fn u8(&mut self, field: &'static str) -> Result<u8, DecodeError> {
        self.need(field, 1)?;
        Ok(self.buf.get_u8())
    }

    fn u16(&mut self, field: &'static str) -> Result<u16, DecodeError> {
        self.need(field, 2)?;
        Ok(self.buf.get_u16_le())
    }

    fn i16(&mut self, field: &'static str) -> Result<i16, DecodeError> {
        self.need(field, 2)?;
        Ok(self.buf.get_i16_le())
    }

    fn sfloat(&mut self, field: &'static str) -> Result<f64, DecodeError> {
        let raw = self.u16(field)?;
        sfloat::decode(raw).map_err(|special| self.error(DecodeErrorKind::OutOfRange { field, special }))
    }

    /// Read a SIG date-time. All-zero date components mean "unknown" and
    /// yield `None`.
    fn date_time(&mut self, field: &'static str) -> Result<Option<OffsetDateTime>, DecodeError> {
        self.need(field, DATE_TIME_LEN)?;
        let year = self.buf.get_u16_le();
        let month = self.buf.get_u8();
        let day = self.buf.get_u8();
        let hour = self.buf.get_u8();
        let minute = self.buf.get_u8();
        let second = self.buf.get_u8();

        if year == 0 || month == 0 || day == 0 {
            return Ok(None);
        }

        let invalid = || self.error(DecodeErrorKind::InvalidTimestamp);
        let month = Month::try_from(month).map_err(|_| invalid())?;
        let year = i32::from(year);
        let date = Date::from_calendar_date(year, month, day).map_err(|_| invalid())?;
        let time = Time::from_hms(hour, minute, second).map_err(|_| invalid())?;
        Ok(Some(PrimitiveDateTime::new(date, time).assume_utc()))
    }
}

fn round_to(value: f64, places: i32) -> f32 {
    let factor = 10f64.powi(places);
    ((value * factor).round() / factor) as f32
}

/// Decode a Blood Pressure Measurement (`0x2A35`) payload.
///
/// Flags (byte 0): bit0 kPa, bit1 timestamp, bit2 pulse rate, bit3 user id,
/// bit4 measurement status. Systolic, diastolic and mean arterial pressure
/// follow as little-endian `u16`, then each flagged field in that order.
///
/// # Errors
///
/// Returns a [`DecodeError`] if the payload is empty, shorter than its flags
/// declare, or carries an impossible timestamp.
pub fn decode_blood_pressure(
    bytes: &[u8],
    ctx: &DecodeContext<'_>,
) -> Result<BloodPressureReading, DecodeError> {
    let mut cur = Cursor::new(bytes)?;
    let flags = cur.u8("flags")?;
    let kpa = flags & 0x01 != 0;

    let divisor = if kpa {
        ctx.pressure_scale.kpa_divisor
    } else {
        ctx.pressure_scale.mmhg_divisor
    };
    let pressure = |raw: u16| round_to(f64::from(raw) / divisor, 1);

    let systolic = pressure(cur.u16("systolic")?);
    let diastolic = pressure(cur.u16("diastolic")?);
    let mean_arterial_pressure = pressure(cur.u16("mean arterial pressure")?);

    let timestamp = if flags & 0x02 != 0 {
        cur.date_time("timestamp")?
    } else {
        None
    };
    let pulse = if flags & 0x04 != 0 {
        Some(round_to(f64::from(cur.u16("pulse rate")?) / 10.0, 1))
    } else {
        None
    };
    let user_id = if flags & 0x08 != 0 {
        Some(cur.u8("user id")?)
    } else {
        None
    };
    let status = if flags & 0x10 != 0 {
        cur.u16("measurement status")?
    } else {
        0
    };

    Ok(BloodPressureReading {
        systolic,
        diastolic,
        mean_arterial_pressure,
        pulse,
        user_id,
        timestamp: timestamp.unwrap_or(ctx.received_at),
        device_id: ctx.device_id.to_string(),
        irregular_pulse: status & 0x01 != 0,
        movement_detected: status & 0x02 != 0,
    })
}

/// Decode a Glucose Measurement (`0x2A18`) payload.
///
/// Flags (byte 0): bit0 time offset, bit1 type and sample location, bit2
/// concentration in mol/L (kg/L otherwise). The concentration is converted
/// to mg/dL and rounded to a whole number.
///
/// # Errors
///
/// Returns a [`DecodeError`] if the payload is truncated, the base time is
/// impossible, or the concentration is one of the SFLOAT special codes.
pub fn decode_glucose(bytes: &[u8], ctx: &DecodeContext<'_>) -> Result<GlucoseReading, DecodeError> {
    let mut cur = Cursor::new(bytes)?;
    let flags = cur.u8("flags")?;

    let sequence_number = cur.u16("sequence number")?;
    let base_time = cur.date_time("base time")?;
    let offset_minutes = if flags & 0x01 != 0 {
        cur.i16("time offset")?
    } else {
        0
    };

    let concentration = cur.sfloat("concentration")?;
    let factor = if flags & 0x04 != 0 {
        MG_DL_PER_MOL_L
    } else {
        MG_DL_PER_KG_L
    };
    let value = (concentration * factor).round() as f32;

    // The type/location byte is trailing; a meter that sets the flag but
    // omits the byte still yields a reading.
    let meal_context = if flags & 0x02 != 0 && cur.has_remaining() {
        let type_location = cur.u8("type and sample location")?;
        MealContext::from_nibble(type_location >> 4)
    } else {
        None
    };

    let timestamp = match base_time {
        Some(base) => base
            .checked_add(time::Duration::minutes(i64::from(offset_minutes)))
            .ok_or_else(|| cur.error(DecodeErrorKind::InvalidTimestamp))?,
        None => ctx.received_at,
    };

    Ok(GlucoseReading {
        value,
        sequence_number,
        timestamp,
        device_id: ctx.device_id.to_string(),
        meal_context,
    })
}

/// Decode a PLX Spot-Check Measurement (`0x2A5E`) payload.
///
/// Flags (byte 0): bit0 timestamp present. SpO2 and pulse rate follow as
/// SFLOATs, then the optional timestamp.
///
/// # Errors
///
/// Returns a [`DecodeError`] on truncation, impossible timestamps or SFLOAT
/// special codes.
pub fn decode_pulse_oximetry(
    bytes: &[u8],
    ctx: &DecodeContext<'_>,
) -> Result<PulseOximetryReading, DecodeError> {
    let mut cur = Cursor::new(bytes)?;
    let flags = cur.u8("flags")?;

    let spo2 = round_to(cur.sfloat("spo2")?, 1);
    let pulse_rate = round_to(cur.sfloat("pulse rate")?, 1);
    let timestamp = if flags & 0x01 != 0 {
        cur.date_time("timestamp")?
    } else {
        None
    };

    Ok(PulseOximetryReading {
        spo2,
        pulse_rate,
        timestamp: timestamp.unwrap_or(ctx.received_at),
        device_id: ctx.device_id.to_string(),
    })
}

/// Decode a Weight Measurement (`0x2A9D`) payload.
///
/// Flags (byte 0): bit0 imperial units, bit1 timestamp present. The weight is
/// a `u16` in 0.005 kg or 0.01 lb steps and is always reported in kilograms.
///
/// # Errors
///
/// Returns a [`DecodeError`] on truncation or impossible timestamps.
pub fn decode_weight(bytes: &[u8], ctx: &DecodeContext<'_>) -> Result<WeightReading, DecodeError> {
    let mut cur = Cursor::new(bytes)?;
    let flags = cur.u8("flags")?;

    let raw = f64::from(cur.u16("weight")?);
    let kilograms = if flags & 0x01 != 0 {
        raw * 0.01 * KILOGRAMS_PER_POUND
    } else {
        raw * 0.005
    };
    let timestamp = if flags & 0x02 != 0 {
        cur.date_time("timestamp")?
    } else {
        None
    };

    Ok(WeightReading {
        kilograms: round_to(kilograms, 3),
        timestamp: timestamp.unwrap_or(ctx.received_at),
        device_id: ctx.device_id.to_string(),
    })
}
