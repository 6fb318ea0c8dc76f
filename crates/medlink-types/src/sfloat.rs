//! Bluetooth SIG 16-bit SFLOAT codec.
//!
//! An SFLOAT packs a 4-bit signed exponent in the high nibble and a 12-bit
//! two's-complement mantissa in the low bits: `value = mantissa * 10^exponent`.
//! It is not an IEEE half-float.
//!
//! Five mantissa values are reserved for special conditions. They are
//! reported as [`SfloatSpecial`] rather than turned into numbers.

use core::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Reserved SFLOAT codes (independent of the exponent bits).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum SfloatSpecial {
    /// `0x07FF`: not a number.
    NaN,
    /// `0x0800`: not at this resolution.
    NotAtThisResolution,
    /// `0x07FE`: above the measurable range ("Hi").
    PositiveInfinity,
    /// `0x0802`: below the measurable range ("Lo").
    NegativeInfinity,
    /// `0x0801`: reserved for future use.
    Reserved,
}

impl fmt::Display for SfloatSpecial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NaN => write!(f, "NaN"),
            Self::NotAtThisResolution => write!(f, "NRes"),
            Self::PositiveInfinity => write!(f, "+INFINITY"),
            Self::NegativeInfinity => write!(f, "-INFINITY"),
            Self::Reserved => write!(f, "reserved"),
        }
    }
}

const MANTISSA_MASK: u16 = 0x0FFF;
const MANTISSA_MAX: i32 = 0x07FD;
const MANTISSA_MIN: i32 = -0x07FD;

/// Decode a raw little-endian SFLOAT word.
///
/// # Examples
///
/// ```
/// use medlink_types::sfloat;
///
/// // mantissa 500, exponent -5
/// assert!((sfloat::decode(0xB1F4).unwrap() - 0.005).abs() < 1e-12);
/// assert!(sfloat::decode(0x07FF).is_err());
/// ```
pub fn decode(raw: u16) -> Result<f64, SfloatSpecial> {
    let mantissa_bits = raw & MANTISSA_MASK;
    match mantissa_bits {
        0x07FF => return Err(SfloatSpecial::NaN),
        0x0800 => return Err(SfloatSpecial::NotAtThisResolution),
        0x07FE => return Err(SfloatSpecial::PositiveInfinity),
        0x0802 => return Err(SfloatSpecial::NegativeInfinity),
        0x0801 => return Err(SfloatSpecial::Reserved),
        _ => {}
    }

    let mut mantissa = i32::from(mantissa_bits);
    if mantissa >= 0x0800 {
        mantissa -= 0x1000;
    }
    let mut exponent = i32::from(raw >> 12);
    if exponent >= 0x8 {
        exponent -= 0x10;
    }

    Ok(f64::from(mantissa) * 10f64.powi(exponent))
}

/// Encode a value as an SFLOAT word, keeping as much precision as fits.
///
/// Returns `None` if the value is not finite or cannot be represented.
pub fn encode(value: f64) -> Option<u16> {
    if !value.is_finite() {
        return None;
    }

    for exponent in -8i32..=7 {
        let mantissa = (value / 10f64.powi(exponent)).round();
        if mantissa >= f64::from(MANTISSA_MIN) && mantissa <= f64::from(MANTISSA_MAX) {
            let mantissa = mantissa as i32;
            let exp_bits = ((exponent & 0xF) as u16) << 12;
            let mantissa_bits = (mantissa as u16) & MANTISSA_MASK;
            return Some(exp_bits | mantissa_bits);
        }
    }

    None
}
