//! CPI level quantization.
//!
//! The device stores each of the five CPI levels as a single byte:
//! the desired CPI divided by 200, shifted into the high six bits.
//!
//! ```text
//! stored = (dpi / 200) << 2
//! dpi    = (stored >> 2) * 200
//! ```
//!
//! Values that are not a multiple of 200 truncate toward the step below
//! (3450 becomes 3400). The same quantization is used everywhere a level is
//! written: setters, file import, and defaults.

use crate::error::{Error, Result};

/// Lowest CPI the sensor accepts.
pub const DPI_MIN: u16 = 200;
/// Highest CPI the sensor accepts.
pub const DPI_MAX: u16 = 8200;
/// Quantization step.
pub const DPI_STEP: u16 = 200;
/// Number of CPI levels per profile.
pub const CPI_LEVELS: usize = 5;

/// Check the host-side value is within the sensor range.
pub fn validate_dpi(dpi: u16) -> Result<u16> {
    if !(DPI_MIN..=DPI_MAX).contains(&dpi) {
        return Err(Error::OutOfRange {
            field: "dpi",
            value: dpi as i64,
            min: DPI_MIN as i64,
            max: DPI_MAX as i64,
        });
    }
    Ok(dpi)
}

/// Encode a host CPI value into the stored byte.
pub fn encode_dpi(dpi: u16) -> Result<u8> {
    let dpi = validate_dpi(dpi)?;
    Ok(((dpi / DPI_STEP) << 2) as u8)
}

/// Decode a stored byte into the host CPI value.
pub fn decode_dpi(stored: u8) -> u16 {
    (stored >> 2) as u16 * DPI_STEP
}

/// Validate a CPI level slot index.
pub fn validate_level(level: usize) -> Result<()> {
    if level >= CPI_LEVELS {
        return Err(Error::OutOfRange {
            field: "cpi_level",
            value: level as i64,
            min: 0,
            max: (CPI_LEVELS - 1) as i64,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_3400_is_68() {
        assert_eq!(encode_dpi(3400).unwrap(), 68);
        assert_eq!(decode_dpi(68), 3400);
    }

    #[test]
    fn non_multiples_truncate() {
        assert_eq!(decode_dpi(encode_dpi(3450).unwrap()), 3400);
        assert_eq!(decode_dpi(encode_dpi(399).unwrap()), 200);
    }

    #[test]
    fn range_limits() {
        assert_eq!(decode_dpi(encode_dpi(DPI_MIN).unwrap()), DPI_MIN);
        assert_eq!(decode_dpi(encode_dpi(DPI_MAX).unwrap()), DPI_MAX);
        assert!(encode_dpi(100).is_err());
        assert!(encode_dpi(8400).is_err());
    }

    #[test]
    fn low_bits_ignored_on_decode() {
        assert_eq!(decode_dpi(68 | 0x03), 3400);
    }

    #[test]
    fn level_index_bounds() {
        assert!(validate_level(4).is_ok());
        assert!(validate_level(5).is_err());
    }
}
