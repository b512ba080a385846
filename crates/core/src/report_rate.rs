//! Polling rate and TalkFX flag packing.
//!
//! Both live in a single settings byte:
//!   - low nibble:  polling rate code (0=125Hz, 1=250Hz, 2=500Hz, 3=1000Hz)
//!   - high nibble: TalkFX on (1) / off (0)

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

/// USB polling rates supported by the Tyon.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u16)]
pub enum PollingRate {
    Hz125 = 125,
    Hz250 = 250,
    Hz500 = 500,
    Hz1000 = 1000,
}

impl PollingRate {
    /// Convert from raw Hz value.
    pub fn from_hz(hz: u16) -> Option<Self> {
        match hz {
            125 => Some(Self::Hz125),
            250 => Some(Self::Hz250),
            500 => Some(Self::Hz500),
            1000 => Some(Self::Hz1000),
            _ => None,
        }
    }

    /// Get the Hz value.
    pub fn as_hz(&self) -> u16 {
        *self as u16
    }

    /// All supported rates.
    pub const ALL: &'static [PollingRate] = &[
        PollingRate::Hz125,
        PollingRate::Hz250,
        PollingRate::Hz500,
        PollingRate::Hz1000,
    ];

    fn code(&self) -> u8 {
        match self {
            Self::Hz125 => 0,
            Self::Hz250 => 1,
            Self::Hz500 => 2,
            Self::Hz1000 => 3,
        }
    }

    fn from_code(code: u8) -> Result<Self> {
        match code {
            0 => Ok(Self::Hz125),
            1 => Ok(Self::Hz250),
            2 => Ok(Self::Hz500),
            3 => Ok(Self::Hz1000),
            other => Err(Error::OutOfRange {
                field: "polling_rate_code",
                value: other as i64,
                min: 0,
                max: 3,
            }),
        }
    }
}

impl std::fmt::Display for PollingRate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} Hz", self.as_hz())
    }
}

/// Validate a polling rate given in Hz.
pub fn validate_polling_rate(hz: u16) -> Result<PollingRate> {
    PollingRate::from_hz(hz).ok_or(Error::OutOfRange {
        field: "polling_rate",
        value: hz as i64,
        min: 125,
        max: 1000,
    })
}

/// Pack polling rate and TalkFX flag into the settings byte.
pub fn pack(rate: PollingRate, talkfx: bool) -> u8 {
    ((talkfx as u8) << 4) | rate.code()
}

/// Polling rate from the settings byte.
pub fn unpack_rate(byte: u8) -> Result<PollingRate> {
    PollingRate::from_code(byte & 0x0F)
}

/// TalkFX flag from the settings byte.
pub fn unpack_talkfx(byte: u8) -> bool {
    (byte >> 4) != 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn polling_rate_roundtrip() {
        for rate in PollingRate::ALL {
            assert_eq!(PollingRate::from_hz(rate.as_hz()), Some(*rate));
        }
    }

    #[test]
    fn polling_rate_rejects_invalid() {
        assert_eq!(PollingRate::from_hz(200), None);
        assert!(validate_polling_rate(0).is_err());
    }

    #[test]
    fn pack_layout() {
        assert_eq!(pack(PollingRate::Hz1000, false), 0x03);
        assert_eq!(pack(PollingRate::Hz125, true), 0x10);
        assert_eq!(pack(PollingRate::Hz500, true), 0x12);
    }

    #[test]
    fn unpack_layout() {
        assert_eq!(unpack_rate(0x12).unwrap(), PollingRate::Hz500);
        assert!(unpack_talkfx(0x12));
        assert!(!unpack_talkfx(0x03));
        assert!(unpack_rate(0x07).is_err());
    }
}
