//! Safety layer: validates all host-supplied values against the ranges the
//! device accepts before they reach a profile or a report.
//!
//! # Tyon Bounds
//!
//! ## Profiles
//! - **Slots**: 0–4
//! - **Names**: at most 255 bytes, printable characters only
//!
//! ## Sensitivity
//! - **Host range**: -5 – +5
//! - **Stored**: 1 – 11 (host value + 6)
//!
//! ## Buttons
//! - **Slots**: 0–31 (16 physical buttons, then their EasyShift variants)
//!
//! ## Lighting
//! - **Palette index**: 0–15
//! - **Effect speed**: 1–3
//!
//! ## Control unit
//! - **DCU level**: 0–3
//!
//! All validation happens before any state is touched, so a rejected value
//! never leaves a profile half-updated.

use crate::error::{Error, Result};

/// Number of profile slots on the device.
pub const PROFILE_COUNT: usize = 5;
/// Longest accepted profile name, in bytes.
pub const NAME_MAX_LEN: usize = 255;

/// Sensitivity limits (host representation).
pub const SENSITIVITY_MIN: i8 = -5;
pub const SENSITIVITY_MAX: i8 = 5;
/// Offset between host and stored sensitivity.
pub const SENSITIVITY_CENTER: u8 = 6;

pub const EFFECT_SPEED_MIN: u8 = 1;
pub const EFFECT_SPEED_MAX: u8 = 3;

pub const DCU_LEVEL_MAX: u8 = 3;

/// Validate a profile slot index.
pub fn validate_profile_index(index: usize) -> Result<u8> {
    if index >= PROFILE_COUNT {
        return Err(Error::OutOfRange {
            field: "profile_index",
            value: index as i64,
            min: 0,
            max: (PROFILE_COUNT - 1) as i64,
        });
    }
    Ok(index as u8)
}

/// Unicode format characters (general category Cf): invisible marks
/// such as soft hyphens, zero-width spaces and direction overrides.
fn is_format(c: char) -> bool {
    matches!(
        c as u32,
        0x00AD
            | 0x0600..=0x0605
            | 0x061C
            | 0x06DD
            | 0x070F
            | 0x0890..=0x0891
            | 0x08E2
            | 0x180E
            | 0x200B..=0x200F
            | 0x202A..=0x202E
            | 0x2060..=0x2064
            | 0x2066..=0x206F
            | 0xFEFF
            | 0xFFF9..=0xFFFB
            | 0x110BD
            | 0x110CD
            | 0x13430..=0x1343F
            | 0x1BCA0..=0x1BCA3
            | 0x1D173..=0x1D17A
            | 0xE0001
            | 0xE0020..=0xE007F
    )
}

/// Whether a name character is allowed. The only whitespace accepted is
/// the plain space.
pub fn is_printable(c: char) -> bool {
    if c == ' ' {
        return true;
    }
    !(c.is_control() || c.is_whitespace() || is_format(c))
}

/// Validate a profile display name.
pub fn validate_name(name: &str) -> Result<()> {
    if name.len() > NAME_MAX_LEN {
        return Err(Error::OutOfRange {
            field: "name_length",
            value: name.len() as i64,
            min: 0,
            max: NAME_MAX_LEN as i64,
        });
    }
    if let Some(c) = name.chars().find(|c| !is_printable(*c)) {
        return Err(Error::OutOfRange {
            field: "name_character",
            value: c as i64,
            min: 0x20,
            max: 0x10FFFF,
        });
    }
    Ok(())
}

/// Validate a host sensitivity and return the stored byte.
pub fn validate_sensitivity(value: i8) -> Result<u8> {
    if !(SENSITIVITY_MIN..=SENSITIVITY_MAX).contains(&value) {
        return Err(Error::OutOfRange {
            field: "sensitivity",
            value: value as i64,
            min: SENSITIVITY_MIN as i64,
            max: SENSITIVITY_MAX as i64,
        });
    }
    Ok((value + SENSITIVITY_CENTER as i8) as u8)
}

/// Validate a button slot index (0-based, EasyShift slots included).
pub fn validate_button_slot(slot: usize) -> Result<()> {
    if slot >= crate::buttons::BUTTON_SLOTS {
        return Err(Error::OutOfRange {
            field: "button_slot",
            value: slot as i64,
            min: 0,
            max: (crate::buttons::BUTTON_SLOTS - 1) as i64,
        });
    }
    Ok(())
}

/// Validate a palette index.
pub fn validate_palette_index(index: u8) -> Result<()> {
    if index as usize >= crate::settings::PALETTE.len() {
        return Err(Error::OutOfRange {
            field: "palette_index",
            value: index as i64,
            min: 0,
            max: (crate::settings::PALETTE.len() - 1) as i64,
        });
    }
    Ok(())
}

/// Validate a lighting effect speed.
pub fn validate_effect_speed(speed: u8) -> Result<()> {
    if !(EFFECT_SPEED_MIN..=EFFECT_SPEED_MAX).contains(&speed) {
        return Err(Error::OutOfRange {
            field: "effect_speed",
            value: speed as i64,
            min: EFFECT_SPEED_MIN as i64,
            max: EFFECT_SPEED_MAX as i64,
        });
    }
    Ok(())
}

/// Validate a distance control unit level.
pub fn validate_dcu_level(level: u8) -> Result<()> {
    if level > DCU_LEVEL_MAX {
        return Err(Error::OutOfRange {
            field: "dcu_level",
            value: level as i64,
            min: 0,
            max: DCU_LEVEL_MAX as i64,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn profile_index_bounds() {
        for i in 0..PROFILE_COUNT {
            assert_eq!(validate_profile_index(i).unwrap(), i as u8);
        }
        assert!(validate_profile_index(5).is_err());
    }

    #[test]
    fn sensitivity_offsets_by_center() {
        assert_eq!(validate_sensitivity(0).unwrap(), 6);
        assert_eq!(validate_sensitivity(-5).unwrap(), 1);
        assert_eq!(validate_sensitivity(5).unwrap(), 11);
        assert!(validate_sensitivity(6).is_err());
        assert!(validate_sensitivity(-6).is_err());
    }

    #[test]
    fn names() {
        assert!(validate_name("Shooter 1").is_ok());
        assert!(validate_name("Spieleprofil Ä").is_ok());
        assert!(validate_name("tab\there").is_err());
        assert!(validate_name("zero\u{200B}width").is_err());
        assert!(validate_name("soft\u{00AD}hyphen").is_err());
        assert!(validate_name("no\u{00A0}break").is_err());
        assert!(validate_name("rtl\u{202E}flip").is_err());
        assert!(validate_name("\u{FEFF}bom").is_err());
        assert!(validate_name("two  spaces").is_ok());
        assert!(validate_name(&"x".repeat(256)).is_err());
        assert!(validate_name(&"x".repeat(255)).is_ok());
    }

    #[test]
    fn button_slots() {
        assert!(validate_button_slot(31).is_ok());
        assert!(validate_button_slot(32).is_err());
    }

    #[test]
    fn misc_bounds() {
        assert!(validate_palette_index(15).is_ok());
        assert!(validate_palette_index(16).is_err());
        assert!(validate_effect_speed(0).is_err());
        assert!(validate_effect_speed(3).is_ok());
        assert!(validate_dcu_level(3).is_ok());
        assert!(validate_dcu_level(4).is_err());
    }
}
