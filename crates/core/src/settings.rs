//! Profile settings report (0x06, 30 bytes).
//!
//! ```text
//! 0  report id        10 cpi level 3        20 wheel light green
//! 1  size (0x1E)      11 cpi level 4        21 wheel light blue
//! 2  profile index    12 active cpi slot    22 wheel light unused
//! 3  advanced sens.   13 talkfx | polling   23 bottom light index
//! 4  sensitivity x    14 lights enabled     24 bottom light red
//! 5  sensitivity y    15 color flow         25 bottom light green
//! 6  cpi enabled mask 16 light effect       26 bottom light blue
//! 7  cpi level 0      17 effect speed       27 bottom light unused
//! 8  cpi level 1      18 wheel light index  28 checksum lo
//! 9  cpi level 2      19 wheel light red    29 checksum hi
//! ```

use crate::dpi::{self, CPI_LEVELS};
use crate::error::{Error, Result};
use crate::report::{check_sized_frame, checksum, ids, FeatureReport};
use crate::report_rate::{self, PollingRate};
use crate::safety;

/// Device color table.
pub const PALETTE: [[u8; 3]; 16] = [
    [0x05, 0x90, 0xFE],
    [0x00, 0x71, 0xFF],
    [0x00, 0x00, 0xFF],
    [0x5C, 0x18, 0xE6],
    [0x81, 0x18, 0xE6],
    [0xC5, 0x18, 0xE6],
    [0xF8, 0x04, 0x7C],
    [0xFF, 0x00, 0x00],
    [0xF7, 0x79, 0x00],
    [0xE7, 0xDC, 0x00],
    [0xC2, 0xF2, 0x08],
    [0x00, 0xFF, 0x00],
    [0x18, 0xA6, 0x2A],
    [0x13, 0xEC, 0x96],
    [0x0D, 0xE2, 0xD9],
    [0xFF, 0xFF, 0xFF],
];

/// Bits of the lights-enabled mask.
pub mod lights {
    pub const WHEEL: u8 = 0x01;
    pub const BOTTOM: u8 = 0x02;
    /// Lights use their RGB bytes instead of the palette entry.
    pub const CUSTOM_COLOR: u8 = 0x10;
}

/// Which of the two LEDs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LightZone {
    Wheel = 0,
    Bottom = 1,
}

impl LightZone {
    pub fn enable_bit(&self) -> u8 {
        match self {
            Self::Wheel => lights::WHEEL,
            Self::Bottom => lights::BOTTOM,
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_lowercase().as_str() {
            "wheel" => Some(Self::Wheel),
            "bottom" => Some(Self::Bottom),
            _ => None,
        }
    }
}

/// One LED entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Light {
    pub index: u8,
    pub red: u8,
    pub green: u8,
    pub blue: u8,
    pub unused: u8,
}

impl Light {
    pub const SIZE: usize = 5;

    /// Light showing a palette entry.
    pub fn from_palette(index: u8) -> Result<Self> {
        safety::validate_palette_index(index)?;
        let [red, green, blue] = PALETTE[index as usize];
        Ok(Self {
            index,
            red,
            green,
            blue,
            unused: 0,
        })
    }

    pub fn from_bytes(b: &[u8]) -> Self {
        Self {
            index: b[0],
            red: b[1],
            green: b[2],
            blue: b[3],
            unused: b[4],
        }
    }

    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        [self.index, self.red, self.green, self.blue, self.unused]
    }
}

/// Host-side color choice for a light.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LightColor {
    Palette(u8),
    Custom { red: u8, green: u8, blue: u8 },
}

impl LightColor {
    /// Parse "3" (palette index) or "#RRGGBB".
    pub fn parse(input: &str) -> Option<Self> {
        let trimmed = input.trim();
        if let Some(hex) = trimmed.strip_prefix('#') {
            if hex.len() != 6 || !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
                return None;
            }
            let value = u32::from_str_radix(hex, 16).ok()?;
            return Some(Self::Custom {
                red: (value >> 16) as u8,
                green: (value >> 8) as u8,
                blue: value as u8,
            });
        }
        if trimmed.is_empty() || !trimmed.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        trimmed.parse::<u8>().ok().map(Self::Palette)
    }
}

/// Rainbow-style color flow across the LEDs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ColorFlow {
    Off = 0,
    Simultaneous = 1,
    Up = 2,
    Down = 3,
    Left = 4,
    Right = 5,
}

impl ColorFlow {
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            0 => Some(Self::Off),
            1 => Some(Self::Simultaneous),
            2 => Some(Self::Up),
            3 => Some(Self::Down),
            4 => Some(Self::Left),
            5 => Some(Self::Right),
            _ => None,
        }
    }
}

/// LED animation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum LightEffect {
    AllOff = 0,
    FullyLighted = 1,
    Blinking = 2,
    Breathing = 3,
    Heartbeat = 4,
}

impl LightEffect {
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            0 => Some(Self::AllOff),
            1 => Some(Self::FullyLighted),
            2 => Some(Self::Blinking),
            3 => Some(Self::Breathing),
            4 => Some(Self::Heartbeat),
            _ => None,
        }
    }
}

/// Per-profile settings record, raw device representation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProfileSettings {
    pub profile_index: u8,
    pub advanced_sensitivity: u8,
    pub sensitivity_x: u8,
    pub sensitivity_y: u8,
    pub cpi_levels_enabled: u8,
    pub cpi_levels: [u8; CPI_LEVELS],
    pub cpi_active: u8,
    pub talkfx_polling_rate: u8,
    pub lights_enabled: u8,
    pub color_flow: u8,
    pub light_effect: u8,
    pub effect_speed: u8,
    pub lights: [Light; 2],
    /// Checksum as last received or sealed; [`FeatureReport::encode`]
    /// always writes a freshly computed one.
    pub checksum: u16,
}

impl ProfileSettings {
    /// Offset of the checksum field.
    const CHECKSUM_OFFSET: usize = 28;

    /// Factory-like defaults for a slot.
    pub fn defaults(profile_index: u8) -> Self {
        let levels = [400u16, 800, 1600, 3200, 6400];
        let mut cpi_levels = [0u8; CPI_LEVELS];
        for (slot, dpi) in cpi_levels.iter_mut().zip(levels) {
            *slot = ((dpi / dpi::DPI_STEP) << 2) as u8;
        }
        let [red, green, blue] = PALETTE[0];
        let light = Light {
            index: 0,
            red,
            green,
            blue,
            unused: 0,
        };
        let mut settings = Self {
            profile_index,
            advanced_sensitivity: 0,
            sensitivity_x: safety::SENSITIVITY_CENTER,
            sensitivity_y: safety::SENSITIVITY_CENTER,
            cpi_levels_enabled: 0x1F,
            cpi_levels,
            cpi_active: 2,
            talkfx_polling_rate: report_rate::pack(PollingRate::Hz1000, false),
            lights_enabled: lights::WHEEL | lights::BOTTOM,
            color_flow: ColorFlow::Off as u8,
            light_effect: LightEffect::FullyLighted as u8,
            effect_speed: 2,
            lights: [light, light],
            checksum: 0,
        };
        settings.seal();
        settings
    }

    /// Serialize without the trailing checksum.
    fn body(&self) -> [u8; Self::CHECKSUM_OFFSET] {
        let mut buf = [0u8; Self::CHECKSUM_OFFSET];
        buf[0] = Self::REPORT_ID;
        buf[1] = Self::SIZE as u8;
        buf[2] = self.profile_index;
        buf[3] = self.advanced_sensitivity;
        buf[4] = self.sensitivity_x;
        buf[5] = self.sensitivity_y;
        buf[6] = self.cpi_levels_enabled;
        buf[7..12].copy_from_slice(&self.cpi_levels);
        buf[12] = self.cpi_active;
        buf[13] = self.talkfx_polling_rate;
        buf[14] = self.lights_enabled;
        buf[15] = self.color_flow;
        buf[16] = self.light_effect;
        buf[17] = self.effect_speed;
        buf[18..23].copy_from_slice(&self.lights[0].to_bytes());
        buf[23..28].copy_from_slice(&self.lights[1].to_bytes());
        buf
    }

    /// Checksum over the current field values.
    pub fn computed_checksum(&self) -> u16 {
        checksum(&self.body())
    }

    /// Whether the stored checksum matches the fields.
    pub fn checksum_valid(&self) -> bool {
        self.checksum == self.computed_checksum()
    }

    /// Recompute the stored checksum after mutation.
    pub fn seal(&mut self) {
        self.checksum = self.computed_checksum();
    }

    pub fn sensitivity_x(&self) -> i8 {
        self.sensitivity_x as i8 - safety::SENSITIVITY_CENTER as i8
    }

    pub fn sensitivity_y(&self) -> i8 {
        self.sensitivity_y as i8 - safety::SENSITIVITY_CENTER as i8
    }

    pub fn set_sensitivity(&mut self, x: i8, y: i8) -> Result<()> {
        let sx = safety::validate_sensitivity(x)?;
        let sy = safety::validate_sensitivity(y)?;
        self.sensitivity_x = sx;
        self.sensitivity_y = sy;
        Ok(())
    }

    pub fn advanced_sensitivity(&self) -> bool {
        self.advanced_sensitivity != 0
    }

    /// Host CPI value of a level.
    pub fn cpi_level(&self, level: usize) -> Result<u16> {
        dpi::validate_level(level)?;
        Ok(dpi::decode_dpi(self.cpi_levels[level]))
    }

    pub fn set_cpi_level(&mut self, level: usize, value: u16) -> Result<()> {
        dpi::validate_level(level)?;
        self.cpi_levels[level] = dpi::encode_dpi(value)?;
        Ok(())
    }

    pub fn cpi_level_enabled(&self, level: usize) -> bool {
        level < CPI_LEVELS && self.cpi_levels_enabled & (1 << level) != 0
    }

    /// Enable or disable a level. The active level cannot be disabled.
    pub fn set_cpi_level_enabled(&mut self, level: usize, enabled: bool) -> Result<()> {
        dpi::validate_level(level)?;
        if !enabled && level == self.cpi_active as usize {
            return Err(Error::OutOfRange {
                field: "cpi_level_enabled",
                value: level as i64,
                min: 0,
                max: (CPI_LEVELS - 1) as i64,
            });
        }
        if enabled {
            self.cpi_levels_enabled |= 1 << level;
        } else {
            self.cpi_levels_enabled &= !(1 << level);
        }
        Ok(())
    }

    pub fn set_cpi_active(&mut self, level: usize) -> Result<()> {
        dpi::validate_level(level)?;
        self.cpi_levels_enabled |= 1 << level;
        self.cpi_active = level as u8;
        Ok(())
    }

    pub fn polling_rate(&self) -> Result<PollingRate> {
        report_rate::unpack_rate(self.talkfx_polling_rate)
    }

    pub fn talkfx(&self) -> bool {
        report_rate::unpack_talkfx(self.talkfx_polling_rate)
    }

    pub fn set_polling_rate(&mut self, rate: PollingRate) {
        self.talkfx_polling_rate = report_rate::pack(rate, self.talkfx());
    }

    /// Set the TalkFX flag, keeping the polling rate nibble untouched.
    pub fn set_talkfx(&mut self, on: bool) {
        self.talkfx_polling_rate = (self.talkfx_polling_rate & 0x0F) | ((on as u8) << 4);
    }

    pub fn light_enabled(&self, zone: LightZone) -> bool {
        self.lights_enabled & zone.enable_bit() != 0
    }

    pub fn set_light_enabled(&mut self, zone: LightZone, on: bool) {
        if on {
            self.lights_enabled |= zone.enable_bit();
        } else {
            self.lights_enabled &= !zone.enable_bit();
        }
    }

    /// Color of a zone. The custom-color bit is profile-wide.
    pub fn set_light_color(&mut self, zone: LightZone, color: LightColor) -> Result<()> {
        let slot = &mut self.lights[zone as usize];
        match color {
            LightColor::Palette(index) => {
                *slot = Light::from_palette(index)?;
                self.lights_enabled &= !lights::CUSTOM_COLOR;
            }
            LightColor::Custom { red, green, blue } => {
                slot.red = red;
                slot.green = green;
                slot.blue = blue;
                self.lights_enabled |= lights::CUSTOM_COLOR;
            }
        }
        Ok(())
    }

    pub fn custom_color(&self) -> bool {
        self.lights_enabled & lights::CUSTOM_COLOR != 0
    }

    /// RGB actually shown for a zone.
    pub fn effective_rgb(&self, zone: LightZone) -> [u8; 3] {
        let light = &self.lights[zone as usize];
        if self.custom_color() {
            [light.red, light.green, light.blue]
        } else {
            PALETTE[(light.index & 0x0F) as usize]
        }
    }

    pub fn set_effect_speed(&mut self, speed: u8) -> Result<()> {
        safety::validate_effect_speed(speed)?;
        self.effect_speed = speed;
        Ok(())
    }
}

impl FeatureReport for ProfileSettings {
    const REPORT_ID: u8 = ids::PROFILE_SETTINGS;
    const SIZE: usize = 30;

    fn decode(data: &[u8]) -> Result<Self> {
        check_sized_frame(data, Self::REPORT_ID, Self::SIZE)?;
        let mut cpi_levels = [0u8; CPI_LEVELS];
        cpi_levels.copy_from_slice(&data[7..12]);
        Ok(Self {
            profile_index: data[2],
            advanced_sensitivity: data[3],
            sensitivity_x: data[4],
            sensitivity_y: data[5],
            cpi_levels_enabled: data[6],
            cpi_levels,
            cpi_active: data[12],
            talkfx_polling_rate: data[13],
            lights_enabled: data[14],
            color_flow: data[15],
            light_effect: data[16],
            effect_speed: data[17],
            lights: [Light::from_bytes(&data[18..23]), Light::from_bytes(&data[23..28])],
            checksum: u16::from_le_bytes([data[28], data[29]]),
        })
    }

    fn encode(&self) -> Vec<u8> {
        let body = self.body();
        let mut buf = Vec::with_capacity(Self::SIZE);
        buf.extend_from_slice(&body);
        buf.extend_from_slice(&checksum(&body).to_le_bytes());
        buf
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sealed() {
        let s = ProfileSettings::defaults(3);
        assert_eq!(s.profile_index, 3);
        assert!(s.checksum_valid());
        assert_eq!(s.encode().len(), 30);
    }

    #[test]
    fn encode_decode_preserves_fields() {
        let mut s = ProfileSettings::defaults(1);
        s.set_cpi_level(0, 3400).unwrap();
        s.set_sensitivity(-2, 4).unwrap();
        s.seal();
        let decoded = ProfileSettings::decode(&s.encode()).unwrap();
        assert_eq!(decoded, s);
        assert_eq!(decoded.cpi_levels[0], 68);
        assert_eq!(decoded.sensitivity_x(), -2);
        assert_eq!(decoded.sensitivity_y(), 4);
    }

    #[test]
    fn encode_writes_fresh_checksum() {
        let mut s = ProfileSettings::defaults(0);
        s.checksum = 0xDEAD;
        let raw = s.encode();
        let decoded = ProfileSettings::decode(&raw).unwrap();
        assert!(decoded.checksum_valid());
    }

    #[test]
    fn decode_rejects_bad_size_byte() {
        let mut raw = ProfileSettings::defaults(0).encode();
        raw[1] = 0x1D;
        assert!(ProfileSettings::decode(&raw).is_err());
    }

    #[test]
    fn talkfx_and_rate_share_byte() {
        let mut s = ProfileSettings::defaults(0);
        s.set_polling_rate(PollingRate::Hz250);
        s.set_talkfx(true);
        assert_eq!(s.talkfx_polling_rate, 0x11);
        assert_eq!(s.polling_rate().unwrap(), PollingRate::Hz250);
        s.set_talkfx(false);
        assert_eq!(s.talkfx_polling_rate, 0x01);
    }

    #[test]
    fn disabling_active_level_rejected() {
        let mut s = ProfileSettings::defaults(0);
        s.set_cpi_active(1).unwrap();
        assert!(s.set_cpi_level_enabled(1, false).is_err());
        s.set_cpi_level_enabled(4, false).unwrap();
        assert!(!s.cpi_level_enabled(4));
    }

    #[test]
    fn palette_and_custom_colors() {
        let mut s = ProfileSettings::defaults(0);
        s.set_light_color(LightZone::Bottom, LightColor::Palette(7))
            .unwrap();
        assert_eq!(s.effective_rgb(LightZone::Bottom), [0xFF, 0x00, 0x00]);
        assert!(!s.custom_color());

        s.set_light_color(
            LightZone::Wheel,
            LightColor::Custom {
                red: 1,
                green: 2,
                blue: 3,
            },
        )
        .unwrap();
        assert!(s.custom_color());
        assert_eq!(s.effective_rgb(LightZone::Wheel), [1, 2, 3]);
        assert!(s
            .set_light_color(LightZone::Wheel, LightColor::Palette(16))
            .is_err());
    }

    #[test]
    fn light_color_parse() {
        assert_eq!(LightColor::parse("4"), Some(LightColor::Palette(4)));
        assert_eq!(
            LightColor::parse("#FF8000"),
            Some(LightColor::Custom {
                red: 0xFF,
                green: 0x80,
                blue: 0x00
            })
        );
        assert_eq!(LightColor::parse("#FF80"), None);
        assert_eq!(LightColor::parse("red"), None);
        assert_eq!(LightColor::parse("#+12345"), None);
        assert_eq!(LightColor::parse("#-12345"), None);
        assert_eq!(LightColor::parse("+5"), None);
        assert_eq!(LightColor::parse(""), None);
    }
}
