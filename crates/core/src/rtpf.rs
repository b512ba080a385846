//! `.rtpf` profile store codec.
//!
//! A store is a sequence of profile records, each delimited by seven
//! little-endian 32-bit markers:
//!
//! | Marker | Payload |
//! |--------|---------|
//! | `RTPH` | slot index (u8), name length (u8), name bytes (UTF-8) |
//! | `RTBT` | buttons report (99 bytes, report ID and size included) |
//! | `RTST` | report ID, size, slot index, then the scalar settings fields |
//! | `RTCP` | CPI level count (u8), stored CPI bytes |
//! | `RTLT` | light count (u8), 5 bytes per light |
//! | `RTCS` | settings checksum (u16) |
//! | `RTEP` | none |
//!
//! Decoding is all-or-nothing: any mismatch rejects the whole store.

use crate::buttons::ProfileButtons;
use crate::dpi::CPI_LEVELS;
use crate::error::{Error, Result};
use crate::profile::{Profile, ProfileSet};
use crate::report::FeatureReport;
use crate::safety::{self, PROFILE_COUNT};
use crate::settings::{Light, ProfileSettings};
use std::path::Path;
use tracing::{debug, info};

/// Conventional file extension.
pub const EXTENSION: &str = "rtpf";

const fn marker(tag: &[u8; 4]) -> u32 {
    u32::from_le_bytes(*tag)
}

/// Record stages, in file order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Header,
    Buttons,
    Settings,
    CpiLevels,
    Lights,
    Checksum,
    End,
}

impl Stage {
    fn marker(self) -> u32 {
        match self {
            Self::Header => marker(b"RTPH"),
            Self::Buttons => marker(b"RTBT"),
            Self::Settings => marker(b"RTST"),
            Self::CpiLevels => marker(b"RTCP"),
            Self::Lights => marker(b"RTLT"),
            Self::Checksum => marker(b"RTCS"),
            Self::End => marker(b"RTEP"),
        }
    }

    fn tag(self) -> String {
        String::from_utf8_lossy(&self.marker().to_le_bytes()).into_owned()
    }
}

/// Number of scalar settings bytes in the `RTST` block after the slot index.
const SETTINGS_SCALARS: usize = 10;
const LIGHT_COUNT: usize = 2;

fn file_error(msg: impl Into<String>) -> Error {
    Error::ProfileFile(msg.into())
}

/// Encode profiles in slot order.
pub fn encode<'a>(profiles: impl IntoIterator<Item = &'a Profile>) -> Vec<u8> {
    let mut out = Vec::new();
    for profile in profiles {
        encode_profile(profile, &mut out);
    }
    out
}

fn encode_profile(profile: &Profile, out: &mut Vec<u8>) {
    let s = &profile.settings;
    let name = profile.name().as_bytes();

    out.extend_from_slice(&Stage::Header.marker().to_le_bytes());
    out.push(profile.index());
    out.push(name.len() as u8);
    out.extend_from_slice(name);

    out.extend_from_slice(&Stage::Buttons.marker().to_le_bytes());
    out.extend_from_slice(&profile.buttons.encode());

    out.extend_from_slice(&Stage::Settings.marker().to_le_bytes());
    out.extend_from_slice(&[
        ProfileSettings::REPORT_ID,
        ProfileSettings::SIZE as u8,
        s.profile_index,
        s.advanced_sensitivity,
        s.sensitivity_x,
        s.sensitivity_y,
        s.cpi_levels_enabled,
        s.cpi_active,
        s.talkfx_polling_rate,
        s.lights_enabled,
        s.color_flow,
        s.light_effect,
        s.effect_speed,
    ]);

    out.extend_from_slice(&Stage::CpiLevels.marker().to_le_bytes());
    out.push(CPI_LEVELS as u8);
    out.extend_from_slice(&s.cpi_levels);

    out.extend_from_slice(&Stage::Lights.marker().to_le_bytes());
    out.push(LIGHT_COUNT as u8);
    for light in &s.lights {
        out.extend_from_slice(&light.to_bytes());
    }

    out.extend_from_slice(&Stage::Checksum.marker().to_le_bytes());
    out.extend_from_slice(&s.computed_checksum().to_le_bytes());

    out.extend_from_slice(&Stage::End.marker().to_le_bytes());
}

struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn at_end(&self) -> bool {
        self.pos >= self.data.len()
    }

    fn bytes(&mut self, n: usize) -> Result<&'a [u8]> {
        let end = self.pos + n;
        if end > self.data.len() {
            return Err(file_error(format!(
                "truncated at offset {} (need {n} bytes)",
                self.pos
            )));
        }
        let slice = &self.data[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn u8(&mut self) -> Result<u8> {
        Ok(self.bytes(1)?[0])
    }

    fn u16(&mut self) -> Result<u16> {
        let b = self.bytes(2)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    fn u32(&mut self) -> Result<u32> {
        let b = self.bytes(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn expect(&mut self, stage: Stage) -> Result<()> {
        let offset = self.pos;
        let found = self.u32()?;
        if found != stage.marker() {
            return Err(file_error(format!(
                "expected {} marker at offset {offset}, found 0x{found:08X}",
                stage.tag()
            )));
        }
        Ok(())
    }
}

fn decode_profile(r: &mut Reader<'_>) -> Result<Profile> {
    r.expect(Stage::Header)?;
    let index = r.u8()?;
    safety::validate_profile_index(index as usize)
        .map_err(|_| file_error(format!("profile index {index} out of range")))?;
    let name_len = r.u8()? as usize;
    let name = std::str::from_utf8(r.bytes(name_len)?)
        .map_err(|_| file_error(format!("profile {index}: name is not UTF-8")))?;
    safety::validate_name(name)
        .map_err(|_| file_error(format!("profile {index}: name has non-printable characters")))?;

    r.expect(Stage::Buttons)?;
    let buttons = ProfileButtons::decode(r.bytes(ProfileButtons::SIZE)?)
        .map_err(|e| file_error(format!("profile {index}: buttons block: {e}")))?;
    if buttons.profile_index != index {
        return Err(file_error(format!(
            "profile {index}: buttons block belongs to slot {}",
            buttons.profile_index
        )));
    }

    r.expect(Stage::Settings)?;
    let head = r.bytes(3)?;
    if head[0] != ProfileSettings::REPORT_ID || head[1] as usize != ProfileSettings::SIZE {
        return Err(file_error(format!(
            "profile {index}: settings block header {:02X?}",
            &head[..2]
        )));
    }
    if head[2] != index {
        return Err(file_error(format!(
            "profile {index}: settings block belongs to slot {}",
            head[2]
        )));
    }
    let scalars = r.bytes(SETTINGS_SCALARS)?;

    r.expect(Stage::CpiLevels)?;
    let count = r.u8()? as usize;
    if count != CPI_LEVELS {
        return Err(file_error(format!(
            "profile {index}: {count} CPI levels (expected {CPI_LEVELS})"
        )));
    }
    let mut cpi_levels = [0u8; CPI_LEVELS];
    cpi_levels.copy_from_slice(r.bytes(CPI_LEVELS)?);

    r.expect(Stage::Lights)?;
    let count = r.u8()? as usize;
    if count != LIGHT_COUNT {
        return Err(file_error(format!(
            "profile {index}: {count} lights (expected {LIGHT_COUNT})"
        )));
    }
    let wheel = Light::from_bytes(r.bytes(Light::SIZE)?);
    let bottom = Light::from_bytes(r.bytes(Light::SIZE)?);

    r.expect(Stage::Checksum)?;
    let checksum = r.u16()?;

    r.expect(Stage::End)?;

    let settings = ProfileSettings {
        profile_index: index,
        advanced_sensitivity: scalars[0],
        sensitivity_x: scalars[1],
        sensitivity_y: scalars[2],
        cpi_levels_enabled: scalars[3],
        cpi_levels,
        cpi_active: scalars[4],
        talkfx_polling_rate: scalars[5],
        lights_enabled: scalars[6],
        color_flow: scalars[7],
        light_effect: scalars[8],
        effect_speed: scalars[9],
        lights: [wheel, bottom],
        checksum,
    };
    if !settings.checksum_valid() {
        return Err(file_error(format!(
            "profile {index}: checksum 0x{checksum:04X} (expected 0x{:04X})",
            settings.computed_checksum()
        )));
    }

    let mut profile = Profile::defaults(index);
    profile.set_name(name)?;
    profile.replace(settings, buttons);
    Ok(profile)
}

/// Decode a store. Yields between one and five profiles with distinct
/// slots, or an error and nothing.
pub fn decode(data: &[u8]) -> Result<Vec<Profile>> {
    if data.is_empty() {
        return Err(Error::NoData("profile store is empty".into()));
    }
    let mut reader = Reader::new(data);
    let mut seen = [false; PROFILE_COUNT];
    let mut profiles = Vec::new();
    while !reader.at_end() {
        if profiles.len() == PROFILE_COUNT {
            return Err(file_error(format!(
                "trailing data after {PROFILE_COUNT} profiles at offset {}",
                reader.pos
            )));
        }
        let profile = decode_profile(&mut reader)?;
        let slot = profile.index() as usize;
        if seen[slot] {
            return Err(file_error(format!("profile {slot} appears twice")));
        }
        seen[slot] = true;
        profiles.push(profile);
    }
    Ok(profiles)
}

/// Write the whole set to `path`, creating parent directories.
pub fn save(path: &Path, set: &ProfileSet) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let data = encode(set.iter());
    std::fs::write(path, &data)?;
    info!(path = %path.display(), bytes = data.len(), "Profile store written");
    Ok(())
}

/// Read and decode the store at `path`.
pub fn load(path: &Path) -> Result<Vec<Profile>> {
    let data = std::fs::read(path)?;
    let profiles = decode(&data)?;
    debug!(path = %path.display(), count = profiles.len(), "Profile store read");
    Ok(profiles)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buttons::{ButtonFunction, ButtonSlot};
    use crate::settings::{LightColor, LightZone};

    fn sample_set() -> ProfileSet {
        let mut set = ProfileSet::new();
        let p = set.get_mut(1).unwrap();
        p.set_name("Sniper").unwrap();
        p.settings.set_cpi_level(0, 3400).unwrap();
        p.settings.set_sensitivity(-3, 2).unwrap();
        p.settings
            .set_light_color(
                LightZone::Bottom,
                LightColor::Custom {
                    red: 9,
                    green: 8,
                    blue: 7,
                },
            )
            .unwrap();
        p.buttons
            .set_slot(4, ButtonSlot::new(ButtonFunction::CpiUp))
            .unwrap();
        set
    }

    fn offset_of(data: &[u8], tag: &[u8; 4]) -> usize {
        data.windows(4).position(|w| w == tag).unwrap()
    }

    #[test]
    fn roundtrip_preserves_every_profile() {
        let set = sample_set();
        let decoded = decode(&encode(set.iter())).unwrap();
        assert_eq!(decoded.len(), PROFILE_COUNT);
        for (original, loaded) in set.iter().zip(&decoded) {
            assert_eq!(loaded.name(), original.name());
            assert_eq!(loaded.settings.encode(), original.settings.encode());
            assert_eq!(loaded.buttons.encode(), original.buttons.encode());
        }
    }

    #[test]
    fn markers_are_little_endian_tags() {
        let data = encode(ProfileSet::new().iter());
        assert_eq!(&data[..4], b"RTPH");
        assert_eq!(&data[data.len() - 4..], b"RTEP");
    }

    #[test]
    fn bad_settings_marker_rejects_whole_store() {
        let set = sample_set();
        let mut data = encode(set.iter());
        // Corrupt the third marker of the last profile only.
        let last = data.windows(4).rposition(|w| w == b"RTST").unwrap();
        data[last] = b'X';
        let err = decode(&data).unwrap_err();
        assert!(matches!(err, Error::ProfileFile(ref m) if m.contains("RTST")));
    }

    #[test]
    fn rejects_out_of_range_index() {
        let mut data = encode(ProfileSet::new().iter());
        data[4] = 7;
        assert!(decode(&data).is_err());
    }

    #[test]
    fn rejects_non_printable_name() {
        let mut set = ProfileSet::new();
        set.get_mut(0).unwrap().set_name("ab").unwrap();
        let mut data = encode(set.iter());
        data[7] = 0x07;
        assert!(decode(&data).is_err());
    }

    #[test]
    fn rejects_bad_buttons_size_byte() {
        let mut data = encode(ProfileSet::new().iter());
        let buttons = offset_of(&data, b"RTBT") + 4;
        data[buttons + 1] = 98;
        assert!(decode(&data).is_err());
    }

    #[test]
    fn rejects_checksum_mismatch() {
        let mut data = encode(ProfileSet::new().iter());
        let cs = offset_of(&data, b"RTCS") + 4;
        data[cs] ^= 0xFF;
        assert!(decode(&data).is_err());
    }

    #[test]
    fn rejects_duplicates_and_truncation() {
        let one = encode(ProfileSet::new().iter().take(1));
        let mut twice = one.clone();
        twice.extend_from_slice(&one);
        assert!(decode(&twice).is_err());
        assert!(decode(&one[..one.len() - 2]).is_err());
        assert_eq!(decode(&one).unwrap().len(), 1);
    }

    #[test]
    fn empty_store_is_no_data() {
        assert!(matches!(decode(&[]), Err(Error::NoData(_))));
    }

    #[test]
    fn save_and_load_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("store.rtpf");
        let set = sample_set();
        save(&path, &set).unwrap();
        let loaded = load(&path).unwrap();
        assert_eq!(loaded[1].name(), "Sniper");
        assert_eq!(loaded[1].settings.cpi_level(0).unwrap(), 3400);
    }
}
