//! In-memory profile slots.
//!
//! A [`ProfileSet`] always holds exactly one [`Profile`] per device slot.
//! Slots are never added or removed; their contents are replaced wholesale
//! by a device load or a file import and mutated in place by setters.

use crate::buttons::ProfileButtons;
use crate::error::{Error, Result};
use crate::safety::{self, PROFILE_COUNT};
use crate::settings::ProfileSettings;
use std::path::PathBuf;

/// Directory name under the per-user config dir.
pub const APP_DIR: &str = "open-tyon";
/// File name of the autosaved profile store.
pub const STORE_FILE: &str = "profiles.rtpf";

/// One device profile slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Profile {
    index: u8,
    name: String,
    /// Changed since the last device load or save.
    pub dirty: bool,
    pub settings: ProfileSettings,
    pub buttons: ProfileButtons,
}

impl Profile {
    /// Placeholder contents for a slot.
    pub fn defaults(index: u8) -> Self {
        Self {
            index,
            name: default_name(index),
            dirty: false,
            settings: ProfileSettings::defaults(index),
            buttons: ProfileButtons::defaults(index),
        }
    }

    pub fn index(&self) -> u8 {
        self.index
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_name(&mut self, name: &str) -> Result<()> {
        safety::validate_name(name)?;
        self.name = name.to_string();
        Ok(())
    }

    /// Replace settings and buttons, pinning their embedded slot index to
    /// this profile. The stored checksum is kept unless the index had to
    /// change.
    pub fn replace(&mut self, mut settings: ProfileSettings, mut buttons: ProfileButtons) {
        if settings.profile_index != self.index {
            settings.profile_index = self.index;
            settings.seal();
        }
        buttons.profile_index = self.index;
        self.settings = settings;
        self.buttons = buttons;
    }
}

/// Default display name of a slot.
pub fn default_name(index: u8) -> String {
    format!("Profile {}", index + 1)
}

/// The five profile slots.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileSet {
    profiles: [Profile; PROFILE_COUNT],
}

impl Default for ProfileSet {
    fn default() -> Self {
        Self {
            profiles: std::array::from_fn(|i| Profile::defaults(i as u8)),
        }
    }
}

impl ProfileSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, index: usize) -> Result<&Profile> {
        safety::validate_profile_index(index)?;
        Ok(&self.profiles[index])
    }

    pub fn get_mut(&mut self, index: usize) -> Result<&mut Profile> {
        safety::validate_profile_index(index)?;
        Ok(&mut self.profiles[index])
    }

    pub fn iter(&self) -> impl Iterator<Item = &Profile> {
        self.profiles.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Profile> {
        self.profiles.iter_mut()
    }

    /// Slots with unsaved changes, ascending.
    pub fn dirty_indices(&self) -> Vec<usize> {
        self.profiles
            .iter()
            .filter(|p| p.dirty)
            .map(|p| p.index as usize)
            .collect()
    }

    pub fn any_dirty(&self) -> bool {
        self.profiles.iter().any(|p| p.dirty)
    }

    /// Duplicate one slot's contents into another, marking the target dirty.
    pub fn copy(&mut self, from: usize, to: usize) -> Result<()> {
        let source = self.get(from)?.clone();
        if from == to {
            return Err(Error::OutOfRange {
                field: "copy_target",
                value: to as i64,
                min: 0,
                max: (PROFILE_COUNT - 1) as i64,
            });
        }
        let target = self.get_mut(to)?;
        target.name = source.name;
        target.replace(source.settings, source.buttons);
        target.settings.seal();
        target.dirty = true;
        Ok(())
    }
}

/// Default path of the autosaved profile store.
pub fn profile_store_path() -> Result<PathBuf> {
    let base = dirs::config_dir()
        .ok_or_else(|| Error::NoData("no per-user config directory".into()))?;
    Ok(base.join(APP_DIR).join(STORE_FILE))
}
