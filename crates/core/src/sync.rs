//! Profile synchronizer.
//!
//! Owns the five in-memory profiles, the active profile index and the
//! control unit registers, and sequences every transfer between them and
//! the device. Setters only touch memory and mark the slot dirty; the
//! device is written by [`ProfileSynchronizer::save_all_to_device`].
//!
//! Transfer order is fixed. A load walks the slots in ascending order,
//! selecting and reading settings then buttons for each. A save writes the
//! control unit, then the active profile index, then settings and buttons
//! of each dirty slot in ascending order.

use crate::buttons::{ButtonFunction, ButtonSlot, ProfileButtons};
use crate::comm::ControlChannel;
use crate::error::{Error, Result};
use crate::events::{Event, EventSink};
use crate::keymap::{KeyCombination, KeyboardLayout};
use crate::onboard;
use crate::profile::{Profile, ProfileSet};
use crate::report::{
    ids, requests, ControlUnitAction, ControlUnitReport, InfoCommand, InfoFunction, SpecialReport,
    SpecialType,
};
use crate::report_rate::PollingRate;
use crate::rtpf;
use crate::safety::{self, PROFILE_COUNT};
use crate::settings::{ColorFlow, LightColor, LightEffect, LightZone, ProfileSettings};
use std::path::Path;
use tracing::{debug, info};

pub struct ProfileSynchronizer {
    channel: ControlChannel,
    profiles: ProfileSet,
    active: u8,
    control_unit: ControlUnitReport,
    events: EventSink,
    layout: KeyboardLayout,
}

impl ProfileSynchronizer {
    /// Synchronizer with placeholder profiles; nothing is read yet.
    pub fn new(channel: ControlChannel, events: EventSink, layout: KeyboardLayout) -> Self {
        Self {
            channel,
            profiles: ProfileSet::new(),
            active: 0,
            control_unit: ControlUnitReport {
                dcu: 0,
                tcu: 0,
                median: 0,
                action: ControlUnitAction::Undefined,
            },
            events,
            layout,
        }
    }

    pub fn channel(&self) -> &ControlChannel {
        &self.channel
    }

    pub fn events(&self) -> &EventSink {
        &self.events
    }

    pub fn layout(&self) -> KeyboardLayout {
        self.layout
    }

    pub fn profiles(&self) -> &ProfileSet {
        &self.profiles
    }

    pub fn profile(&self, index: usize) -> Result<&Profile> {
        self.profiles.get(index)
    }

    pub fn active_profile(&self) -> u8 {
        self.active
    }

    pub fn control_unit(&self) -> &ControlUnitReport {
        &self.control_unit
    }

    fn read_slot(&self, index: u8) -> Result<(ProfileSettings, ProfileButtons)> {
        self.channel.select(index, requests::PROFILE_SETTINGS)?;
        let settings: ProfileSettings = self.channel.read()?;
        if settings.profile_index != index {
            return Err(Error::decode(
                ids::PROFILE_SETTINGS,
                format!("settings for slot {} (expected {index})", settings.profile_index),
            ));
        }
        self.channel.select(index, requests::PROFILE_BUTTONS)?;
        let buttons: ProfileButtons = self.channel.read()?;
        if buttons.profile_index != index {
            return Err(Error::decode(
                ids::PROFILE_BUTTONS,
                format!("buttons for slot {} (expected {index})", buttons.profile_index),
            ));
        }
        Ok((settings, buttons))
    }

    /// Read every slot, the active index and the control unit.
    ///
    /// Nothing is committed unless every read succeeds. Names are host-only
    /// and survive the load.
    pub fn load_all_from_device(&mut self) -> Result<()> {
        self.events.emit(Event::LoadStarted);
        info!("Loading profiles from device");
        let mut slots = Vec::with_capacity(PROFILE_COUNT);
        for index in 0..PROFILE_COUNT as u8 {
            slots.push(self.read_slot(index)?);
            debug!(profile = index, "slot read");
        }
        let active = onboard::read_active_profile(&self.channel)?;
        let control_unit = onboard::read_control_unit(&self.channel)?;

        for (profile, (settings, buttons)) in self.profiles.iter_mut().zip(slots) {
            profile.replace(settings, buttons);
            profile.dirty = false;
        }
        self.active = active;
        self.control_unit = control_unit;
        for index in 0..PROFILE_COUNT as u8 {
            self.events.emit(Event::ProfileChanged(index));
        }
        self.events.emit(Event::ActiveProfileChanged(active));
        self.events.emit(Event::ControlUnitChanged);
        self.events.emit(Event::LoadFinished);
        info!(active, "Profiles loaded");
        Ok(())
    }

    /// Write the control unit, the active index, and every dirty slot.
    pub fn save_all_to_device(&mut self) -> Result<()> {
        self.events.emit(Event::SaveStarted);
        let dirty = self.profiles.dirty_indices();
        info!(?dirty, active = self.active, "Saving profiles to device");

        onboard::write_control_unit(
            &self.channel,
            &onboard::control_unit_for_save(&self.control_unit),
        )?;
        onboard::write_active_profile(&self.channel, self.active as usize)?;

        for index in dirty {
            let profile = self.profiles.get_mut(index)?;
            self.channel.write_checked_async(&profile.settings)?;
            self.channel.write_checked_async(&profile.buttons)?;
            profile.dirty = false;
            debug!(profile = index, "slot written");
        }
        self.events.emit(Event::SaveFinished);
        Ok(())
    }

    /// Restore factory defaults on the device and reload.
    pub fn reset_all_profiles(&mut self) -> Result<()> {
        info!("Resetting all profiles");
        self.channel
            .write_info(InfoCommand::new(InfoFunction::Reset))?;
        self.profiles = ProfileSet::new();
        self.active = 0;
        self.load_all_from_device()
    }

    /// Apply a change to one slot. The slot is untouched if `f` fails.
    fn modify(&mut self, index: usize, f: impl FnOnce(&mut Profile) -> Result<()>) -> Result<()> {
        let profile = self.profiles.get_mut(index)?;
        let mut updated = profile.clone();
        f(&mut updated)?;
        updated.settings.seal();
        updated.dirty = true;
        *profile = updated;
        self.events.emit(Event::ProfileChanged(index as u8));
        Ok(())
    }

    pub fn set_profile_name(&mut self, index: usize, name: &str) -> Result<()> {
        self.modify(index, |p| p.set_name(name))
    }

    pub fn set_sensitivity(&mut self, index: usize, x: i8, y: i8) -> Result<()> {
        self.modify(index, |p| p.settings.set_sensitivity(x, y))
    }

    pub fn set_advanced_sensitivity(&mut self, index: usize, on: bool) -> Result<()> {
        self.modify(index, |p| {
            p.settings.advanced_sensitivity = on as u8;
            Ok(())
        })
    }

    pub fn set_dpi_level(&mut self, index: usize, level: usize, dpi: u16) -> Result<()> {
        self.modify(index, |p| p.settings.set_cpi_level(level, dpi))
    }

    pub fn set_dpi_level_enabled(&mut self, index: usize, level: usize, on: bool) -> Result<()> {
        self.modify(index, |p| p.settings.set_cpi_level_enabled(level, on))
    }

    pub fn set_dpi_active(&mut self, index: usize, level: usize) -> Result<()> {
        self.modify(index, |p| p.settings.set_cpi_active(level))
    }

    pub fn set_polling_rate(&mut self, index: usize, rate: PollingRate) -> Result<()> {
        self.modify(index, |p| {
            p.settings.set_polling_rate(rate);
            Ok(())
        })
    }

    pub fn set_talkfx(&mut self, index: usize, on: bool) -> Result<()> {
        self.modify(index, |p| {
            p.settings.set_talkfx(on);
            Ok(())
        })
    }

    pub fn set_light_enabled(&mut self, index: usize, zone: LightZone, on: bool) -> Result<()> {
        self.modify(index, |p| {
            p.settings.set_light_enabled(zone, on);
            Ok(())
        })
    }

    pub fn set_light_color(&mut self, index: usize, zone: LightZone, color: LightColor) -> Result<()> {
        self.modify(index, |p| p.settings.set_light_color(zone, color))
    }

    pub fn set_color_flow(&mut self, index: usize, flow: ColorFlow) -> Result<()> {
        self.modify(index, |p| {
            p.settings.color_flow = flow as u8;
            Ok(())
        })
    }

    pub fn set_light_effect(&mut self, index: usize, effect: LightEffect) -> Result<()> {
        self.modify(index, |p| {
            p.settings.light_effect = effect as u8;
            Ok(())
        })
    }

    pub fn set_effect_speed(&mut self, index: usize, speed: u8) -> Result<()> {
        self.modify(index, |p| p.settings.set_effect_speed(speed))
    }

    pub fn set_button(&mut self, index: usize, slot: usize, button: ButtonSlot) -> Result<()> {
        self.modify(index, |p| p.buttons.set_slot(slot, button))
    }

    pub fn set_button_function(
        &mut self,
        index: usize,
        slot: usize,
        function: ButtonFunction,
    ) -> Result<()> {
        self.set_button(index, slot, ButtonSlot::new(function))
    }

    /// Assign a shortcut, encoded for the synchronizer's keyboard layout.
    pub fn set_button_shortcut(
        &mut self,
        index: usize,
        slot: usize,
        combo: &KeyCombination,
    ) -> Result<()> {
        let button = ButtonSlot::shortcut(combo, self.layout);
        self.set_button(index, slot, button)
    }

    /// Duplicate a slot into another; the target becomes dirty.
    pub fn copy_profile(&mut self, from: usize, to: usize) -> Result<()> {
        self.profiles.copy(from, to)?;
        self.events.emit(Event::ProfileChanged(to as u8));
        Ok(())
    }

    /// Select the profile the device uses; written on the next save.
    pub fn set_active_profile(&mut self, index: usize) -> Result<()> {
        self.active = safety::validate_profile_index(index)?;
        self.events.emit(Event::ActiveProfileChanged(self.active));
        Ok(())
    }

    pub fn set_dcu_level(&mut self, level: u8) -> Result<()> {
        safety::validate_dcu_level(level)?;
        self.control_unit.dcu = level;
        self.events.emit(Event::ControlUnitChanged);
        Ok(())
    }

    pub fn set_tcu_enabled(&mut self, on: bool) {
        self.control_unit.tcu = on as u8;
        self.events.emit(Event::ControlUnitChanged);
    }

    /// Adopt a control unit produced elsewhere, e.g. an accepted TCU
    /// calibration.
    pub fn set_control_unit(&mut self, report: ControlUnitReport) {
        self.control_unit = report;
        self.events.emit(Event::ControlUnitChanged);
    }

    /// Track device-side changes reported through the special stream.
    ///
    /// Profile and CPI data are 1-based slot numbers. Neither marks a
    /// profile dirty. Returns whether the report changed anything.
    pub fn apply_special(&mut self, report: &SpecialReport) -> bool {
        let slot = match report.data.checked_sub(1) {
            Some(slot) => slot,
            None => return false,
        };
        match report.kind {
            SpecialType::Profile if (slot as usize) < PROFILE_COUNT => {
                debug!(profile = slot, "device switched profile");
                self.active = slot;
                self.events.emit(Event::ActiveProfileChanged(slot));
                true
            }
            SpecialType::Cpi if (slot as usize) < crate::dpi::CPI_LEVELS => {
                let active = self.active;
                let Ok(profile) = self.profiles.get_mut(active as usize) else {
                    return false;
                };
                debug!(profile = active, level = slot, "device switched CPI level");
                profile.settings.cpi_active = slot;
                profile.settings.seal();
                self.events.emit(Event::ProfileChanged(active));
                true
            }
            _ => false,
        }
    }

    fn adopt(&mut self, loaded: Vec<Profile>, dirty: bool) {
        for mut incoming in loaded {
            let index = incoming.index() as usize;
            if let Ok(profile) = self.profiles.get_mut(index) {
                incoming.dirty = dirty;
                *profile = incoming;
                self.events.emit(Event::ProfileChanged(index as u8));
            }
        }
    }

    /// Load profiles from a store file; they are written on the next save.
    pub fn import_file(&mut self, path: &Path) -> Result<usize> {
        let loaded = rtpf::load(path)?;
        let count = loaded.len();
        self.adopt(loaded, true);
        info!(path = %path.display(), count, "Profiles imported");
        Ok(count)
    }

    /// Restore host-side state (names, cached contents) from the autosave
    /// store without scheduling device writes.
    pub fn restore_store(&mut self, path: &Path) -> Result<usize> {
        let loaded = rtpf::load(path)?;
        let count = loaded.len();
        self.adopt(loaded, false);
        Ok(count)
    }

    /// Write all five profiles to a store file.
    pub fn export_file(&self, path: &Path) -> Result<()> {
        rtpf::save(path, &self.profiles)
    }
}
