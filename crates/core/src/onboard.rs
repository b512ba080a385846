//! Device-held state outside the five profile slots.
//!
//!   - Profile index report (0x05): which slot is active. Changing it does
//!     not touch slot contents.
//!   - Device state report (0x0E): 1 while a host driver is attached; the
//!     device only streams special reports in this mode.
//!   - Control unit report (0x0D): DCU level, TCU on/off and median.

use crate::comm::ControlChannel;
use crate::error::{Error, Result};
use crate::report::{
    ids, ControlUnitAction, ControlUnitReport, DeviceStateReport, ProfileIndexReport,
};
use crate::safety;
use tracing::debug;

/// Host driver state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverState {
    /// Device runs standalone.
    Off = 0,
    /// Host driver attached, special reports enabled.
    On = 1,
}

impl DriverState {
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            0 => Some(Self::Off),
            1 => Some(Self::On),
            _ => None,
        }
    }
}

/// Read the active profile index.
pub fn read_active_profile(channel: &ControlChannel) -> Result<u8> {
    let report: ProfileIndexReport = channel.read()?;
    if report.index as usize >= safety::PROFILE_COUNT {
        return Err(Error::decode(
            ids::PROFILE,
            format!("active profile {} out of range", report.index),
        ));
    }
    Ok(report.index)
}

/// Switch the active profile.
pub fn write_active_profile(channel: &ControlChannel, index: usize) -> Result<()> {
    let index = safety::validate_profile_index(index)?;
    debug!(profile = index, "set active profile");
    channel.write_checked(&ProfileIndexReport { index })
}

pub fn read_device_state(channel: &ControlChannel) -> Result<DriverState> {
    let report: DeviceStateReport = channel.read()?;
    DriverState::from_byte(report.state).ok_or_else(|| {
        Error::decode(
            ids::DEVICE_STATE,
            format!("unknown device state {}", report.state),
        )
    })
}

pub fn write_device_state(channel: &ControlChannel, state: DriverState) -> Result<()> {
    debug!(?state, "set device state");
    channel.write_checked(&DeviceStateReport { state: state as u8 })
}

pub fn read_control_unit(channel: &ControlChannel) -> Result<ControlUnitReport> {
    channel.read()
}

pub fn write_control_unit(channel: &ControlChannel, report: &ControlUnitReport) -> Result<()> {
    debug!(
        dcu = report.dcu,
        tcu = report.tcu,
        median = report.median,
        action = format_args!("0x{:02X}", report.action.as_byte()),
        "write control unit"
    );
    channel.write_checked(report)
}

/// Control unit record persisted on save: TCU on keeps the calibrated
/// median and accepts it, TCU off clears the median.
pub fn control_unit_for_save(current: &ControlUnitReport) -> ControlUnitReport {
    if current.tcu != 0 {
        ControlUnitReport {
            dcu: current.dcu,
            tcu: 1,
            median: current.median,
            action: ControlUnitAction::Accept,
        }
    } else {
        ControlUnitReport {
            dcu: current.dcu,
            tcu: 0,
            median: 0,
            action: ControlUnitAction::Off,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::comm::CommConfig;
    use crate::report::FeatureReport;
    use crate::transport::mock::SimulatedTyon;

    fn channel() -> (SimulatedTyon, ControlChannel) {
        let sim = SimulatedTyon::new();
        let channel = ControlChannel::new(Box::new(sim.clone()), CommConfig::default());
        (sim, channel)
    }

    #[test]
    fn active_profile_roundtrip() {
        let (sim, channel) = channel();
        write_active_profile(&channel, 3).unwrap();
        assert_eq!(sim.with(|s| s.active_profile), 3);
        assert_eq!(read_active_profile(&channel).unwrap(), 3);
    }

    #[test]
    fn active_profile_rejects_bad_index() {
        let (sim, channel) = channel();
        assert!(write_active_profile(&channel, 5).is_err());
        assert!(sim.writes().is_empty());

        sim.with(|s| s.active_profile = 9);
        assert!(read_active_profile(&channel).is_err());
    }

    #[test]
    fn device_state_toggle() {
        let (sim, channel) = channel();
        write_device_state(&channel, DriverState::On).unwrap();
        assert_eq!(sim.with(|s| s.device_state), 1);
        assert_eq!(read_device_state(&channel).unwrap(), DriverState::On);
        assert_eq!(DriverState::from_byte(2), None);
    }

    #[test]
    fn save_record_follows_tcu_flag() {
        let on = ControlUnitReport {
            dcu: 2,
            tcu: 1,
            median: 77,
            action: ControlUnitAction::Undefined,
        };
        assert_eq!(control_unit_for_save(&on).encode(), vec![0x0D, 6, 2, 1, 77, 0x01]);

        let off = ControlUnitReport { tcu: 0, ..on };
        assert_eq!(control_unit_for_save(&off).encode(), vec![0x0D, 6, 2, 0, 0, 0x02]);
    }
}
