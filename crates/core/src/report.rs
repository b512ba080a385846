//! Tyon feature report encoding and decoding.
//!
//! Every report is a packed, fixed-size record starting with its report ID.
//! Most reports carry a declared size byte at offset 1 which must equal the
//! record length. Decoding is pure: it never touches the device.
//!
//! Report map:
//! - 0x03 special (input, 5 bytes)
//! - 0x04 control (3 bytes, no size byte)
//! - 0x05 profile index (3 bytes)
//! - 0x06 profile settings (30 bytes, see [`crate::settings`])
//! - 0x07 profile buttons (99 bytes, see [`crate::buttons`])
//! - 0x08 macro (2002 bytes, u16 size)
//! - 0x09 info (8 bytes)
//! - 0x0C sensor (4 bytes) / sensor image (903 bytes)
//! - 0x0D control unit (6 bytes)
//! - 0x0E device state (3 bytes)
//! - 0x10 talk-fx (16 bytes, see [`crate::talkfx`])

use crate::buttons::ProfileButtons;
use crate::error::{Error, Result};
use crate::settings::ProfileSettings;
use crate::talkfx::TalkFxReport;

/// Report IDs.
pub mod ids {
    pub const SPECIAL: u8 = 0x03;
    pub const CONTROL: u8 = 0x04;
    pub const PROFILE: u8 = 0x05;
    pub const PROFILE_SETTINGS: u8 = 0x06;
    pub const PROFILE_BUTTONS: u8 = 0x07;
    pub const MACRO: u8 = 0x08;
    pub const INFO: u8 = 0x09;
    pub const SENSOR: u8 = 0x0C;
    pub const CONTROL_UNIT: u8 = 0x0D;
    pub const DEVICE_STATE: u8 = 0x0E;
    pub const TALK: u8 = 0x10;
}

/// Control request codes used with [`crate::comm::ControlChannel::select`].
pub mod requests {
    pub const PROFILE_SETTINGS: u8 = 0x80;
    pub const PROFILE_BUTTONS: u8 = 0x90;
}

/// A fixed-layout feature report.
pub trait FeatureReport: Sized {
    /// Report ID (first byte on the wire).
    const REPORT_ID: u8;
    /// Total length including the report ID.
    const SIZE: usize;

    /// Decode from a raw buffer, validating framing.
    fn decode(data: &[u8]) -> Result<Self>;

    /// Encode into exactly `SIZE` bytes.
    fn encode(&self) -> Vec<u8>;
}

/// Validate report ID and buffer length.
pub(crate) fn check_frame(data: &[u8], report_id: u8, size: usize) -> Result<()> {
    if data.len() != size {
        return Err(Error::decode(
            report_id,
            format!("length {} (expected {size})", data.len()),
        ));
    }
    if data[0] != report_id {
        return Err(Error::decode(
            report_id,
            format!("report ID 0x{:02X} (expected 0x{report_id:02X})", data[0]),
        ));
    }
    Ok(())
}

/// Validate report ID, buffer length, and the declared size byte.
pub(crate) fn check_sized_frame(data: &[u8], report_id: u8, size: usize) -> Result<()> {
    check_frame(data, report_id, size)?;
    if data[1] as usize != size {
        return Err(Error::decode(
            report_id,
            format!("declared size {} (expected {size})", data[1]),
        ));
    }
    Ok(())
}

/// Wrapping byte sum, the checksum used by settings records.
pub fn checksum(data: &[u8]) -> u16 {
    data.iter().fold(0u16, |acc, &b| acc.wrapping_add(b as u16))
}

/// Control record: the select command when written, the status when read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControlReport {
    /// Store index on write, status byte on read.
    pub value: u8,
    pub request: u8,
}

impl FeatureReport for ControlReport {
    const REPORT_ID: u8 = ids::CONTROL;
    const SIZE: usize = 3;

    fn decode(data: &[u8]) -> Result<Self> {
        check_frame(data, Self::REPORT_ID, Self::SIZE)?;
        Ok(Self {
            value: data[1],
            request: data[2],
        })
    }

    fn encode(&self) -> Vec<u8> {
        vec![Self::REPORT_ID, self.value, self.request]
    }
}

/// Device-held active profile index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProfileIndexReport {
    pub index: u8,
}

impl FeatureReport for ProfileIndexReport {
    const REPORT_ID: u8 = ids::PROFILE;
    const SIZE: usize = 3;

    fn decode(data: &[u8]) -> Result<Self> {
        check_sized_frame(data, Self::REPORT_ID, Self::SIZE)?;
        Ok(Self { index: data[2] })
    }

    fn encode(&self) -> Vec<u8> {
        vec![Self::REPORT_ID, Self::SIZE as u8, self.index]
    }
}

/// Info functions written through the info report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum InfoFunction {
    /// Restore factory defaults on all profiles.
    Reset = 0x01,
    XcCalibrationStart = 0x08,
    XcCalibrationData = 0x09,
    XcCalibrationEnd = 0x0A,
}

/// Info report as read from the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InfoReport {
    pub firmware_version: u8,
    pub dfu_version: u8,
    pub xc_min: u8,
    pub xc_mid: u8,
    pub xc_max: u8,
}

impl InfoReport {
    /// Firmware version as "major.minor" (stored as major*100 + minor).
    pub fn firmware_string(&self) -> String {
        format!(
            "{}.{:02}",
            self.firmware_version / 100,
            self.firmware_version % 100
        )
    }
}

impl FeatureReport for InfoReport {
    const REPORT_ID: u8 = ids::INFO;
    const SIZE: usize = 8;

    fn decode(data: &[u8]) -> Result<Self> {
        check_sized_frame(data, Self::REPORT_ID, Self::SIZE)?;
        Ok(Self {
            firmware_version: data[2],
            dfu_version: data[3],
            xc_min: data[4],
            xc_mid: data[5],
            xc_max: data[6],
        })
    }

    fn encode(&self) -> Vec<u8> {
        vec![
            Self::REPORT_ID,
            Self::SIZE as u8,
            self.firmware_version,
            self.dfu_version,
            self.xc_min,
            self.xc_mid,
            self.xc_max,
            0,
        ]
    }
}

/// Info report written to trigger a function. Shares the info layout, with
/// the function code in place of the firmware version.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InfoCommand {
    pub function: InfoFunction,
    pub xc_min: u8,
    pub xc_mid: u8,
    pub xc_max: u8,
}

impl InfoCommand {
    pub fn new(function: InfoFunction) -> Self {
        Self {
            function,
            xc_min: 0,
            xc_mid: 0,
            xc_max: 0,
        }
    }

    pub fn xc_data(min: u8, mid: u8, max: u8) -> Self {
        Self {
            function: InfoFunction::XcCalibrationData,
            xc_min: min,
            xc_mid: mid,
            xc_max: max,
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        vec![
            ids::INFO,
            InfoReport::SIZE as u8,
            self.function as u8,
            0,
            self.xc_min,
            self.xc_mid,
            self.xc_max,
            0,
        ]
    }
}

/// Device state report. State 1 means a host driver is attached and the
/// special report stream is enabled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceStateReport {
    pub state: u8,
}

impl FeatureReport for DeviceStateReport {
    const REPORT_ID: u8 = ids::DEVICE_STATE;
    const SIZE: usize = 3;

    fn decode(data: &[u8]) -> Result<Self> {
        check_sized_frame(data, Self::REPORT_ID, Self::SIZE)?;
        Ok(Self { state: data[2] })
    }

    fn encode(&self) -> Vec<u8> {
        vec![Self::REPORT_ID, Self::SIZE as u8, self.state]
    }
}

/// Action field of the control unit report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlUnitAction {
    Cancel,
    Accept,
    Off,
    Undefined,
    Other(u8),
}

impl ControlUnitAction {
    pub fn from_byte(b: u8) -> Self {
        match b {
            0x00 => Self::Cancel,
            0x01 => Self::Accept,
            0x02 => Self::Off,
            0xFF => Self::Undefined,
            other => Self::Other(other),
        }
    }

    pub fn as_byte(&self) -> u8 {
        match self {
            Self::Cancel => 0x00,
            Self::Accept => 0x01,
            Self::Off => 0x02,
            Self::Undefined => 0xFF,
            Self::Other(b) => *b,
        }
    }
}

/// Distance/tracking control unit registers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControlUnitReport {
    pub dcu: u8,
    pub tcu: u8,
    pub median: u8,
    pub action: ControlUnitAction,
}

impl FeatureReport for ControlUnitReport {
    const REPORT_ID: u8 = ids::CONTROL_UNIT;
    const SIZE: usize = 6;

    fn decode(data: &[u8]) -> Result<Self> {
        check_sized_frame(data, Self::REPORT_ID, Self::SIZE)?;
        Ok(Self {
            dcu: data[2],
            tcu: data[3],
            median: data[4],
            action: ControlUnitAction::from_byte(data[5]),
        })
    }

    fn encode(&self) -> Vec<u8> {
        vec![
            Self::REPORT_ID,
            Self::SIZE as u8,
            self.dcu,
            self.tcu,
            self.median,
            self.action.as_byte(),
        ]
    }
}

/// Sensor command actions.
pub mod sensor_actions {
    pub const WRITE: u8 = 0x01;
    pub const READ: u8 = 0x02;
    pub const FRAME_CAPTURE: u8 = 0x03;
    pub const IMAGE_READ: u8 = 0x04;
}

/// Short sensor command/register report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SensorReport {
    pub action: u8,
    pub register: u8,
    pub value: u8,
}

impl SensorReport {
    pub fn frame_capture() -> Self {
        Self {
            action: sensor_actions::FRAME_CAPTURE,
            register: 0,
            value: 0,
        }
    }

    pub fn image_read() -> Self {
        Self {
            action: sensor_actions::IMAGE_READ,
            register: 0,
            value: 0,
        }
    }
}

impl FeatureReport for SensorReport {
    const REPORT_ID: u8 = ids::SENSOR;
    const SIZE: usize = 4;

    fn decode(data: &[u8]) -> Result<Self> {
        check_frame(data, Self::REPORT_ID, Self::SIZE)?;
        Ok(Self {
            action: data[1],
            register: data[2],
            value: data[3],
        })
    }

    fn encode(&self) -> Vec<u8> {
        vec![Self::REPORT_ID, self.action, self.register, self.value]
    }
}

/// Side length of the sensor image grid.
pub const SENSOR_IMAGE_SIDE: usize = 30;
/// Number of samples in a sensor image.
pub const SENSOR_IMAGE_SAMPLES: usize = SENSOR_IMAGE_SIDE * SENSOR_IMAGE_SIDE;

/// 30x30 surface image captured by the optical sensor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SensorImage {
    pub action: u8,
    pub samples: Vec<u8>,
}

impl SensorImage {
    /// Arithmetic mean of all samples, used as the TCU median value.
    pub fn mean(&self) -> u8 {
        if self.samples.is_empty() {
            return 0;
        }
        let sum: u32 = self.samples.iter().map(|&b| b as u32).sum();
        (sum / self.samples.len() as u32) as u8
    }
}

impl FeatureReport for SensorImage {
    const REPORT_ID: u8 = ids::SENSOR;
    const SIZE: usize = 3 + SENSOR_IMAGE_SAMPLES;

    fn decode(data: &[u8]) -> Result<Self> {
        check_frame(data, Self::REPORT_ID, Self::SIZE)?;
        Ok(Self {
            action: data[1],
            samples: data[3..].to_vec(),
        })
    }

    fn encode(&self) -> Vec<u8> {
        let mut buf = vec![0u8; Self::SIZE];
        buf[0] = Self::REPORT_ID;
        buf[1] = self.action;
        let n = self.samples.len().min(SENSOR_IMAGE_SAMPLES);
        buf[3..3 + n].copy_from_slice(&self.samples[..n]);
        buf
    }
}

/// Macro report. Content is not interpreted; only framing is checked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MacroReport {
    pub profile_index: u8,
    pub button_index: u8,
    raw: Vec<u8>,
}

impl MacroReport {
    pub fn as_bytes(&self) -> &[u8] {
        &self.raw
    }
}

impl FeatureReport for MacroReport {
    const REPORT_ID: u8 = ids::MACRO;
    const SIZE: usize = 2002;

    fn decode(data: &[u8]) -> Result<Self> {
        check_frame(data, Self::REPORT_ID, Self::SIZE)?;
        let declared = u16::from_le_bytes([data[1], data[2]]) as usize;
        if declared != Self::SIZE {
            return Err(Error::decode(
                Self::REPORT_ID,
                format!("declared size {declared} (expected {})", Self::SIZE),
            ));
        }
        Ok(Self {
            profile_index: data[3],
            button_index: data[4],
            raw: data.to_vec(),
        })
    }

    fn encode(&self) -> Vec<u8> {
        self.raw.clone()
    }
}

/// Special input report event types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpecialType {
    Tilt,
    Profile,
    Quicklaunch,
    Timer,
    TimerStop,
    OpenDriver,
    Cpi,
    Sensitivity,
    XcPosition,
    Multimedia,
    Talk,
    Other(u8),
}

impl SpecialType {
    pub fn from_byte(b: u8) -> Self {
        match b {
            0x10 => Self::Tilt,
            0x20 => Self::Profile,
            0x60 => Self::Quicklaunch,
            0x80 => Self::Timer,
            0x90 => Self::TimerStop,
            0xA0 => Self::OpenDriver,
            0xB0 => Self::Cpi,
            0xC0 => Self::Sensitivity,
            0xE0 => Self::XcPosition,
            0xF0 => Self::Multimedia,
            0xFF => Self::Talk,
            other => Self::Other(other),
        }
    }

    pub fn as_byte(&self) -> u8 {
        match self {
            Self::Tilt => 0x10,
            Self::Profile => 0x20,
            Self::Quicklaunch => 0x60,
            Self::Timer => 0x80,
            Self::TimerStop => 0x90,
            Self::OpenDriver => 0xA0,
            Self::Cpi => 0xB0,
            Self::Sensitivity => 0xC0,
            Self::XcPosition => 0xE0,
            Self::Multimedia => 0xF0,
            Self::Talk => 0xFF,
            Self::Other(b) => *b,
        }
    }
}

/// Asynchronous event from the misc interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpecialReport {
    pub kind: SpecialType,
    pub data: u8,
    pub action: u8,
}

impl SpecialReport {
    pub const SIZE: usize = 5;

    /// Decode an input report. Input reports may arrive padded by the
    /// backend, so only the leading `SIZE` bytes are considered.
    pub fn decode(data: &[u8]) -> Result<Self> {
        if data.len() < Self::SIZE {
            return Err(Error::decode(
                ids::SPECIAL,
                format!("length {} (expected {})", data.len(), Self::SIZE),
            ));
        }
        check_frame(&data[..Self::SIZE], ids::SPECIAL, Self::SIZE)?;
        Ok(Self {
            kind: SpecialType::from_byte(data[1]),
            data: data[2],
            action: data[3],
        })
    }

    pub fn encode(&self) -> Vec<u8> {
        vec![ids::SPECIAL, self.kind.as_byte(), self.data, self.action, 0]
    }
}

/// Any decoded report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Report {
    Special(SpecialReport),
    Control(ControlReport),
    ProfileIndex(ProfileIndexReport),
    Settings(ProfileSettings),
    Buttons(ProfileButtons),
    Macro(MacroReport),
    Info(InfoReport),
    SensorImage(SensorImage),
    Sensor(SensorReport),
    ControlUnit(ControlUnitReport),
    DeviceState(DeviceStateReport),
    TalkFx(TalkFxReport),
}

/// Decode a raw buffer according to its report ID.
///
/// The sensor ID is shared by the short command report and the image; the
/// buffer length selects between them.
pub fn decode(report_id: u8, data: &[u8]) -> Result<Report> {
    match report_id {
        ids::SPECIAL => SpecialReport::decode(data).map(Report::Special),
        ids::CONTROL => ControlReport::decode(data).map(Report::Control),
        ids::PROFILE => ProfileIndexReport::decode(data).map(Report::ProfileIndex),
        ids::PROFILE_SETTINGS => ProfileSettings::decode(data).map(Report::Settings),
        ids::PROFILE_BUTTONS => ProfileButtons::decode(data).map(Report::Buttons),
        ids::MACRO => MacroReport::decode(data).map(Report::Macro),
        ids::INFO => InfoReport::decode(data).map(Report::Info),
        ids::SENSOR if data.len() == SensorImage::SIZE => {
            SensorImage::decode(data).map(Report::SensorImage)
        }
        ids::SENSOR => SensorReport::decode(data).map(Report::Sensor),
        ids::CONTROL_UNIT => ControlUnitReport::decode(data).map(Report::ControlUnit),
        ids::DEVICE_STATE => DeviceStateReport::decode(data).map(Report::DeviceState),
        ids::TALK => TalkFxReport::decode(data).map(Report::TalkFx),
        other => Err(Error::decode(other, "unknown report ID")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn control_report_layout() {
        let r = ControlReport {
            value: 3,
            request: requests::PROFILE_BUTTONS,
        };
        assert_eq!(r.encode(), vec![0x04, 0x03, 0x90]);
    }

    #[test]
    fn decode_rejects_wrong_length() {
        assert!(ControlReport::decode(&[0x04, 0x01]).is_err());
        assert!(ControlUnitReport::decode(&[0x0D, 0x06, 0, 0, 0]).is_err());
    }

    #[test]
    fn decode_rejects_wrong_report_id() {
        let err = ProfileIndexReport::decode(&[0x06, 0x03, 0x01]).unwrap_err();
        assert!(matches!(err, Error::Decode { report_id: 0x05, .. }));
    }

    #[test]
    fn decode_rejects_wrong_declared_size() {
        assert!(DeviceStateReport::decode(&[0x0E, 0x04, 0x01]).is_err());
        assert!(InfoReport::decode(&[0x09, 0x07, 1, 2, 3, 4, 5, 0]).is_err());
    }

    #[test]
    fn info_report_fields() {
        let info = InfoReport::decode(&[0x09, 0x08, 104, 3, 10, 128, 250, 0]).unwrap();
        assert_eq!(info.firmware_version, 104);
        assert_eq!(info.firmware_string(), "1.04");
        assert_eq!((info.xc_min, info.xc_mid, info.xc_max), (10, 128, 250));
    }

    #[test]
    fn info_command_puts_function_in_version_slot() {
        let cmd = InfoCommand::xc_data(5, 120, 240);
        assert_eq!(cmd.encode(), vec![0x09, 0x08, 0x09, 0x00, 5, 120, 240, 0]);
        assert_eq!(InfoCommand::new(InfoFunction::Reset).encode()[2], 0x01);
    }

    #[test]
    fn control_unit_action_bytes() {
        for b in [0x00u8, 0x01, 0x02, 0xFF, 0x42] {
            assert_eq!(ControlUnitAction::from_byte(b).as_byte(), b);
        }
        let cu = ControlUnitReport::decode(&[0x0D, 0x06, 2, 1, 77, 0x01]).unwrap();
        assert_eq!(cu.action, ControlUnitAction::Accept);
        assert_eq!(cu.median, 77);
    }

    #[test]
    fn sensor_image_mean() {
        let mut samples = vec![10u8; SENSOR_IMAGE_SAMPLES];
        samples[0] = 10 + 90; // 90 extra over 900 samples rounds down to 10
        let image = SensorImage { action: 0, samples };
        assert_eq!(image.mean(), 10);

        let image = SensorImage {
            action: 0,
            samples: (0..SENSOR_IMAGE_SAMPLES).map(|i| (i % 2) as u8 * 200).collect(),
        };
        assert_eq!(image.mean(), 100);
    }

    #[test]
    fn decode_dispatches_sensor_by_length() {
        let short = SensorReport::frame_capture().encode();
        assert!(matches!(decode(ids::SENSOR, &short), Ok(Report::Sensor(_))));

        let image = SensorImage {
            action: sensor_actions::IMAGE_READ,
            samples: vec![7; SENSOR_IMAGE_SAMPLES],
        }
        .encode();
        assert_eq!(image.len(), 903);
        assert!(matches!(
            decode(ids::SENSOR, &image),
            Ok(Report::SensorImage(_))
        ));
    }

    #[test]
    fn decode_unknown_report_id_fails() {
        assert!(decode(0x42, &[0x42, 0x00]).is_err());
    }

    #[test]
    fn macro_framing_checked() {
        let mut raw = vec![0u8; MacroReport::SIZE];
        raw[0] = ids::MACRO;
        raw[1..3].copy_from_slice(&(MacroReport::SIZE as u16).to_le_bytes());
        raw[3] = 2;
        raw[4] = 7;
        let m = MacroReport::decode(&raw).unwrap();
        assert_eq!((m.profile_index, m.button_index), (2, 7));

        raw[1] = 0;
        assert!(MacroReport::decode(&raw).is_err());
    }

    #[test]
    fn special_report_accepts_padding() {
        let data = [0x03, 0xE0, 0x80, 0x00, 0x00, 0x00, 0x00, 0x00];
        let special = SpecialReport::decode(&data).unwrap();
        assert_eq!(special.kind, SpecialType::XcPosition);
        assert_eq!(special.data, 0x80);
        assert!(SpecialReport::decode(&[0x03, 0x20]).is_err());
    }

    #[test]
    fn checksum_wraps() {
        assert_eq!(checksum(&[0xFF; 300]), (0xFFu32 * 300 % 0x10000) as u16);
    }
}
