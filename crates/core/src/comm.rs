//! Control protocol engine.
//!
//! Every state-changing transaction with the Tyon is gated by the control
//! status register (report 0x04). [`ControlChannel::check`] polls it until
//! the device reports OK, backing off while it reports BUSY and failing on
//! anything else. [`ControlChannel::select`] then points the device at a
//! store index and request code so the following read returns that record.

use crate::error::{Error, Result};
use crate::report::{
    ids, ControlReport, FeatureReport, InfoCommand, InfoReport, MacroReport,
};
use crate::safety;
use crate::transport::HidTransport;
use std::time::{Duration, Instant};
use tracing::{debug, trace, warn};

/// Status byte of the control report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlStatus {
    Critical,
    Ok,
    Invalid,
    Busy,
    Critical2,
    Unknown(u8),
}

impl ControlStatus {
    pub fn from_byte(b: u8) -> Self {
        match b {
            0 => Self::Critical,
            1 => Self::Ok,
            2 => Self::Invalid,
            3 => Self::Busy,
            4 => Self::Critical2,
            other => Self::Unknown(other),
        }
    }
}

impl std::fmt::Display for ControlStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Critical => write!(f, "CRITICAL"),
            Self::Ok => write!(f, "OK"),
            Self::Invalid => write!(f, "INVALID"),
            Self::Busy => write!(f, "BUSY"),
            Self::Critical2 => write!(f, "CRITICAL_2"),
            Self::Unknown(b) => write!(f, "unknown status {b}"),
        }
    }
}

/// Classification of communication errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// The device stayed busy past the caller's deadline.
    Busy,
    /// Device is disconnected: stop, notify user.
    Disconnected,
    /// Device answered with a CRITICAL/INVALID/unknown status.
    Protocol,
    /// Corrupted or unexpected data, or a rejected value.
    InvalidResponse,
    /// Transport or filesystem failure.
    Io,
}

impl ErrorClass {
    pub fn classify(err: &Error) -> Self {
        match err {
            Error::Timeout(_) => Self::Busy,
            Error::DeviceNotFound(_) => Self::Disconnected,
            Error::DeviceStatus { .. } => Self::Protocol,
            Error::Hid(msg) => {
                let lower = msg.to_lowercase();
                if lower.contains("disconnect")
                    || lower.contains("not found")
                    || lower.contains("no such device")
                {
                    Self::Disconnected
                } else {
                    Self::Io
                }
            }
            Error::Io(_) => Self::Io,
            Error::Decode { .. }
            | Error::OutOfRange { .. }
            | Error::ProfileFile(_)
            | Error::Calibration(_)
            | Error::NoData(_) => Self::InvalidResponse,
        }
    }

    /// Whether restarting the whole operation later may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Busy)
    }
}

/// Timing policy for the control channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommConfig {
    /// Sleep between polls while the device reports BUSY.
    pub busy_backoff: Duration,
    /// Give up polling after this long. `None` polls forever.
    pub busy_timeout: Option<Duration>,
    /// Bound on waiting for an asynchronous write to complete.
    pub write_deadline: Duration,
}

impl Default for CommConfig {
    fn default() -> Self {
        Self {
            busy_backoff: Duration::from_millis(500),
            busy_timeout: None,
            write_deadline: Duration::from_millis(1000),
        }
    }
}

/// Device connection status for display.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkStatus {
    /// Device answered the control register with OK or BUSY.
    Connected,
    Disconnected,
    /// Device answered, but with an error status or garbage.
    Error,
}

/// Serialized access to the control interface.
pub struct ControlChannel {
    transport: Box<dyn HidTransport>,
    config: CommConfig,
}

impl ControlChannel {
    pub fn new(transport: Box<dyn HidTransport>, config: CommConfig) -> Self {
        Self { transport, config }
    }

    pub fn config(&self) -> &CommConfig {
        &self.config
    }

    /// Read and decode a feature report.
    pub fn read<R: FeatureReport>(&self) -> Result<R> {
        let raw = self.transport.read_feature_report(R::REPORT_ID, R::SIZE)?;
        trace!(
            report_id = format_args!("0x{:02X}", R::REPORT_ID),
            report_hex = format_args!("{:02X?}", raw),
            "RX"
        );
        R::decode(&raw)
    }

    /// Write raw report bytes without consulting the status register.
    pub fn write_raw(&self, data: &[u8]) -> Result<()> {
        trace!(
            report_id = format_args!("0x{:02X}", data.first().copied().unwrap_or(0)),
            report_hex = format_args!("{:02X?}", data),
            "TX"
        );
        self.transport.write_feature_report(data)
    }

    /// Poll the control status until the device is ready.
    ///
    /// Returns the number of BUSY retries. Never writes.
    pub fn check(&self) -> Result<u32> {
        let started = Instant::now();
        let mut retries = 0u32;
        loop {
            let report: ControlReport = self.read()?;
            match ControlStatus::from_byte(report.value) {
                ControlStatus::Ok => {
                    if retries > 0 {
                        debug!(retries, "device ready after busy wait");
                    }
                    return Ok(retries);
                }
                ControlStatus::Busy => {
                    if let Some(limit) = self.config.busy_timeout {
                        if started.elapsed() >= limit {
                            warn!(retries, "device busy past deadline");
                            return Err(Error::Timeout(format!(
                                "device busy for {} ms",
                                started.elapsed().as_millis()
                            )));
                        }
                    }
                    retries += 1;
                    trace!(retries, "device busy, backing off");
                    std::thread::sleep(self.config.busy_backoff);
                }
                status => {
                    warn!(%status, raw = report.value, "control check failed");
                    return Err(Error::DeviceStatus {
                        status,
                        raw: report.value,
                    });
                }
            }
        }
    }

    /// Point the device at `value` (store index) for `request`.
    pub fn select(&self, value: u8, request: u8) -> Result<()> {
        self.check()?;
        debug!(
            value,
            request = format_args!("0x{:02X}", request),
            "select"
        );
        self.write_raw(&ControlReport { value, request }.encode())
    }

    /// Write a report without a status check.
    pub fn write<R: FeatureReport>(&self, report: &R) -> Result<()> {
        self.write_raw(&report.encode())
    }

    /// Wait for the device to be ready, then write.
    pub fn write_checked<R: FeatureReport>(&self, report: &R) -> Result<()> {
        self.check()?;
        self.write(report)
    }

    /// Wait for the device to be ready, then write and wait for the
    /// transport to acknowledge within the configured deadline.
    pub fn write_checked_async<R: FeatureReport>(&self, report: &R) -> Result<()> {
        self.check()?;
        let data = report.encode();
        trace!(
            report_id = format_args!("0x{:02X}", R::REPORT_ID),
            report_hex = format_args!("{:02X?}", data),
            "TX async"
        );
        let pending = self.transport.write_async(&data)?;
        pending.wait(self.config.write_deadline)
    }

    /// Trigger an info function.
    pub fn write_info(&self, command: InfoCommand) -> Result<()> {
        self.check()?;
        debug!(function = ?command.function, "info function");
        self.write_raw(&command.encode())
    }

    pub fn read_info(&self) -> Result<InfoReport> {
        self.read()
    }

    /// Select and read a macro record. Only the framing is validated.
    pub fn read_macro(&self, profile: usize, button_slot: usize) -> Result<MacroReport> {
        let profile = safety::validate_profile_index(profile)?;
        safety::validate_button_slot(button_slot)?;
        self.select(profile, button_slot as u8)?;
        let report: MacroReport = self.read()?;
        if report.profile_index != profile || report.button_index as usize != button_slot {
            return Err(Error::decode(
                ids::MACRO,
                format!(
                    "macro for {}/{} (expected {profile}/{button_slot})",
                    report.profile_index, report.button_index
                ),
            ));
        }
        Ok(report)
    }

    /// Probe the control register.
    pub fn link_status(&self) -> LinkStatus {
        match self.read::<ControlReport>() {
            Ok(report) => match ControlStatus::from_byte(report.value) {
                ControlStatus::Ok | ControlStatus::Busy => LinkStatus::Connected,
                _ => LinkStatus::Error,
            },
            Err(ref e) => match ErrorClass::classify(e) {
                ErrorClass::Disconnected => LinkStatus::Disconnected,
                _ => LinkStatus::Error,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::{requests, InfoFunction};
    use crate::transport::mock::{
        SimulatedTyon, STATUS_BUSY, STATUS_CRITICAL, STATUS_CRITICAL_2, STATUS_INVALID,
    };

    fn fast() -> CommConfig {
        CommConfig {
            busy_backoff: Duration::ZERO,
            busy_timeout: None,
            write_deadline: Duration::from_millis(50),
        }
    }

    fn channel() -> (SimulatedTyon, ControlChannel) {
        let sim = SimulatedTyon::new();
        let channel = ControlChannel::new(Box::new(sim.clone()), fast());
        (sim, channel)
    }

    #[test]
    fn check_retries_busy_then_succeeds() {
        let (sim, channel) = channel();
        sim.push_statuses(&[STATUS_BUSY, STATUS_BUSY]);
        assert_eq!(channel.check().unwrap(), 2);
        assert_eq!(sim.control_reads(), 3);
        assert!(sim.writes().is_empty());
    }

    #[test]
    fn check_fails_immediately_on_critical() {
        let (sim, channel) = channel();
        sim.push_statuses(&[STATUS_CRITICAL]);
        let err = channel.check().unwrap_err();
        assert!(matches!(
            err,
            Error::DeviceStatus {
                status: ControlStatus::Critical,
                raw: 0
            }
        ));
        assert_eq!(sim.control_reads(), 1);
    }

    #[test]
    fn check_fails_on_invalid_and_unknown() {
        for status in [STATUS_INVALID, STATUS_CRITICAL_2, 0x7F] {
            let (sim, channel) = channel();
            sim.push_statuses(&[status]);
            assert!(matches!(
                channel.check(),
                Err(Error::DeviceStatus { .. })
            ));
        }
    }

    #[test]
    fn check_honours_busy_deadline() {
        let sim = SimulatedTyon::new();
        sim.push_statuses(&[STATUS_BUSY; 64]);
        let channel = ControlChannel::new(
            Box::new(sim.clone()),
            CommConfig {
                busy_backoff: Duration::from_millis(2),
                busy_timeout: Some(Duration::from_millis(10)),
                ..fast()
            },
        );
        let err = channel.check().unwrap_err();
        assert_eq!(ErrorClass::classify(&err), ErrorClass::Busy);
    }

    #[test]
    fn select_checks_before_writing() {
        let (sim, channel) = channel();
        sim.push_statuses(&[STATUS_BUSY]);
        channel.select(3, requests::PROFILE_BUTTONS).unwrap();
        assert_eq!(sim.control_reads(), 2);
        assert_eq!(sim.writes(), vec![vec![0x04, 0x03, 0x90]]);
    }

    #[test]
    fn select_aborts_without_write_on_error() {
        let (sim, channel) = channel();
        sim.push_statuses(&[STATUS_INVALID]);
        assert!(channel.select(0, requests::PROFILE_SETTINGS).is_err());
        assert!(sim.writes().is_empty());
    }

    #[test]
    fn async_write_times_out_when_never_acknowledged() {
        let (sim, channel) = channel();
        sim.with(|s| s.stall_async = true);
        let err = channel
            .write_checked_async(&crate::report::DeviceStateReport { state: 1 })
            .unwrap_err();
        assert!(matches!(err, Error::Timeout(_)));
    }

    #[test]
    fn write_info_reset_checks_first() {
        let (sim, channel) = channel();
        channel
            .write_info(InfoCommand::new(InfoFunction::Reset))
            .unwrap();
        assert_eq!(sim.control_reads(), 1);
        assert_eq!(sim.written_ids(), vec![0x09]);
    }

    #[test]
    fn read_macro_validates_framing() {
        let (sim, channel) = channel();
        let m = channel.read_macro(2, 7).unwrap();
        assert_eq!((m.profile_index, m.button_index), (2, 7));
        assert_eq!(sim.writes()[0], vec![0x04, 2, 7]);
        assert!(channel.read_macro(5, 0).is_err());
    }

    #[test]
    fn classify_errors() {
        assert_eq!(
            ErrorClass::classify(&Error::DeviceNotFound("Tyon".into())),
            ErrorClass::Disconnected
        );
        assert_eq!(
            ErrorClass::classify(&Error::Hid("No such device".into())),
            ErrorClass::Disconnected
        );
        assert_eq!(
            ErrorClass::classify(&Error::Hid("broken pipe".into())),
            ErrorClass::Io
        );
        assert_eq!(
            ErrorClass::classify(&Error::decode(0x06, "bad size")),
            ErrorClass::InvalidResponse
        );
        assert!(ErrorClass::classify(&Error::Timeout("x".into())).is_transient());
    }

    #[test]
    fn link_status_reflects_register() {
        let (sim, channel) = channel();
        assert_eq!(channel.link_status(), LinkStatus::Connected);
        sim.push_statuses(&[STATUS_CRITICAL]);
        assert_eq!(channel.link_status(), LinkStatus::Error);
        sim.with(|s| s.fail_read = Some(ids::CONTROL));
        assert_eq!(channel.link_status(), LinkStatus::Error);
    }
}
