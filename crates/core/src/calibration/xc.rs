//! X-Celerator lever calibration.
//!
//! The device streams the lever's analog position as special reports while
//! calibration mode is on. The user holds the lever at its minimum, then
//! lets it rest, then pushes it to its maximum. A position is locked once
//! successive samples stay within [`XcConfig::tolerance`] of the first
//! sample of the run for at least [`XcConfig::dwell`].
//!
//! Completing all three phases writes the captured triple followed by the
//! end command. Cancelling writes only the end command.

use crate::comm::ControlChannel;
use crate::error::{Error, Result};
use crate::events::{Event, EventSink};
use crate::report::{InfoCommand, InfoFunction, SpecialReport, SpecialType};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Lever position being captured.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum XcPhase {
    Min,
    Mid,
    Max,
}

impl XcPhase {
    fn next(self) -> Option<Self> {
        match self {
            Self::Min => Some(Self::Mid),
            Self::Mid => Some(Self::Max),
            Self::Max => None,
        }
    }

    pub fn instruction(&self) -> &'static str {
        match self {
            Self::Min => "Hold the X-Celerator lever at its lowest position",
            Self::Mid => "Release the X-Celerator lever to its resting position",
            Self::Max => "Hold the X-Celerator lever at its highest position",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum XcState {
    Idle,
    Running(XcPhase),
    /// All three positions locked, not yet written.
    Captured,
    Applied,
    Cancelled,
}

/// Debounce parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct XcConfig {
    /// Largest deviation from the run's first sample still counted as stable.
    pub tolerance: u8,
    /// How long a run must stay stable before it is locked.
    pub dwell: Duration,
}

impl Default for XcConfig {
    fn default() -> Self {
        Self {
            tolerance: 3,
            dwell: Duration::from_millis(750),
        }
    }
}

/// Captured calibration triple.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct XcValues {
    pub min: u8,
    pub mid: u8,
    pub max: u8,
}

pub struct XcSession {
    state: XcState,
    config: XcConfig,
    values: XcValues,
    /// First sample of the current stable run.
    anchor: Option<(u8, Instant)>,
    events: EventSink,
}

impl XcSession {
    pub fn new(config: XcConfig, events: EventSink) -> Self {
        Self {
            state: XcState::Idle,
            config,
            values: XcValues::default(),
            anchor: None,
            events,
        }
    }

    /// Put the device in calibration mode and begin with the min phase.
    pub fn start(&mut self, channel: &ControlChannel) -> Result<()> {
        if self.state != XcState::Idle {
            return Err(Error::Calibration(format!(
                "XC start not allowed in state {:?}",
                self.state
            )));
        }
        channel.write_info(InfoCommand::new(InfoFunction::XcCalibrationStart))?;
        info!("XC calibration started");
        self.enter(XcPhase::Min);
        Ok(())
    }

    pub fn state(&self) -> XcState {
        self.state
    }

    pub fn values(&self) -> XcValues {
        self.values
    }

    fn enter(&mut self, phase: XcPhase) {
        self.state = XcState::Running(phase);
        self.anchor = None;
        self.events.emit(Event::XcPhase(phase));
    }

    /// Value locked by the phase before `phase`. A new phase only starts
    /// a run once the lever has left that value's band.
    fn previous_lock(&self, phase: XcPhase) -> Option<u8> {
        match phase {
            XcPhase::Min => None,
            XcPhase::Mid => Some(self.values.min),
            XcPhase::Max => Some(self.values.mid),
        }
    }

    /// Feed one lever sample taken at `now`.
    ///
    /// Returns the phase locked by this sample, if any.
    pub fn feed(&mut self, value: u8, now: Instant) -> Option<XcPhase> {
        let XcState::Running(phase) = self.state else {
            return None;
        };
        if let Some(previous) = self.previous_lock(phase) {
            if previous.abs_diff(value) <= self.config.tolerance {
                self.anchor = None;
                return None;
            }
        }
        let (anchor, since) = match self.anchor {
            Some((anchor, since)) if anchor.abs_diff(value) <= self.config.tolerance => {
                (anchor, since)
            }
            _ => {
                self.anchor = Some((value, now));
                return None;
            }
        };
        if now.saturating_duration_since(since) < self.config.dwell {
            return None;
        }
        match phase {
            XcPhase::Min => self.values.min = anchor,
            XcPhase::Mid => self.values.mid = anchor,
            XcPhase::Max => self.values.max = anchor,
        }
        debug!(?phase, value = anchor, "XC position locked");
        match phase.next() {
            Some(next) => self.enter(next),
            None => {
                self.state = XcState::Captured;
                self.anchor = None;
            }
        }
        Some(phase)
    }

    /// Feed a special report; lever positions advance the session, and a
    /// completed capture is written to the device.
    pub fn handle_special(
        &mut self,
        channel: &ControlChannel,
        report: &SpecialReport,
        now: Instant,
    ) -> Result<Option<XcPhase>> {
        if report.kind != SpecialType::XcPosition {
            return Ok(None);
        }
        let locked = self.feed(report.data, now);
        if self.state == XcState::Captured {
            self.apply(channel)?;
        }
        Ok(locked)
    }

    /// Write the captured triple and leave calibration mode.
    pub fn apply(&mut self, channel: &ControlChannel) -> Result<XcValues> {
        if self.state != XcState::Captured {
            return Err(Error::Calibration(format!(
                "XC apply not allowed in state {:?}",
                self.state
            )));
        }
        let XcValues { min, mid, max } = self.values;
        if !(min < mid && mid < max) {
            self.state = XcState::Cancelled;
            warn!(min, mid, max, "XC capture not ordered, leaving calibration");
            channel.write_info(InfoCommand::new(InfoFunction::XcCalibrationEnd))?;
            return Err(Error::Calibration(format!(
                "XC positions must rise from min to max, got {min}/{mid}/{max}"
            )));
        }
        channel.write_info(InfoCommand::xc_data(min, mid, max))?;
        channel.write_info(InfoCommand::new(InfoFunction::XcCalibrationEnd))?;
        self.state = XcState::Applied;
        info!(min, mid, max, "XC calibration applied");
        Ok(self.values)
    }

    /// Leave calibration mode without writing data.
    pub fn cancel(&mut self, channel: &ControlChannel) -> Result<()> {
        if matches!(self.state, XcState::Applied | XcState::Cancelled) {
            return Err(Error::Calibration(format!(
                "XC cancel not allowed in state {:?}",
                self.state
            )));
        }
        self.state = XcState::Cancelled;
        self.anchor = None;
        info!("XC calibration cancelled");
        channel.write_info(InfoCommand::new(InfoFunction::XcCalibrationEnd))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::comm::CommConfig;
    use crate::events;
    use crate::report::ids;
    use crate::transport::mock::SimulatedTyon;

    fn channel() -> (SimulatedTyon, ControlChannel) {
        let sim = SimulatedTyon::new();
        (
            sim.clone(),
            ControlChannel::new(Box::new(sim), CommConfig::default()),
        )
    }

    fn ms(base: Instant, n: u64) -> Instant {
        base + Duration::from_millis(n)
    }

    fn lever(value: u8) -> SpecialReport {
        SpecialReport {
            kind: SpecialType::XcPosition,
            data: value,
            action: 0,
        }
    }

    #[test]
    fn locks_only_after_stable_dwell() {
        let mut session = XcSession::new(XcConfig::default(), EventSink::none());
        session.state = XcState::Running(XcPhase::Min);
        let t0 = Instant::now();
        assert_eq!(session.feed(10, t0), None);
        assert_eq!(session.feed(12, ms(t0, 400)), None);
        // Jump outside the band restarts the run.
        assert_eq!(session.feed(20, ms(t0, 700)), None);
        assert_eq!(session.feed(21, ms(t0, 1000)), None);
        assert_eq!(session.feed(19, ms(t0, 1449)), None);
        assert_eq!(session.feed(22, ms(t0, 1450)), Some(XcPhase::Min));
        assert_eq!(session.values().min, 20);
        assert_eq!(session.state(), XcState::Running(XcPhase::Mid));
    }

    #[test]
    fn full_run_writes_data_then_end() {
        let (sim, channel) = channel();
        let (sink, rx) = events::channel();
        let mut session = XcSession::new(XcConfig::default(), sink);
        session.start(&channel).unwrap();

        let t0 = Instant::now();
        let samples = [(5, 0), (5, 800), (130, 900), (129, 1700), (250, 1800), (251, 2600)];
        for (value, at) in samples {
            session
                .handle_special(&channel, &lever(value), ms(t0, at))
                .unwrap();
        }
        assert_eq!(session.state(), XcState::Applied);
        assert_eq!(
            session.values(),
            XcValues {
                min: 5,
                mid: 130,
                max: 250
            }
        );

        let info_writes: Vec<Vec<u8>> = sim
            .writes()
            .into_iter()
            .filter(|w| w[0] == ids::INFO)
            .collect();
        assert_eq!(info_writes.len(), 3);
        assert_eq!(info_writes[0][2], InfoFunction::XcCalibrationStart as u8);
        assert_eq!(info_writes[1], InfoCommand::xc_data(5, 130, 250).encode());
        assert_eq!(info_writes[2][2], InfoFunction::XcCalibrationEnd as u8);
        assert_eq!(sim.with(|s| (s.info.xc_min, s.info.xc_mid, s.info.xc_max)), (5, 130, 250));

        let phases: Vec<Event> = rx.try_iter().collect();
        assert_eq!(
            phases,
            vec![
                Event::XcPhase(XcPhase::Min),
                Event::XcPhase(XcPhase::Mid),
                Event::XcPhase(XcPhase::Max)
            ]
        );
    }

    #[test]
    fn held_lever_does_not_lock_next_phase() {
        let (sim, channel) = channel();
        let mut session = XcSession::new(XcConfig::default(), EventSink::none());
        session.start(&channel).unwrap();

        let t0 = Instant::now();
        for at in [0, 800, 900, 1700, 1800, 2600, 5000] {
            session
                .handle_special(&channel, &lever(5), ms(t0, at))
                .unwrap();
        }
        assert_eq!(session.values().min, 5);
        assert_eq!(session.state(), XcState::Running(XcPhase::Mid));
        // Still inside the min band.
        assert_eq!(session.feed(7, ms(t0, 6000)), None);
        assert_eq!(session.feed(8, ms(t0, 7000)), None);
        assert_eq!(session.state(), XcState::Running(XcPhase::Mid));
        assert!(!sim
            .writes()
            .iter()
            .any(|w| w[0] == ids::INFO && w[2] == InfoFunction::XcCalibrationData as u8));
    }

    #[test]
    fn unordered_capture_is_not_written() {
        let (sim, channel) = channel();
        let mut session = XcSession::new(XcConfig::default(), EventSink::none());
        session.start(&channel).unwrap();

        let t0 = Instant::now();
        let samples = [(200, 0), (200, 800), (100, 900), (100, 1700), (50, 1800)];
        for (value, at) in samples {
            session
                .handle_special(&channel, &lever(value), ms(t0, at))
                .unwrap();
        }
        sim.clear_log();
        let err = session
            .handle_special(&channel, &lever(50), ms(t0, 2600))
            .unwrap_err();
        assert!(matches!(err, Error::Calibration(_)));
        assert_eq!(session.state(), XcState::Cancelled);

        let writes = sim.writes();
        assert_eq!(writes.len(), 1);
        assert_eq!(writes[0][2], InfoFunction::XcCalibrationEnd as u8);
        assert_eq!(sim.with(|s| (s.info.xc_min, s.info.xc_mid, s.info.xc_max)), (0, 128, 255));
    }

    #[test]
    fn cancel_sends_end_without_data() {
        let (sim, channel) = channel();
        let mut session = XcSession::new(XcConfig::default(), EventSink::none());
        session.start(&channel).unwrap();
        session.feed(40, Instant::now());
        sim.clear_log();
        session.cancel(&channel).unwrap();
        let writes = sim.writes();
        assert_eq!(writes.len(), 1);
        assert_eq!(writes[0][2], InfoFunction::XcCalibrationEnd as u8);
        assert_eq!(sim.with(|s| s.info.xc_mid), 128);
        assert!(session.cancel(&channel).is_err());
    }

    #[test]
    fn other_special_reports_are_ignored() {
        let (_sim, channel) = channel();
        let mut session = XcSession::new(XcConfig::default(), EventSink::none());
        session.start(&channel).unwrap();
        let tilt = SpecialReport {
            kind: SpecialType::Tilt,
            data: 1,
            action: 0,
        };
        assert_eq!(
            session
                .handle_special(&channel, &tilt, Instant::now())
                .unwrap(),
            None
        );
        assert_eq!(session.state(), XcState::Running(XcPhase::Min));
    }

    #[test]
    fn apply_requires_capture() {
        let (_sim, channel) = channel();
        let mut session = XcSession::new(XcConfig::default(), EventSink::none());
        assert!(session.apply(&channel).is_err());
        session.start(&channel).unwrap();
        assert!(session.start(&channel).is_err());
    }
}
