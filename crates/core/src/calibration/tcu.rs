//! Tracking control unit calibration.
//!
//! ```text
//! Idle -> Sampling -> Complete -> AwaitingConfirmation -> Accepted
//!            |           |                |
//!            v           +-------+--------+--> Cancelled
//!         Errored ---------------+
//! ```
//!
//! Every tick captures a frame and reads the 30x30 sensor image; the image
//! mean becomes the candidate median. Each tick is worth two progress
//! units, and sampling completes at [`PROGRESS_MAX`].

use crate::comm::ControlChannel;
use crate::error::{Error, Result};
use crate::events::{Event, EventSink};
use crate::onboard;
use crate::report::{ControlUnitAction, ControlUnitReport, SensorImage, SensorReport};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Default sampling tick.
pub const TICK: Duration = Duration::from_millis(300);
/// Progress units needed to complete sampling.
pub const PROGRESS_MAX: u32 = 40;
/// Progress units per tick (capture + read).
pub const PROGRESS_PER_TICK: u32 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TcuState {
    Idle,
    Sampling,
    Complete,
    /// Dry-run values written; waiting for the user to confirm.
    AwaitingConfirmation,
    Accepted,
    Cancelled,
    Errored,
}

pub struct TcuSession {
    state: TcuState,
    snapshot: ControlUnitReport,
    progress: u32,
    median: u8,
    events: EventSink,
}

impl TcuSession {
    /// Session that has not started sampling yet.
    pub fn new(snapshot: ControlUnitReport, events: EventSink) -> Self {
        Self {
            state: TcuState::Idle,
            snapshot,
            progress: 0,
            median: snapshot.median,
            events,
        }
    }

    /// Snapshot the control unit from the device and begin sampling.
    pub fn start(channel: &ControlChannel, events: EventSink) -> Result<Self> {
        let snapshot = onboard::read_control_unit(channel)?;
        let mut session = Self::new(snapshot, events);
        session.begin()?;
        Ok(session)
    }

    /// Idle -> Sampling.
    pub fn begin(&mut self) -> Result<()> {
        self.require(&[TcuState::Idle], "begin")?;
        info!(dcu = self.snapshot.dcu, "TCU calibration started");
        self.state = TcuState::Sampling;
        self.progress = 0;
        self.emit_progress();
        Ok(())
    }

    pub fn state(&self) -> TcuState {
        self.state
    }

    pub fn progress(&self) -> u32 {
        self.progress
    }

    /// Most recent image mean.
    pub fn median(&self) -> u8 {
        self.median
    }

    /// Control unit as it was when the session started.
    pub fn snapshot(&self) -> &ControlUnitReport {
        &self.snapshot
    }

    fn require(&self, allowed: &[TcuState], op: &str) -> Result<()> {
        if allowed.contains(&self.state) {
            Ok(())
        } else {
            Err(Error::Calibration(format!(
                "TCU {op} not allowed in state {:?}",
                self.state
            )))
        }
    }

    fn emit_progress(&self) {
        self.events.emit(Event::TcuProgress {
            value: self.progress,
            max: PROGRESS_MAX,
        });
    }

    fn sample(&self, channel: &ControlChannel) -> Result<u8> {
        channel.write_checked(&SensorReport::frame_capture())?;
        channel.write_checked(&SensorReport::image_read())?;
        let image: SensorImage = channel.read()?;
        Ok(image.mean())
    }

    /// One timer tick: capture, read and advance progress.
    ///
    /// A device error moves the session to `Errored`; only `cancel` is
    /// possible afterwards.
    pub fn tick(&mut self, channel: &ControlChannel) -> Result<TcuState> {
        self.require(&[TcuState::Sampling], "tick")?;
        match self.sample(channel) {
            Ok(median) => self.record(median),
            Err(e) => {
                warn!("TCU sampling failed: {e}");
                self.state = TcuState::Errored;
                self.events.emit(Event::error(&e));
                Err(e)
            }
        }
    }

    /// Account one sampled median. Exposed for timer-free drivers.
    pub fn record(&mut self, median: u8) -> Result<TcuState> {
        self.require(&[TcuState::Sampling], "record")?;
        self.median = median;
        self.progress = (self.progress + PROGRESS_PER_TICK).min(PROGRESS_MAX);
        self.emit_progress();
        if self.progress >= PROGRESS_MAX {
            debug!(median, "TCU sampling complete");
            self.state = TcuState::Complete;
        }
        Ok(self.state)
    }

    /// Tick every `interval` until sampling completes or fails.
    pub fn run(&mut self, channel: &ControlChannel, interval: Duration) -> Result<()> {
        while self.state == TcuState::Sampling {
            std::thread::sleep(interval);
            self.tick(channel)?;
        }
        Ok(())
    }

    fn report(&self, tcu: u8, action: ControlUnitAction) -> ControlUnitReport {
        ControlUnitReport {
            dcu: self.snapshot.dcu,
            tcu,
            median: self.median,
            action,
        }
    }

    /// Write the sampled median as a dry run.
    pub fn test(&mut self, channel: &ControlChannel) -> Result<()> {
        self.require(&[TcuState::Complete], "test")?;
        onboard::write_control_unit(channel, &self.report(1, ControlUnitAction::Cancel))?;
        self.state = TcuState::AwaitingConfirmation;
        Ok(())
    }

    /// Commit the sampled median. Returns the control unit now in effect.
    pub fn accept(&mut self, channel: &ControlChannel) -> Result<ControlUnitReport> {
        self.require(&[TcuState::AwaitingConfirmation], "accept")?;
        let report = self.report(1, ControlUnitAction::Accept);
        onboard::write_control_unit(channel, &report)?;
        self.state = TcuState::Accepted;
        self.events.emit(Event::ControlUnitChanged);
        info!(median = self.median, "TCU calibration accepted");
        Ok(report)
    }

    /// Abandon the session and restore the snapshot.
    pub fn cancel(&mut self, channel: &ControlChannel) -> Result<()> {
        if matches!(self.state, TcuState::Accepted | TcuState::Cancelled) {
            return Err(Error::Calibration(format!(
                "TCU cancel not allowed in state {:?}",
                self.state
            )));
        }
        self.state = TcuState::Cancelled;
        let restore = ControlUnitReport {
            action: ControlUnitAction::Cancel,
            ..self.snapshot
        };
        info!("TCU calibration cancelled");
        onboard::write_control_unit(channel, &restore)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::comm::CommConfig;
    use crate::events;
    use crate::report::{ids, FeatureReport};
    use crate::transport::mock::{SimulatedTyon, STATUS_CRITICAL};

    fn channel() -> (SimulatedTyon, ControlChannel) {
        let sim = SimulatedTyon::new();
        let config = CommConfig {
            busy_backoff: Duration::ZERO,
            ..CommConfig::default()
        };
        (sim.clone(), ControlChannel::new(Box::new(sim), config))
    }

    fn snapshot() -> ControlUnitReport {
        ControlUnitReport {
            dcu: 2,
            tcu: 0,
            median: 0,
            action: ControlUnitAction::Undefined,
        }
    }

    #[test]
    fn completes_exactly_at_forty_units() {
        let mut session = TcuSession::new(snapshot(), EventSink::none());
        session.begin().unwrap();
        for tick in 1..=19 {
            assert_eq!(session.record(50).unwrap(), TcuState::Sampling, "tick {tick}");
        }
        assert_eq!(session.progress(), 38);
        assert_eq!(session.record(50).unwrap(), TcuState::Complete);
        assert_eq!(session.progress(), PROGRESS_MAX);
        assert!(session.record(50).is_err());
    }

    #[test]
    fn ticks_capture_then_read_image() {
        let (sim, channel) = channel();
        sim.with(|s| s.sensor_samples = vec![90; s.sensor_samples.len()]);
        let mut session = TcuSession::start(&channel, EventSink::none()).unwrap();
        sim.clear_log();
        session.tick(&channel).unwrap();
        let writes = sim.writes();
        assert_eq!(writes.len(), 2);
        assert_eq!(writes[0], SensorReport::frame_capture().encode());
        assert_eq!(writes[1], SensorReport::image_read().encode());
        assert_eq!(session.median(), 90);
        assert_eq!(session.progress(), 2);
    }

    #[test]
    fn run_reaches_complete_and_emits_progress() {
        let (_sim, channel) = channel();
        let (sink, rx) = events::channel();
        let mut session = TcuSession::start(&channel, sink).unwrap();
        session.run(&channel, Duration::ZERO).unwrap();
        assert_eq!(session.state(), TcuState::Complete);
        let progress: Vec<u32> = rx
            .try_iter()
            .filter_map(|e| match e {
                Event::TcuProgress { value, .. } => Some(value),
                _ => None,
            })
            .collect();
        assert_eq!(progress.first(), Some(&0));
        assert_eq!(progress.last(), Some(&PROGRESS_MAX));
        assert_eq!(progress.len(), 21);
    }

    #[test]
    fn test_then_accept_writes_median() {
        let (sim, channel) = channel();
        sim.with(|s| s.sensor_samples = vec![33; s.sensor_samples.len()]);
        let mut session = TcuSession::start(&channel, EventSink::none()).unwrap();
        session.run(&channel, Duration::ZERO).unwrap();
        assert!(session.accept(&channel).is_err());

        session.test(&channel).unwrap();
        let dry = sim.with(|s| s.control_unit);
        assert_eq!(dry.action, ControlUnitAction::Cancel);
        assert_eq!((dry.dcu, dry.tcu, dry.median), (1, 1, 33));

        let committed = session.accept(&channel).unwrap();
        assert_eq!(committed.action, ControlUnitAction::Accept);
        assert_eq!(sim.with(|s| s.control_unit), committed);
        assert_eq!(session.state(), TcuState::Accepted);
        assert!(session.cancel(&channel).is_err());
    }

    #[test]
    fn error_mid_sampling_blocks_accept() {
        let (sim, channel) = channel();
        let mut session = TcuSession::start(&channel, EventSink::none()).unwrap();
        session.tick(&channel).unwrap();
        sim.with(|s| s.fail_read = Some(ids::SENSOR));
        assert!(session.tick(&channel).is_err());
        assert_eq!(session.state(), TcuState::Errored);
        assert!(session.test(&channel).is_err());
        assert!(session.tick(&channel).is_err());

        sim.with(|s| s.fail_read = None);
        session.cancel(&channel).unwrap();
        assert_eq!(session.state(), TcuState::Cancelled);
        assert_eq!(
            sim.with(|s| s.control_unit.action),
            ControlUnitAction::Cancel
        );
    }

    #[test]
    fn device_status_error_is_fatal_to_tick() {
        let (sim, channel) = channel();
        let mut session = TcuSession::start(&channel, EventSink::none()).unwrap();
        sim.push_statuses(&[STATUS_CRITICAL]);
        assert!(matches!(
            session.tick(&channel),
            Err(Error::DeviceStatus { .. })
        ));
        assert_eq!(session.state(), TcuState::Errored);
    }
}
