//! TalkFX report (0x10, 16 bytes).
//!
//! Lets the host drive EasyShift/EasyAim state and override the lights
//! with ambient and event colors. The override only takes effect while
//! TalkFX is enabled in the active profile (high nibble of the polling
//! byte, see [`crate::report_rate`]).

use crate::comm::ControlChannel;
use crate::error::Result;
use crate::report::{check_sized_frame, ids, FeatureReport};
use tracing::debug;

/// Which state bits the device should take from the report.
pub mod fx_status {
    pub const OFF: u8 = 0x00;
    pub const ON: u8 = 0x01;
    pub const EASYSHIFT: u8 = 0x02;
    pub const EASYAIM: u8 = 0x04;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TalkFxReport {
    pub easyshift: u8,
    pub easyshift_lock: u8,
    pub easyaim: u8,
    pub fx_status: u8,
    pub zone: u8,
    pub effect: u8,
    pub speed: u8,
    pub ambient: [u8; 3],
    pub event: [u8; 3],
}

impl TalkFxReport {
    /// Light override with one ambient color on all zones.
    pub fn lights(effect: u8, speed: u8, ambient: [u8; 3]) -> Self {
        Self {
            fx_status: fx_status::ON,
            effect,
            speed,
            ambient,
            ..Self::default()
        }
    }

    /// Hand lighting back to the profile.
    pub fn release() -> Self {
        Self::default()
    }
}

impl FeatureReport for TalkFxReport {
    const REPORT_ID: u8 = ids::TALK;
    const SIZE: usize = 16;

    fn decode(data: &[u8]) -> Result<Self> {
        check_sized_frame(data, Self::REPORT_ID, Self::SIZE)?;
        Ok(Self {
            easyshift: data[2],
            easyshift_lock: data[3],
            easyaim: data[4],
            fx_status: data[5],
            zone: data[6],
            effect: data[7],
            speed: data[8],
            ambient: [data[9], data[10], data[11]],
            event: [data[12], data[13], data[14]],
        })
    }

    fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(Self::SIZE);
        buf.extend_from_slice(&[
            Self::REPORT_ID,
            Self::SIZE as u8,
            self.easyshift,
            self.easyshift_lock,
            self.easyaim,
            self.fx_status,
            self.zone,
            self.effect,
            self.speed,
        ]);
        buf.extend_from_slice(&self.ambient);
        buf.extend_from_slice(&self.event);
        buf.push(0);
        buf
    }
}

/// Send a TalkFX report after the status check.
pub fn write_talk_fx(channel: &ControlChannel, report: &TalkFxReport) -> Result<()> {
    debug!(
        fx_status = report.fx_status,
        effect = report.effect,
        "write TalkFX"
    );
    channel.write_checked(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::comm::CommConfig;
    use crate::transport::mock::{SimulatedTyon, STATUS_CRITICAL};

    #[test]
    fn layout() {
        let r = TalkFxReport::lights(3, 2, [0x10, 0x20, 0x30]);
        let raw = r.encode();
        assert_eq!(raw.len(), 16);
        assert_eq!(&raw[..2], &[0x10, 16]);
        assert_eq!(raw[5], fx_status::ON);
        assert_eq!(&raw[9..12], &[0x10, 0x20, 0x30]);
        assert_eq!(TalkFxReport::decode(&raw).unwrap(), r);
    }

    #[test]
    fn write_goes_through_status_check() {
        let sim = SimulatedTyon::new();
        let channel = ControlChannel::new(Box::new(sim.clone()), CommConfig::default());
        write_talk_fx(&channel, &TalkFxReport::release()).unwrap();
        assert_eq!(sim.control_reads(), 1);
        assert_eq!(sim.with(|s| s.talk_fx), Some(TalkFxReport::release()));

        sim.push_statuses(&[STATUS_CRITICAL]);
        assert!(write_talk_fx(&channel, &TalkFxReport::release()).is_err());
    }
}
