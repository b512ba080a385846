//! open-tyon-core: control protocol, profile synchronization, and
//! calibration for the ROCCAT Tyon mouse.
//!
//! The crate talks to the mouse through HID feature reports on its control
//! interface and listens for special input reports on its misc interface.
//! Protocol logic only depends on the [`transport::HidTransport`] trait;
//! [`backend`] provides the hidapi implementation.

pub mod backend;
pub mod buttons;
pub mod calibration;
pub mod comm;
pub mod config;
pub mod device;
pub mod dpi;
pub mod error;
pub mod events;
pub mod input;
pub mod jobs;
pub mod keymap;
pub mod onboard;
pub mod profile;
pub mod report;
pub mod report_rate;
pub mod rtpf;
pub mod safety;
pub mod settings;
pub mod sync;
pub mod talkfx;
pub mod transport;

/// ROCCAT USB Vendor ID.
pub const ROCCAT_VID: u16 = 0x1E7D;

/// Tyon product IDs.
pub mod pids {
    pub const TYON_BLACK: u16 = 0x2E4A;
    pub const TYON_WHITE: u16 = 0x2E4B;
}
