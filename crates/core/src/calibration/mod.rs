//! Physical calibration procedures.
//!
//! - [`tcu`]: tracking control unit, samples the surface through the
//!   optical sensor on a fixed tick.
//! - [`xc`]: X-Celerator lever, locks the rest and end positions from the
//!   special report stream.
//!
//! Both are explicit state machines driven by the caller; neither blocks
//! except through [`tcu::TcuSession::run`], a convenience driver for
//! front ends without their own timer.

pub mod tcu;
pub mod xc;

pub use tcu::{TcuSession, TcuState};
pub use xc::{XcPhase, XcSession, XcState};
