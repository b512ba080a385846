//! HID transport abstraction for device communication.
//!
//! Provides a trait-based transport layer so that the hidapi backend and
//! the simulated device used in tests share the same interface. Protocol
//! logic only ever sees `dyn HidTransport`.

use crate::error::{Error, Result};
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};
use tracing::trace;

/// Abstraction over feature-report I/O on the control interface.
///
/// The device tolerates one outstanding transaction; callers serialize
/// access through [`crate::comm::ControlChannel`].
pub trait HidTransport: Send {
    /// Read a feature report of exactly `len` bytes (report ID included).
    fn read_feature_report(&self, report_id: u8, len: usize) -> Result<Vec<u8>>;

    /// Write a feature report. `data[0]` is the report ID.
    fn write_feature_report(&self, data: &[u8]) -> Result<()>;

    /// Start a write whose completion is signalled later.
    ///
    /// The default performs a synchronous write and returns an already
    /// completed handle.
    fn write_async(&self, data: &[u8]) -> Result<PendingWrite> {
        let (pending, completer) = PendingWrite::new();
        completer.complete(self.write_feature_report(data));
        Ok(pending)
    }
}

/// Source of input reports from the misc interface.
pub trait InputReportSource: Send {
    /// Wait up to `timeout` for one input report. `Ok(None)` on timeout.
    fn read_input_report(&self, timeout: Duration) -> Result<Option<Vec<u8>>>;
}

enum WriteState {
    Pending,
    Done(Result<()>),
    Cancelled,
}

type WriteSlot = Arc<(Mutex<WriteState>, Condvar)>;

fn lock(slot: &WriteSlot) -> std::sync::MutexGuard<'_, WriteState> {
    slot.0.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Handle to an in-flight asynchronous write.
pub struct PendingWrite {
    slot: WriteSlot,
}

/// Completion side of a [`PendingWrite`], handed to whatever performs the
/// write.
pub struct WriteCompleter {
    slot: WriteSlot,
}

impl PendingWrite {
    pub fn new() -> (PendingWrite, WriteCompleter) {
        let slot: WriteSlot = Arc::new((Mutex::new(WriteState::Pending), Condvar::new()));
        (
            PendingWrite { slot: slot.clone() },
            WriteCompleter { slot },
        )
    }

    /// Whether the write has finished (successfully or not).
    pub fn is_complete(&self) -> bool {
        matches!(*lock(&self.slot), WriteState::Done(_))
    }

    /// Block until the write completes or `deadline` elapses.
    pub fn wait(self, deadline: Duration) -> Result<()> {
        let started = Instant::now();
        let mut state = lock(&self.slot);
        loop {
            match std::mem::replace(&mut *state, WriteState::Cancelled) {
                WriteState::Done(result) => return result,
                WriteState::Cancelled => {
                    return Err(Error::Hid("write cancelled".into()));
                }
                WriteState::Pending => *state = WriteState::Pending,
            }
            let elapsed = started.elapsed();
            if elapsed >= deadline {
                *state = WriteState::Cancelled;
                return Err(Error::Timeout(format!(
                    "write not acknowledged within {} ms",
                    deadline.as_millis()
                )));
            }
            state = self
                .slot
                .1
                .wait_timeout(state, deadline - elapsed)
                .map(|(guard, _)| guard)
                .unwrap_or_else(|poisoned| poisoned.into_inner().0);
        }
    }

    /// Abandon the write. A later completion is discarded.
    pub fn cancel(self) {
        *lock(&self.slot) = WriteState::Cancelled;
        self.slot.1.notify_all();
    }
}

impl WriteCompleter {
    /// Record the outcome and wake the waiter. Ignored after cancellation.
    pub fn complete(self, result: Result<()>) {
        let mut state = lock(&self.slot);
        if matches!(*state, WriteState::Pending) {
            trace!(ok = result.is_ok(), "write completion");
            *state = WriteState::Done(result);
            self.slot.1.notify_all();
        }
    }
}
