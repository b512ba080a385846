//! Special report subscription.
//!
//! A reader thread pulls input reports from the misc interface, decodes
//! special reports and forwards them over a channel until stopped, until
//! the receiver goes away, or until the transport fails.

use crate::error::{Error, Result};
use crate::report::{ids, SpecialReport};
use crate::transport::InputReportSource;
use crossbeam_channel::{unbounded, Receiver, Sender};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, info, trace, warn};

/// Read timeout per poll; bounds how long `stop` waits.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

pub struct InputListener {
    running: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl InputListener {
    /// Start the reader thread.
    pub fn spawn(source: Box<dyn InputReportSource>) -> Result<(Self, Receiver<SpecialReport>)> {
        let (sender, receiver) = unbounded();
        let running = Arc::new(AtomicBool::new(true));
        let flag = Arc::clone(&running);
        let handle = thread::Builder::new()
            .name("tyon-input".into())
            .spawn(move || read_loop(source, sender, flag))
            .map_err(Error::Io)?;
        Ok((
            Self {
                running,
                handle: Some(handle),
            },
            receiver,
        ))
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Stop the reader and wait for it to exit.
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("input thread panicked");
            }
        }
    }
}

impl Drop for InputListener {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn read_loop(
    source: Box<dyn InputReportSource>,
    sender: Sender<SpecialReport>,
    running: Arc<AtomicBool>,
) {
    info!("Input listener started");
    while running.load(Ordering::SeqCst) {
        match source.read_input_report(POLL_INTERVAL) {
            Ok(Some(raw)) => {
                if raw.first() != Some(&ids::SPECIAL) {
                    trace!(report_hex = format_args!("{:02X?}", raw), "ignoring input report");
                    continue;
                }
                match SpecialReport::decode(&raw) {
                    Ok(special) => {
                        trace!(kind = ?special.kind, data = special.data, "special report");
                        if sender.send(special).is_err() {
                            debug!("special report receiver gone");
                            break;
                        }
                    }
                    Err(e) => warn!("bad special report: {e}"),
                }
            }
            Ok(None) => {}
            Err(e) => {
                warn!("input read failed: {e}");
                break;
            }
        }
    }
    running.store(false, Ordering::SeqCst);
    info!("Input listener stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::SpecialType;
    use crate::transport::mock::ScriptedInput;

    #[test]
    fn forwards_special_reports_only() {
        let source = ScriptedInput::new(vec![
            vec![0x01, 0x00, 0x05, 0x00],
            vec![0x03, 0xE0, 0x42, 0x00, 0x00],
            vec![0x03, 0x20, 0x02, 0x00, 0x00, 0x00, 0x00, 0x00],
        ]);
        let (listener, rx) = InputListener::spawn(Box::new(source)).unwrap();
        let first = rx.recv_timeout(Duration::from_secs(2)).unwrap();
        assert_eq!(first.kind, SpecialType::XcPosition);
        assert_eq!(first.data, 0x42);
        let second = rx.recv_timeout(Duration::from_secs(2)).unwrap();
        assert_eq!(second.kind, SpecialType::Profile);
        listener.stop();
    }

    #[test]
    fn stops_when_receiver_dropped() {
        let source = ScriptedInput::new(vec![vec![0x03, 0x10, 0, 0, 0]; 4]);
        let (listener, rx) = InputListener::spawn(Box::new(source)).unwrap();
        drop(rx);
        let deadline = std::time::Instant::now() + Duration::from_secs(2);
        while listener.is_running() && std::time::Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        assert!(!listener.is_running());
    }
}
