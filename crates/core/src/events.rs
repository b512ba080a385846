//! Notifications from the engine to its front end.

use crate::calibration::xc::XcPhase;
use crate::error::{Error, ErrorCode};
use crossbeam_channel::{unbounded, Receiver, Sender};
use tracing::trace;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    LoadStarted,
    LoadFinished,
    SaveStarted,
    SaveFinished,
    /// A profile's in-memory content changed.
    ProfileChanged(u8),
    ActiveProfileChanged(u8),
    ControlUnitChanged,
    TcuProgress { value: u32, max: u32 },
    XcPhase(XcPhase),
    Error { code: ErrorCode, message: String },
}

impl Event {
    pub fn error(err: &Error) -> Self {
        Self::Error {
            code: err.code(),
            message: err.to_string(),
        }
    }
}

/// Sending side of the notification channel.
///
/// Emitting never fails: a sink without a receiver, or whose receiver has
/// gone away, drops the event.
#[derive(Debug, Clone, Default)]
pub struct EventSink {
    sender: Option<Sender<Event>>,
}

impl EventSink {
    /// A sink that drops everything.
    pub fn none() -> Self {
        Self::default()
    }

    pub fn emit(&self, event: Event) {
        let Some(sender) = &self.sender else {
            return;
        };
        if sender.send(event).is_err() {
            trace!("event receiver gone");
        }
    }
}

/// New notification channel.
pub fn channel() -> (EventSink, Receiver<Event>) {
    let (sender, receiver) = unbounded();
    (
        EventSink {
            sender: Some(sender),
        },
        receiver,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn emit_delivers_in_order() {
        let (sink, rx) = channel();
        sink.emit(Event::LoadStarted);
        sink.emit(Event::ProfileChanged(2));
        assert_eq!(rx.try_recv().unwrap(), Event::LoadStarted);
        assert_eq!(rx.try_recv().unwrap(), Event::ProfileChanged(2));
    }

    #[test]
    fn disconnected_receiver_is_not_an_error() {
        let (sink, rx) = channel();
        drop(rx);
        sink.emit(Event::SaveFinished);
        EventSink::none().emit(Event::SaveStarted);
    }

    #[test]
    fn error_event_carries_errno_class() {
        let ev = Event::error(&Error::DeviceNotFound("Tyon".into()));
        match ev {
            Event::Error { code, message } => {
                assert_eq!(code.errno(), 19);
                assert!(message.contains("Tyon"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}
