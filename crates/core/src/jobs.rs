//! Short-lived background workers.
//!
//! A [`Job`] moves the state it drives onto a named thread, runs one fixed
//! sequence to completion and hands the state back through [`Job::join`].
//! Jobs are not pooled; a failed sequence is reported once as an error
//! event and must be restarted as a whole by the caller.

use crate::error::{Error, Result};
use crate::events::{Event, EventSink};
use crate::sync::ProfileSynchronizer;
use std::thread::{self, JoinHandle};
use tracing::{debug, warn};

pub struct Job<S> {
    name: String,
    handle: JoinHandle<(S, Result<()>)>,
}

impl<S: Send + 'static> Job<S> {
    /// Run `work` on `state` in a new thread named `name`.
    pub fn spawn<F>(name: &str, mut state: S, events: EventSink, work: F) -> Result<Self>
    where
        F: FnOnce(&mut S) -> Result<()> + Send + 'static,
    {
        let thread_name = name.to_string();
        let handle = thread::Builder::new()
            .name(format!("tyon-{name}"))
            .spawn(move || {
                debug!(job = %thread_name, "job started");
                let result = work(&mut state);
                match &result {
                    Ok(()) => debug!(job = %thread_name, "job finished"),
                    Err(e) => {
                        warn!(job = %thread_name, "job failed: {e}");
                        events.emit(Event::error(e));
                    }
                }
                (state, result)
            })
            .map_err(Error::Io)?;
        Ok(Self {
            name: name.to_string(),
            handle,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Wait for the job and take back its state. A panic in the job is
    /// propagated to the caller.
    pub fn join(self) -> (S, Result<()>) {
        self.handle
            .join()
            .unwrap_or_else(|panic| std::panic::resume_unwind(panic))
    }
}

/// Load all profiles from the device in the background.
pub fn spawn_load(sync: ProfileSynchronizer) -> Result<Job<ProfileSynchronizer>> {
    let events = sync.events().clone();
    Job::spawn("load", sync, events, ProfileSynchronizer::load_all_from_device)
}

/// Save the control unit, active index and dirty profiles in the background.
pub fn spawn_save(sync: ProfileSynchronizer) -> Result<Job<ProfileSynchronizer>> {
    let events = sync.events().clone();
    Job::spawn("save", sync, events, ProfileSynchronizer::save_all_to_device)
}

/// Factory-reset the device and reload in the background.
pub fn spawn_reset(sync: ProfileSynchronizer) -> Result<Job<ProfileSynchronizer>> {
    let events = sync.events().clone();
    Job::spawn("reset", sync, events, ProfileSynchronizer::reset_all_profiles)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::comm::{CommConfig, ControlChannel};
    use crate::events;
    use crate::keymap::KeyboardLayout;
    use crate::report::ids;
    use crate::transport::mock::SimulatedTyon;

    fn sync(sim: &SimulatedTyon, sink: EventSink) -> ProfileSynchronizer {
        let channel = ControlChannel::new(Box::new(sim.clone()), CommConfig::default());
        ProfileSynchronizer::new(channel, sink, KeyboardLayout::Default)
    }

    #[test]
    fn job_returns_state() {
        let job = Job::spawn("count", 40u32, EventSink::none(), |n| {
            *n += 2;
            Ok(())
        })
        .unwrap();
        assert_eq!(job.name(), "count");
        let (n, result) = job.join();
        assert_eq!(n, 42);
        assert!(result.is_ok());
    }

    #[test]
    fn failure_is_reported_once() {
        let (sink, rx) = events::channel();
        let job = Job::spawn("fail", (), sink, |_| Err(Error::NoData("nothing".into()))).unwrap();
        let (_, result) = job.join();
        assert!(result.is_err());
        let errors: Vec<Event> = rx
            .try_iter()
            .filter(|e| matches!(e, Event::Error { .. }))
            .collect();
        assert_eq!(errors.len(), 1);
    }

    #[test]
    fn load_then_save_round_trip_through_workers() {
        let sim = SimulatedTyon::new();
        let (sink, rx) = events::channel();
        let (mut s, result) = spawn_load(sync(&sim, sink)).unwrap().join();
        result.unwrap();
        s.set_sensitivity(1, 4, -4).unwrap();

        let (s, result) = spawn_save(s).unwrap().join();
        result.unwrap();
        assert!(!s.profiles().any_dirty());
        assert_eq!(sim.with(|st| st.settings[1].sensitivity_y()), -4);

        let seen: Vec<Event> = rx.try_iter().collect();
        assert_eq!(seen.first(), Some(&Event::LoadStarted));
        assert_eq!(seen.last(), Some(&Event::SaveFinished));
    }

    #[test]
    fn failed_save_emits_error_event() {
        let sim = SimulatedTyon::new();
        sim.with(|s| s.fail_write = Some(ids::CONTROL_UNIT));
        let (sink, rx) = events::channel();
        let (_, result) = spawn_save(sync(&sim, sink)).unwrap().join();
        assert!(result.is_err());
        assert!(rx
            .try_iter()
            .any(|e| matches!(e, Event::Error { code, .. } if code.errno() == 5)));
    }

    #[test]
    fn reset_job_reloads() {
        let sim = SimulatedTyon::new();
        sim.with(|s| s.active_profile = 4);
        let (s, result) = spawn_reset(sync(&sim, EventSink::none())).unwrap().join();
        result.unwrap();
        assert_eq!(s.active_profile(), 0);
    }
}
