//! hidapi-backed transport.
//!
//! Two write completion strategies exist. `Threaded` runs each async write
//! on a helper thread which fills the completion slot when the OS call
//! returns. `Settle` performs the write synchronously and then sleeps for
//! the device's settle time before reporting completion. The platform
//! default is picked in [`WriteCompletion::platform_default`] only.

use crate::device::DeviceInfo;
use crate::error::{Error, Result};
use crate::transport::{HidTransport, InputReportSource, PendingWrite};
use hidapi::{HidApi, HidDevice};
use std::ffi::CString;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tracing::debug;

/// How an async write signals completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteCompletion {
    Threaded,
    Settle(Duration),
}

impl WriteCompletion {
    pub fn platform_default(settle: Duration) -> Self {
        if cfg!(target_os = "macos") {
            Self::Threaded
        } else {
            Self::Settle(settle)
        }
    }
}

fn open_path(api: &HidApi, path: &str) -> Result<HidDevice> {
    let c_path = CString::new(path).map_err(|e| Error::Hid(format!("bad path {path}: {e}")))?;
    api.open_path(&c_path)
        .map_err(|e| Error::Hid(format!("open {path}: {e}")))
}

type SharedDevice = Arc<Mutex<HidDevice>>;

fn lock(device: &SharedDevice) -> MutexGuard<'_, HidDevice> {
    device.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn send_feature(device: &SharedDevice, data: &[u8]) -> Result<()> {
    lock(device)
        .send_feature_report(data)
        .map_err(|e| Error::Hid(format!("send_feature_report 0x{:02X}: {e}", data[0])))
}

/// Feature-report transport on the control interface.
pub struct HidapiTransport {
    device: SharedDevice,
    completion: WriteCompletion,
}

impl HidapiTransport {
    pub fn open(api: &HidApi, info: &DeviceInfo, completion: WriteCompletion) -> Result<Self> {
        debug!(path = %info.path, ?completion, "Opening control interface");
        Ok(Self {
            device: Arc::new(Mutex::new(open_path(api, &info.path)?)),
            completion,
        })
    }
}

impl HidTransport for HidapiTransport {
    fn read_feature_report(&self, report_id: u8, len: usize) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; len];
        buf[0] = report_id;
        let n = lock(&self.device)
            .get_feature_report(&mut buf)
            .map_err(|e| Error::Hid(format!("get_feature_report 0x{report_id:02X}: {e}")))?;
        buf.truncate(n);
        Ok(buf)
    }

    fn write_feature_report(&self, data: &[u8]) -> Result<()> {
        if data.is_empty() {
            return Err(Error::Hid("empty feature report".into()));
        }
        send_feature(&self.device, data)
    }

    fn write_async(&self, data: &[u8]) -> Result<PendingWrite> {
        if data.is_empty() {
            return Err(Error::Hid("empty feature report".into()));
        }
        let (pending, completer) = PendingWrite::new();
        match self.completion {
            WriteCompletion::Settle(delay) => {
                let result = send_feature(&self.device, data);
                if result.is_ok() {
                    std::thread::sleep(delay);
                }
                completer.complete(result);
            }
            WriteCompletion::Threaded => {
                let device = Arc::clone(&self.device);
                let data = data.to_vec();
                std::thread::Builder::new()
                    .name("tyon-write".into())
                    .spawn(move || completer.complete(send_feature(&device, &data)))
                    .map_err(Error::Io)?;
            }
        }
        Ok(pending)
    }
}

/// Input report reader on the misc interface.
pub struct HidapiInput {
    device: HidDevice,
}

impl HidapiInput {
    /// Report buffer size; special reports are 5 bytes but some platforms
    /// deliver padded frames.
    const BUF_LEN: usize = 64;

    pub fn open(api: &HidApi, info: &DeviceInfo) -> Result<Self> {
        let path = info
            .misc_path
            .as_deref()
            .ok_or_else(|| Error::DeviceNotFound("misc interface not enumerated".into()))?;
        debug!(path, "Opening misc interface");
        Ok(Self {
            device: open_path(api, path)?,
        })
    }
}

impl InputReportSource for HidapiInput {
    fn read_input_report(&self, timeout: Duration) -> Result<Option<Vec<u8>>> {
        let mut buf = [0u8; Self::BUF_LEN];
        let timeout_ms = i32::try_from(timeout.as_millis()).unwrap_or(i32::MAX);
        let n = self
            .device
            .read_timeout(&mut buf, timeout_ms)
            .map_err(|e| Error::Hid(format!("read_timeout: {e}")))?;
        if n == 0 {
            return Ok(None);
        }
        Ok(Some(buf[..n].to_vec()))
    }
}

/// Open the control transport for a device.
pub fn open_control(info: &DeviceInfo, settle: Duration) -> Result<HidapiTransport> {
    let api = HidApi::new().map_err(|e| Error::Hid(format!("hidapi init: {e}")))?;
    HidapiTransport::open(&api, info, WriteCompletion::platform_default(settle))
}

/// Open the misc interface for a device.
pub fn open_input(info: &DeviceInfo) -> Result<HidapiInput> {
    let api = HidApi::new().map_err(|e| Error::Hid(format!("hidapi init: {e}")))?;
    HidapiInput::open(&api, info)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn platform_default_matches_target() {
        let settle = Duration::from_millis(200);
        let default = WriteCompletion::platform_default(settle);
        if cfg!(target_os = "macos") {
            assert_eq!(default, WriteCompletion::Threaded);
        } else {
            assert_eq!(default, WriteCompletion::Settle(settle));
        }
    }
}
