//! Device model and discovery.
//!
//! A Tyon exposes several HID interfaces. Interface 0 carries the feature
//! reports; interface 1 streams the special input reports. Discovery pairs
//! the two by serial number (or enumeration order when the platform hides
//! the serial).

use crate::error::{Error, Result};
use crate::{pids, ROCCAT_VID};
use tracing::{debug, info};

/// Interface carrying feature reports.
pub const CONTROL_INTERFACE: i32 = 0;
/// Interface streaming special reports.
pub const MISC_INTERFACE: i32 = 1;

/// Supported models.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceModel {
    TyonBlack,
    TyonWhite,
}

impl DeviceModel {
    /// Look up model from USB product ID.
    pub fn from_pid(pid: u16) -> Option<Self> {
        match pid {
            pids::TYON_BLACK => Some(Self::TyonBlack),
            pids::TYON_WHITE => Some(Self::TyonWhite),
            _ => None,
        }
    }

    /// Human-readable name.
    pub fn name(&self) -> &'static str {
        match self {
            Self::TyonBlack => "ROCCAT Tyon Black",
            Self::TyonWhite => "ROCCAT Tyon White",
        }
    }

    pub fn pid(&self) -> u16 {
        match self {
            Self::TyonBlack => pids::TYON_BLACK,
            Self::TyonWhite => pids::TYON_WHITE,
        }
    }
}

/// One enumerated HID interface of a supported device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterfaceEntry {
    pub pid: u16,
    pub interface: i32,
    pub path: String,
    pub serial: Option<String>,
}

/// A discovered device with its paired interfaces.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    pub model: DeviceModel,
    pub vid: u16,
    pub pid: u16,
    /// Path of the control interface.
    pub path: String,
    /// Path of the misc interface, if enumerated.
    pub misc_path: Option<String>,
    pub serial: Option<String>,
}

/// Pair control and misc interfaces into devices.
///
/// Control interfaces define the devices; each takes the first unclaimed
/// misc interface of the same product with a matching serial.
pub fn pair_interfaces(entries: &[InterfaceEntry]) -> Vec<DeviceInfo> {
    let mut claimed = vec![false; entries.len()];
    let mut devices = Vec::new();
    for control in entries.iter().filter(|e| e.interface == CONTROL_INTERFACE) {
        let Some(model) = DeviceModel::from_pid(control.pid) else {
            continue;
        };
        let misc = entries.iter().enumerate().find(|(i, e)| {
            !claimed[*i]
                && e.interface == MISC_INTERFACE
                && e.pid == control.pid
                && e.serial == control.serial
        });
        let misc_path = misc.map(|(i, e)| {
            claimed[i] = true;
            e.path.clone()
        });
        devices.push(DeviceInfo {
            model,
            vid: ROCCAT_VID,
            pid: control.pid,
            path: control.path.clone(),
            misc_path,
            serial: control.serial.clone(),
        });
    }
    devices
}

/// Discover all connected Tyons.
pub fn discover_devices() -> Result<Vec<DeviceInfo>> {
    debug!("Starting HID device enumeration");
    let api = hidapi::HidApi::new().map_err(|e| Error::Hid(e.to_string()))?;

    let entries: Vec<InterfaceEntry> = api
        .device_list()
        .filter(|d| d.vendor_id() == ROCCAT_VID && DeviceModel::from_pid(d.product_id()).is_some())
        .map(|d| InterfaceEntry {
            pid: d.product_id(),
            interface: d.interface_number(),
            path: d.path().to_string_lossy().into_owned(),
            serial: d.serial_number().map(|s| s.to_string()),
        })
        .collect();

    let devices = pair_interfaces(&entries);
    for dev in &devices {
        info!(
            model = dev.model.name(),
            pid = format_args!("0x{:04X}", dev.pid),
            path = %dev.path,
            misc = dev.misc_path.as_deref().unwrap_or("-"),
            "Found device"
        );
    }
    debug!(count = devices.len(), "Device enumeration complete");
    Ok(devices)
}

/// First discovered device, or `DeviceNotFound`.
pub fn first_device() -> Result<DeviceInfo> {
    discover_devices()?
        .into_iter()
        .next()
        .ok_or_else(|| Error::DeviceNotFound("no ROCCAT Tyon connected".into()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(pid: u16, interface: i32, path: &str, serial: Option<&str>) -> InterfaceEntry {
        InterfaceEntry {
            pid,
            interface,
            path: path.into(),
            serial: serial.map(Into::into),
        }
    }

    #[test]
    fn model_from_known_pid() {
        assert_eq!(DeviceModel::from_pid(0x2E4A), Some(DeviceModel::TyonBlack));
        assert_eq!(DeviceModel::from_pid(0x2E4B), Some(DeviceModel::TyonWhite));
        assert_eq!(DeviceModel::from_pid(0x1234), None);
        assert_eq!(DeviceModel::TyonWhite.pid(), 0x2E4B);
    }

    #[test]
    fn pairs_by_serial() {
        let entries = vec![
            entry(0x2E4A, 1, "/dev/hidraw3", Some("B")),
            entry(0x2E4A, 0, "/dev/hidraw0", Some("A")),
            entry(0x2E4A, 1, "/dev/hidraw1", Some("A")),
            entry(0x2E4A, 0, "/dev/hidraw2", Some("B")),
        ];
        let devices = pair_interfaces(&entries);
        assert_eq!(devices.len(), 2);
        assert_eq!(devices[0].path, "/dev/hidraw0");
        assert_eq!(devices[0].misc_path.as_deref(), Some("/dev/hidraw1"));
        assert_eq!(devices[1].misc_path.as_deref(), Some("/dev/hidraw3"));
    }

    #[test]
    fn pairs_in_order_without_serials() {
        let entries = vec![
            entry(0x2E4B, 0, "a0", None),
            entry(0x2E4B, 1, "a1", None),
            entry(0x2E4B, 2, "a2", None),
        ];
        let devices = pair_interfaces(&entries);
        assert_eq!(devices.len(), 1);
        assert_eq!(devices[0].model, DeviceModel::TyonWhite);
        assert_eq!(devices[0].misc_path.as_deref(), Some("a1"));
    }

    #[test]
    fn control_without_misc_is_still_listed() {
        let devices = pair_interfaces(&[entry(0x2E4A, 0, "only", None)]);
        assert_eq!(devices.len(), 1);
        assert_eq!(devices[0].misc_path, None);
    }
}
