//! Error types for open-tyon-core.

use thiserror::Error;

/// Core library error type.
#[derive(Debug, Error)]
pub enum Error {
    /// HID device communication failure (open, read, write).
    #[error("HID error: {0}")]
    Hid(String),

    /// Device not found during enumeration, or gone while talking to it.
    #[error("device not found: {0}")]
    DeviceNotFound(String),

    /// The control report returned a non-OK, non-BUSY status.
    #[error("device reported {status} (raw 0x{raw:02X})")]
    DeviceStatus {
        status: crate::comm::ControlStatus,
        raw: u8,
    },

    /// A feature report failed framing validation.
    #[error("report 0x{report_id:02X}: {reason}")]
    Decode { report_id: u8, reason: String },

    /// Value out of safe range.
    #[error("value out of range: {field} = {value} (allowed {min}..={max})")]
    OutOfRange {
        field: &'static str,
        value: i64,
        min: i64,
        max: i64,
    },

    /// Profile file serialization/deserialization error.
    #[error("profile file error: {0}")]
    ProfileFile(String),

    /// Host filesystem error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Operation timed out.
    #[error("timeout: {0}")]
    Timeout(String),

    /// A calibration step was requested in a state that does not allow it.
    #[error("calibration: {0}")]
    Calibration(String),

    /// Nothing to return (empty file, no reading available).
    #[error("no data: {0}")]
    NoData(String),
}

/// Convenience Result alias.
pub type Result<T> = std::result::Result<T, Error>;

/// POSIX-style classification surfaced to callers and notifications.
///
/// These are protocol-level categories, not literal syscall failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    Io,
    InvalidArgument,
    NoDevice,
    NoData,
}

impl ErrorCode {
    /// Linux errno value for this category.
    pub fn errno(&self) -> i32 {
        match self {
            Self::Io => 5,
            Self::InvalidArgument => 22,
            Self::NoDevice => 19,
            Self::NoData => 61,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Io => "EIO",
            Self::InvalidArgument => "EINVAL",
            Self::NoDevice => "ENODEV",
            Self::NoData => "ENODATA",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl Error {
    /// Map this error onto the errno-style taxonomy.
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::DeviceNotFound(_) => ErrorCode::NoDevice,
            Self::Hid(_) | Self::DeviceStatus { .. } | Self::Io(_) | Self::Timeout(_) => {
                ErrorCode::Io
            }
            Self::Decode { .. }
            | Self::OutOfRange { .. }
            | Self::ProfileFile(_)
            | Self::Calibration(_) => ErrorCode::InvalidArgument,
            Self::NoData(_) => ErrorCode::NoData,
        }
    }

    pub(crate) fn decode(report_id: u8, reason: impl Into<String>) -> Self {
        Self::Decode {
            report_id,
            reason: reason.into(),
        }
    }
}
