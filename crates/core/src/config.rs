//! User configuration.
//!
//! Stored as JSON at `<config dir>/open-tyon/config.json`. Every field has a
//! default, so a partial or missing file is fine; a malformed one is not.

use crate::calibration::xc::XcConfig;
use crate::comm::CommConfig;
use crate::error::{Error, Result};
use crate::keymap::KeyboardLayout;
use crate::profile::{self, APP_DIR};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

/// Config file name.
pub const CONFIG_FILE: &str = "config.json";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Sleep between control polls while the device is busy.
    pub busy_backoff_ms: u64,
    /// Give up on a busy device after this long; unset waits forever.
    pub busy_timeout_ms: Option<u64>,
    pub write_deadline_ms: u64,
    /// Delay after a synchronous write before it counts as complete.
    pub settle_delay_ms: u64,
    pub tcu_tick_ms: u64,
    pub xc_tolerance: u8,
    pub xc_dwell_ms: u64,
    /// Unset follows the locale environment.
    pub keyboard_layout: Option<KeyboardLayout>,
    /// Autosave file; unset uses the default store path.
    pub profile_store: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            busy_backoff_ms: 500,
            busy_timeout_ms: None,
            write_deadline_ms: 1000,
            settle_delay_ms: 200,
            tcu_tick_ms: 300,
            xc_tolerance: 3,
            xc_dwell_ms: 750,
            keyboard_layout: None,
            profile_store: None,
        }
    }
}

impl Config {
    /// Default config file location.
    pub fn default_path() -> Result<PathBuf> {
        let base = dirs::config_dir()
            .ok_or_else(|| Error::NoData("no per-user config directory".into()))?;
        Ok(base.join(APP_DIR).join(CONFIG_FILE))
    }

    /// Load from `path`, falling back to defaults if it does not exist.
    pub fn load(path: &Path) -> Result<Self> {
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "No config file, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(e.into()),
        };
        serde_json::from_str(&text).map_err(|e| Error::Io(e.into()))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self).map_err(|e| Error::Io(e.into()))?;
        std::fs::write(path, json)?;
        Ok(())
    }

    pub fn comm(&self) -> CommConfig {
        CommConfig {
            busy_backoff: Duration::from_millis(self.busy_backoff_ms),
            busy_timeout: self.busy_timeout_ms.map(Duration::from_millis),
            write_deadline: Duration::from_millis(self.write_deadline_ms),
        }
    }

    pub fn xc(&self) -> XcConfig {
        XcConfig {
            tolerance: self.xc_tolerance,
            dwell: Duration::from_millis(self.xc_dwell_ms),
        }
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    pub fn tcu_tick(&self) -> Duration {
        Duration::from_millis(self.tcu_tick_ms)
    }

    pub fn layout(&self) -> KeyboardLayout {
        self.keyboard_layout.unwrap_or_else(KeyboardLayout::from_env)
    }

    pub fn profile_store(&self) -> Result<PathBuf> {
        match &self.profile_store {
            Some(path) => Ok(path.clone()),
            None => profile::profile_store_path(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load(&dir.path().join("absent.json")).unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.comm(), CommConfig::default());
        assert_eq!(config.xc(), XcConfig::default());
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(
            &path,
            r#"{ "busy_timeout_ms": 5000, "keyboard_layout": "german" }"#,
        )
        .unwrap();
        let config = Config::load(&path).unwrap();
        assert_eq!(config.comm().busy_timeout, Some(Duration::from_secs(5)));
        assert_eq!(config.busy_backoff_ms, 500);
        assert_eq!(config.layout(), KeyboardLayout::German);
    }

    #[test]
    fn malformed_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert!(Config::load(&path).is_err());
    }

    #[test]
    fn save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sub").join("config.json");
        let config = Config {
            tcu_tick_ms: 100,
            profile_store: Some(dir.path().join("p.rtpf")),
            ..Config::default()
        };
        config.save(&path).unwrap();
        let loaded = Config::load(&path).unwrap();
        assert_eq!(loaded, config);
        assert_eq!(loaded.profile_store().unwrap(), dir.path().join("p.rtpf"));
    }
}
