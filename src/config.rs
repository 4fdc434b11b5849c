//! Agent-wide configuration.
//!
//! A small `serde`-derived structure with field defaults, loaded from a
//! JSON file on disk. There is no hot-reload path: the Worker reads
//! `AgentConfig` once at startup and the values are immutable for the
//! life of the process.

use anyhow::{Context, Result};
use log::{debug, info, warn, LevelFilter};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Configurable log level.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Off,
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    #[must_use]
    pub const fn as_level_filter(self) -> LevelFilter {
        match self {
            Self::Off => LevelFilter::Off,
            Self::Error => LevelFilter::Error,
            Self::Warn => LevelFilter::Warn,
            Self::Info => LevelFilter::Info,
            Self::Debug => LevelFilter::Debug,
            Self::Trace => LevelFilter::Trace,
        }
    }
}

const fn default_queue_capacity() -> usize {
    3
}

fn default_image_path() -> String {
    "ota.bin".to_string()
}

fn default_ca_bundle_relpath() -> String {
    "certs/root.pem".to_string()
}

fn default_extmcu_device_path() -> PathBuf {
    PathBuf::from("/dev/ttyExtMcu")
}

const fn default_low_speed_limit_bytes_per_sec() -> u64 {
    10
}

const fn default_low_speed_window_secs() -> u64 {
    30
}

/// Top-level agent configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    #[serde(default)]
    pub log_level: LogLevel,

    /// Capacity of the bounded request queue between Notice Intake and
    /// the Worker.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// Well-known path of the image file inside the local flash
    /// filesystem.
    #[serde(default = "default_image_path")]
    pub image_path: String,

    /// Root directory the local flash filesystem is rooted at (stand-in
    /// for the SPI-flash + littlefs pairing).
    pub flash_root: PathBuf,

    /// Path to the host-provided mutable file the `ProgressRecord` lives
    /// on. Distinct from `flash_root`: this persists across reboots on a
    /// small reserved area outside the flash filesystem.
    pub mutable_file_path: PathBuf,

    /// Root of the application's read-only image package, used to
    /// resolve `ca_bundle_relpath`.
    pub image_package_root: PathBuf,

    /// Path to the TLS CA bundle, relative to `image_package_root`.
    #[serde(default = "default_ca_bundle_relpath")]
    pub ca_bundle_relpath: String,

    /// Serial device the attached microcontroller is reachable on.
    #[serde(default = "default_extmcu_device_path")]
    pub extmcu_device_path: PathBuf,

    /// Low-speed watchdog: abort a download if fewer than this many
    /// bytes arrive within the trailing window.
    #[serde(default = "default_low_speed_limit_bytes_per_sec")]
    pub low_speed_limit_bytes_per_sec: u64,

    /// Width, in seconds, of the low-speed watchdog's trailing window.
    #[serde(default = "default_low_speed_window_secs")]
    pub low_speed_window_secs: u64,
}

impl AgentConfig {
    /// Resolves the CA bundle's absolute path.
    #[must_use]
    pub fn ca_bundle_path(&self) -> PathBuf {
        crate::fs::resolve_in_image_package(&self.image_package_root, &self.ca_bundle_relpath)
    }

    /// Loads configuration from a JSON file at `path`.
    pub fn load(path: &Path) -> Result<Self> {
        debug!("loading config from {}", path.display());
        let bytes = std::fs::read(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        let config: Self = serde_json::from_slice(&bytes)
            .with_context(|| format!("parsing config file {}", path.display()))?;
        debug!(
            "config parsed: queue_capacity={}, image_path={}, log_level={:?}",
            config.queue_capacity, config.image_path, config.log_level
        );
        Ok(config)
    }

    /// Loads configuration from `path`, falling back to a directory-rooted
    /// default if the file is absent or unparseable.
    #[must_use]
    pub fn load_or_default(path: &Path, state_dir: &Path) -> Self {
        match Self::load(path) {
            Ok(config) => {
                info!("loaded agent config from {}", path.display());
                config
            }
            Err(e) => {
                warn!(
                    "failed to load config from {}: {e:#}, using defaults",
                    path.display()
                );
                Self::defaults_under(state_dir)
            }
        }
    }

    /// Builds a default configuration rooted at `state_dir` (used both as
    /// the fallback above and directly by tests).
    #[must_use]
    pub fn defaults_under(state_dir: &Path) -> Self {
        Self {
            log_level: LogLevel::default(),
            queue_capacity: default_queue_capacity(),
            image_path: default_image_path(),
            flash_root: state_dir.join("flash"),
            mutable_file_path: state_dir.join("ota_progress"),
            image_package_root: state_dir.join("package"),
            ca_bundle_relpath: default_ca_bundle_relpath(),
            extmcu_device_path: default_extmcu_device_path(),
            low_speed_limit_bytes_per_sec: default_low_speed_limit_bytes_per_sec(),
            low_speed_window_secs: default_low_speed_window_secs(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_under_fills_expected_paths() {
        let config = AgentConfig::defaults_under(Path::new("/var/lib/ota-agent"));
        assert_eq!(config.queue_capacity, 3);
        assert_eq!(config.image_path, "ota.bin");
        assert_eq!(config.flash_root, PathBuf::from("/var/lib/ota-agent/flash"));
        assert_eq!(
            config.ca_bundle_path(),
            PathBuf::from("/var/lib/ota-agent/package/certs/root.pem")
        );
    }

    #[test]
    fn missing_fields_fall_back_to_defaults_when_present_in_json() {
        let json = r#"{
            "flash_root": "/data/flash",
            "mutable_file_path": "/data/progress",
            "image_package_root": "/data/package"
        }"#;
        let config: AgentConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.queue_capacity, 3);
        assert_eq!(config.low_speed_limit_bytes_per_sec, 10);
        assert_eq!(config.low_speed_window_secs, 30);
        assert_eq!(config.log_level, LogLevel::Info);
    }

    #[test]
    fn load_from_missing_path_is_an_error() {
        let err = AgentConfig::load(Path::new("/nonexistent/path/config.json")).unwrap_err();
        assert!(format!("{err:#}").contains("reading config file"));
    }
}
