//! Configuration System using Figment
//!
//! Settings are layered, later sources overriding earlier ones:
//! 1. built-in defaults (`Settings::default()`)
//! 2. a TOML file (`rfid_attendance.toml` unless another path is given)
//! 3. environment variables prefixed with `RFID_ATTENDANCE_`, nested keys split on `__`
//!
//! # Example
//! ```no_run
//! use rfid_attendance::config::Settings;
//!
//! // RFID_ATTENDANCE_SERIAL__BAUD_RATE=115200 overrides the file
//! let settings = Settings::load_from("rfid_attendance.toml")?;
//! settings.validate()?;
//! println!("Profiles: {}", settings.storage.profiles_path.display());
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

use crate::error::{AppResult, AttendanceError};
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default configuration file name, looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "rfid_attendance.toml";
/// Environment variable prefix.
pub const ENV_PREFIX: &str = "RFID_ATTENDANCE_";

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Application settings
    pub application: ApplicationSettings,
    /// Serial link settings
    pub serial: SerialSettings,
    /// CSV file locations
    pub storage: StorageSettings,
    /// Polling loop settings
    pub coordinator: CoordinatorSettings,
}

/// Application-level configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApplicationSettings {
    /// Application name
    pub name: String,
    /// Logging level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Log output format (pretty, compact, json)
    pub log_format: String,
}

/// Serial link configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SerialSettings {
    /// Port used when none is given on the command line
    pub default_port: Option<String>,
    /// Line speed of the reader sketch
    pub baud_rate: u32,
    /// Bounded wait for one line; also the worst-case disconnect latency
    pub read_timeout_ms: u64,
    /// Capacity of the hand-off queue between the reader thread and the coordinator
    pub queue_capacity: usize,
}

/// Storage configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageSettings {
    /// Registered profiles (`identifier,name,age`)
    pub profiles_path: PathBuf,
    /// Attendance log (`identifier,name,timestamp`)
    pub attendance_path: PathBuf,
}

/// Coordinator configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoordinatorSettings {
    /// Interval between queue drains
    pub poll_interval_ms: u64,
    /// How many attendance records the view keeps
    pub log_view_limit: usize,
}

impl Default for ApplicationSettings {
    fn default() -> Self {
        Self {
            name: "RFID Attendance".to_string(),
            log_level: "info".to_string(),
            log_format: "compact".to_string(),
        }
    }
}

impl Default for SerialSettings {
    fn default() -> Self {
        Self {
            default_port: None,
            baud_rate: 9600,
            read_timeout_ms: 1000,
            queue_capacity: 256,
        }
    }
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            profiles_path: PathBuf::from("users.csv"),
            attendance_path: PathBuf::from("attendance.csv"),
        }
    }
}

impl Default for CoordinatorSettings {
    fn default() -> Self {
        Self {
            poll_interval_ms: 100,
            log_view_limit: 200,
        }
    }
}

impl SerialSettings {
    /// `read_timeout_ms` as a `Duration`.
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }
}

impl CoordinatorSettings {
    /// `poll_interval_ms` as a `Duration`.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

impl Settings {
    /// Load configuration from the default file and environment variables
    pub fn load() -> AppResult<Self> {
        Self::load_from(DEFAULT_CONFIG_FILE)
    }

    /// Load configuration from a specific file path. A missing file is not an
    /// error; defaults and environment variables still apply.
    pub fn load_from<P: AsRef<Path>>(path: P) -> AppResult<Self> {
        Ok(Self::figment(path.as_ref()).extract()?)
    }

    fn figment(path: &Path) -> Figment {
        Figment::from(Serialized::defaults(Settings::default()))
            .merge(Toml::file(path))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    /// Validate configuration after loading
    pub fn validate(&self) -> AppResult<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.application.log_level.to_lowercase().as_str()) {
            return Err(AttendanceError::Configuration(format!(
                "Invalid log_level '{}'. Must be one of: {}",
                self.application.log_level,
                valid_levels.join(", ")
            )));
        }

        let valid_formats = ["pretty", "compact", "json"];
        if !valid_formats.contains(&self.application.log_format.to_lowercase().as_str()) {
            return Err(AttendanceError::Configuration(format!(
                "Invalid log_format '{}'. Must be one of: {}",
                self.application.log_format,
                valid_formats.join(", ")
            )));
        }

        if self.serial.baud_rate == 0 {
            return Err(AttendanceError::Configuration(
                "serial.baud_rate must be greater than 0".into(),
            ));
        }
        if self.serial.read_timeout_ms == 0 {
            return Err(AttendanceError::Configuration(
                "serial.read_timeout_ms must be greater than 0".into(),
            ));
        }
        if self.serial.queue_capacity == 0 {
            return Err(AttendanceError::Configuration(
                "serial.queue_capacity must be greater than 0".into(),
            ));
        }
        if self.coordinator.poll_interval_ms == 0 {
            return Err(AttendanceError::Configuration(
                "coordinator.poll_interval_ms must be greater than 0".into(),
            ));
        }

        if self.storage.profiles_path == self.storage.attendance_path {
            return Err(AttendanceError::Configuration(format!(
                "Profile and attendance files must differ (both are '{}')",
                self.storage.profiles_path.display()
            )));
        }

        Ok(())
    }

    /// Render the effective configuration as TOML.
    pub fn to_toml(&self) -> AppResult<String> {
        toml::to_string_pretty(self).map_err(|e| AttendanceError::Configuration(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::io::Write;

    #[test]
    #[serial]
    fn missing_file_yields_defaults() {
        let settings = Settings::load_from("does/not/exist.toml").unwrap();
        assert_eq!(settings, Settings::default());
        assert_eq!(settings.serial.baud_rate, 9600);
        assert_eq!(settings.coordinator.poll_interval(), Duration::from_millis(100));
        assert!(settings.validate().is_ok());
    }

    #[test]
    #[serial]
    fn file_overrides_defaults_partially() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[serial]\nbaud_rate = 115200\ndefault_port = \"/dev/ttyACM0\"\n\n[storage]\nprofiles_path = \"data/users.csv\""
        )
        .unwrap();

        let settings = Settings::load_from(file.path()).unwrap();
        assert_eq!(settings.serial.baud_rate, 115200);
        assert_eq!(settings.serial.default_port.as_deref(), Some("/dev/ttyACM0"));
        assert_eq!(settings.serial.read_timeout_ms, 1000);
        assert_eq!(settings.storage.profiles_path, PathBuf::from("data/users.csv"));
        assert_eq!(settings.storage.attendance_path, PathBuf::from("attendance.csv"));
    }

    #[test]
    #[serial]
    fn environment_overrides_file() {
        std::env::set_var("RFID_ATTENDANCE_COORDINATOR__POLL_INTERVAL_MS", "250");
        let settings = Settings::load_from("does/not/exist.toml");
        std::env::remove_var("RFID_ATTENDANCE_COORDINATOR__POLL_INTERVAL_MS");

        assert_eq!(settings.unwrap().coordinator.poll_interval_ms, 250);
    }

    #[test]
    fn test_invalid_log_level() {
        let mut settings = Settings::default();
        settings.application.log_level = "loud".into();
        assert!(matches!(
            settings.validate(),
            Err(AttendanceError::Configuration(_))
        ));
    }

    #[test]
    fn test_zero_values_rejected() {
        let mut settings = Settings::default();
        settings.serial.read_timeout_ms = 0;
        assert!(settings.validate().is_err());

        let mut settings = Settings::default();
        settings.serial.queue_capacity = 0;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_same_file_for_both_stores_rejected() {
        let mut settings = Settings::default();
        settings.storage.attendance_path = settings.storage.profiles_path.clone();
        assert!(settings.validate().is_err());
    }

    #[test]
    fn toml_rendering_round_trips() {
        let settings = Settings::default();
        let text = settings.to_toml().unwrap();
        assert!(text.contains("baud_rate = 9600"));
        let parsed: Settings = toml::from_str(&text).unwrap();
        assert_eq!(parsed, settings);
    }
}
