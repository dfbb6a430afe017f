//! # Configuration Type Definitions
//!
//! This library provides configuration types for the printforge orchestration
//! server. These types are shared between every subsystem: the printer session
//! (which needs connection credentials), the slicer invocation (which needs the
//! executable location), the camera session, and the iteration store.
//!
//! ## Configuration Sources
//!
//! Configuration is read exactly once at startup, from environment variables
//! (`PRINTFORGE_*`), and is then passed explicitly to the components that need
//! it. Configurations can also be stored as TOML files for human readability
//! and easy editing, which is how printer profiles are usually shipped.
//!
//! ## Environment Variables
//!
//! | Variable | Meaning |
//! |---|---|
//! | `PRINTFORGE_PRINTER_IP` | Printer IP address on the local network |
//! | `PRINTFORGE_ACCESS_CODE` | Printer access code from the device settings |
//! | `PRINTFORGE_SERIAL` | Printer serial number |
//! | `PRINTFORGE_PRINTER_MODEL` | Printer model identifier |
//! | `PRINTFORGE_SLICER_PATH` | Path to the slicer executable |
//! | `PRINTFORGE_SLICER_PROFILES` | Directory containing slicing profiles |
//! | `PRINTFORGE_TEMP` | Temporary directory for working files |
//! | `PRINTFORGE_DB` | SQLite database for print history |
//! | `CAMERA_CAPTURE_INTERVAL` | Seconds between captures for analysis |

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Printer connection configuration.
///
/// The printer is reached over the local network; the access code doubles as
/// the broker password and the camera credential.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PrinterConfig {
    /// Printer IP address on the local network
    pub ip_address: String,

    /// Printer access code from the device settings screen
    pub access_code: String,

    /// Printer serial number (part of the broker topic names)
    pub serial_number: String,

    /// Printer model identifier
    pub model: String,
}

impl PrinterConfig {
    /// Validates that the fields required for any printer action are present.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.ip_address.is_empty() {
            return Err(ConfigError::MissingField(
                "printer ip address (set PRINTFORGE_PRINTER_IP)".to_string(),
            ));
        }
        if self.access_code.is_empty() {
            return Err(ConfigError::MissingField(
                "printer access code (set PRINTFORGE_ACCESS_CODE)".to_string(),
            ));
        }
        if self.serial_number.is_empty() {
            return Err(ConfigError::MissingField(
                "printer serial number (set PRINTFORGE_SERIAL)".to_string(),
            ));
        }
        Ok(())
    }
}

/// Slicer application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlicerConfig {
    /// Path to the slicer executable
    pub executable_path: PathBuf,

    /// Directory containing slicing profile files
    pub profiles_dir: Option<PathBuf>,

    /// Temporary directory for working files
    pub temp_dir: PathBuf,
}

impl Default for SlicerConfig {
    fn default() -> Self {
        Self {
            executable_path: PathBuf::from(
                "/Applications/BambuStudio.app/Contents/MacOS/BambuStudio",
            ),
            profiles_dir: None,
            temp_dir: PathBuf::from("/tmp/printforge"),
        }
    }
}

/// Camera streaming configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CameraConfig {
    /// RTSPS streaming port
    pub rtsp_port: u16,

    /// Expected frame rate (the reference device streams at 1 FPS)
    pub frame_rate: u32,

    /// Seconds between captures when monitoring a print
    pub capture_interval: f64,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            rtsp_port: 322,
            frame_rate: 1,
            capture_interval: 5.0,
        }
    }
}

/// Main configuration container.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Printer connection settings
    pub printer: PrinterConfig,

    /// Slicer integration settings
    pub slicer: SlicerConfig,

    /// Camera streaming settings
    pub camera: CameraConfig,

    /// SQLite database file for print history
    pub database_path: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            printer: PrinterConfig::default(),
            slicer: SlicerConfig::default(),
            camera: CameraConfig::default(),
            database_path: default_database_path(),
        }
    }
}

impl Config {
    /// Loads configuration from environment variables.
    ///
    /// Missing variables fall back to defaults; the presence of
    /// printer-specific values is only enforced when a printer action is
    /// actually requested (see [`PrinterConfig::validate`]).
    pub fn from_env() -> Self {
        let mut config = Config::default();

        if let Ok(ip) = std::env::var("PRINTFORGE_PRINTER_IP") {
            config.printer.ip_address = ip;
        }
        if let Ok(code) = std::env::var("PRINTFORGE_ACCESS_CODE") {
            config.printer.access_code = code;
        }
        if let Ok(serial) = std::env::var("PRINTFORGE_SERIAL") {
            config.printer.serial_number = serial;
        }
        config.printer.model =
            std::env::var("PRINTFORGE_PRINTER_MODEL").unwrap_or_else(|_| "generic".to_string());

        if let Ok(path) = std::env::var("PRINTFORGE_SLICER_PATH") {
            config.slicer.executable_path = PathBuf::from(path);
        }
        if let Ok(dir) = std::env::var("PRINTFORGE_SLICER_PROFILES") {
            if !dir.is_empty() {
                config.slicer.profiles_dir = Some(PathBuf::from(dir));
            }
        }
        if let Ok(dir) = std::env::var("PRINTFORGE_TEMP") {
            config.slicer.temp_dir = PathBuf::from(dir);
        }

        if let Ok(interval) = std::env::var("CAMERA_CAPTURE_INTERVAL") {
            if let Ok(secs) = interval.parse::<f64>() {
                config.camera.capture_interval = secs;
            }
        }

        if let Ok(db) = std::env::var("PRINTFORGE_DB") {
            config.database_path = expand_home(&db);
        }

        config
    }

    /// Loads configuration from a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::IoError(e.to_string()))?;

        toml::from_str(&contents).map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// Saves configuration to a TOML file.
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let contents = toml::to_string_pretty(self)
            .map_err(|e| ConfigError::SerializationError(e.to_string()))?;

        std::fs::write(path.as_ref(), contents).map_err(|e| ConfigError::IoError(e.to_string()))
    }

    /// Validates that configuration values are usable.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.camera.capture_interval <= 0.0 {
            return Err(ConfigError::InvalidConfiguration(
                "camera capture interval must be positive".to_string(),
            ));
        }
        if self.camera.frame_rate == 0 {
            return Err(ConfigError::InvalidConfiguration(
                "camera frame rate must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// Default database location under the user's home directory.
fn default_database_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".printforge")
        .join("prints.db")
}

/// Expands a leading `~` to the user's home directory.
fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    IoError(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Missing required field: {0}")]
    MissingField(String),
}
