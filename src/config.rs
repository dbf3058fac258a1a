//! Configuration loading using Figment.
//!
//! Settings are read from a TOML file and then overridden by environment variables prefixed
//! with `TWEEZERS_DAQ_`, where `__` separates nesting levels
//! (`TWEEZERS_DAQ_INJECT_MAN__CONNECTION__PORT=/dev/ttyUSB1`).
//!
//! ```toml
//! [application]
//! name = "tweezers bench"
//! log_level = "info"
//! log_format = "compact"
//!
//! [inject_man]
//! simulated = false
//! default_speed = 1000
//!
//! [inject_man.connection]
//! port = "/dev/ttyUSB0"
//! reply_wait = "forever"
//!
//! [voltage_control]
//! channels = 4
//!
//! [voltage_control.connection]
//! port = "/dev/ttyACM0"
//! reply_wait = { bounded_ms = 2000 }
//! ```
//!
//! Every `connection` table must state its `reply_wait`; there is no implicit default.

use crate::error::{AppResult, DaqError};
use crate::instrument::inject_man::InjectManLimits;
use crate::instrument::voltage_control::VoltageLimits;
use crate::kinematics::{Calibration, Geometry};
use crate::logging::OutputFormat;
use crate::transport::ReplyWait;
use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Environment variable prefix for overrides.
pub const ENV_PREFIX: &str = "TWEEZERS_DAQ_";

/// Top-level configuration document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Application settings
    #[serde(default)]
    pub application: ApplicationConfig,
    /// Micromanipulator, if one is attached
    #[serde(default)]
    pub inject_man: Option<InjectManConfig>,
    /// Voltage controller, if one is attached
    #[serde(default)]
    pub voltage_control: Option<VoltageControlConfig>,
}

/// Application-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplicationConfig {
    /// Application name
    #[serde(default = "default_name")]
    pub name: String,
    /// Logging level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Log output format
    #[serde(default)]
    pub log_format: OutputFormat,
}

impl Default for ApplicationConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            log_level: default_log_level(),
            log_format: OutputFormat::default(),
        }
    }
}

/// Byte ending a frame on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LineEnding {
    /// `\n`
    Lf,
    /// `\r`
    Cr,
}

impl LineEnding {
    /// The terminator byte.
    pub fn as_byte(self) -> u8 {
        match self {
            LineEnding::Lf => b'\n',
            LineEnding::Cr => b'\r',
        }
    }
}

/// Serial connection parameters. Unset fields fall back to the device's defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// Port path, e.g. `/dev/ttyUSB0` or `COM3`
    #[serde(default)]
    pub port: String,
    /// Baud rate
    #[serde(default)]
    pub baud_rate: Option<u32>,
    /// Per-read timeout of the port in milliseconds
    #[serde(default = "default_read_timeout_ms")]
    pub read_timeout_ms: u64,
    /// Pause after opening the port, in milliseconds
    #[serde(default)]
    pub settle_ms: Option<u64>,
    /// Terminator appended to outgoing commands
    #[serde(default)]
    pub command_terminator: Option<LineEnding>,
    /// Delimiter ending incoming replies
    #[serde(default)]
    pub reply_delimiter: Option<LineEnding>,
    /// How long to wait for each reply
    pub reply_wait: ReplyWait,
}

impl ConnectionConfig {
    /// Connection on `port` with every optional field left to the device defaults.
    pub fn new(port: impl Into<String>, reply_wait: ReplyWait) -> Self {
        Self {
            port: port.into(),
            baud_rate: None,
            read_timeout_ms: default_read_timeout_ms(),
            settle_ms: None,
            command_terminator: None,
            reply_delimiter: None,
            reply_wait,
        }
    }

    /// Per-read timeout as a duration.
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }
}

/// InjectMan micromanipulator configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InjectManConfig {
    /// Replace the serial port with the in-memory echo controller
    #[serde(default)]
    pub simulated: bool,
    /// Speed used by moves that do not name one, in µm/s
    #[serde(default = "default_speed")]
    pub default_speed: f64,
    /// Position and speed limits
    #[serde(default)]
    pub limits: InjectManLimits,
    /// Calibration distances of the tilted axis
    #[serde(default)]
    pub calibration: Calibration,
    /// Serial connection
    pub connection: ConnectionConfig,
}

impl InjectManConfig {
    /// Simulated controller with default limits and calibration.
    pub fn simulated() -> Self {
        Self {
            simulated: true,
            default_speed: default_speed(),
            limits: InjectManLimits::default(),
            calibration: Calibration::default(),
            connection: ConnectionConfig::new("", ReplyWait::Forever),
        }
    }
}

/// Arduino voltage controller configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoltageControlConfig {
    /// Replace the serial port with the in-memory echo controller
    #[serde(default)]
    pub simulated: bool,
    /// Channel and value limits
    #[serde(flatten)]
    pub limits: VoltageLimits,
    /// Serial connection
    pub connection: ConnectionConfig,
}

impl VoltageControlConfig {
    /// Simulated controller with default limits.
    pub fn simulated() -> Self {
        Self {
            simulated: true,
            limits: VoltageLimits::default(),
            connection: ConnectionConfig::new("", ReplyWait::Forever),
        }
    }
}

fn default_name() -> String {
    "tweezers-daq".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_read_timeout_ms() -> u64 {
    100
}

fn default_speed() -> f64 {
    1000.0
}

impl Settings {
    /// Load configuration from `path`, then apply `TWEEZERS_DAQ_` environment overrides.
    ///
    /// A missing file is not an error; the environment alone may supply everything.
    pub fn load_from<P: AsRef<Path>>(path: P) -> AppResult<Self> {
        let settings: Settings = Figment::new()
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()?;
        Ok(settings)
    }

    /// Validate configuration after loading
    pub fn validate(&self) -> AppResult<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.application.log_level.to_lowercase().as_str()) {
            return Err(DaqError::Configuration(format!(
                "Invalid log_level '{}'. Must be one of: {}",
                self.application.log_level,
                valid_levels.join(", ")
            )));
        }

        if let Some(im) = &self.inject_man {
            check_port("inject_man", im.simulated, &im.connection)?;
            if !(im.limits.position_max > 0.0 && im.limits.speed_max > 0.0) {
                return Err(DaqError::Configuration(format!(
                    "inject_man limits must be positive: {:?}",
                    im.limits
                )));
            }
            Geometry::from_calibration(&im.calibration)?;
            if im.default_speed.abs() > im.limits.speed_max {
                return Err(DaqError::Configuration(format!(
                    "inject_man default_speed {} exceeds speed_max {}",
                    im.default_speed, im.limits.speed_max
                )));
            }
        }

        if let Some(vc) = &self.voltage_control {
            check_port("voltage_control", vc.simulated, &vc.connection)?;
            if vc.limits.channels == 0 {
                return Err(DaqError::Configuration(
                    "voltage_control needs at least one channel".to_string(),
                ));
            }
            if vc.limits.voltage_min > vc.limits.voltage_max {
                return Err(DaqError::Configuration(format!(
                    "voltage_control voltage_min {} is above voltage_max {}",
                    vc.limits.voltage_min, vc.limits.voltage_max
                )));
            }
        }

        Ok(())
    }
}

fn check_port(device: &str, simulated: bool, conn: &ConnectionConfig) -> AppResult<()> {
    if !simulated && conn.port.trim().is_empty() {
        return Err(DaqError::Configuration(format!(
            "{device}.connection.port must be set unless the device is simulated"
        )));
    }
    Ok(())
}
