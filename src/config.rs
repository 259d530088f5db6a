use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

use crate::bridge::guard::GuardSettings;
use crate::bridge::worker::WorkerSettings;
use crate::link::DEFAULT_SHUTDOWN_GRACE;

/// Baud rates the serial driver accepts.
pub const SUPPORTED_BAUD_RATES: [u32; 17] = [
    50, 75, 110, 134, 150, 200, 300, 600, 1200, 1800, 2400, 4800, 9600, 19200, 38400, 57600,
    115200,
];

/// Largest value an RGB color component may take.
pub const MAX_COLOR: u32 = 0xFF_FFFF;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Unsupported baud rate: {0}")]
    BaudRate(u32),

    #[error("Color {part} out of range: {value:#x}")]
    ColorOutOfRange { part: &'static str, value: u32 },

    #[error("Pairing timeout must be finite and non-negative, got {0}")]
    PairingTimeout(f64),

    #[error("Timing {0} must be greater than zero")]
    ZeroInterval(&'static str),

    #[error("Serial port must not be empty")]
    EmptyPort,

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
}

/// Colors the paired device shows for the virtual controller.
#[derive(Deserialize, Serialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(default)]
pub struct ControllerColor {
    pub pad: u32,
    pub button: u32,
    pub left_grip: u32,
    pub right_grip: u32,
}

impl Default for ControllerColor {
    fn default() -> Self {
        Self {
            pad: 0x2D_2D2D,
            button: 0xE6_E6E6,
            left_grip: 0x46_4646,
            right_grip: 0x46_4646,
        }
    }
}

impl ControllerColor {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let parts = [
            ("pad", self.pad),
            ("button", self.button),
            ("left_grip", self.left_grip),
            ("right_grip", self.right_grip),
        ];
        for (part, value) in parts {
            if value > MAX_COLOR {
                return Err(ConfigError::ColorOutOfRange { part, value });
            }
        }
        Ok(())
    }
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq)]
pub struct SerialConfig {
    pub port: String,
    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,
}

fn default_baud_rate() -> u32 {
    9600
}

impl SerialConfig {
    pub fn new(port: impl Into<String>) -> Self {
        Self {
            port: port.into(),
            baud_rate: default_baud_rate(),
        }
    }
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq)]
#[serde(default)]
pub struct TimingConfig {
    pub pairing_poll_ms: u64,
    pub read_poll_ms: u64,
    pub settle_ms: u64,
    pub shutdown_grace_ms: u64,
    pub stats_interval_secs: u64,
}

impl TimingConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let intervals = [
            ("pairing_poll_ms", self.pairing_poll_ms),
            ("read_poll_ms", self.read_poll_ms),
            ("stats_interval_secs", self.stats_interval_secs),
        ];
        for (name, value) in intervals {
            if value == 0 {
                return Err(ConfigError::ZeroInterval(name));
            }
        }
        Ok(())
    }
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            pairing_poll_ms: 1000,
            read_poll_ms: 1,
            settle_ms: 1000,
            shutdown_grace_ms: DEFAULT_SHUTDOWN_GRACE.as_millis() as u64,
            stats_interval_secs: 10,
        }
    }
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
pub struct BridgeConfig {
    #[serde(default = "default_pairing_timeout")]
    pub pairing_timeout_secs: f64,
    pub serial: SerialConfig,
    #[serde(default)]
    pub controller_color: ControllerColor,
    #[serde(default)]
    pub timing: TimingConfig,
}

fn default_pairing_timeout() -> f64 {
    30.0
}

impl BridgeConfig {
    pub fn new(serial: SerialConfig) -> Self {
        Self {
            pairing_timeout_secs: default_pairing_timeout(),
            serial,
            controller_color: ControllerColor::default(),
            timing: TimingConfig::default(),
        }
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        debug!("Loaded bridge config for port {}", config.serial.port);
        Ok(config)
    }

    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.serial.port.trim().is_empty() {
            return Err(ConfigError::EmptyPort);
        }
        if !SUPPORTED_BAUD_RATES.contains(&self.serial.baud_rate) {
            return Err(ConfigError::BaudRate(self.serial.baud_rate));
        }
        if !self.pairing_timeout_secs.is_finite() || self.pairing_timeout_secs < 0.0 {
            return Err(ConfigError::PairingTimeout(self.pairing_timeout_secs));
        }
        self.timing.validate()?;
        self.controller_color.validate()
    }

    pub fn pairing_timeout(&self) -> Duration {
        Duration::try_from_secs_f64(self.pairing_timeout_secs).unwrap_or_default()
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.timing.shutdown_grace_ms)
    }

    pub fn worker_settings(&self) -> WorkerSettings {
        WorkerSettings {
            read_poll: Duration::from_millis(self.timing.read_poll_ms),
            stats_interval: Duration::from_secs(self.timing.stats_interval_secs),
        }
    }

    pub fn guard_settings(&self) -> GuardSettings {
        GuardSettings {
            pairing_timeout: self.pairing_timeout(),
            pairing_poll: Duration::from_millis(self.timing.pairing_poll_ms),
            settle_delay: Duration::from_millis(self.timing.settle_ms),
            colors: self.controller_color,
            worker: self.worker_settings(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config = BridgeConfig::from_toml_str("[serial]\nport = \"/dev/ttyUSB0\"\n").unwrap();
        assert_eq!(config.serial.baud_rate, 9600);
        assert_eq!(config.pairing_timeout(), Duration::from_secs(30));
        assert_eq!(config.controller_color, ControllerColor::default());
        assert_eq!(config.timing, TimingConfig::default());
        assert_eq!(config.shutdown_grace(), Duration::from_millis(500));
    }

    #[test]
    fn test_full_config() {
        let content = r#"
            pairing_timeout_secs = 2.5

            [serial]
            port = "COM3"
            baud_rate = 115200

            [controller_color]
            pad = 0xFF0000
            button = 0x00FF00

            [timing]
            read_poll_ms = 5
            settle_ms = 0
        "#;
        let config = BridgeConfig::from_toml_str(content).unwrap();
        assert_eq!(config.serial.port, "COM3");
        assert_eq!(config.pairing_timeout(), Duration::from_millis(2500));
        assert_eq!(config.controller_color.pad, 0xFF0000);
        assert_eq!(config.controller_color.left_grip, 0x464646);

        let guard = config.guard_settings();
        assert_eq!(guard.settle_delay, Duration::ZERO);
        assert_eq!(guard.pairing_poll, Duration::from_secs(1));
        assert_eq!(guard.worker.read_poll, Duration::from_millis(5));
        assert_eq!(
            guard.session_settings().pairing_timeout,
            Duration::from_millis(2500)
        );
    }

    #[test]
    fn test_rejects_unsupported_baud_rate() {
        let result = BridgeConfig::from_toml_str("[serial]\nport = \"COM3\"\nbaud_rate = 12345\n");
        assert!(matches!(result, Err(ConfigError::BaudRate(12345))));
    }

    #[test]
    fn test_rejects_color_out_of_range() {
        let mut config = BridgeConfig::new(SerialConfig::new("COM3"));
        config.controller_color.right_grip = 0x100_0000;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ColorOutOfRange {
                part: "right_grip",
                ..
            })
        ));
    }

    #[test]
    fn test_rejects_bad_timeout_and_port() {
        let mut config = BridgeConfig::new(SerialConfig::new("COM3"));
        config.pairing_timeout_secs = -1.0;
        assert!(matches!(config.validate(), Err(ConfigError::PairingTimeout(_))));

        config.pairing_timeout_secs = f64::NAN;
        assert!(matches!(config.validate(), Err(ConfigError::PairingTimeout(_))));

        let config = BridgeConfig::new(SerialConfig::new("  "));
        assert!(matches!(config.validate(), Err(ConfigError::EmptyPort)));
    }

    #[test]
    fn test_rejects_zero_intervals() {
        let content = "[serial]\nport = \"COM3\"\n[timing]\nread_poll_ms = 0\n";
        assert!(matches!(
            BridgeConfig::from_toml_str(content),
            Err(ConfigError::ZeroInterval("read_poll_ms"))
        ));

        let mut config = BridgeConfig::new(SerialConfig::new("COM3"));
        config.timing.pairing_poll_ms = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ZeroInterval("pairing_poll_ms"))
        ));

        config.timing = TimingConfig {
            stats_interval_secs: 0,
            ..TimingConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ZeroInterval("stats_interval_secs"))
        ));

        config.timing.stats_interval_secs = 1;
        config.timing.settle_ms = 0;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_survives_toml_round_trip() {
        let config = BridgeConfig::new(SerialConfig::new("/dev/ttyACM0"));
        let content = config.to_toml_string().unwrap();
        assert_eq!(BridgeConfig::from_toml_str(&content).unwrap(), config);
    }

    #[test]
    fn test_malformed_toml() {
        assert!(matches!(
            BridgeConfig::from_toml_str("serial = 3"),
            Err(ConfigError::Parse(_))
        ));
    }
}
