//! Configuration management
//!
//! Configuration is loaded once at startup from a TOML file (plus
//! `SIPREC__SECTION__KEY` environment overrides) and then shared read-only
//! as an `Arc<Config>`. The recording destination and the local media
//! address are mandatory; a missing value is a fatal startup error.

use crate::domain::fork::RecorderDestination;
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("Missing required setting: {0}")]
    Missing(&'static str),

    #[error("Invalid setting {0}: {1}")]
    Invalid(&'static str, String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub fork: ForkConfig,
    #[serde(default)]
    pub sip: SipConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForkConfig {
    /// Address RTP sockets bind to and that is advertised in the SDP offer
    pub local_media_ip: IpAddr,
    /// Recording server host
    pub srs_host: String,
    /// Recording server SIP port
    pub srs_port: u16,
    #[serde(default = "default_originate_timeout_secs")]
    pub originate_timeout_secs: u64,
    #[serde(default = "default_rtp_port_start")]
    pub rtp_port_start: u16,
    #[serde(default = "default_rtp_port_end")]
    pub rtp_port_end: u16,
    #[serde(default = "default_resample_quality")]
    pub resample_quality: u8,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SipConfig {
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    /// `s=` line of the SDP offer
    #[serde(default = "default_session_name")]
    pub session_name: String,
    /// Username of the SDP `o=` line
    #[serde(default = "default_origin_user")]
    pub origin_user: String,
    /// User dialed on the recording server when a `DestHost` header is set
    #[serde(default = "default_srs_name")]
    pub srs_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_originate_timeout_secs() -> u64 {
    60
}

fn default_rtp_port_start() -> u16 {
    16384
}

fn default_rtp_port_end() -> u16 {
    32768
}

fn default_resample_quality() -> u8 {
    2
}

fn default_user_agent() -> String {
    "siprec-fork".to_string()
}

fn default_session_name() -> String {
    "SIPREC Media Gateway".to_string()
}

fn default_origin_user() -> String {
    "siprec-src".to_string()
}

fn default_srs_name() -> String {
    "drachtio".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for SipConfig {
    fn default() -> Self {
        Self {
            user_agent: default_user_agent(),
            session_name: default_session_name(),
            origin_user: default_origin_user(),
            srs_name: default_srs_name(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl ForkConfig {
    /// Build a fork configuration with defaults for everything optional
    pub fn new(local_media_ip: IpAddr, srs_host: impl Into<String>, srs_port: u16) -> Self {
        Self {
            local_media_ip,
            srs_host: srs_host.into(),
            srs_port,
            originate_timeout_secs: default_originate_timeout_secs(),
            rtp_port_start: default_rtp_port_start(),
            rtp_port_end: default_rtp_port_end(),
            resample_quality: default_resample_quality(),
        }
    }

    pub fn originate_timeout(&self) -> Duration {
        Duration::from_secs(self.originate_timeout_secs)
    }

    /// Configured recording server
    pub fn destination(&self) -> RecorderDestination {
        RecorderDestination::new(self.srs_host.clone(), self.srs_port)
    }
}

impl Config {
    /// Create a configuration from an already validated fork section
    pub fn new(fork: ForkConfig) -> Self {
        Self {
            fork,
            sip: SipConfig::default(),
            logging: LoggingConfig::default(),
        }
    }

    /// Load configuration from a file, applying `SIPREC__*` overrides
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let settings = config::Config::builder()
            .add_source(config::File::from(path.as_ref()))
            .add_source(config::Environment::with_prefix("SIPREC").separator("__"))
            .build()?;

        Self::from_settings(settings)
    }

    /// Load configuration from TOML text
    pub fn from_toml_str(toml: &str) -> Result<Self, ConfigError> {
        let settings = config::Config::builder()
            .add_source(config::File::from_str(toml, config::FileFormat::Toml))
            .build()?;

        Self::from_settings(settings)
    }

    fn from_settings(settings: config::Config) -> Result<Self, ConfigError> {
        let config: Config = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Check the settings the fork engine cannot run without
    pub fn validate(&self) -> Result<(), ConfigError> {
        let fork = &self.fork;

        if fork.local_media_ip.is_unspecified() {
            return Err(ConfigError::Missing("fork.local_media_ip"));
        }

        if fork.srs_host.trim().is_empty() {
            return Err(ConfigError::Missing("fork.srs_host"));
        }

        if fork.srs_port == 0 {
            return Err(ConfigError::Missing("fork.srs_port"));
        }

        if fork.rtp_port_start == 0 || fork.rtp_port_start >= fork.rtp_port_end {
            return Err(ConfigError::Invalid(
                "fork.rtp_port_start",
                format!(
                    "range {}..{} is empty",
                    fork.rtp_port_start, fork.rtp_port_end
                ),
            ));
        }

        if fork.originate_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "fork.originate_timeout_secs",
                "must be greater than zero".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_minimal_config() {
        let config = Config::from_toml_str(
            r#"
[fork]
local_media_ip = "10.0.0.5"
srs_host = "srs.example.com"
srs_port = 5080
"#,
        )
        .unwrap();

        assert_eq!(config.fork.local_media_ip, "10.0.0.5".parse::<IpAddr>().unwrap());
        assert_eq!(config.fork.srs_host, "srs.example.com");
        assert_eq!(config.fork.srs_port, 5080);
        assert_eq!(config.fork.originate_timeout(), Duration::from_secs(60));
        assert_eq!(config.sip.srs_name, "drachtio");
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_missing_srs_host_is_fatal() {
        let result = Config::from_toml_str(
            r#"
[fork]
local_media_ip = "10.0.0.5"
srs_port = 5080
"#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_empty_srs_host_rejected() {
        let result = Config::from_toml_str(
            r#"
[fork]
local_media_ip = "10.0.0.5"
srs_host = ""
srs_port = 5080
"#,
        );
        assert!(matches!(result, Err(ConfigError::Missing("fork.srs_host"))));
    }

    #[test]
    fn test_zero_port_rejected() {
        let config = Config::new(ForkConfig::new("10.0.0.5".parse().unwrap(), "srs", 0));
        assert!(matches!(config.validate(), Err(ConfigError::Missing("fork.srs_port"))));
    }

    #[test]
    fn test_unspecified_media_ip_rejected() {
        let config = Config::new(ForkConfig::new("0.0.0.0".parse().unwrap(), "srs", 5060));
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Missing("fork.local_media_ip"))
        ));
    }

    #[test]
    fn test_empty_port_range_rejected() {
        let mut fork = ForkConfig::new("10.0.0.5".parse().unwrap(), "srs", 5060);
        fork.rtp_port_start = 20000;
        fork.rtp_port_end = 20000;
        assert!(matches!(
            Config::new(fork).validate(),
            Err(ConfigError::Invalid("fork.rtp_port_start", _))
        ));
    }
}
