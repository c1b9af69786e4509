//! Server configuration
//!
//! All settings are read once at server construction; there is no hot
//! reload. Defaults match the reference deployment: 15 second client
//! inactivity timeout and a 10 second shutdown grace period.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

// ----------------------------------------------------------------------------
// TLS Settings
// ----------------------------------------------------------------------------

/// Certificate material for TLS termination
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TlsSettings {
    /// PEM certificate chain
    pub cert_path: PathBuf,
    /// PEM private key
    pub key_path: PathBuf,
}

// ----------------------------------------------------------------------------
// Server Configuration
// ----------------------------------------------------------------------------

/// Configuration for the sawmill server
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Address to listen on
    pub bind_addr: SocketAddr,
    /// Close a connection after this long without an inbound byte
    #[serde(with = "duration_secs")]
    pub inactivity_timeout: Duration,
    /// How long outstanding work gets to finish during shutdown before
    /// being force-cancelled
    #[serde(with = "duration_secs")]
    pub shutdown_grace: Duration,
    /// Size of the per-connection socket read buffer
    pub read_buffer_size: usize,
    /// TLS termination; `None` serves plaintext
    pub tls: Option<TlsSettings>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 5044),
            inactivity_timeout: Duration::from_secs(15),
            shutdown_grace: Duration::from_secs(10),
            read_buffer_size: 16 * 1024,
            tls: None,
        }
    }
}

impl ServerConfig {
    /// Configuration bound to a specific port on all interfaces
    pub fn for_port(port: u16) -> Self {
        Self {
            bind_addr: SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), port),
            ..Self::default()
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.inactivity_timeout.is_zero() {
            return Err("inactivity_timeout must be greater than zero".into());
        }
        if self.shutdown_grace.is_zero() {
            return Err("shutdown_grace must be greater than zero".into());
        }
        if self.read_buffer_size == 0 {
            return Err("read_buffer_size must be greater than zero".into());
        }
        if let Some(tls) = &self.tls {
            if tls.cert_path.as_os_str().is_empty() {
                return Err("tls.cert_path must not be empty".into());
            }
            if tls.key_path.as_os_str().is_empty() {
                return Err("tls.key_path must not be empty".into());
            }
        }
        Ok(())
    }
}

/// Serialize durations as whole seconds, matching the configuration
/// surface of the original deployment.
mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = ServerConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.inactivity_timeout, Duration::from_secs(15));
        assert_eq!(config.shutdown_grace, Duration::from_secs(10));
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let config = ServerConfig {
            inactivity_timeout: Duration::ZERO,
            ..ServerConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_empty_tls_paths_rejected() {
        let config = ServerConfig {
            tls: Some(TlsSettings {
                cert_path: PathBuf::new(),
                key_path: PathBuf::from("key.pem"),
            }),
            ..ServerConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_duration_round_trip_through_toml() {
        let config = ServerConfig::for_port(9200);
        let text = toml::to_string(&config).unwrap();
        let back: ServerConfig = toml::from_str(&text).unwrap();
        assert_eq!(back.bind_addr, config.bind_addr);
        assert_eq!(back.inactivity_timeout, config.inactivity_timeout);
    }
}
