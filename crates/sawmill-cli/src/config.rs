//! CLI configuration loading
//!
//! Loads the server configuration from a TOML file (`sawmill.toml`) and
//! applies command-line overrides on top. Configuration is read once at
//! startup; there is no hot reload.

use std::path::Path;

use serde::{Deserialize, Serialize};

use sawmill_core::ServerConfig;

use crate::cli::Cli;
use crate::error::{CliError, Result};

// ----------------------------------------------------------------------------
// Application Configuration
// ----------------------------------------------------------------------------

/// Complete configuration for the sawmill CLI
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,
}

impl AppConfig {
    /// Load configuration from a TOML file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        let config: AppConfig = toml::from_str(&raw)?;
        Ok(config)
    }

    /// Apply command-line overrides on top of the loaded configuration
    pub fn apply_overrides(&mut self, cli: &Cli) {
        if let Some(port) = cli.port {
            self.server.bind_addr.set_port(port);
        }
        if let Some(secs) = cli.inactivity_timeout {
            self.server.inactivity_timeout = std::time::Duration::from_secs(secs);
        }
    }

    /// Validate the resulting configuration
    pub fn validate(&self) -> Result<()> {
        self.server.validate().map_err(CliError::Config)
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
