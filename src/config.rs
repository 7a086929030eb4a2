//! Runtime configuration
//!
//! Loaded from TOML; every field has a default so an empty file is valid.

use crate::error::{Result, TeleportError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Configuration for the teleport orchestrator and its service loop
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TeleportConfig {
    /// Re-sends allowed when the server confirms a different rating
    #[serde(default = "default_max_preference_retries")]
    pub max_preference_retries: u32,

    /// Region capability used to push the maturity preference
    #[serde(default = "default_preference_capability")]
    pub preference_capability: String,

    /// Timeout for capability HTTP calls
    #[serde(default = "default_http_timeout_secs")]
    pub http_timeout_secs: u64,

    /// Buffered notifications per broadcast subscriber
    #[serde(default = "default_notification_capacity")]
    pub notification_capacity: usize,

    /// Buffered commands for the service loop
    #[serde(default = "default_command_capacity")]
    pub command_capacity: usize,

    /// Where the desired maturity rating is persisted
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preference_file: Option<PathBuf>,
}

fn default_max_preference_retries() -> u32 {
    3
}
fn default_preference_capability() -> String {
    "UpdateAgentInformation".into()
}
fn default_http_timeout_secs() -> u64 {
    30
}
fn default_notification_capacity() -> usize {
    64
}
fn default_command_capacity() -> usize {
    256
}

impl Default for TeleportConfig {
    fn default() -> Self {
        Self {
            max_preference_retries: default_max_preference_retries(),
            preference_capability: default_preference_capability(),
            http_timeout_secs: default_http_timeout_secs(),
            notification_capacity: default_notification_capacity(),
            command_capacity: default_command_capacity(),
            preference_file: None,
        }
    }
}

impl TeleportConfig {
    /// Parse a TOML document
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(s).map_err(|e| TeleportError::Config(format!("Invalid TOML: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            TeleportError::Config(format!("Failed to read config {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&content)
    }

    /// HTTP timeout as a `Duration`
    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    fn validate(&self) -> Result<()> {
        if self.preference_capability.trim().is_empty() {
            return Err(TeleportError::Config(
                "preference_capability must not be empty".into(),
            ));
        }
        if self.notification_capacity == 0 || self.command_capacity == 0 {
            return Err(TeleportError::Config(
                "channel capacities must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}
