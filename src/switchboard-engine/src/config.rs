//! Configuration loading.
//!
//! Two files feed the engine:
//! - the tool-server fleet, `mcp-config.json`:
//!   `{"mcpServers": {"<id>": {"command": "...", "args": [], "env": {}}}}`
//! - engine settings, `switchboard.toml`, where every field is optional.

use std::path::Path;
use std::time::Duration;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use switchboard_mcp_client::SpawnConfig;
use tracing::{debug, info};

use crate::error::ConfigError;
use crate::prompt::DEFAULT_SYSTEM_INSTRUCTION;

/// Default fleet file name.
pub const DEFAULT_FLEET_FILE: &str = "mcp-config.json";

/// Environment variable holding the oracle API key.
pub const API_KEY_ENV: &str = "GEMINI_API_KEY";

/// Configured tool servers in file order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FleetConfig {
    #[serde(rename = "mcpServers", default)]
    pub servers: IndexMap<String, SpawnConfig>,
}

impl FleetConfig {
    /// Load the fleet file. A missing file is an empty fleet.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            info!(path = %path.display(), "No tool-server config found, starting without tools");
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let fleet = Self::from_json_str(&content)?;
        debug!(path = %path.display(), servers = fleet.servers.len(), "Loaded tool-server config");
        Ok(fleet)
    }

    pub fn from_json_str(content: &str) -> Result<Self, ConfigError> {
        let fleet: Self = serde_json::from_str(content)?;
        for (id, spawn) in &fleet.servers {
            if spawn.command.trim().is_empty() {
                return Err(ConfigError::invalid(
                    format!("mcpServers.{id}.command"),
                    "must not be empty",
                ));
            }
        }
        Ok(fleet)
    }

    pub fn is_empty(&self) -> bool {
        self.servers.is_empty()
    }
}

/// Engine settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Tool batches one turn may execute.
    pub max_rounds: u32,
    /// Run the calls of one batch concurrently.
    pub parallel_tool_calls: bool,
    pub system_instruction: String,
    pub history: HistoryConfig,
    pub timeouts: TimeoutConfig,
    pub oracle: OracleConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_rounds: 8,
            parallel_tool_calls: true,
            system_instruction: DEFAULT_SYSTEM_INSTRUCTION.to_string(),
            history: HistoryConfig::default(),
            timeouts: TimeoutConfig::default(),
            oracle: OracleConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Load and validate a TOML settings file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_toml_str(&content)?;
        debug!(path = %path.display(), "Loaded engine config");
        Ok(config)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_rounds == 0 {
            return Err(ConfigError::invalid("max_rounds", "must be at least 1"));
        }
        if self.history.cap < 2 {
            return Err(ConfigError::invalid("history.cap", "must be at least 2"));
        }
        if self.history.retain == 0 || self.history.retain >= self.history.cap {
            return Err(ConfigError::invalid(
                "history.retain",
                format!("must be between 1 and {}", self.history.cap - 1),
            ));
        }
        if self.history.max_conversations == 0 {
            return Err(ConfigError::invalid(
                "history.max_conversations",
                "must be at least 1",
            ));
        }
        for (field, secs) in [
            ("timeouts.oracle_secs", self.timeouts.oracle_secs),
            ("timeouts.tool_secs", self.timeouts.tool_secs),
            ("timeouts.handshake_secs", self.timeouts.handshake_secs),
        ] {
            if secs == 0 {
                return Err(ConfigError::invalid(field, "must be at least 1"));
            }
        }
        if let Some(temperature) = self.oracle.temperature
            && !(0.0..=2.0).contains(&temperature)
        {
            return Err(ConfigError::invalid(
                "oracle.temperature",
                "must be between 0.0 and 2.0",
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    /// High-water mark.
    pub cap: usize,
    /// Messages kept when the cap is exceeded.
    pub retain: usize,
    pub max_conversations: usize,
    pub idle_ttl_secs: u64,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            cap: 40,
            retain: 30,
            max_conversations: 1024,
            idle_ttl_secs: 3600,
        }
    }
}

impl HistoryConfig {
    pub fn idle_ttl(&self) -> Duration {
        Duration::from_secs(self.idle_ttl_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    pub oracle_secs: u64,
    pub tool_secs: u64,
    pub handshake_secs: u64,
    pub shutdown_grace_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            oracle_secs: 60,
            tool_secs: 30,
            handshake_secs: 30,
            shutdown_grace_secs: 5,
        }
    }
}

impl TimeoutConfig {
    pub fn oracle(&self) -> Duration {
        Duration::from_secs(self.oracle_secs)
    }

    pub fn tool(&self) -> Duration {
        Duration::from_secs(self.tool_secs)
    }

    pub fn handshake(&self) -> Duration {
        Duration::from_secs(self.handshake_secs)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OracleConfig {
    pub model: String,
    pub api_base: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_output_tokens: Option<u32>,
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            model: "gemini-2.0-flash".to_string(),
            api_base: "https://generativelanguage.googleapis.com/v1beta".to_string(),
            temperature: None,
            max_output_tokens: None,
        }
    }
}
