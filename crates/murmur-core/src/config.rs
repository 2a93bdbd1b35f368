//! Mesh configuration.
//!
//! Sources are layered: defaults, then a TOML file, then `MURMUR_*`
//! environment variables. [`MeshConfig::validate`] runs last.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::errors::{MurmurError, Result};

/// Prefix for environment overrides
pub const ENV_PREFIX: &str = "MURMUR_";

/// Default upper bound on a single encoded gossip payload (16 MiB)
pub const DEFAULT_MAX_PAYLOAD_BYTES: u64 = 16 * 1024 * 1024;

/// Settings shared by the silence and notification stores of one node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MeshConfig {
    /// Largest payload accepted or produced by the wire codec
    pub max_payload_bytes: u64,
    /// Gossip channel carrying silences
    pub silences_channel: String,
    /// Gossip channel carrying notification infos
    pub notifications_channel: String,
}

impl Default for MeshConfig {
    fn default() -> Self {
        Self {
            max_payload_bytes: DEFAULT_MAX_PAYLOAD_BYTES,
            silences_channel: "silences".to_string(),
            notifications_channel: "notifications".to_string(),
        }
    }
}

impl MeshConfig {
    /// Parse TOML; missing keys keep their defaults.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| MurmurError::config(format!("Invalid TOML: {e}")))
    }

    /// Load from a TOML file
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            MurmurError::config(format!("Failed to read config file {}: {e}", path.display()))
        })?;
        Self::from_toml_str(&content)
    }

    /// Apply `MURMUR_*` overrides from the process environment
    pub fn merge_with_env(&mut self) -> Result<()> {
        self.merge_with_vars(std::env::vars())
    }

    /// Apply `MURMUR_*` overrides from an explicit variable list
    pub fn merge_with_vars<I>(&mut self, vars: I) -> Result<()>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        for (key, value) in vars {
            let Some(name) = key.strip_prefix(ENV_PREFIX) else {
                continue;
            };
            match name {
                "MAX_PAYLOAD_BYTES" => {
                    self.max_payload_bytes = value.parse().map_err(|e| {
                        MurmurError::config(format!("{key}: expected an integer: {e}"))
                    })?;
                }
                "SILENCES_CHANNEL" => self.silences_channel = value,
                "NOTIFICATIONS_CHANNEL" => self.notifications_channel = value,
                _ => tracing::debug!(key = %key, "ignoring unknown environment override"),
            }
        }
        Ok(())
    }

    /// Check internal consistency
    pub fn validate(&self) -> Result<()> {
        if self.max_payload_bytes == 0 {
            return Err(MurmurError::config("max_payload_bytes must be positive"));
        }
        if self.silences_channel.is_empty() || self.notifications_channel.is_empty() {
            return Err(MurmurError::config("channel names must not be empty"));
        }
        if self.silences_channel == self.notifications_channel {
            return Err(MurmurError::config(
                "silences and notifications need distinct channels",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = MeshConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.max_payload_bytes, DEFAULT_MAX_PAYLOAD_BYTES);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = MeshConfig::from_toml_str("max_payload_bytes = 4096").unwrap();
        assert_eq!(config.max_payload_bytes, 4096);
        assert_eq!(config.silences_channel, "silences");
    }

    #[test]
    fn test_invalid_toml_is_config_error() {
        let err = MeshConfig::from_toml_str("max_payload_bytes = \"lots\"").unwrap_err();
        assert!(matches!(err, MurmurError::Config { .. }));
    }

    #[test]
    fn test_env_overrides() {
        let mut config = MeshConfig::default();
        config
            .merge_with_vars(vec![
                ("MURMUR_MAX_PAYLOAD_BYTES".to_string(), "1024".to_string()),
                ("MURMUR_SILENCES_CHANNEL".to_string(), "sil".to_string()),
                ("HOME".to_string(), "/root".to_string()),
            ])
            .unwrap();
        assert_eq!(config.max_payload_bytes, 1024);
        assert_eq!(config.silences_channel, "sil");
        assert_eq!(config.notifications_channel, "notifications");
    }

    #[test]
    fn test_bad_env_override() {
        let mut config = MeshConfig::default();
        let result = config.merge_with_vars(vec![(
            "MURMUR_MAX_PAYLOAD_BYTES".to_string(),
            "many".to_string(),
        )]);
        assert!(result.is_err());
    }

    #[test]
    fn test_validate_rejects_shared_channel() {
        let config = MeshConfig {
            notifications_channel: "silences".to_string(),
            ..MeshConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
