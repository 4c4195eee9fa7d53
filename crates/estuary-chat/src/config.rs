//! Session configuration.

use serde::Deserialize;
use thiserror::Error;

/// Configuration for one session.
///
/// Constructed by the embedding application and passed to
/// [`crate::Session::connect`]; there is no global configuration state.
/// The `root`/`sandbox` pair prefixes every store path and is validated
/// at connect time (letters, digits and underscores only).
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Whether the engine reacts to inbound messages with automatic
    /// delivery receipts at all.
    #[serde(default = "default_true")]
    pub delivery_receipts_enabled: bool,

    /// Whether inbound messages from other users are automatically
    /// marked received. Only consulted when no custom mark-received
    /// filter is installed.
    #[serde(default = "default_true")]
    pub auto_mark_received: bool,

    /// Whether chat invitations are accepted automatically.
    #[serde(default = "default_true")]
    pub auto_accept_chat_invite: bool,

    /// If enabled, every sendable in the session inbox is deleted once
    /// it has been received. Even when disabled, typing-state and
    /// presence sendables are always deleted — they have no use in the
    /// message archive.
    #[serde(default)]
    pub delete_messages_on_receipt: bool,

    /// How many historic messages to materialize when a message lane
    /// attaches. Older messages stay reachable through explicit
    /// pagination.
    #[serde(default = "default_message_history_limit")]
    pub message_history_limit: usize,

    /// First path segment of the store namespace.
    #[serde(default = "default_root")]
    pub root: String,

    /// Second path segment of the store namespace; lets several
    /// deployments share one store.
    #[serde(default = "default_sandbox")]
    pub sandbox: String,
}

fn default_true() -> bool {
    true
}

fn default_message_history_limit() -> usize {
    100
}

fn default_root() -> String {
    "estuary".to_string()
}

fn default_sandbox() -> String {
    "prod".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            delivery_receipts_enabled: true,
            auto_mark_received: true,
            auto_accept_chat_invite: true,
            delete_messages_on_receipt: false,
            message_history_limit: default_message_history_limit(),
            root: default_root(),
            sandbox: default_sandbox(),
        }
    }
}

/// Errors that can occur when loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read the configuration file.
    #[error("failed to read config file: {0}")]
    Read(#[from] std::io::Error),

    /// Failed to parse the configuration file as TOML.
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}

impl Config {
    /// Parses a configuration from a TOML string. Missing fields take
    /// their defaults.
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(raw)?)
    }

    /// Loads a configuration from a TOML file.
    pub fn from_toml_file(path: impl AsRef<std::path::Path>) -> Result<Self, ConfigError> {
        Self::from_toml_str(&std::fs::read_to_string(path)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = Config::default();
        assert!(config.delivery_receipts_enabled);
        assert!(config.auto_mark_received);
        assert!(config.auto_accept_chat_invite);
        assert!(!config.delete_messages_on_receipt);
        assert_eq!(config.message_history_limit, 100);
        assert_eq!(config.root, "estuary");
        assert_eq!(config.sandbox, "prod");
    }

    #[test]
    fn partial_toml_takes_defaults() {
        let config = Config::from_toml_str(
            r#"
            sandbox = "staging"
            delete_messages_on_receipt = true
            "#,
        )
        .expect("should parse");
        assert_eq!(config.sandbox, "staging");
        assert!(config.delete_messages_on_receipt);
        assert_eq!(config.root, "estuary");
        assert!(config.delivery_receipts_enabled);
    }

    #[test]
    fn malformed_toml_is_rejected() {
        assert!(matches!(
            Config::from_toml_str("sandbox = ["),
            Err(ConfigError::Parse(_))
        ));
    }
}
