// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Mark Wells <contact@markwells.dev>

//! Configuration value for the bridge: named peers, their launch command,
//! file-pattern routing, and optional overrides.
//!
//! Loading and validating the config FILE is an external concern — this
//! module owns the shape of the value and the layered load order (defaults
//! < user config dir < explicit file < environment), not bespoke
//! validation logic.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::PathBuf;

/// Top-level configuration: a named set of peers.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    /// Peer definitions keyed by a user-chosen name (not a language id —
    /// one peer may serve several languages via several glob patterns).
    #[serde(default)]
    pub peers: HashMap<String, PeerConfig>,
}

/// One configured LSP peer.
#[derive(Debug, Deserialize, Clone)]
pub struct PeerConfig {
    /// The command to execute, e.g. `["rust-analyzer"]` or
    /// `["typescript-language-server", "--stdio"]`.
    pub command: Vec<String>,

    /// Glob patterns (relative to the project root) this peer should
    /// handle, e.g. `["**/*.rs"]`.
    #[serde(default)]
    pub file_patterns: Vec<String>,

    /// Initialization options forwarded verbatim in the `initialize`
    /// request, if any.
    #[serde(default)]
    pub initialization_options: Option<serde_json::Value>,

    /// Overrides the `rootUri` sent during `initialize`; defaults to the
    /// `file://` form of the project root.
    #[serde(default)]
    pub root_uri: Option<String>,

    /// Environment variables overlaid onto the inherited process
    /// environment when spawning this peer's subprocess.
    #[serde(default)]
    pub env: HashMap<String, String>,
}

impl Config {
    /// Loads configuration from standard paths or a specific file.
    ///
    /// Layering, lowest to highest priority: built-in defaults, the
    /// user config directory (`~/.config/lspmux/config.toml`), an
    /// explicit `--config` file, and `LSPMUX_*` environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if a configured source cannot be parsed.
    pub fn load(explicit_file: Option<PathBuf>) -> Result<Self> {
        let mut builder = config::Config::builder();

        if let Some(config_dir) = dirs::config_dir() {
            let config_path = config_dir.join("lspmux").join("config.toml");
            if config_path.exists() {
                builder = builder.add_source(config::File::from(config_path));
            }
        }

        if let Some(path) = explicit_file {
            builder = builder.add_source(config::File::from(path));
        }

        builder = builder.add_source(config::Environment::with_prefix("LSPMUX"));

        let config = builder.build().context("failed to build configuration")?;

        config.try_deserialize().context("failed to deserialize configuration")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_no_peers() {
        let config = Config::default();
        assert!(config.peers.is_empty());
    }

    #[test]
    fn peer_config_deserializes_minimal() {
        let json = serde_json::json!({
            "command": ["rust-analyzer"],
            "file_patterns": ["**/*.rs"],
        });
        let peer: PeerConfig = serde_json::from_value(json).unwrap();
        assert_eq!(peer.command, vec!["rust-analyzer".to_string()]);
        assert_eq!(peer.file_patterns, vec!["**/*.rs".to_string()]);
        assert!(peer.initialization_options.is_none());
        assert!(peer.root_uri.is_none());
        assert!(peer.env.is_empty());
    }

    #[test]
    fn peer_config_deserializes_full() {
        let json = serde_json::json!({
            "command": ["typescript-language-server", "--stdio"],
            "file_patterns": ["**/*.ts", "**/*.tsx"],
            "initialization_options": {"preferences": {}},
            "root_uri": "file:///workspace/frontend",
            "env": {"NODE_ENV": "development"},
        });
        let peer: PeerConfig = serde_json::from_value(json).unwrap();
        assert_eq!(peer.file_patterns.len(), 2);
        assert!(peer.initialization_options.is_some());
        assert_eq!(peer.root_uri.as_deref(), Some("file:///workspace/frontend"));
        assert_eq!(peer.env.get("NODE_ENV").map(String::as_str), Some("development"));
    }

    #[test]
    fn config_deserializes_multiple_peers() {
        let json = serde_json::json!({
            "peers": {
                "rust": {"command": ["rust-analyzer"], "file_patterns": ["**/*.rs"]},
                "python": {"command": ["pylsp"], "file_patterns": ["**/*.py"]},
            }
        });
        let config: Config = serde_json::from_value(json).unwrap();
        assert_eq!(config.peers.len(), 2);
        assert!(config.peers.contains_key("rust"));
        assert!(config.peers.contains_key("python"));
    }
}
