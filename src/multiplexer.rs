// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Mark Wells <contact@markwells.dev>

//! Routes files to LSP peers by glob pattern, starting peers lazily and
//! never restarting one that has died.
//!
//! Peers are ordered by name, ascending, for a deterministic tie-break
//! when more than one peer's patterns match the same file — the
//! project's `config` table has no reliable declaration order once it
//! has gone through deserialization, so name order stands in for it.

use anyhow::{Context, Result, anyhow};
use globset::{Glob, GlobSet, GlobSetBuilder};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::config::Config;
use crate::lsp::{ClientState, LspClient};
use crate::path as pathutil;
use crate::registry::{self, Extension};

struct Peer {
    client: Arc<LspClient>,
    patterns: GlobSet,
}

/// Owns every configured LSP peer and routes files to the right one.
pub struct Multiplexer {
    root: PathBuf,
    peers: Vec<Peer>,
}

impl Multiplexer {
    /// Builds one [`LspClient`] per configured peer, compiling its glob
    /// patterns once, in ascending name order.
    ///
    /// # Errors
    ///
    /// Returns an error if any peer's file patterns fail to compile as
    /// globs.
    pub fn new(config: Config, root: PathBuf) -> Result<Self> {
        let mut names: Vec<&String> = config.peers.keys().collect();
        names.sort();

        let mut peers = Vec::with_capacity(names.len());
        for name in names {
            let peer_config = config.peers[name].clone();
            let mut builder = GlobSetBuilder::new();
            for pattern in &peer_config.file_patterns {
                let glob = Glob::new(pattern)
                    .with_context(|| format!("peer '{name}' has an invalid pattern '{pattern}'"))?;
                builder.add(glob);
            }
            let patterns = builder
                .build()
                .with_context(|| format!("failed to compile glob set for peer '{name}'"))?;

            let client = Arc::new(LspClient::new(name.clone(), peer_config, root.clone()));
            peers.push(Peer { client, patterns });
        }

        Ok(Self { root, peers })
    }

    fn matching_peers(&self, path: &Path) -> impl Iterator<Item = &Peer> {
        let relative = pathutil::relative_to(&self.root, path);
        self.peers
            .iter()
            .filter(move |peer| peer.patterns.is_match(&relative) || peer.patterns.is_match(path))
    }

    /// Returns every `Ready` peer configured to handle `path`, in
    /// configuration order. Never starts a peer.
    pub async fn clients_for_file(&self, path: &Path) -> Vec<Arc<LspClient>> {
        let mut matches = Vec::new();
        for peer in self.matching_peers(path) {
            if peer.client.state().await == ClientState::Ready {
                matches.push(peer.client.clone());
            }
        }
        matches
    }

    /// Returns the first `Ready` peer (in configuration order) configured
    /// to handle `path`. Never starts a peer.
    pub async fn client_for_file(&self, path: &Path) -> Option<Arc<LspClient>> {
        self.clients_for_file(path).await.into_iter().next()
    }

    /// Resolves the peer for `path`: returns the first `Ready` matching
    /// peer if one exists, otherwise starts the first matching peer that
    /// has not yet been started. A peer that has already died is never
    /// retried.
    ///
    /// # Errors
    ///
    /// Returns an error if no peer is configured for `path`, or if the
    /// peer that needed starting fails to start.
    pub async fn ensure_client_for_file(&self, path: &Path) -> Result<Arc<LspClient>> {
        let mut first_not_started = None;
        for peer in self.matching_peers(path) {
            match peer.client.state().await {
                ClientState::Ready => return Ok(peer.client.clone()),
                ClientState::Idle if first_not_started.is_none() => {
                    first_not_started = Some(peer.client.clone());
                }
                _ => {}
            }
        }

        let client = first_not_started
            .ok_or_else(|| anyhow!("no peer configured for {}", path.display()))?;
        client.start().await?;
        Ok(client)
    }

    /// Returns `true` if no peer was configured at all, distinct from a
    /// peer existing but not matching a particular file.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    /// Returns every configured peer, started or not, in configuration
    /// order.
    #[must_use]
    pub fn all_clients(&self) -> Vec<Arc<LspClient>> {
        self.peers.iter().map(|peer| peer.client.clone()).collect()
    }

    /// Returns the full set of protocol extensions across every
    /// configured peer, regardless of whether it has been started.
    #[must_use]
    pub fn all_configured_extensions(&self) -> Vec<&'static Extension> {
        self.peers
            .iter()
            .flat_map(|peer| registry::extensions_for_command(peer.client.command()))
            .collect()
    }

    /// Finds the peer and extension descriptor serving `tool_name`.
    #[must_use]
    pub fn client_for_extension_tool(&self, tool_name: &str) -> Option<(Arc<LspClient>, &'static Extension)> {
        self.peers.iter().find_map(|peer| {
            registry::extension_for_tool(peer.client.command(), tool_name)
                .map(|ext| (peer.client.clone(), ext))
        })
    }

    /// Shuts down every started peer concurrently.
    pub async fn shutdown_all(&self) {
        let handles: Vec<_> = self
            .peers
            .iter()
            .map(|peer| {
                let client = peer.client.clone();
                tokio::spawn(async move {
                    if let Err(e) = client.shutdown().await {
                        tracing::warn!("peer '{}' failed to shut down cleanly: {e}", client.name);
                    }
                })
            })
            .collect();
        for handle in handles {
            let _ = handle.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PeerConfig;
    use std::collections::HashMap;

    fn config_with(peers: &[(&str, &[&str])]) -> Config {
        let mut map = HashMap::new();
        for (name, patterns) in peers {
            map.insert(
                (*name).to_string(),
                PeerConfig {
                    command: vec!["true".to_string()],
                    file_patterns: patterns.iter().map(|p| (*p).to_string()).collect(),
                    initialization_options: None,
                    root_uri: None,
                    env: HashMap::new(),
                },
            );
        }
        Config { peers: map }
    }

    /// Matching is glob-only and state-agnostic; `Ready` filtering is
    /// exercised separately against the real `mockls` peer in
    /// `tests/lsp_integration.rs` and `tests/mcp_integration.rs`, since
    /// a peer spawned from `"true"` can never reach `Ready`.
    fn matched_names(mux: &Multiplexer, path: &Path) -> Vec<&str> {
        mux.matching_peers(path).map(|peer| peer.client.name.as_str()).collect()
    }

    #[test]
    fn routes_file_to_matching_peer() {
        let config = config_with(&[("rust", &["**/*.rs"]), ("python", &["**/*.py"])]);
        let mux = Multiplexer::new(config, PathBuf::from("/proj")).unwrap();

        assert_eq!(matched_names(&mux, Path::new("/proj/src/main.rs")), vec!["rust"]);
    }

    #[test]
    fn no_client_for_unmatched_file() {
        let config = config_with(&[("rust", &["**/*.rs"])]);
        let mux = Multiplexer::new(config, PathBuf::from("/proj")).unwrap();
        assert!(matched_names(&mux, Path::new("/proj/README.md")).is_empty());
    }

    #[test]
    fn overlapping_patterns_tie_break_by_name_order() {
        // "py-tools" sorts before "python" so it wins the tie-break.
        let config = config_with(&[("python", &["**/*.py"]), ("py-tools", &["**/*.py"])]);
        let mux = Multiplexer::new(config, PathBuf::from("/proj")).unwrap();
        assert_eq!(matched_names(&mux, Path::new("/proj/a.py")), vec!["py-tools", "python"]);
    }

    #[test]
    fn clients_for_file_returns_every_match() {
        let config = config_with(&[("rust", &["**/*.rs"]), ("all", &["**/*"])]);
        let mux = Multiplexer::new(config, PathBuf::from("/proj")).unwrap();
        assert_eq!(matched_names(&mux, Path::new("/proj/src/main.rs")).len(), 2);
    }

    #[tokio::test]
    async fn unready_peers_are_excluded_from_selection() {
        let config = config_with(&[("rust", &["**/*.rs"])]);
        let mux = Multiplexer::new(config, PathBuf::from("/proj")).unwrap();

        // The peer command is "true", which exits immediately and can
        // never reach `Ready`, so selection must come back empty rather
        // than returning an Idle or Dead client.
        assert!(mux.client_for_file(Path::new("/proj/main.rs")).await.is_none());
        assert!(mux.clients_for_file(Path::new("/proj/main.rs")).await.is_empty());
    }

    #[tokio::test]
    async fn ensure_client_for_file_errors_when_nothing_matches() {
        let config = config_with(&[("rust", &["**/*.rs"])]);
        let mux = Multiplexer::new(config, PathBuf::from("/proj")).unwrap();
        assert!(mux.ensure_client_for_file(Path::new("/proj/README.md")).await.is_err());
    }

    #[test]
    fn all_configured_extensions_ignores_unstarted_state() {
        let config = config_with(&[("rust", &["**/*.rs"])]);
        let mux = Multiplexer::new(config, PathBuf::from("/proj")).unwrap();
        // command is "true", not rust-analyzer, so no extensions match.
        assert!(mux.all_configured_extensions().is_empty());
    }
}
