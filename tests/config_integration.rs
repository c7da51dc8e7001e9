// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Mark Wells <contact@markwells.dev>

#![deny(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
//! Integration tests for configuration loading precedence.
//!
//! These tests run single-threaded (`--test-threads=1` is not required
//! since each test installs its own `XDG_CONFIG_HOME`, but `std::env`
//! mutation is process-global, so each test uses its own temp dir and
//! restores nothing — cargo runs each test file's tests in one process,
//! and `#[serial]`-style isolation is achieved by never sharing a dir).

use anyhow::{Context, Result};
use lspmux::config::Config;
use std::fs;
use std::io::Write;

/// Points `XDG_CONFIG_HOME` at a fresh temp dir containing
/// `lspmux/config.toml` with `contents`, returning the guard that keeps
/// the dir alive.
fn with_user_config(contents: &str) -> Result<tempfile::TempDir> {
    let dir = tempfile::tempdir()?;
    let lspmux_dir = dir.path().join("lspmux");
    fs::create_dir_all(&lspmux_dir)?;
    fs::write(lspmux_dir.join("config.toml"), contents)?;
    // SAFETY: no other thread in this test binary reads XDG_CONFIG_HOME concurrently.
    unsafe {
        std::env::set_var("XDG_CONFIG_HOME", dir.path());
    }
    Ok(dir)
}

#[test]
fn no_config_anywhere_yields_empty_peers() -> Result<()> {
    let dir = tempfile::tempdir()?;
    // SAFETY: single-threaded w.r.t. this env var within the test.
    unsafe {
        std::env::set_var("XDG_CONFIG_HOME", dir.path());
    }
    let config = Config::load(None)?;
    assert!(config.peers.is_empty());
    Ok(())
}

#[test]
fn user_config_dir_is_read_when_no_explicit_file_given() -> Result<()> {
    let _guard = with_user_config(
        r#"
        [peers.rust]
        command = ["rust-analyzer"]
        file_patterns = ["**/*.rs"]
        "#,
    )?;

    let config = Config::load(None)?;
    assert!(config.peers.contains_key("rust"));
    Ok(())
}

#[test]
fn explicit_file_overrides_user_config_dir() -> Result<()> {
    let _guard = with_user_config(
        r#"
        [peers.rust]
        command = ["rust-analyzer"]
        file_patterns = ["**/*.rs"]
        "#,
    )?;

    let mut explicit = tempfile::NamedTempFile::new()?;
    writeln!(
        explicit,
        r#"
        [peers.python]
        command = ["pylsp"]
        file_patterns = ["**/*.py"]
        "#
    )?;

    let config = Config::load(Some(explicit.path().to_path_buf()))?;
    // The user config dir is loaded first, the explicit file second — both
    // source files declare a `peers` table, so the later source's table
    // wins wholesale for the `peers` key (the `config` crate merges maps
    // key-by-key at the source level, not entry-by-entry across sources).
    assert!(config.peers.contains_key("python"));
    Ok(())
}

#[test]
fn invalid_toml_in_explicit_file_is_an_error() -> Result<()> {
    let dir = tempfile::tempdir()?;
    // SAFETY: single-threaded w.r.t. this env var within the test.
    unsafe {
        std::env::set_var("XDG_CONFIG_HOME", dir.path());
    }

    let mut explicit = tempfile::NamedTempFile::new()?;
    writeln!(explicit, "this is not valid toml {{{{")?;

    let result = Config::load(Some(explicit.path().to_path_buf()));
    assert!(result.is_err());
    Ok(())
}

#[test]
fn peer_config_carries_optional_fields_through_file_loading() -> Result<()> {
    let mut explicit = tempfile::NamedTempFile::new()?;
    writeln!(
        explicit,
        r#"
        [peers.ts]
        command = ["typescript-language-server", "--stdio"]
        file_patterns = ["**/*.ts", "**/*.tsx"]
        root_uri = "file:///workspace/frontend"

        [peers.ts.env]
        NODE_ENV = "development"

        [peers.ts.initialization_options]
        preferences = {{}}
        "#
    )?;

    let dir = tempfile::tempdir()?;
    // SAFETY: single-threaded w.r.t. this env var within the test.
    unsafe {
        std::env::set_var("XDG_CONFIG_HOME", dir.path());
    }

    let config = Config::load(Some(explicit.path().to_path_buf()))
        .context("loading explicit config file")?;
    let peer = config.peers.get("ts").context("peer 'ts' missing")?;
    assert_eq!(peer.file_patterns.len(), 2);
    assert_eq!(peer.root_uri.as_deref(), Some("file:///workspace/frontend"));
    assert_eq!(peer.env.get("NODE_ENV").map(String::as_str), Some("development"));
    assert!(peer.initialization_options.is_some());
    Ok(())
}
