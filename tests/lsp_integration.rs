// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Mark Wells <contact@markwells.dev>

#![deny(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
//! Integration tests for [`lspmux::lsp::LspClient`] against the `mockls`
//! test peer, exercising the real subprocess/stdio transport without
//! depending on any real language server being installed.

use anyhow::{Context, Result};
use lspmux::config::PeerConfig;
use lspmux::lsp::{ClientState, LspClient};
use std::collections::HashMap;
use std::fs;
use tempfile::tempdir;

fn mockls_config(extra_args: &[&str]) -> PeerConfig {
    let mut command = vec![env!("CARGO_BIN_EXE_mockls").to_string()];
    command.extend(extra_args.iter().map(|s| (*s).to_string()));
    PeerConfig {
        command,
        file_patterns: vec!["**/*.rs".to_string()],
        initialization_options: None,
        root_uri: None,
        env: HashMap::new(),
    }
}

#[tokio::test]
async fn start_reaches_ready_and_negotiates_defaults() -> Result<()> {
    let dir = tempdir()?;
    let client = LspClient::new("mockls".to_string(), mockls_config(&[]), dir.path().to_path_buf());

    assert_eq!(client.state().await, ClientState::Idle);
    client.start().await?;
    assert_eq!(client.state().await, ClientState::Ready);

    client.shutdown().await?;
    assert_eq!(client.state().await, ClientState::Dead);
    Ok(())
}

#[tokio::test]
async fn dead_client_never_restarts() -> Result<()> {
    let dir = tempdir()?;
    let client = LspClient::new("mockls".to_string(), mockls_config(&[]), dir.path().to_path_buf());

    client.start().await?;
    client.shutdown().await?;
    assert_eq!(client.state().await, ClientState::Dead);

    // A second start() attempt against a Dead client must not spawn a new
    // process — it returns an error instead of silently recovering.
    assert!(client.start().await.is_err());
    assert_eq!(client.state().await, ClientState::Dead);
    Ok(())
}

#[tokio::test]
async fn hover_round_trips_through_the_real_transport() -> Result<()> {
    let dir = tempdir()?;
    let file_path = dir.path().join("main.rs");
    fs::write(&file_path, "fn greet() {}\ngreet\n")?;

    let client = LspClient::new("mockls".to_string(), mockls_config(&[]), dir.path().to_path_buf());
    client.start().await?;

    let uri = client.ensure_open(&file_path).await?;
    let hover = client
        .hover(lsp_types::HoverParams {
            text_document_position_params: lsp_types::TextDocumentPositionParams {
                text_document: lsp_types::TextDocumentIdentifier { uri },
                position: lsp_types::Position { line: 1, character: 0 },
            },
            work_done_progress_params: lsp_types::WorkDoneProgressParams::default(),
        })
        .await?
        .context("mockls returned no hover for a word it should resolve")?;

    let lsp_types::HoverContents::Markup(markup) = hover.contents else {
        panic!("expected markup hover contents from mockls");
    };
    assert!(markup.value.contains("greet"));

    client.shutdown().await?;
    Ok(())
}

#[tokio::test]
async fn diagnostics_are_published_on_open_and_cached() -> Result<()> {
    let dir = tempdir()?;
    let file_path = dir.path().join("main.rs");
    fs::write(&file_path, "fn greet() {}\n")?;

    let client = LspClient::new("mockls".to_string(), mockls_config(&[]), dir.path().to_path_buf());
    client.start().await?;

    let uri = client.ensure_open(&file_path).await?;
    let diagnostics = client.wait_for_diagnostics(&uri).await;
    assert!(!diagnostics.is_empty());
    assert_eq!(diagnostics[0].source.as_deref(), Some("mockls"));

    client.shutdown().await?;
    Ok(())
}

#[tokio::test]
async fn hang_on_method_surfaces_as_a_request_timeout() -> Result<()> {
    let dir = tempdir()?;
    let file_path = dir.path().join("main.rs");
    fs::write(&file_path, "fn greet() {}\n")?;

    let client = LspClient::new(
        "mockls".to_string(),
        mockls_config(&["--hang-on", "textDocument/hover"]),
        dir.path().to_path_buf(),
    );
    client.start().await?;
    let uri = client.ensure_open(&file_path).await?;

    let result = tokio::time::timeout(
        std::time::Duration::from_secs(2),
        client.hover(lsp_types::HoverParams {
            text_document_position_params: lsp_types::TextDocumentPositionParams {
                text_document: lsp_types::TextDocumentIdentifier { uri },
                position: lsp_types::Position { line: 0, character: 0 },
            },
            work_done_progress_params: lsp_types::WorkDoneProgressParams::default(),
        }),
    )
    .await;

    assert!(result.is_err(), "expected the hover call to still be pending after 2s");
    client.shutdown().await?;
    Ok(())
}

#[tokio::test]
async fn crashed_peer_is_observed_as_dead() -> Result<()> {
    let dir = tempdir()?;
    let client = LspClient::new(
        "mockls".to_string(),
        mockls_config(&["--drop-after", "1"]),
        dir.path().to_path_buf(),
    );
    client.start().await?;

    // The one response mockls sends before exiting is the `initialize`
    // reply itself, so the peer is already gone by the time we observe it.
    tokio::time::sleep(std::time::Duration::from_millis(200)).await;
    assert_eq!(client.state().await, ClientState::Dead);
    Ok(())
}
