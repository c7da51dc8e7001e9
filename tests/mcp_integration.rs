// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Mark Wells <contact@markwells.dev>

#![deny(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
//! End-to-end integration tests for the MCP-LSP bridge.
//!
//! These spawn the real `lspmux` binary over stdio, pointed at a config
//! file that routes to the `mockls` test peer, and drive it with the
//! MCP wire protocol exactly as a coding agent would.

use anyhow::{Context, Result, anyhow, bail};
use serde_json::{Value, json};
use std::fs;
use std::io::{BufRead, BufReader, Write};
use std::process::{Command, Stdio};
use tempfile::TempDir;

struct Bridge {
    child: std::process::Child,
    stdin: std::process::ChildStdin,
    stdout: BufReader<std::process::ChildStdout>,
    root_dir: TempDir,
}

impl Bridge {
    /// Writes a config routing `**/*.rs` to `mockls` with `extra_args`,
    /// then spawns `lspmux` against a fresh temp project root.
    fn spawn(extra_args: &[&str]) -> Result<Self> {
        let root = tempfile::tempdir()?;
        let config_path = root.path().join("lspmux.toml");
        let mockls = env!("CARGO_BIN_EXE_mockls");
        let mut command_toml = format!("command = [{mockls:?}");
        for arg in extra_args {
            command_toml.push_str(&format!(", {arg:?}"));
        }
        command_toml.push(']');
        fs::write(
            &config_path,
            format!(
                "[peers.mock]\n{command_toml}\nfile_patterns = [\"**/*.rs\"]\n"
            ),
        )?;

        let mut child = Command::new(env!("CARGO_BIN_EXE_lspmux"))
            .arg(root.path())
            .arg("--config")
            .arg(&config_path)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .context("failed to spawn lspmux")?;

        let stdin = child.stdin.take().context("missing stdin")?;
        let stdout = BufReader::new(child.stdout.take().context("missing stdout")?);

        Ok(Self { child, stdin, stdout, root_dir: root })
    }

    fn root(&self) -> &std::path::Path {
        self.root_dir.path()
    }

    fn send(&mut self, value: &Value) -> Result<()> {
        writeln!(self.stdin, "{value}").context("writing to lspmux stdin")?;
        self.stdin.flush().context("flushing lspmux stdin")?;
        Ok(())
    }

    fn recv(&mut self) -> Result<Value> {
        let mut line = String::new();
        self.stdout.read_line(&mut line).context("reading from lspmux stdout")?;
        if line.is_empty() {
            bail!("lspmux closed stdout");
        }
        serde_json::from_str(&line).with_context(|| format!("invalid JSON from lspmux: {line}"))
    }

    fn initialize(&mut self) -> Result<()> {
        self.send(&json!({
            "jsonrpc": "2.0",
            "id": 0,
            "method": "initialize",
            "params": {
                "protocolVersion": "2024-11-05",
                "capabilities": {},
                "clientInfo": {"name": "integration-test", "version": "1.0.0"},
            },
        }))?;
        let response = self.recv()?;
        if response.get("result").is_none() {
            bail!("initialize failed: {response:?}");
        }
        self.send(&json!({"jsonrpc": "2.0", "method": "notifications/initialized"}))?;
        Ok(())
    }

    fn call_tool(&mut self, id: i64, name: &str, arguments: Value) -> Result<Value> {
        self.send(&json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": "tools/call",
            "params": {"name": name, "arguments": arguments},
        }))?;
        self.recv()
    }
}

impl Drop for Bridge {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

fn tool_text(response: &Value) -> Result<&str> {
    response["result"]["content"][0]["text"]
        .as_str()
        .ok_or_else(|| anyhow!("missing content[0].text in {response:?}"))
}

#[test]
fn initialize_reports_server_identity() -> Result<()> {
    let mut bridge = Bridge::spawn(&[])?;
    bridge.send(&json!({
        "jsonrpc": "2.0",
        "id": 1,
        "method": "initialize",
        "params": {
            "protocolVersion": "2024-11-05",
            "capabilities": {},
            "clientInfo": {"name": "test-client", "version": "1.0.0"},
        },
    }))?;

    let response = bridge.recv()?;
    assert_eq!(response["result"]["serverInfo"]["name"], "lspmux");
    assert!(response["result"]["capabilities"]["tools"].is_object());
    Ok(())
}

#[test]
fn tools_list_contains_the_standard_catalog() -> Result<()> {
    let mut bridge = Bridge::spawn(&[])?;
    bridge.initialize()?;

    bridge.send(&json!({"jsonrpc": "2.0", "id": 2, "method": "tools/list"}))?;
    let response = bridge.recv()?;
    let tools = response["result"]["tools"].as_array().context("missing tools array")?;
    let names: Vec<&str> = tools.iter().filter_map(|t| t["name"].as_str()).collect();

    for expected in [
        "goto_definition",
        "goto_type_definition",
        "goto_implementation",
        "goto_declaration",
        "find_references",
        "hover",
        "signature_help",
        "document_symbols",
        "workspace_symbols",
        "code_actions",
        "rename_prepare",
        "rename",
        "call_hierarchy_incoming",
        "call_hierarchy_outgoing",
        "type_hierarchy",
        "open_file",
        "diagnostics",
    ] {
        assert!(names.contains(&expected), "missing tool {expected} in {names:?}");
    }
    Ok(())
}

#[test]
fn hover_round_trips_through_a_real_subprocess() -> Result<()> {
    let mut bridge = Bridge::spawn(&[])?;
    bridge.initialize()?;

    let file = bridge.root().join("main.rs");
    fs::write(&file, "fn greet() {}\ngreet\n")?;

    let response = bridge.call_tool(
        3,
        "hover",
        json!({"file": "main.rs", "line": 2, "col": 1}),
    )?;
    assert_ne!(response["result"]["isError"], json!(true));
    let text = tool_text(&response)?;
    assert!(text.contains("greet"), "expected hover text to mention 'greet', got: {text}");
    Ok(())
}

#[test]
fn goto_definition_resolves_through_mockls() -> Result<()> {
    let mut bridge = Bridge::spawn(&[])?;
    bridge.initialize()?;

    let file = bridge.root().join("main.rs");
    fs::write(&file, "fn greet() {}\ngreet\n")?;

    let response =
        bridge.call_tool(4, "goto_definition", json!({"file": "main.rs", "line": 2, "col": 1}))?;
    assert_ne!(response["result"]["isError"], json!(true));
    let text = tool_text(&response)?;
    assert!(text.contains("main.rs"), "expected definition to point at main.rs, got: {text}");
    assert!(text.contains("\"line\":1"), "expected definition at line 1, got: {text}");
    Ok(())
}

#[test]
fn diagnostics_are_published_and_cached() -> Result<()> {
    let mut bridge = Bridge::spawn(&[])?;
    bridge.initialize()?;

    let file = bridge.root().join("main.rs");
    fs::write(&file, "fn greet() {}\n")?;

    // open_file ensures the document is open, triggering mockls's
    // publishDiagnostics; diagnostics then waits for (or returns) them.
    bridge.call_tool(5, "open_file", json!({"file": "main.rs"}))?;
    let response = bridge.call_tool(6, "diagnostics", json!({"file": "main.rs"}))?;
    assert_ne!(response["result"]["isError"], json!(true));
    let text = tool_text(&response)?;
    assert!(text.contains("mockls"), "expected cached diagnostics from mockls, got: {text}");
    Ok(())
}

#[test]
fn tool_call_against_unmatched_file_is_an_error() -> Result<()> {
    let mut bridge = Bridge::spawn(&[])?;
    bridge.initialize()?;

    let file = bridge.root().join("notes.md");
    fs::write(&file, "no peer handles markdown here\n")?;

    let response = bridge.call_tool(7, "hover", json!({"file": "notes.md", "line": 1, "col": 1}))?;
    assert_eq!(response["result"]["isError"], json!(true));
    Ok(())
}

#[test]
fn unknown_tool_is_an_error() -> Result<()> {
    let mut bridge = Bridge::spawn(&[])?;
    bridge.initialize()?;

    let response = bridge.call_tool(8, "not_a_real_tool", json!({}))?;
    assert_eq!(response["result"]["isError"], json!(true));
    Ok(())
}

#[test]
fn missing_required_argument_is_an_error() -> Result<()> {
    let mut bridge = Bridge::spawn(&[])?;
    bridge.initialize()?;

    // `rename` requires `newName`; omit it.
    let response =
        bridge.call_tool(9, "rename", json!({"file": "main.rs", "line": 1, "col": 1}))?;
    assert_eq!(response["result"]["isError"], json!(true));
    Ok(())
}

#[test]
fn lazy_start_spawns_peer_only_on_first_matching_call() -> Result<()> {
    let mut bridge = Bridge::spawn(&[])?;
    bridge.initialize()?;

    let file = bridge.root().join("a.rs");
    fs::write(&file, "fn a() {}\na\n")?;

    // Nothing has touched the peer yet; a hover on a matching file must
    // succeed, which only happens if the lazy start path works end to end.
    let response = bridge.call_tool(10, "hover", json!({"file": "a.rs", "line": 2, "col": 1}))?;
    assert_ne!(response["result"]["isError"], json!(true));

    // A second file matching the same peer should reuse the started client
    // rather than failing or hanging.
    let file_b = bridge.root().join("b.rs");
    fs::write(&file_b, "fn b() {}\nb\n")?;
    let response_b = bridge.call_tool(11, "hover", json!({"file": "b.rs", "line": 2, "col": 1}))?;
    assert_ne!(response_b["result"]["isError"], json!(true));
    Ok(())
}

#[test]
fn ping_is_answered() -> Result<()> {
    let mut bridge = Bridge::spawn(&[])?;
    bridge.initialize()?;

    bridge.send(&json!({"jsonrpc": "2.0", "id": 12, "method": "ping"}))?;
    let response = bridge.recv()?;
    assert!(response.get("result").is_some());
    Ok(())
}

#[test]
fn request_that_hangs_surfaces_as_an_error_result_not_a_frozen_bridge() -> Result<()> {
    let mut bridge = Bridge::spawn(&["--hang-on", "textDocument/hover"])?;
    bridge.initialize()?;

    let file = bridge.root().join("main.rs");
    fs::write(&file, "fn greet() {}\ngreet\n")?;

    let response = bridge.call_tool(13, "hover", json!({"file": "main.rs", "line": 2, "col": 1}))?;
    assert_eq!(response["result"]["isError"], json!(true));

    // The bridge process itself must still be alive and answer a second,
    // unrelated call — one tool call hanging must never take the bridge down.
    bridge.send(&json!({"jsonrpc": "2.0", "id": 14, "method": "ping"}))?;
    let ping = bridge.recv()?;
    assert!(ping.get("result").is_some());
    Ok(())
}
