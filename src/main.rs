/*
 * Copyright (C) 2026 Mark Wells Dev
 *
 * This program is free software: you can redistribute it and/or modify
 * it under the terms of the GNU General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * This program is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 * GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License
 * along with this program.  If not, see <https://www.gnu.org/licenses/>.
 */

//! Entry point: loads configuration, builds the multiplexer and
//! dispatcher, and runs the MCP server on stdio until the client
//! disconnects or a shutdown signal arrives.

use anyhow::{Context, Result};
use clap::Parser;
use lspmux::config::Config;
use lspmux::dispatcher::Dispatcher;
use lspmux::mcp::McpServer;
use lspmux::multiplexer::Multiplexer;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

/// Bridges MCP tool calls to one or more LSP peers over a single stdio
/// transport.
#[derive(Parser, Debug)]
#[command(name = "lspmux", version = env!("LSPMUX_VERSION"))]
struct Args {
    /// Project root. Relative `file` arguments in tool calls resolve
    /// against this directory.
    #[arg(default_value = ".")]
    root: PathBuf,

    /// Path to a config file, overriding the default discovery chain.
    #[arg(long)]
    config: Option<PathBuf>,
}

fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let root = args
        .root
        .canonicalize()
        .with_context(|| format!("project root '{}' does not exist", args.root.display()))?;

    let config = Config::load(args.config).context("failed to load configuration")?;
    if config.peers.is_empty() {
        warn!(
            "no peers configured; tool calls will fail with a guidance message until a config file declares at least one"
        );
    }

    let runtime = tokio::runtime::Runtime::new().context("failed to start the async runtime")?;
    runtime.block_on(run(config, root))
}

async fn run(config: Config, root: PathBuf) -> Result<()> {
    let multiplexer =
        Multiplexer::new(config, root.clone()).context("failed to build the LSP multiplexer")?;
    let dispatcher = Arc::new(Dispatcher::new(multiplexer, root, tokio::runtime::Handle::current()));

    let server_dispatcher = dispatcher.clone();
    let server_task = tokio::task::spawn_blocking(move || {
        let mut server = McpServer::new(server_dispatcher);
        server.run()
    });

    tokio::select! {
        result = server_task => {
            result.context("MCP server task panicked")?.context("MCP server exited with an error")?;
        }
        () = shutdown_signal() => {
            info!("shutdown signal received, stopping LSP peers");
        }
    }

    dispatcher.shutdown().await;
    Ok(())
}

/// Resolves once SIGINT or (on Unix) SIGTERM arrives.
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        let Ok(mut terminate) = signal(SignalKind::terminate()) else {
            warn!("failed to install SIGTERM handler, watching SIGINT only");
            let _ = tokio::signal::ctrl_c().await;
            return;
        };

        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = terminate.recv() => {}
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
