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

//! lspmux bridges the Model Context Protocol (MCP) to one or more Language
//! Server Protocol (LSP) peers over a single stdio transport.
//!
//! A coding agent issues MCP tool calls naming language-aware operations;
//! the bridge selects the right LSP peer for each referenced file, spawns
//! and initializes it lazily, keeps documents synchronized, and translates
//! coordinates and payloads in both directions.

/// Configuration value: named peers, glob patterns, init options, env.
pub mod config;
/// The tool dispatcher: MCP tool catalog, validation, coordinate translation.
pub mod dispatcher;
/// LSP client, wire protocol, and diagnostics cache.
pub mod lsp;
/// MCP server implementation and type definitions.
pub mod mcp;
/// Multiplexer: client selection, lazy startup, fan-out.
pub mod multiplexer;
/// Path and language-id utilities.
pub mod path;
/// Static registry of per-peer protocol extensions.
pub mod registry;
