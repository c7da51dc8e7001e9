// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Mark Wells <contact@markwells.dev>

//! Static registry mapping a command-line substring to the non-standard
//! LSP methods that peer exposes, surfaced as MCP tools.
//!
//! This table is pure data — adding support for a new peer's extension
//! methods means adding a row here, not writing new dispatch code.

/// How an extension's params are built from the validated tool input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamShape {
    /// `{textDocument: {uri}}`
    Document,
    /// `{textDocument: {uri}, position: {line, character}}`
    DocumentPosition,
    /// The validated input object is forwarded verbatim.
    Opaque,
}

/// Descriptor for a single per-peer protocol extension.
#[derive(Debug, Clone, Copy)]
pub struct Extension {
    /// Substring matched against a peer's `command[0]` (and full command
    /// line) to decide whether this extension applies.
    pub command_match: &'static str,
    /// The MCP tool name this extension is surfaced as.
    pub tool_name: &'static str,
    /// The LSP wire method invoked via `sendCustomRequest`.
    pub wire_method: &'static str,
    /// How to shape the request params.
    pub param_shape: ParamShape,
    /// Human-readable description for the MCP tool catalog.
    pub description: &'static str,
}

/// The compile-time extension table.
pub static EXTENSIONS: &[Extension] = &[
    Extension {
        command_match: "rust-analyzer",
        tool_name: "rust_analyzer_view_syntax_tree",
        wire_method: "rust-analyzer/viewSyntaxTree",
        param_shape: ParamShape::Document,
        description: "Render the rust-analyzer syntax tree for a file.",
    },
    Extension {
        command_match: "rust-analyzer",
        tool_name: "rust_analyzer_expand_macro",
        wire_method: "rust-analyzer/expandMacro",
        param_shape: ParamShape::DocumentPosition,
        description: "Expand the macro invocation at a position.",
    },
    Extension {
        command_match: "ruby-lsp",
        tool_name: "ruby_discover_tests",
        wire_method: "rubyLsp/discoverTests",
        param_shape: ParamShape::Document,
        description: "Discover test cases declared in a Ruby file.",
    },
    Extension {
        command_match: "gopls",
        tool_name: "gopls_list_known_packages",
        wire_method: "gopls/listKnownPackages",
        param_shape: ParamShape::Opaque,
        description: "List packages gopls knows about, importable or not.",
    },
];

/// Returns every extension whose `command_match` appears in `command`.
#[must_use]
pub fn extensions_for_command(command: &[String]) -> Vec<&'static Extension> {
    let joined = command.join(" ");
    EXTENSIONS
        .iter()
        .filter(|ext| joined.contains(ext.command_match))
        .collect()
}

/// Looks up a single extension by its MCP tool name among the extensions
/// applicable to `command`.
#[must_use]
pub fn extension_for_tool(command: &[String], tool_name: &str) -> Option<&'static Extension> {
    extensions_for_command(command)
        .into_iter()
        .find(|ext| ext.tool_name == tool_name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_by_command_substring() {
        let command = vec!["rust-analyzer".to_string()];
        let exts = extensions_for_command(&command);
        assert_eq!(exts.len(), 2);
        assert!(exts.iter().any(|e| e.tool_name == "rust_analyzer_view_syntax_tree"));
    }

    #[test]
    fn no_match_for_unknown_command() {
        let command = vec!["clangd".to_string()];
        let exts = extensions_for_command(&command);
        assert!(exts.is_empty());
    }

    #[test]
    fn extension_for_tool_finds_by_name() {
        let command = vec!["/usr/bin/ruby-lsp".to_string()];
        let ext = extension_for_tool(&command, "ruby_discover_tests");
        assert!(ext.is_some());
        assert_eq!(ext.unwrap().wire_method, "rubyLsp/discoverTests");
    }

    #[test]
    fn extension_for_tool_none_when_tool_not_served_by_command() {
        let command = vec!["rust-analyzer".to_string()];
        assert!(extension_for_tool(&command, "ruby_discover_tests").is_none());
    }
}
