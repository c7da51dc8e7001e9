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

//! Translates the fixed MCP tool catalog into LSP requests and back.
//!
//! Every position crossing this boundary is 1-based on the MCP side and
//! 0-based on the LSP wire; the conversion happens here and nowhere else.
//! Every result is canonical JSON, never formatted prose — this bridge is
//! read by an agent, not a human.

use anyhow::{Context, Result, anyhow};
use lsp_types::{
    CallHierarchyIncomingCallsParams, CallHierarchyItem, CallHierarchyOutgoingCallsParams,
    CallHierarchyPrepareParams, CodeActionContext, CodeActionOrCommand, CodeActionParams,
    CompletionParams, Diagnostic, DiagnosticSeverity, DocumentChanges, DocumentFormattingParams,
    DocumentRangeFormattingParams, DocumentSymbol, DocumentSymbolParams, DocumentSymbolResponse,
    Documentation, FormattingOptions, GotoDefinitionParams, GotoDefinitionResponse, Hover,
    HoverContents, HoverParams, Location, LocationLink, MarkedString, OneOf, Position,
    PrepareRenameResponse, Range, ReferenceContext, ReferenceParams, RenameParams, SignatureHelp,
    SignatureHelpParams, SymbolInformation, SymbolKind, TextDocumentIdentifier,
    TextDocumentPositionParams, TypeHierarchyItem, TypeHierarchyPrepareParams,
    TypeHierarchySubtypesParams, TypeHierarchySupertypesParams, Uri, WorkspaceEdit,
    WorkspaceSymbolParams, WorkspaceSymbolResponse,
};
use serde::Deserialize;
use serde_json::{Value, json};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::runtime::Handle;
use tracing::debug;

use crate::lsp::{ClientState, LspClient};
use crate::mcp::{CallToolResult, Tool, ToolHandler};
use crate::multiplexer::Multiplexer;
use crate::path as pathutil;
use crate::registry::ParamShape;

/// Direction for a call-hierarchy fan-out request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CallDirection {
    Incoming,
    Outgoing,
}

/// Which goto-style request to send.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum GotoKind {
    Definition,
    TypeDefinition,
    Implementation,
    Declaration,
}

// -- Tool input shapes, one per parameter shape in the catalog ----------

#[derive(Debug, Deserialize)]
struct PositionInput {
    file: String,
    line: u32,
    col: u32,
}

#[derive(Debug, Deserialize)]
struct FileInput {
    file: String,
}

#[derive(Debug, Deserialize)]
struct DiagnosticsInput {
    #[serde(default)]
    file: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WorkspaceSymbolInput {
    query: String,
}

#[derive(Debug, Deserialize)]
struct CodeActionInput {
    file: String,
    line: u32,
    col: u32,
    end_line: Option<u32>,
    end_col: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct RenameInput {
    file: String,
    line: u32,
    col: u32,
    new_name: String,
}

/// Translates MCP tool calls into LSP requests against a [`Multiplexer`]
/// and normalizes the results back to canonical JSON.
pub struct Dispatcher {
    multiplexer: Multiplexer,
    root: PathBuf,
    runtime: Handle,
}

impl Dispatcher {
    /// Creates a dispatcher over `multiplexer`, resolving relative `file`
    /// inputs against `root` and bridging into async LSP calls via
    /// `runtime`.
    #[must_use]
    pub fn new(multiplexer: Multiplexer, root: PathBuf, runtime: Handle) -> Self {
        Self { multiplexer, root, runtime }
    }

    /// Shuts down every started peer. Called once, at process exit.
    pub async fn shutdown(&self) {
        self.multiplexer.shutdown_all().await;
    }

    fn resolve(&self, file: &str) -> Result<PathBuf> {
        pathutil::resolve(&self.root, file)
    }

    fn display_path(&self, uri: &Uri) -> Result<String> {
        let path = pathutil::uri_to_path(uri)?;
        Ok(pathutil::relative_to(&self.root, &path).to_string_lossy().into_owned())
    }

    async fn ensure_open(&self, path: &Path) -> Result<(Uri, Arc<LspClient>)> {
        let client = self.multiplexer.ensure_client_for_file(path).await?;
        let uri = client.ensure_open(path).await?;
        Ok((uri, client))
    }

    async fn ready_clients(&self) -> Vec<Arc<LspClient>> {
        let mut ready = Vec::new();
        for client in self.multiplexer.all_clients() {
            if client.state().await == ClientState::Ready {
                ready.push(client);
            }
        }
        ready
    }

    // -- Navigation -------------------------------------------------------

    fn handle_goto(&self, arguments: Option<Value>, kind: GotoKind) -> Result<CallToolResult> {
        let input = parse::<PositionInput>(arguments)?;
        let path = self.resolve(&input.file)?;
        let position = wire_position(input.line, input.col)?;

        debug!("goto request ({kind:?}): {}:{}:{}", input.file, input.line, input.col);

        let response = self.runtime.block_on(async {
            let (uri, client) = self.ensure_open(&path).await?;
            let params = GotoDefinitionParams {
                text_document_position_params: TextDocumentPositionParams {
                    text_document: TextDocumentIdentifier { uri },
                    position,
                },
                work_done_progress_params: lsp_types::WorkDoneProgressParams::default(),
                partial_result_params: lsp_types::PartialResultParams::default(),
            };
            match kind {
                GotoKind::Definition => client.definition(params).await,
                GotoKind::TypeDefinition => client.type_definition(params).await,
                GotoKind::Implementation => client.implementation(params).await,
                GotoKind::Declaration => client.declaration(params).await,
            }
        })?;

        CallToolResult::json(&self.normalize_goto_response(response)?).context("serializing goto result")
    }

    fn normalize_goto_response(&self, response: Option<GotoDefinitionResponse>) -> Result<Value> {
        let Some(response) = response else {
            return Ok(Value::Null);
        };
        let locations: Vec<Value> = match response {
            GotoDefinitionResponse::Scalar(loc) => vec![self.location_json(&loc)?],
            GotoDefinitionResponse::Array(locs) => {
                locs.iter().map(|loc| self.location_json(loc)).collect::<Result<_>>()?
            }
            GotoDefinitionResponse::Link(links) => {
                links.iter().map(|link| self.location_link_json(link)).collect::<Result<_>>()?
            }
        };
        Ok(collapse(locations))
    }

    fn location_json(&self, location: &Location) -> Result<Value> {
        Ok(json!({
            "file": self.display_path(&location.uri)?,
            "line": location.range.start.line + 1,
            "col": location.range.start.character + 1,
        }))
    }

    fn location_link_json(&self, link: &LocationLink) -> Result<Value> {
        Ok(json!({
            "file": self.display_path(&link.target_uri)?,
            "line": link.target_selection_range.start.line + 1,
            "col": link.target_selection_range.start.character + 1,
        }))
    }

    fn handle_find_references(&self, arguments: Option<Value>) -> Result<CallToolResult> {
        let input = parse::<PositionInput>(arguments)?;
        let path = self.resolve(&input.file)?;
        let position = wire_position(input.line, input.col)?;

        let locations = self.runtime.block_on(async {
            let (uri, client) = self.ensure_open(&path).await?;
            let params = ReferenceParams {
                text_document_position: TextDocumentPositionParams {
                    text_document: TextDocumentIdentifier { uri },
                    position,
                },
                work_done_progress_params: lsp_types::WorkDoneProgressParams::default(),
                partial_result_params: lsp_types::PartialResultParams::default(),
                context: ReferenceContext { include_declaration: true },
            };
            client.references(params).await
        })?;

        let Some(locations) = locations else {
            return CallToolResult::json(&Value::Null).context("serializing references result");
        };
        let values: Vec<Value> =
            locations.iter().map(|loc| self.location_json(loc)).collect::<Result<_>>()?;
        CallToolResult::json(&collapse(values)).context("serializing references result")
    }

    // -- Inspection --------------------------------------------------------

    fn handle_hover(&self, arguments: Option<Value>) -> Result<CallToolResult> {
        let input = parse::<PositionInput>(arguments)?;
        let path = self.resolve(&input.file)?;
        let position = wire_position(input.line, input.col)?;

        let hover = self.runtime.block_on(async {
            let (uri, client) = self.ensure_open(&path).await?;
            let params = HoverParams {
                text_document_position_params: TextDocumentPositionParams {
                    text_document: TextDocumentIdentifier { uri },
                    position,
                },
                work_done_progress_params: lsp_types::WorkDoneProgressParams::default(),
            };
            client.hover(params).await
        })?;

        CallToolResult::json(&normalize_hover(hover.as_ref())).context("serializing hover result")
    }

    fn handle_signature_help(&self, arguments: Option<Value>) -> Result<CallToolResult> {
        let input = parse::<PositionInput>(arguments)?;
        let path = self.resolve(&input.file)?;
        let position = wire_position(input.line, input.col)?;

        let help = self.runtime.block_on(async {
            let (uri, client) = self.ensure_open(&path).await?;
            let params = SignatureHelpParams {
                text_document_position_params: TextDocumentPositionParams {
                    text_document: TextDocumentIdentifier { uri },
                    position,
                },
                work_done_progress_params: lsp_types::WorkDoneProgressParams::default(),
                context: None,
            };
            client.signature_help(params).await
        })?;

        CallToolResult::json(&normalize_signature_help(help.as_ref()))
            .context("serializing signature help result")
    }

    fn handle_document_symbols(&self, arguments: Option<Value>) -> Result<CallToolResult> {
        let input = parse::<FileInput>(arguments)?;
        let path = self.resolve(&input.file)?;

        let response = self.runtime.block_on(async {
            let (uri, client) = self.ensure_open(&path).await?;
            let params = DocumentSymbolParams {
                text_document: TextDocumentIdentifier { uri },
                work_done_progress_params: lsp_types::WorkDoneProgressParams::default(),
                partial_result_params: lsp_types::PartialResultParams::default(),
            };
            client.document_symbols(params).await
        })?;

        let value = match response {
            None => Value::Null,
            Some(response) => self.normalize_document_symbols(&response)?,
        };
        CallToolResult::json(&value).context("serializing document symbols result")
    }

    fn normalize_document_symbols(&self, response: &DocumentSymbolResponse) -> Result<Value> {
        match response {
            DocumentSymbolResponse::Flat(symbols) => Ok(Value::Array(
                symbols.iter().map(|s| self.symbol_information_json(s)).collect::<Result<_>>()?,
            )),
            DocumentSymbolResponse::Nested(symbols) => Ok(Value::Array(
                symbols.iter().map(nested_symbol_json).collect::<Vec<_>>(),
            )),
        }
    }

    fn symbol_information_json(&self, symbol: &SymbolInformation) -> Result<Value> {
        Ok(json!({
            "name": symbol.name,
            "kind": symbol_kind_name(symbol.kind),
            "file": self.display_path(&symbol.location.uri)?,
            "line": symbol.location.range.start.line + 1,
            "col": symbol.location.range.start.character + 1,
        }))
    }

    fn handle_workspace_symbols(&self, arguments: Option<Value>) -> Result<CallToolResult> {
        let input = parse::<WorkspaceSymbolInput>(arguments)?;

        let responses = self.runtime.block_on(async {
            let clients = self.ready_clients().await;
            let mut handles = Vec::with_capacity(clients.len());
            for client in clients {
                let query = input.query.clone();
                handles.push(tokio::spawn(async move {
                    let params = WorkspaceSymbolParams {
                        query,
                        work_done_progress_params: lsp_types::WorkDoneProgressParams::default(),
                        partial_result_params: lsp_types::PartialResultParams::default(),
                    };
                    client.workspace_symbols(params).await
                }));
            }
            let mut responses = Vec::new();
            for handle in handles {
                if let Ok(Ok(Some(response))) = handle.await {
                    responses.push(response);
                }
            }
            responses
        });

        let mut symbols = Vec::new();
        for response in &responses {
            self.collect_workspace_symbols(response, &mut symbols)?;
        }
        CallToolResult::json(&Value::Array(symbols)).context("serializing workspace symbols result")
    }

    fn collect_workspace_symbols(
        &self,
        response: &WorkspaceSymbolResponse,
        out: &mut Vec<Value>,
    ) -> Result<()> {
        match response {
            WorkspaceSymbolResponse::Flat(symbols) => {
                for symbol in symbols {
                    out.push(self.symbol_information_json(symbol)?);
                }
            }
            WorkspaceSymbolResponse::Nested(symbols) => {
                for symbol in symbols {
                    out.push(match &symbol.location {
                        OneOf::Left(location) => json!({
                            "name": symbol.name,
                            "kind": symbol_kind_name(symbol.kind),
                            "file": self.display_path(&location.uri)?,
                            "line": location.range.start.line + 1,
                            "col": location.range.start.character + 1,
                        }),
                        OneOf::Right(uri_only) => json!({
                            "name": symbol.name,
                            "kind": symbol_kind_name(symbol.kind),
                            "file": self.display_path(&uri_only.uri)?,
                        }),
                    });
                }
            }
        }
        Ok(())
    }

    // -- Refactoring --------------------------------------------------------

    fn handle_code_actions(&self, arguments: Option<Value>) -> Result<CallToolResult> {
        let input = parse::<CodeActionInput>(arguments)?;
        let path = self.resolve(&input.file)?;
        let start = wire_position(input.line, input.col)?;
        let end = match (input.end_line, input.end_col) {
            (Some(line), Some(col)) => wire_position(line, col)?,
            _ => start,
        };

        let actions = self.runtime.block_on(async {
            let (uri, client) = self.ensure_open(&path).await?;
            let params = CodeActionParams {
                text_document: TextDocumentIdentifier { uri },
                range: Range { start, end },
                context: CodeActionContext { diagnostics: Vec::new(), only: None, trigger_kind: None },
                work_done_progress_params: lsp_types::WorkDoneProgressParams::default(),
                partial_result_params: lsp_types::PartialResultParams::default(),
            };
            client.code_actions(params).await
        })?;

        let value = match actions {
            None => Value::Array(Vec::new()),
            Some(actions) => {
                Value::Array(actions.iter().map(|a| self.code_action_json(a)).collect::<Result<_>>()?)
            }
        };
        CallToolResult::json(&value).context("serializing code actions result")
    }

    fn code_action_json(&self, action: &CodeActionOrCommand) -> Result<Value> {
        match action {
            CodeActionOrCommand::Command(command) => {
                Ok(json!({"title": command.title, "command": command.command}))
            }
            CodeActionOrCommand::CodeAction(action) => {
                let edit = action.edit.as_ref().map(|e| self.normalize_workspace_edit(e)).transpose()?;
                Ok(json!({
                    "title": action.title,
                    "kind": action.kind.as_ref().map(|k| k.as_str().to_string()),
                    "isPreferred": action.is_preferred,
                    "edit": edit,
                    "diagnostics": action.diagnostics.as_ref().map(|ds| ds.iter().map(diagnostic_json).collect::<Vec<_>>()),
                }))
            }
        }
    }

    fn handle_rename_prepare(&self, arguments: Option<Value>) -> Result<CallToolResult> {
        let input = parse::<PositionInput>(arguments)?;
        let path = self.resolve(&input.file)?;
        let position = wire_position(input.line, input.col)?;

        let response = self.runtime.block_on(async {
            let (uri, client) = self.ensure_open(&path).await?;
            let params =
                TextDocumentPositionParams { text_document: TextDocumentIdentifier { uri }, position };
            client.prepare_rename(params).await
        })?;

        CallToolResult::json(&normalize_prepare_rename(response.as_ref()))
            .context("serializing rename_prepare result")
    }

    fn handle_rename(&self, arguments: Option<Value>) -> Result<CallToolResult> {
        let input = parse::<RenameInput>(arguments)?;
        let path = self.resolve(&input.file)?;
        let position = wire_position(input.line, input.col)?;

        let edit = self.runtime.block_on(async {
            let (uri, client) = self.ensure_open(&path).await?;
            let params = RenameParams {
                text_document_position: TextDocumentPositionParams {
                    text_document: TextDocumentIdentifier { uri },
                    position,
                },
                new_name: input.new_name,
                work_done_progress_params: lsp_types::WorkDoneProgressParams::default(),
            };
            client.rename(params).await
        })?;

        let value = edit.as_ref().map(|e| self.normalize_workspace_edit(e)).transpose()?;
        CallToolResult::json(&value.unwrap_or(Value::Null)).context("serializing rename result")
    }

    fn normalize_workspace_edit(&self, edit: &WorkspaceEdit) -> Result<Value> {
        let mut changes: std::collections::BTreeMap<String, Vec<Value>> =
            std::collections::BTreeMap::new();

        if let Some(document_changes) = &edit.document_changes {
            match document_changes {
                DocumentChanges::Edits(edits) => {
                    for text_document_edit in edits {
                        let file = self.display_path(&text_document_edit.text_document.uri)?;
                        let entry = changes.entry(file).or_default();
                        for e in &text_document_edit.edits {
                            entry.push(one_of_text_edit_json(e));
                        }
                    }
                }
                DocumentChanges::Operations(ops) => {
                    for op in ops {
                        if let lsp_types::DocumentChangeOperation::Edit(text_document_edit) = op {
                            let file = self.display_path(&text_document_edit.text_document.uri)?;
                            let entry = changes.entry(file).or_default();
                            for e in &text_document_edit.edits {
                                entry.push(one_of_text_edit_json(e));
                            }
                        }
                    }
                }
            }
        } else if let Some(raw_changes) = &edit.changes {
            for (uri, edits) in raw_changes {
                let file = self.display_path(uri)?;
                let entry = changes.entry(file).or_default();
                for e in edits {
                    entry.push(text_edit_json(e.range, &e.new_text));
                }
            }
        }

        Ok(json!({ "changes": changes }))
    }

    // -- Hierarchy --------------------------------------------------------

    fn handle_call_hierarchy(
        &self,
        arguments: Option<Value>,
        direction: CallDirection,
    ) -> Result<CallToolResult> {
        let input = parse::<PositionInput>(arguments)?;
        let path = self.resolve(&input.file)?;
        let position = wire_position(input.line, input.col)?;

        let result = self.runtime.block_on(async {
            let (uri, client) = self.ensure_open(&path).await?;
            let params = CallHierarchyPrepareParams {
                text_document_position_params: TextDocumentPositionParams {
                    text_document: TextDocumentIdentifier { uri },
                    position,
                },
                work_done_progress_params: lsp_types::WorkDoneProgressParams::default(),
            };
            let Some(items) = client.prepare_call_hierarchy(params).await? else {
                return Ok::<_, anyhow::Error>(None);
            };
            let Some(item) = items.into_iter().next() else {
                return Ok(None);
            };

            match direction {
                CallDirection::Incoming => {
                    let params = CallHierarchyIncomingCallsParams {
                        item,
                        work_done_progress_params: lsp_types::WorkDoneProgressParams::default(),
                        partial_result_params: lsp_types::PartialResultParams::default(),
                    };
                    let calls = client.incoming_calls(params).await?;
                    Ok(calls.map(|calls| {
                        calls
                            .into_iter()
                            .map(|c| (c.from, c.from_ranges))
                            .collect::<Vec<_>>()
                    }))
                }
                CallDirection::Outgoing => {
                    let params = CallHierarchyOutgoingCallsParams {
                        item,
                        work_done_progress_params: lsp_types::WorkDoneProgressParams::default(),
                        partial_result_params: lsp_types::PartialResultParams::default(),
                    };
                    let calls = client.outgoing_calls(params).await?;
                    Ok(calls.map(|calls| {
                        calls
                            .into_iter()
                            .map(|c| (c.to, c.to_ranges))
                            .collect::<Vec<_>>()
                    }))
                }
            }
        })?;

        let Some(entries) = result else {
            return CallToolResult::json(&Value::Null).context("serializing call hierarchy result");
        };

        let key = match direction {
            CallDirection::Incoming => "from",
            CallDirection::Outgoing => "to",
        };
        let values: Vec<Value> = entries
            .iter()
            .map(|(item, ranges)| -> Result<Value> {
                Ok(json!({
                    key: self.call_hierarchy_item_json(item)?,
                    "fromRanges": ranges.iter().map(|r| json!({
                        "line": r.start.line + 1,
                        "col": r.start.character + 1,
                    })).collect::<Vec<_>>(),
                }))
            })
            .collect::<Result<_>>()?;

        CallToolResult::json(&Value::Array(values)).context("serializing call hierarchy result")
    }

    fn call_hierarchy_item_json(&self, item: &CallHierarchyItem) -> Result<Value> {
        Ok(json!({
            "name": item.name,
            "kind": symbol_kind_name(item.kind),
            "file": self.display_path(&item.uri)?,
            "line": item.selection_range.start.line + 1,
            "col": item.selection_range.start.character + 1,
        }))
    }

    fn handle_type_hierarchy(&self, arguments: Option<Value>) -> Result<CallToolResult> {
        let input = parse::<PositionInput>(arguments)?;
        let path = self.resolve(&input.file)?;
        let position = wire_position(input.line, input.col)?;

        let result = self.runtime.block_on(async {
            let (uri, client) = self.ensure_open(&path).await?;
            let params = TypeHierarchyPrepareParams {
                text_document_position_params: TextDocumentPositionParams {
                    text_document: TextDocumentIdentifier { uri },
                    position,
                },
                work_done_progress_params: lsp_types::WorkDoneProgressParams::default(),
            };
            let Some(items) = client.prepare_type_hierarchy(params).await? else {
                return Ok::<_, anyhow::Error>(None);
            };
            let Some(item) = items.into_iter().next() else {
                return Ok(None);
            };

            let supertypes_params = TypeHierarchySupertypesParams {
                item: item.clone(),
                work_done_progress_params: lsp_types::WorkDoneProgressParams::default(),
                partial_result_params: lsp_types::PartialResultParams::default(),
            };
            let subtypes_params = TypeHierarchySubtypesParams {
                item: item.clone(),
                work_done_progress_params: lsp_types::WorkDoneProgressParams::default(),
                partial_result_params: lsp_types::PartialResultParams::default(),
            };
            let (supertypes, subtypes) =
                tokio::join!(client.supertypes(supertypes_params), client.subtypes(subtypes_params));

            Ok(Some((item, supertypes?.unwrap_or_default(), subtypes?.unwrap_or_default())))
        })?;

        let Some((item, supertypes, subtypes)) = result else {
            return CallToolResult::json(&Value::Null).context("serializing type hierarchy result");
        };

        let value = json!({
            "item": self.type_hierarchy_item_json(&item)?,
            "supertypes": supertypes.iter().map(|i| self.type_hierarchy_item_json(i)).collect::<Result<Vec<_>>>()?,
            "subtypes": subtypes.iter().map(|i| self.type_hierarchy_item_json(i)).collect::<Result<Vec<_>>>()?,
        });
        CallToolResult::json(&value).context("serializing type hierarchy result")
    }

    fn type_hierarchy_item_json(&self, item: &TypeHierarchyItem) -> Result<Value> {
        Ok(json!({
            "name": item.name,
            "kind": symbol_kind_name(item.kind),
            "file": self.display_path(&item.uri)?,
            "line": item.selection_range.start.line + 1,
            "col": item.selection_range.start.character + 1,
        }))
    }

    // -- Always available --------------------------------------------------

    fn handle_open_file(&self, arguments: Option<Value>) -> Result<CallToolResult> {
        let input = parse::<FileInput>(arguments)?;
        let path = self.resolve(&input.file)?;

        self.runtime.block_on(async { self.ensure_open(&path).await })?;

        CallToolResult::json(&json!({"file": input.file, "opened": true}))
            .context("serializing open_file result")
    }

    fn handle_diagnostics(&self, arguments: Option<Value>) -> Result<CallToolResult> {
        let input = parse::<DiagnosticsInput>(arguments)?;

        if let Some(file) = input.file {
            let path = self.resolve(&file)?;
            let diagnostics = self.runtime.block_on(async {
                let (uri, client) = self.ensure_open(&path).await?;
                Ok::<_, anyhow::Error>(client.wait_for_diagnostics(&uri).await)
            })?;
            let value = Value::Array(diagnostics.iter().map(diagnostic_json).collect());
            return CallToolResult::json(&value).context("serializing diagnostics result");
        }

        let mut all = Vec::new();
        self.runtime.block_on(async {
            for client in self.ready_clients().await {
                for (uri, diagnostics) in client.all_diagnostics().await {
                    if let Ok(file) = self.display_path(&uri) {
                        for diagnostic in &diagnostics {
                            all.push((file.clone(), diagnostic_json(diagnostic)));
                        }
                    }
                }
            }
        });
        let value = Value::Array(
            all.into_iter()
                .map(|(file, mut d)| {
                    if let Value::Object(ref mut map) = d {
                        map.insert("file".to_string(), Value::String(file));
                    }
                    d
                })
                .collect(),
        );
        CallToolResult::json(&value).context("serializing diagnostics result")
    }

    // -- Extension pass-through --------------------------------------------

    fn handle_extension(&self, tool_name: &str, arguments: Option<Value>) -> Result<CallToolResult> {
        let Some((client, extension)) = self.multiplexer.client_for_extension_tool(tool_name) else {
            return Err(anyhow!("unknown tool: {tool_name}"));
        };

        let result = self.runtime.block_on(async {
            let params = match extension.param_shape {
                ParamShape::Document => {
                    let input = parse::<FileInput>(arguments)?;
                    let path = self.resolve(&input.file)?;
                    let (uri, _) = self.ensure_open(&path).await?;
                    serde_json::json!({"textDocument": {"uri": uri.as_str()}})
                }
                ParamShape::DocumentPosition => {
                    let input = parse::<PositionInput>(arguments)?;
                    let path = self.resolve(&input.file)?;
                    let position = wire_position(input.line, input.col)?;
                    let (uri, _) = self.ensure_open(&path).await?;
                    serde_json::json!({
                        "textDocument": {"uri": uri.as_str()},
                        "position": {"line": position.line, "character": position.character},
                    })
                }
                ParamShape::Opaque => arguments.unwrap_or(Value::Null),
            };
            client.send_custom_request(extension.wire_method, params).await
        })?;

        CallToolResult::json(&result).context("serializing extension result")
    }

    // -- Catalog ------------------------------------------------------------

    fn standard_tools(&self) -> Vec<Tool> {
        vec![
            tool("goto_definition", "Go to the definition of the symbol at a position.", position_schema()),
            tool(
                "goto_type_definition",
                "Go to the type definition of the symbol at a position.",
                position_schema(),
            ),
            tool(
                "goto_implementation",
                "Find implementations of the interface or abstract method at a position.",
                position_schema(),
            ),
            tool(
                "goto_declaration",
                "Go to the declaration of the symbol at a position.",
                position_schema(),
            ),
            tool(
                "find_references",
                "Find every reference to the symbol at a position, including its declaration.",
                position_schema(),
            ),
            tool("hover", "Get hover information for the symbol at a position.", position_schema()),
            tool(
                "signature_help",
                "Get function signature help at a position.",
                position_schema(),
            ),
            tool("document_symbols", "List the symbols declared in a file.", file_schema()),
            tool(
                "workspace_symbols",
                "Search for symbols by name across the whole workspace.",
                workspace_symbol_schema(),
            ),
            tool(
                "code_actions",
                "List available code actions (quick fixes, refactorings) for a range.",
                code_action_schema(),
            ),
            tool(
                "rename_prepare",
                "Check whether a rename is valid at a position.",
                position_schema(),
            ),
            tool("rename", "Rename the symbol at a position across the workspace.", rename_schema()),
            tool(
                "call_hierarchy_incoming",
                "List callers of the function at a position.",
                position_schema(),
            ),
            tool(
                "call_hierarchy_outgoing",
                "List calls made by the function at a position.",
                position_schema(),
            ),
            tool(
                "type_hierarchy",
                "List supertypes and subtypes of the type at a position.",
                position_schema(),
            ),
            tool("open_file", "Open a file on its matching peer without querying it.", file_schema()),
            tool(
                "diagnostics",
                "Get diagnostics for a file, or every cached diagnostic if no file is given.",
                diagnostics_schema(),
            ),
        ]
    }

    fn extension_tools(&self) -> Vec<Tool> {
        self.multiplexer
            .all_configured_extensions()
            .into_iter()
            .map(|ext| {
                let schema = match ext.param_shape {
                    ParamShape::Document => file_schema(),
                    ParamShape::DocumentPosition => position_schema(),
                    ParamShape::Opaque => json!({"type": "object"}),
                };
                tool(ext.tool_name, ext.description, schema)
            })
            .collect()
    }
}

impl ToolHandler for Dispatcher {
    fn list_tools(&self) -> Vec<Tool> {
        let mut tools = self.standard_tools();
        tools.extend(self.extension_tools());
        tools
    }

    fn call_tool(&self, name: &str, arguments: Option<Value>) -> Result<CallToolResult> {
        if self.multiplexer.is_empty() {
            return Err(anyhow!(
                "no LSP peers are configured; add at least one peer to the config file (see lspmux's \
                 configuration documentation) and restart the bridge"
            ));
        }

        match name {
            "goto_definition" => self.handle_goto(arguments, GotoKind::Definition),
            "goto_type_definition" => self.handle_goto(arguments, GotoKind::TypeDefinition),
            "goto_implementation" => self.handle_goto(arguments, GotoKind::Implementation),
            "goto_declaration" => self.handle_goto(arguments, GotoKind::Declaration),
            "find_references" => self.handle_find_references(arguments),
            "hover" => self.handle_hover(arguments),
            "signature_help" => self.handle_signature_help(arguments),
            "document_symbols" => self.handle_document_symbols(arguments),
            "workspace_symbols" => self.handle_workspace_symbols(arguments),
            "code_actions" => self.handle_code_actions(arguments),
            "rename_prepare" => self.handle_rename_prepare(arguments),
            "rename" => self.handle_rename(arguments),
            "call_hierarchy_incoming" => self.handle_call_hierarchy(arguments, CallDirection::Incoming),
            "call_hierarchy_outgoing" => self.handle_call_hierarchy(arguments, CallDirection::Outgoing),
            "type_hierarchy" => self.handle_type_hierarchy(arguments),
            "open_file" => self.handle_open_file(arguments),
            "diagnostics" => self.handle_diagnostics(arguments),
            other => self.handle_extension(other, arguments),
        }
    }
}

// -- Free functions -------------------------------------------------------

fn tool(name: &str, description: &str, input_schema: Value) -> Tool {
    Tool { name: name.to_string(), description: Some(description.to_string()), input_schema }
}

fn position_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "file": {"type": "string", "description": "Path to the file, absolute or relative to the project root."},
            "line": {"type": "integer", "description": "1-indexed line number."},
            "col": {"type": "integer", "description": "1-indexed column number."},
        },
        "required": ["file", "line", "col"],
    })
}

fn file_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "file": {"type": "string", "description": "Path to the file, absolute or relative to the project root."},
        },
        "required": ["file"],
    })
}

fn diagnostics_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "file": {"type": "string", "description": "Path to a single file. Omit to get every cached diagnostic."},
        },
        "required": [],
    })
}

fn workspace_symbol_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "query": {"type": "string", "description": "Symbol name or substring to search for."},
        },
        "required": ["query"],
    })
}

fn code_action_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "file": {"type": "string", "description": "Path to the file, absolute or relative to the project root."},
            "line": {"type": "integer", "description": "1-indexed start line number."},
            "col": {"type": "integer", "description": "1-indexed start column number."},
            "endLine": {"type": "integer", "description": "1-indexed end line number. Defaults to `line`."},
            "endCol": {"type": "integer", "description": "1-indexed end column number. Defaults to `col`."},
        },
        "required": ["file", "line", "col"],
    })
}

fn rename_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "file": {"type": "string", "description": "Path to the file, absolute or relative to the project root."},
            "line": {"type": "integer", "description": "1-indexed line number."},
            "col": {"type": "integer", "description": "1-indexed column number."},
            "newName": {"type": "string", "description": "The symbol's new name."},
        },
        "required": ["file", "line", "col", "newName"],
    })
}

fn parse<T: serde::de::DeserializeOwned>(arguments: Option<Value>) -> Result<T> {
    serde_json::from_value(arguments.unwrap_or(Value::Null))
        .with_context(|| format!("invalid arguments for {}", std::any::type_name::<T>()))
}

/// Converts an external 1-based `(line, col)` pair to a 0-based wire
/// [`Position`].
///
/// # Errors
///
/// Returns an error if `line` or `col` is `0`.
fn wire_position(line: u32, col: u32) -> Result<Position> {
    let line = line.checked_sub(1).ok_or_else(|| anyhow!("line must be 1-indexed, got 0"))?;
    let character = col.checked_sub(1).ok_or_else(|| anyhow!("col must be 1-indexed, got 0"))?;
    Ok(Position { line, character })
}

/// Collapses a list of normalized location objects per the catalog's
/// response-shape rule: empty is `null`, one is the object itself, many
/// stays an array.
fn collapse(mut values: Vec<Value>) -> Value {
    match values.len() {
        0 => Value::Null,
        1 => values.remove(0),
        _ => Value::Array(values),
    }
}

fn nested_symbol_json(symbol: &DocumentSymbol) -> Value {
    json!({
        "name": symbol.name,
        "kind": symbol_kind_name(symbol.kind),
        "detail": symbol.detail,
        "range": range_json(symbol.range),
        "selectionRange": range_json(symbol.selection_range),
        "children": symbol.children.as_ref().map(|children| {
            children.iter().map(nested_symbol_json).collect::<Vec<_>>()
        }),
    })
}

fn range_json(range: Range) -> Value {
    json!({
        "start": {"line": range.start.line + 1, "col": range.start.character + 1},
        "end": {"line": range.end.line + 1, "col": range.end.character + 1},
    })
}

fn text_edit_json(range: Range, new_text: &str) -> Value {
    json!({"range": range_json(range), "newText": new_text})
}

fn one_of_text_edit_json(edit: &OneOf<lsp_types::TextEdit, lsp_types::AnnotatedTextEdit>) -> Value {
    match edit {
        OneOf::Left(edit) => text_edit_json(edit.range, &edit.new_text),
        OneOf::Right(edit) => text_edit_json(edit.text_edit.range, &edit.text_edit.new_text),
    }
}

fn diagnostic_json(diagnostic: &Diagnostic) -> Value {
    json!({
        "range": range_json(diagnostic.range),
        "severity": diagnostic.severity.map(severity_name),
        "message": diagnostic.message,
        "source": diagnostic.source,
        "code": diagnostic.code.as_ref().map(|c| match c {
            lsp_types::NumberOrString::Number(n) => json!(n),
            lsp_types::NumberOrString::String(s) => json!(s),
        }),
    })
}

fn severity_name(severity: DiagnosticSeverity) -> &'static str {
    match severity {
        DiagnosticSeverity::ERROR => "error",
        DiagnosticSeverity::WARNING => "warning",
        DiagnosticSeverity::INFORMATION => "information",
        DiagnosticSeverity::HINT => "hint",
        _ => "unknown",
    }
}

fn normalize_hover(hover: Option<&Hover>) -> Value {
    let Some(hover) = hover else {
        return Value::Null;
    };
    let contents = flatten_hover_contents(&hover.contents);
    json!({
        "contents": contents,
        "range": hover.range.map(range_json),
    })
}

fn flatten_hover_contents(contents: &HoverContents) -> String {
    match contents {
        HoverContents::Scalar(marked) => flatten_marked_string(marked),
        HoverContents::Array(marked) => {
            marked.iter().map(flatten_marked_string).collect::<Vec<_>>().join("\n\n")
        }
        HoverContents::Markup(markup) => markup.value.clone(),
    }
}

fn flatten_marked_string(marked: &MarkedString) -> String {
    match marked {
        MarkedString::String(s) => s.clone(),
        MarkedString::LanguageString(ls) => format!("```{}\n{}\n```", ls.language, ls.value),
    }
}

fn flatten_documentation(documentation: &Documentation) -> String {
    match documentation {
        Documentation::String(s) => s.clone(),
        Documentation::MarkupContent(markup) => markup.value.clone(),
    }
}

fn normalize_signature_help(help: Option<&SignatureHelp>) -> Value {
    let Some(help) = help else {
        return Value::Null;
    };
    let signatures: Vec<Value> = help
        .signatures
        .iter()
        .map(|sig| {
            json!({
                "label": sig.label,
                "documentation": sig.documentation.as_ref().map(flatten_documentation),
                "parameters": sig.parameters.as_ref().map(|params| {
                    params.iter().map(|p| json!({
                        "label": match &p.label {
                            lsp_types::ParameterLabel::Simple(s) => json!(s),
                            lsp_types::ParameterLabel::LabelOffsets(offsets) => json!(offsets),
                        },
                        "documentation": p.documentation.as_ref().map(flatten_documentation),
                    })).collect::<Vec<_>>()
                }),
            })
        })
        .collect();
    json!({
        "signatures": signatures,
        "activeSignature": help.active_signature.unwrap_or(0),
        "activeParameter": help.active_parameter.unwrap_or(0),
    })
}

fn normalize_prepare_rename(response: Option<&PrepareRenameResponse>) -> Value {
    match response {
        None => json!({"canRename": false}),
        Some(PrepareRenameResponse::Range(range)) => {
            json!({"canRename": true, "range": range_json(*range)})
        }
        Some(PrepareRenameResponse::RangeWithPlaceholder { range, placeholder }) => {
            json!({"canRename": true, "range": range_json(*range), "placeholder": placeholder})
        }
        Some(PrepareRenameResponse::DefaultBehavior { default_behavior }) => {
            json!({"canRename": *default_behavior})
        }
    }
}

/// Maps a symbol kind to its canonical name, falling back to `Kind(N)`
/// for values outside the LSP-defined range.
fn symbol_kind_name(kind: SymbolKind) -> String {
    let name = match kind {
        SymbolKind::FILE => "File",
        SymbolKind::MODULE => "Module",
        SymbolKind::NAMESPACE => "Namespace",
        SymbolKind::PACKAGE => "Package",
        SymbolKind::CLASS => "Class",
        SymbolKind::METHOD => "Method",
        SymbolKind::PROPERTY => "Property",
        SymbolKind::FIELD => "Field",
        SymbolKind::CONSTRUCTOR => "Constructor",
        SymbolKind::ENUM => "Enum",
        SymbolKind::INTERFACE => "Interface",
        SymbolKind::FUNCTION => "Function",
        SymbolKind::VARIABLE => "Variable",
        SymbolKind::CONSTANT => "Constant",
        SymbolKind::STRING => "String",
        SymbolKind::NUMBER => "Number",
        SymbolKind::BOOLEAN => "Boolean",
        SymbolKind::ARRAY => "Array",
        SymbolKind::OBJECT => "Object",
        SymbolKind::KEY => "Key",
        SymbolKind::NULL => "Null",
        SymbolKind::ENUM_MEMBER => "EnumMember",
        SymbolKind::STRUCT => "Struct",
        SymbolKind::EVENT => "Event",
        SymbolKind::OPERATOR => "Operator",
        SymbolKind::TYPE_PARAMETER => "TypeParameter",
        other => {
            let n = serde_json::to_value(other).ok().and_then(|v| v.as_i64()).unwrap_or(0);
            return format!("Kind({n})");
        }
    };
    name.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use lsp_types::{MarkupContent, MarkupKind};

    #[tokio::test]
    async fn call_tool_with_no_configured_peers_is_an_error() {
        let multiplexer = Multiplexer::new(Config::default(), PathBuf::from("/proj")).unwrap();
        let dispatcher = Dispatcher::new(multiplexer, PathBuf::from("/proj"), Handle::current());
        let err = dispatcher.call_tool("hover", None).unwrap_err();
        assert!(err.to_string().contains("no LSP peers are configured"));
    }

    #[test]
    fn wire_position_converts_one_based_to_zero_based() {
        let pos = wire_position(1, 1).unwrap();
        assert_eq!(pos, Position { line: 0, character: 0 });
    }

    #[test]
    fn wire_position_rejects_zero() {
        assert!(wire_position(0, 1).is_err());
        assert!(wire_position(1, 0).is_err());
    }

    #[test]
    fn collapse_empty_is_null() {
        assert_eq!(collapse(vec![]), Value::Null);
    }

    #[test]
    fn collapse_single_unwraps() {
        assert_eq!(collapse(vec![json!({"a": 1})]), json!({"a": 1}));
    }

    #[test]
    fn collapse_many_stays_array() {
        assert_eq!(collapse(vec![json!(1), json!(2)]), json!([1, 2]));
    }

    #[test]
    fn symbol_kind_name_known() {
        assert_eq!(symbol_kind_name(SymbolKind::FUNCTION), "Function");
        assert_eq!(symbol_kind_name(SymbolKind::STRUCT), "Struct");
    }

    #[test]
    fn symbol_kind_name_unknown_falls_back_to_kind_n() {
        let weird = SymbolKind::from(999);
        assert_eq!(symbol_kind_name(weird), "Kind(999)");
    }

    #[test]
    fn flatten_hover_contents_scalar_string() {
        let contents = HoverContents::Scalar(MarkedString::String("hello".to_string()));
        assert_eq!(flatten_hover_contents(&contents), "hello");
    }

    #[test]
    fn flatten_hover_contents_markup() {
        let contents = HoverContents::Markup(MarkupContent {
            kind: MarkupKind::Markdown,
            value: "**bold**".to_string(),
        });
        assert_eq!(flatten_hover_contents(&contents), "**bold**");
    }

    #[test]
    fn flatten_hover_contents_array_joins_with_blank_line() {
        let contents = HoverContents::Array(vec![
            MarkedString::String("a".to_string()),
            MarkedString::String("b".to_string()),
        ]);
        assert_eq!(flatten_hover_contents(&contents), "a\n\nb");
    }

    #[test]
    fn normalize_prepare_rename_none_cannot_rename() {
        assert_eq!(normalize_prepare_rename(None), json!({"canRename": false}));
    }

    #[test]
    fn normalize_prepare_rename_range_with_placeholder() {
        let response = PrepareRenameResponse::RangeWithPlaceholder {
            range: Range {
                start: Position { line: 0, character: 0 },
                end: Position { line: 0, character: 3 },
            },
            placeholder: "foo".to_string(),
        };
        let value = normalize_prepare_rename(Some(&response));
        assert_eq!(value["canRename"], json!(true));
        assert_eq!(value["placeholder"], json!("foo"));
    }

    #[test]
    fn severity_name_maps_known_values() {
        assert_eq!(severity_name(DiagnosticSeverity::ERROR), "error");
        assert_eq!(severity_name(DiagnosticSeverity::HINT), "hint");
    }
}
