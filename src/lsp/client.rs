// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Mark Wells <contact@markwells.dev>

//! A single LSP peer: its subprocess, wire protocol, open documents, and
//! lifecycle state machine (`Idle` -> `Starting` -> `Ready` -> `Stopping`
//! -> `Dead`).
//!
//! A client never restarts itself once `Dead` — that decision belongs to
//! whatever routes work to clients, and the answer there is "never".

use anyhow::{Context, Result, anyhow};
use bytes::BytesMut;
use lsp_types::{
    CallHierarchyClientCapabilities, CallHierarchyIncomingCall, CallHierarchyIncomingCallsParams,
    CallHierarchyItem, CallHierarchyOutgoingCall, CallHierarchyOutgoingCallsParams,
    CallHierarchyPrepareParams, ClientCapabilities, CodeActionClientCapabilities,
    CodeActionParams, CodeActionResponse, CompletionParams, CompletionResponse, DiagnosticTag,
    DidChangeTextDocumentParams, DidCloseTextDocumentParams, DidOpenTextDocumentParams,
    DidSaveTextDocumentParams, DocumentFormattingParams, DocumentRangeFormattingParams,
    DocumentSymbolClientCapabilities, DocumentSymbolParams, DocumentSymbolResponse,
    GotoCapability, GotoDefinitionParams, GotoDefinitionResponse, Hover, HoverClientCapabilities,
    HoverParams, InitializeParams, InitializeResult, InitializedParams, Location, MarkupKind,
    PositionEncodingKind, PrepareRenameResponse, PublishDiagnosticsClientCapabilities,
    PublishDiagnosticsParams, ReferenceClientCapabilities, ReferenceParams, RenameClientCapabilities,
    RenameParams, SignatureHelp, SignatureHelpClientCapabilities, SignatureHelpParams,
    SignatureInformationSettings, TagSupport, TextDocumentClientCapabilities,
    TextDocumentContentChangeEvent, TextDocumentIdentifier, TextDocumentItem,
    TextDocumentPositionParams, TextDocumentSyncClientCapabilities, TextEdit,
    TypeHierarchyClientCapabilities, TypeHierarchyItem, TypeHierarchyPrepareParams,
    TypeHierarchySubtypesParams, TypeHierarchySupertypesParams, Uri, VersionedTextDocumentIdentifier,
    WorkspaceClientCapabilities, WorkspaceEdit, WorkspaceFolder, WorkspaceSymbolClientCapabilities,
    WorkspaceSymbolParams, WorkspaceSymbolResponse,
};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::{Mutex, oneshot};
use tracing::{debug, error, trace, warn};

use super::diagnostics::DiagnosticsCache;
use super::protocol::{self, NotificationMessage, RequestId, RequestMessage, ResponseMessage};
use crate::config::PeerConfig;
use crate::path as pathutil;

/// Default timeout for an individual LSP request.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

type Pending = Arc<Mutex<HashMap<RequestId, oneshot::Sender<ResponseMessage>>>>;

/// Lifecycle state of an [`LspClient`], observable from the outside.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
    /// No subprocess has been spawned yet.
    Idle,
    /// The subprocess has been spawned and the `initialize` handshake is
    /// in flight.
    Starting,
    /// The handshake completed; the peer accepts requests.
    Ready,
    /// A graceful `shutdown`/`exit` sequence is in progress.
    Stopping,
    /// The peer's connection is gone. Terminal — never restarted.
    Dead,
}

struct OpenDoc {
    language_id: &'static str,
    version: i32,
    text: String,
}

/// Everything that exists only while the subprocess is alive.
struct Running {
    stdin: Arc<Mutex<ChildStdin>>,
    pending: Pending,
    next_id: Arc<AtomicI64>,
    alive: Arc<AtomicBool>,
    encoding: PositionEncodingKind,
    _reader_handle: tokio::task::JoinHandle<()>,
    _child: Child,
}

enum Phase {
    Idle,
    Starting,
    Ready(Running),
    Stopping,
    Dead,
}

/// A single configured LSP peer and its subprocess lifecycle.
pub struct LspClient {
    /// The peer's configured name, used in logs and error messages.
    pub name: String,
    config: PeerConfig,
    root: PathBuf,
    phase: Mutex<Phase>,
    open_docs: Mutex<HashMap<Uri, OpenDoc>>,
    diagnostics: Arc<DiagnosticsCache>,
}

impl LspClient {
    /// Creates a client in the `Idle` state. No subprocess is spawned
    /// until [`Self::start`] is called.
    #[must_use]
    pub fn new(name: String, config: PeerConfig, root: PathBuf) -> Self {
        Self {
            name,
            config,
            root,
            phase: Mutex::new(Phase::Idle),
            open_docs: Mutex::new(HashMap::new()),
            diagnostics: Arc::new(DiagnosticsCache::new()),
        }
    }

    /// Returns the peer's current lifecycle state, lazily observing a
    /// dead subprocess connection.
    pub async fn state(&self) -> ClientState {
        let mut phase = self.phase.lock().await;
        if let Phase::Ready(running) = &*phase {
            if !running.alive.load(Ordering::SeqCst) {
                *phase = Phase::Dead;
                return ClientState::Dead;
            }
            return ClientState::Ready;
        }
        match &*phase {
            Phase::Idle => ClientState::Idle,
            Phase::Starting => ClientState::Starting,
            Phase::Stopping => ClientState::Stopping,
            Phase::Dead => ClientState::Dead,
            Phase::Ready(_) => unreachable!("handled above"),
        }
    }

    /// Returns the patterns this peer's configuration is routed by.
    #[must_use]
    pub fn file_patterns(&self) -> &[String] {
        &self.config.file_patterns
    }

    /// Returns the command this peer was configured with, e.g. for
    /// extension-table lookups.
    #[must_use]
    pub fn command(&self) -> &[String] {
        &self.config.command
    }

    /// Spawns the peer's subprocess and performs the `initialize`
    /// handshake, if it hasn't happened already. A peer that has died is
    /// never restarted.
    ///
    /// # Errors
    ///
    /// Returns an error if the peer is `Dead` or `Stopping`, or if
    /// spawning or initializing the subprocess fails (in which case the
    /// client moves to `Dead`).
    pub async fn start(&self) -> Result<()> {
        {
            let mut phase = self.phase.lock().await;
            match &*phase {
                Phase::Ready(_) | Phase::Starting => return Ok(()),
                Phase::Dead => {
                    return Err(anyhow!("peer '{}' is dead and will not be restarted", self.name));
                }
                Phase::Stopping => return Err(anyhow!("peer '{}' is shutting down", self.name)),
                Phase::Idle => {}
            }
            *phase = Phase::Starting;
        }

        match self.spawn_and_initialize().await {
            Ok(running) => {
                *self.phase.lock().await = Phase::Ready(running);
                Ok(())
            }
            Err(e) => {
                *self.phase.lock().await = Phase::Dead;
                Err(e)
            }
        }
    }

    async fn spawn_and_initialize(&self) -> Result<Running> {
        let program = self.config.command.first().context("peer command is empty")?;
        let args = &self.config.command[1..];

        let mut command = Command::new(program);
        command.args(args).stdin(Stdio::piped()).stdout(Stdio::piped()).stderr(Stdio::inherit());
        for (key, value) in &self.config.env {
            command.env(key, value);
        }

        let mut child = command
            .spawn()
            .with_context(|| format!("failed to spawn peer '{}' ({program})", self.name))?;

        let stdin = child.stdin.take().context("stdin not captured")?;
        let stdout = child.stdout.take().context("stdout not captured")?;

        let stdin = Arc::new(Mutex::new(stdin));
        let pending: Pending = Arc::new(Mutex::new(HashMap::new()));
        let next_id = Arc::new(AtomicI64::new(1));
        let alive = Arc::new(AtomicBool::new(true));

        let reader_handle = tokio::spawn(Self::reader_task(
            stdin.clone(),
            stdout,
            pending.clone(),
            self.diagnostics.clone(),
            alive.clone(),
            self.name.clone(),
        ));

        let root_uri = self.root_uri()?;
        let params = InitializeParams {
            process_id: Some(std::process::id()),
            capabilities: Self::client_capabilities(),
            workspace_folders: Some(vec![WorkspaceFolder {
                uri: root_uri.clone(),
                name: self
                    .root
                    .file_name()
                    .map(|s| s.to_string_lossy().to_string())
                    .unwrap_or_else(|| "workspace".to_string()),
            }]),
            root_uri: Some(root_uri),
            initialization_options: self.config.initialization_options.clone(),
            ..Default::default()
        };

        let result: InitializeResult =
            Self::raw_request(&stdin, &pending, &next_id, "initialize", params).await?;

        let encoding = result.capabilities.position_encoding.clone().unwrap_or_else(|| {
            debug!("peer '{}' did not negotiate a position encoding, defaulting to UTF-16", self.name);
            PositionEncodingKind::UTF16
        });

        Self::raw_notify(&stdin, "initialized", InitializedParams {}).await?;

        Ok(Running {
            stdin,
            pending,
            next_id,
            alive,
            encoding,
            _reader_handle: reader_handle,
            _child: child,
        })
    }

    /// Builds the fixed client capability set declared on every
    /// `initialize` request: full-text sync with `didSave`, markdown-first
    /// hover, link-less goto requests, hierarchical document symbols,
    /// rename with prepare support, and diagnostics with related
    /// information and the `Unnecessary`/`Deprecated` tags. No per-peer
    /// negotiation happens beyond this fixed set.
    fn client_capabilities() -> ClientCapabilities {
        ClientCapabilities {
            workspace: Some(WorkspaceClientCapabilities {
                workspace_folders: Some(true),
                symbol: Some(WorkspaceSymbolClientCapabilities::default()),
                ..Default::default()
            }),
            text_document: Some(TextDocumentClientCapabilities {
                synchronization: Some(TextDocumentSyncClientCapabilities {
                    dynamic_registration: Some(false),
                    will_save: Some(false),
                    will_save_wait_until: Some(false),
                    did_save: Some(true),
                }),
                hover: Some(HoverClientCapabilities {
                    dynamic_registration: Some(false),
                    content_format: Some(vec![MarkupKind::Markdown, MarkupKind::PlainText]),
                }),
                definition: Some(GotoCapability { dynamic_registration: Some(false), link_support: Some(false) }),
                type_definition: Some(GotoCapability {
                    dynamic_registration: Some(false),
                    link_support: Some(false),
                }),
                implementation: Some(GotoCapability {
                    dynamic_registration: Some(false),
                    link_support: Some(false),
                }),
                declaration: Some(GotoCapability {
                    dynamic_registration: Some(false),
                    link_support: Some(false),
                }),
                references: Some(ReferenceClientCapabilities { dynamic_registration: Some(false) }),
                signature_help: Some(SignatureHelpClientCapabilities {
                    dynamic_registration: Some(false),
                    signature_information: Some(SignatureInformationSettings {
                        documentation_format: Some(vec![MarkupKind::Markdown]),
                        parameter_information: None,
                        active_parameter_support: Some(true),
                    }),
                    context_support: Some(true),
                }),
                document_symbol: Some(DocumentSymbolClientCapabilities {
                    dynamic_registration: Some(false),
                    symbol_kind: None,
                    hierarchical_document_symbol_support: Some(true),
                    tag_support: None,
                    label_support: Some(true),
                }),
                code_action: Some(CodeActionClientCapabilities::default()),
                rename: Some(RenameClientCapabilities {
                    dynamic_registration: Some(false),
                    prepare_support: Some(true),
                    prepare_support_default_behavior: None,
                    honors_change_annotations: Some(false),
                }),
                publish_diagnostics: Some(PublishDiagnosticsClientCapabilities {
                    related_information: Some(true),
                    tag_support: Some(TagSupport {
                        value_set: vec![DiagnosticTag::UNNECESSARY, DiagnosticTag::DEPRECATED],
                    }),
                    version_support: Some(false),
                    code_description_support: Some(true),
                    data_support: Some(true),
                }),
                call_hierarchy: Some(CallHierarchyClientCapabilities { dynamic_registration: Some(false) }),
                type_hierarchy: Some(TypeHierarchyClientCapabilities { dynamic_registration: Some(false) }),
                ..Default::default()
            }),
            general: Some(lsp_types::GeneralClientCapabilities {
                position_encodings: Some(vec![PositionEncodingKind::UTF8, PositionEncodingKind::UTF16]),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    fn root_uri(&self) -> Result<Uri> {
        if let Some(explicit) = &self.config.root_uri {
            return explicit
                .parse()
                .map_err(|e| anyhow!("invalid configured root_uri '{explicit}': {e}"));
        }
        pathutil::path_to_uri(&self.root)
    }

    /// Background task that reads LSP messages from `stdout` and routes
    /// responses to pending requests, publishes diagnostics, and answers
    /// unsolicited server-to-client requests with `MethodNotFound`.
    async fn reader_task(
        stdin: Arc<Mutex<ChildStdin>>,
        stdout: ChildStdout,
        pending: Pending,
        diagnostics: Arc<DiagnosticsCache>,
        alive: Arc<AtomicBool>,
        name: String,
    ) {
        let mut reader = BufReader::new(stdout);
        let mut buffer = BytesMut::with_capacity(8192);

        loop {
            let mut temp = [0u8; 4096];
            match reader.read(&mut temp).await {
                Ok(0) => {
                    debug!("peer '{name}' closed stdout");
                    break;
                }
                Ok(n) => buffer.extend_from_slice(&temp[..n]),
                Err(e) => {
                    error!("error reading from peer '{name}': {e}");
                    break;
                }
            }

            while let Ok(Some(message_str)) = protocol::try_parse_message(&mut buffer) {
                trace!("peer '{name}' -> {message_str}");

                let value: serde_json::Value = match serde_json::from_str(&message_str) {
                    Ok(v) => v,
                    Err(e) => {
                        warn!("peer '{name}' sent invalid JSON: {e}");
                        continue;
                    }
                };

                if let Some(method) = value.get("method").and_then(|m| m.as_str()) {
                    if let Some(id) = value.get("id") {
                        debug!("peer '{name}' sent unsolicited request: {method} (id: {id})");
                        let response = ResponseMessage {
                            jsonrpc: "2.0".to_string(),
                            id: Some(
                                serde_json::from_value(id.clone()).unwrap_or(RequestId::Number(0)),
                            ),
                            result: None,
                            error: Some(protocol::ResponseError {
                                code: -32601,
                                message: format!("method '{method}' not supported by client"),
                                data: None,
                            }),
                        };
                        if let Err(e) = Self::send_message(&stdin, &response).await {
                            warn!("failed to answer peer '{name}' request {method}: {e}");
                        }
                    } else if let Ok(notification) =
                        serde_json::from_value::<NotificationMessage>(value)
                    {
                        Self::handle_notification(&notification, &diagnostics, &name).await;
                    }
                } else if value.get("id").is_some() {
                    if let Ok(response) = serde_json::from_value::<ResponseMessage>(value)
                        && let Some(id) = &response.id
                    {
                        let mut pending = pending.lock().await;
                        if let Some(sender) = pending.remove(id) {
                            let _ = sender.send(response);
                        } else {
                            warn!("peer '{name}' responded to unknown request id {id:?}");
                        }
                    }
                } else {
                    warn!("peer '{name}' sent an unrecognized message: {message_str}");
                }
            }
        }

        alive.store(false, Ordering::SeqCst);
        warn!("peer '{name}' connection lost");
    }

    async fn handle_notification(
        notification: &NotificationMessage,
        diagnostics: &DiagnosticsCache,
        name: &str,
    ) {
        match notification.method.as_str() {
            "textDocument/publishDiagnostics" => {
                match serde_json::from_value::<PublishDiagnosticsParams>(
                    notification.params.clone(),
                ) {
                    Ok(params) => {
                        debug!(
                            "peer '{name}' published {} diagnostics for {}",
                            params.diagnostics.len(),
                            params.uri.as_str()
                        );
                        diagnostics.publish(params.uri, params.diagnostics).await;
                    }
                    Err(e) => warn!("peer '{name}' sent malformed publishDiagnostics: {e}"),
                }
            }
            "window/logMessage" | "window/showMessage" => {
                if let Some(message) = notification.params.get("message").and_then(|m| m.as_str())
                {
                    debug!("peer '{name}': {message}");
                }
            }
            other => {
                trace!("peer '{name}' ignoring notification {other}: {}", notification.params);
            }
        }
    }

    async fn send_message<T: serde::Serialize>(
        stdin: &Arc<Mutex<ChildStdin>>,
        message: &T,
    ) -> Result<()> {
        let body = serde_json::to_string(message)?;
        let header = format!("Content-Length: {}\r\n\r\n", body.len());

        let mut stdin = stdin.lock().await;
        stdin.write_all(header.as_bytes()).await?;
        stdin.write_all(body.as_bytes()).await?;
        stdin.flush().await?;
        Ok(())
    }

    async fn raw_request<P: serde::Serialize, R: serde::de::DeserializeOwned>(
        stdin: &Arc<Mutex<ChildStdin>>,
        pending: &Pending,
        next_id: &AtomicI64,
        method: &str,
        params: P,
    ) -> Result<R> {
        let id = RequestId::Number(next_id.fetch_add(1, Ordering::SeqCst));
        let request = RequestMessage {
            jsonrpc: "2.0".to_string(),
            id: id.clone(),
            method: method.to_string(),
            params: serde_json::to_value(params)?,
        };

        let (tx, rx) = oneshot::channel();
        pending.lock().await.insert(id.clone(), tx);

        Self::send_message(stdin, &request).await?;

        let response = match tokio::time::timeout(REQUEST_TIMEOUT, rx).await {
            Ok(Ok(response)) => response,
            Ok(Err(_)) => return Err(anyhow!("LSP server closed connection")),
            Err(_) => {
                pending.lock().await.remove(&id);
                return Err(anyhow!("LSP request '{method}' timed out after {REQUEST_TIMEOUT:?}"));
            }
        };

        if let Some(error) = response.error {
            return Err(anyhow!("LSP error {}: {}", error.code, error.message));
        }

        let result = response.result.unwrap_or(serde_json::Value::Null);
        serde_json::from_value(result).context("failed to parse LSP response")
    }

    async fn raw_notify<P: serde::Serialize>(
        stdin: &Arc<Mutex<ChildStdin>>,
        method: &str,
        params: P,
    ) -> Result<()> {
        let notification = NotificationMessage {
            jsonrpc: "2.0".to_string(),
            method: method.to_string(),
            params: serde_json::to_value(params)?,
        };
        Self::send_message(stdin, &notification).await
    }

    async fn request<P: serde::Serialize, R: serde::de::DeserializeOwned>(
        &self,
        method: &str,
        params: P,
    ) -> Result<R> {
        let (stdin, pending, next_id) = {
            let phase = self.phase.lock().await;
            match &*phase {
                Phase::Ready(running) => {
                    (running.stdin.clone(), running.pending.clone(), running.next_id.clone())
                }
                _ => return Err(anyhow!("peer '{}' is not ready", self.name)),
            }
        };
        Self::raw_request(&stdin, &pending, &next_id, method, params).await
    }

    async fn notify<P: serde::Serialize>(&self, method: &str, params: P) -> Result<()> {
        let stdin = {
            let phase = self.phase.lock().await;
            match &*phase {
                Phase::Ready(running) => running.stdin.clone(),
                _ => return Err(anyhow!("peer '{}' is not ready", self.name)),
            }
        };
        Self::raw_notify(&stdin, method, params).await
    }

    /// Sends a graceful `shutdown`/`exit` sequence and moves the client
    /// to `Dead`. A no-op if the client was never started or already
    /// stopped.
    pub async fn shutdown(&self) -> Result<()> {
        let extracted = {
            let mut phase = self.phase.lock().await;
            let extracted = match &*phase {
                Phase::Ready(running) => {
                    Some((running.stdin.clone(), running.pending.clone(), running.next_id.clone()))
                }
                _ => None,
            };
            if extracted.is_some() {
                *phase = Phase::Stopping;
            }
            extracted
        };

        let Some((stdin, pending, next_id)) = extracted else {
            *self.phase.lock().await = Phase::Dead;
            return Ok(());
        };

        let result: Result<serde_json::Value> =
            Self::raw_request(&stdin, &pending, &next_id, "shutdown", serde_json::Value::Null)
                .await;
        if let Err(e) = result {
            warn!("peer '{}' shutdown request failed: {e}", self.name);
        }
        let _ = Self::raw_notify(&stdin, "exit", serde_json::Value::Null).await;

        *self.phase.lock().await = Phase::Dead;
        Ok(())
    }

    // -- Document synchronization ------------------------------------

    /// Ensures `path` is open on this peer, reading it from disk and
    /// sending `didOpen` the first time. Returns the document's URI.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or the peer is not
    /// ready.
    pub async fn ensure_open(&self, path: &Path) -> Result<Uri> {
        let uri = pathutil::path_to_uri(path)?;
        {
            let docs = self.open_docs.lock().await;
            if docs.contains_key(&uri) {
                return Ok(uri);
            }
        }

        let text = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("failed to read {}", path.display()))?;
        let language_id = pathutil::language_id(path);
        let version = 1;

        self.open_docs
            .lock()
            .await
            .insert(uri.clone(), OpenDoc { language_id, version, text: text.clone() });

        self.notify(
            "textDocument/didOpen",
            DidOpenTextDocumentParams {
                text_document: TextDocumentItem {
                    uri: uri.clone(),
                    language_id: language_id.to_string(),
                    version,
                    text,
                },
            },
        )
        .await?;

        Ok(uri)
    }

    /// Sends `didChange` with the document's full new text and a
    /// strictly incremented version number.
    ///
    /// # Errors
    ///
    /// Returns an error if the document was never opened on this peer.
    pub async fn notify_change(&self, path: &Path, text: String) -> Result<()> {
        let uri = pathutil::path_to_uri(path)?;
        let version = {
            let mut docs = self.open_docs.lock().await;
            let doc = docs
                .get_mut(&uri)
                .ok_or_else(|| anyhow!("document not open: {}", uri.as_str()))?;
            doc.version += 1;
            doc.text.clone_from(&text);
            doc.version
        };

        self.notify(
            "textDocument/didChange",
            DidChangeTextDocumentParams {
                text_document: VersionedTextDocumentIdentifier { uri, version },
                content_changes: vec![TextDocumentContentChangeEvent {
                    range: None,
                    range_length: None,
                    text,
                }],
            },
        )
        .await
    }

    /// Sends `didSave`.
    ///
    /// # Errors
    ///
    /// Returns an error if the document was never opened on this peer.
    pub async fn notify_save(&self, path: &Path) -> Result<()> {
        let uri = pathutil::path_to_uri(path)?;
        if !self.open_docs.lock().await.contains_key(&uri) {
            return Err(anyhow!("document not open: {}", uri.as_str()));
        }
        self.notify(
            "textDocument/didSave",
            DidSaveTextDocumentParams { text_document: TextDocumentIdentifier { uri }, text: None },
        )
        .await
    }

    /// Sends `didClose` and drops the document's tracked state and
    /// cached diagnostics.
    pub async fn notify_close(&self, path: &Path) -> Result<()> {
        let uri = pathutil::path_to_uri(path)?;
        self.open_docs.lock().await.remove(&uri);
        self.diagnostics.forget(&uri).await;
        self.notify(
            "textDocument/didClose",
            DidCloseTextDocumentParams { text_document: TextDocumentIdentifier { uri } },
        )
        .await
    }

    // -- LSP request surface ------------------------------------------

    /// Gets hover information for a position in a document.
    pub async fn hover(&self, params: HoverParams) -> Result<Option<Hover>> {
        self.request("textDocument/hover", params).await
    }

    /// Gets the definition location(s) for a symbol.
    pub async fn definition(
        &self,
        params: GotoDefinitionParams,
    ) -> Result<Option<GotoDefinitionResponse>> {
        self.request("textDocument/definition", params).await
    }

    /// Gets the declaration location(s) for a symbol.
    pub async fn declaration(
        &self,
        params: GotoDefinitionParams,
    ) -> Result<Option<GotoDefinitionResponse>> {
        self.request("textDocument/declaration", params).await
    }

    /// Gets the type definition location(s) for a symbol.
    pub async fn type_definition(
        &self,
        params: GotoDefinitionParams,
    ) -> Result<Option<GotoDefinitionResponse>> {
        self.request("textDocument/typeDefinition", params).await
    }

    /// Gets implementation location(s) for a symbol.
    pub async fn implementation(
        &self,
        params: GotoDefinitionParams,
    ) -> Result<Option<GotoDefinitionResponse>> {
        self.request("textDocument/implementation", params).await
    }

    /// Gets all references to a symbol. Callers should set
    /// `include_declaration: true`.
    pub async fn references(&self, params: ReferenceParams) -> Result<Option<Vec<Location>>> {
        self.request("textDocument/references", params).await
    }

    /// Gets document symbols (outline) for a file.
    pub async fn document_symbols(
        &self,
        params: DocumentSymbolParams,
    ) -> Result<Option<DocumentSymbolResponse>> {
        self.request("textDocument/documentSymbol", params).await
    }

    /// Searches for symbols across the workspace.
    pub async fn workspace_symbols(
        &self,
        params: WorkspaceSymbolParams,
    ) -> Result<Option<WorkspaceSymbolResponse>> {
        self.request("workspace/symbol", params).await
    }

    /// Gets code actions (quick fixes, refactorings) for a range.
    pub async fn code_actions(
        &self,
        params: CodeActionParams,
    ) -> Result<Option<CodeActionResponse>> {
        self.request("textDocument/codeAction", params).await
    }

    /// Checks whether a rename is valid at a position, and if so, its
    /// default range or placeholder.
    pub async fn prepare_rename(
        &self,
        params: TextDocumentPositionParams,
    ) -> Result<Option<PrepareRenameResponse>> {
        self.request("textDocument/prepareRename", params).await
    }

    /// Computes a rename's workspace edit.
    pub async fn rename(&self, params: RenameParams) -> Result<Option<WorkspaceEdit>> {
        self.request("textDocument/rename", params).await
    }

    /// Gets completion suggestions at a position.
    pub async fn completion(&self, params: CompletionParams) -> Result<Option<CompletionResponse>> {
        self.request("textDocument/completion", params).await
    }

    /// Gets signature help for a function call.
    pub async fn signature_help(
        &self,
        params: SignatureHelpParams,
    ) -> Result<Option<SignatureHelp>> {
        self.request("textDocument/signatureHelp", params).await
    }

    /// Formats an entire document.
    pub async fn formatting(
        &self,
        params: DocumentFormattingParams,
    ) -> Result<Option<Vec<TextEdit>>> {
        self.request("textDocument/formatting", params).await
    }

    /// Formats a range within a document.
    pub async fn range_formatting(
        &self,
        params: DocumentRangeFormattingParams,
    ) -> Result<Option<Vec<TextEdit>>> {
        self.request("textDocument/rangeFormatting", params).await
    }

    /// Prepares call hierarchy items for a position.
    pub async fn prepare_call_hierarchy(
        &self,
        params: CallHierarchyPrepareParams,
    ) -> Result<Option<Vec<CallHierarchyItem>>> {
        self.request("textDocument/prepareCallHierarchy", params).await
    }

    /// Gets incoming calls to a call hierarchy item.
    pub async fn incoming_calls(
        &self,
        params: CallHierarchyIncomingCallsParams,
    ) -> Result<Option<Vec<CallHierarchyIncomingCall>>> {
        self.request("callHierarchy/incomingCalls", params).await
    }

    /// Gets outgoing calls from a call hierarchy item.
    pub async fn outgoing_calls(
        &self,
        params: CallHierarchyOutgoingCallsParams,
    ) -> Result<Option<Vec<CallHierarchyOutgoingCall>>> {
        self.request("callHierarchy/outgoingCalls", params).await
    }

    /// Prepares type hierarchy items for a position.
    pub async fn prepare_type_hierarchy(
        &self,
        params: TypeHierarchyPrepareParams,
    ) -> Result<Option<Vec<TypeHierarchyItem>>> {
        self.request("textDocument/prepareTypeHierarchy", params).await
    }

    /// Gets supertypes of a type hierarchy item.
    pub async fn supertypes(
        &self,
        params: TypeHierarchySupertypesParams,
    ) -> Result<Option<Vec<TypeHierarchyItem>>> {
        self.request("typeHierarchy/supertypes", params).await
    }

    /// Gets subtypes of a type hierarchy item.
    pub async fn subtypes(
        &self,
        params: TypeHierarchySubtypesParams,
    ) -> Result<Option<Vec<TypeHierarchyItem>>> {
        self.request("typeHierarchy/subtypes", params).await
    }

    /// Sends an arbitrary request by method name, for peer-specific
    /// protocol extensions not in the standard LSP surface above.
    pub async fn send_custom_request(
        &self,
        method: &str,
        params: serde_json::Value,
    ) -> Result<serde_json::Value> {
        self.request(method, params).await
    }

    /// Waits for fresh diagnostics on `uri`, per the cache's freshness
    /// window and timeout.
    pub async fn wait_for_diagnostics(&self, uri: &Uri) -> Vec<lsp_types::Diagnostic> {
        self.diagnostics.wait(uri).await
    }

    /// Returns every cached non-empty diagnostics batch for this peer.
    pub async fn all_diagnostics(&self) -> HashMap<Uri, Vec<lsp_types::Diagnostic>> {
        self.diagnostics.all_nonempty().await
    }

    /// Returns the negotiated position encoding, if the peer is ready.
    pub async fn encoding(&self) -> Option<PositionEncodingKind> {
        let phase = self.phase.lock().await;
        match &*phase {
            Phase::Ready(running) => Some(running.encoding.clone()),
            _ => None,
        }
    }
}
