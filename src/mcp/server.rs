// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Mark Wells <contact@markwells.dev>

//! MCP server implementation: a blocking stdin/stdout JSON-RPC loop.

use anyhow::{Context, Result, anyhow};
use std::io::{BufRead, Write};
use tracing::{debug, error, info, trace, warn};

use super::types::*;

/// Handles MCP tool calls on behalf of an [`McpServer`].
pub trait ToolHandler: Send + Sync {
    /// Returns the list of available tools, assembled fresh on every
    /// call so newly-started peers' extensions are reflected.
    fn list_tools(&self) -> Vec<Tool>;

    /// Handles a tool call and returns its result.
    ///
    /// # Errors
    ///
    /// Returns an error for failures that should surface as a
    /// `tools/call` result with `isError: true` — the server never
    /// propagates this as a JSON-RPC error.
    fn call_tool(&self, name: &str, arguments: Option<serde_json::Value>)
    -> Result<CallToolResult>;
}

impl<T: ToolHandler + ?Sized> ToolHandler for std::sync::Arc<T> {
    fn list_tools(&self) -> Vec<Tool> {
        (**self).list_tools()
    }

    fn call_tool(&self, name: &str, arguments: Option<serde_json::Value>) -> Result<CallToolResult> {
        (**self).call_tool(name, arguments)
    }
}

/// An MCP server communicating over stdin/stdout.
pub struct McpServer<H: ToolHandler> {
    handler: H,
    initialized: bool,
}

impl<H: ToolHandler> McpServer<H> {
    /// Creates a new `McpServer` wrapping `handler`.
    pub fn new(handler: H) -> Self {
        Self { handler, initialized: false }
    }

    /// Runs the server until stdin closes.
    ///
    /// # Errors
    ///
    /// Returns an error if reading from stdin or writing to stdout
    /// fails.
    pub fn run(&mut self) -> Result<()> {
        let stdin = std::io::stdin();
        let stdout = std::io::stdout();
        let mut stdout = stdout.lock();

        info!("MCP server starting, waiting for requests on stdin");

        for line in stdin.lock().lines() {
            let line = line.context("failed to read from stdin")?;

            if line.is_empty() {
                continue;
            }

            trace!("received: {line}");

            match self.handle_message(&line) {
                Ok(Some(response)) => {
                    let response_json = serde_json::to_string(&response)?;
                    trace!("sending: {response_json}");
                    writeln!(stdout, "{response_json}")?;
                    stdout.flush()?;
                }
                Ok(None) => {}
                Err(e) => {
                    error!("error handling message: {e}");
                    if let Ok(req) = serde_json::from_str::<Request>(&line) {
                        let response = Response::error(req.id, INTERNAL_ERROR, e.to_string());
                        let response_json = serde_json::to_string(&response)?;
                        writeln!(stdout, "{response_json}")?;
                        stdout.flush()?;
                    }
                }
            }
        }

        info!("MCP server shutting down (stdin closed)");
        Ok(())
    }

    fn handle_message(&mut self, line: &str) -> Result<Option<Response>> {
        if let Ok(request) = serde_json::from_str::<Request>(line) {
            let response = self.handle_request(request)?;
            return Ok(Some(response));
        }

        if let Ok(notification) = serde_json::from_str::<Notification>(line) {
            self.handle_notification(notification);
            return Ok(None);
        }

        Err(anyhow!("failed to parse message as a request or notification"))
    }

    fn handle_request(&mut self, request: Request) -> Result<Response> {
        debug!("handling request: {} (id={:?})", request.method, request.id);

        match request.method.as_str() {
            "initialize" => self.handle_initialize(request),
            "tools/list" => self.handle_tools_list(request),
            "tools/call" => self.handle_tools_call(request),
            "ping" => Ok(Response::success(request.id, serde_json::json!({}))?),
            _ => {
                warn!("unknown method: {}", request.method);
                Ok(Response::error(
                    request.id,
                    METHOD_NOT_FOUND,
                    format!("unknown method: {}", request.method),
                ))
            }
        }
    }

    fn handle_notification(&mut self, notification: Notification) {
        debug!("handling notification: {}", notification.method);

        match notification.method.as_str() {
            "notifications/initialized" => {
                info!("MCP client initialized");
                self.initialized = true;
            }
            "notifications/cancelled" => debug!("request cancelled"),
            other => debug!("ignoring unknown notification: {other}"),
        }
    }

    fn handle_initialize(&mut self, request: Request) -> Result<Response> {
        let params: InitializeParams = request
            .params
            .map(serde_json::from_value)
            .transpose()
            .context("invalid initialize params")?
            .ok_or_else(|| anyhow!("missing initialize params"))?;

        let client_name = &params.client_info.name;
        let client_version = params.client_info.version.as_deref().unwrap_or("unknown");
        info!("MCP client connecting: {client_name} v{client_version}");
        info!("protocol version: {}", params.protocol_version);

        let result = InitializeResult {
            protocol_version: "2024-11-05".to_string(),
            capabilities: ServerCapabilities { tools: Some(ToolsCapability { list_changed: None }) },
            server_info: ServerInfo {
                name: "lspmux".to_string(),
                version: Some(env!("LSPMUX_VERSION").to_string()),
            },
        };

        Ok(Response::success(request.id, result)?)
    }

    fn handle_tools_list(&self, request: Request) -> Result<Response> {
        let tools = self.handler.list_tools();
        debug!("listing {} tools", tools.len());
        Ok(Response::success(request.id, ListToolsResult { tools })?)
    }

    fn handle_tools_call(&self, request: Request) -> Result<Response> {
        let params: CallToolParams = request
            .params
            .map(serde_json::from_value)
            .transpose()
            .context("invalid tools/call params")?
            .ok_or_else(|| anyhow!("missing tools/call params"))?;

        debug!("calling tool: {}", params.name);

        match self.handler.call_tool(&params.name, params.arguments) {
            Ok(result) => Ok(Response::success(request.id, result)?),
            Err(e) => {
                error!("tool call failed: {e}");
                Ok(Response::success(request.id, CallToolResult::error(e.to_string()))?)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct TestHandler;

    impl ToolHandler for TestHandler {
        fn list_tools(&self) -> Vec<Tool> {
            vec![Tool {
                name: "test_tool".to_string(),
                description: Some("A test tool".to_string()),
                input_schema: serde_json::json!({"type": "object", "properties": {}}),
            }]
        }

        fn call_tool(&self, name: &str, _arguments: Option<serde_json::Value>) -> Result<CallToolResult> {
            match name {
                "test_tool" => Ok(CallToolResult::text("Test result")),
                "error_tool" => Err(anyhow!("Test error")),
                _ => Err(anyhow!("Unknown tool: {name}")),
            }
        }
    }

    fn request(id: i64, method: &str, params: Option<serde_json::Value>) -> Request {
        Request { jsonrpc: "2.0".to_string(), id: RequestId::Number(id), method: method.to_string(), params }
    }

    #[test]
    fn handle_initialize_reports_server_name() {
        let mut server = McpServer::new(TestHandler);
        let req = request(
            1,
            "initialize",
            Some(serde_json::json!({
                "protocolVersion": "2024-11-05",
                "capabilities": {},
                "clientInfo": {"name": "test-client", "version": "1.0.0"}
            })),
        );

        let response = server.handle_request(req).unwrap();
        let result: InitializeResult = serde_json::from_value(response.result.unwrap()).unwrap();
        assert_eq!(result.server_info.name, "lspmux");
    }

    #[test]
    fn handle_tools_list_returns_handler_tools() {
        let mut server = McpServer::new(TestHandler);
        let response = server.handle_request(request(2, "tools/list", None)).unwrap();
        let result: ListToolsResult = serde_json::from_value(response.result.unwrap()).unwrap();
        assert_eq!(result.tools.len(), 1);
        assert_eq!(result.tools[0].name, "test_tool");
    }

    #[test]
    fn handle_tools_call_success() {
        let mut server = McpServer::new(TestHandler);
        let req = request(3, "tools/call", Some(serde_json::json!({"name": "test_tool", "arguments": {}})));
        let response = server.handle_request(req).unwrap();
        let result: CallToolResult = serde_json::from_value(response.result.unwrap()).unwrap();
        assert!(result.is_error.is_none());
    }

    #[test]
    fn handle_tools_call_converts_handler_error_to_is_error_result() {
        let mut server = McpServer::new(TestHandler);
        let req = request(4, "tools/call", Some(serde_json::json!({"name": "error_tool"})));
        let response = server.handle_request(req).unwrap();
        let result: CallToolResult = serde_json::from_value(response.result.unwrap()).unwrap();
        assert_eq!(result.is_error, Some(true));
    }

    #[test]
    fn handle_unknown_method_returns_method_not_found() {
        let mut server = McpServer::new(TestHandler);
        let response = server.handle_request(request(5, "unknown/method", None)).unwrap();
        assert_eq!(response.error.unwrap().code, METHOD_NOT_FOUND);
    }

    #[test]
    fn handle_ping() {
        let mut server = McpServer::new(TestHandler);
        let response = server.handle_request(request(6, "ping", None)).unwrap();
        assert!(response.result.is_some());
        assert!(response.error.is_none());
    }
}
