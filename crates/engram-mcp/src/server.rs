//! MCP Server Core
//!
//! Routes JSON-RPC requests to the tool handlers. Tool execution runs on
//! the blocking pool (the engine is synchronous), and `BackendUnavailable`
//! is retried exactly once at this boundary.

use std::collections::HashMap;
use std::sync::Arc;

use engram_core::{Engine, EngineError};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::protocol::types::{
    CallToolRequest, InitializeRequest, InitializeResult, JsonRpcError, JsonRpcRequest,
    JsonRpcResponse, ServerCapabilities, ServerInfo, MCP_VERSION,
};
use crate::tools;

/// MCP server over the engine.
pub struct McpServer {
    engine: Arc<Engine>,
    initialized: bool,
}

impl McpServer {
    pub fn new(engine: Arc<Engine>) -> Self {
        Self {
            engine,
            initialized: false,
        }
    }

    /// Handle one JSON-RPC request; `None` for notifications.
    pub async fn handle_request(&mut self, request: JsonRpcRequest) -> Option<JsonRpcResponse> {
        debug!("handling request: {}", request.method);

        if !self.initialized
            && request.method != "initialize"
            && request.method != "notifications/initialized"
        {
            warn!("rejecting '{}': server not initialized", request.method);
            return Some(JsonRpcResponse::error(
                request.id,
                JsonRpcError::server_not_initialized(),
            ));
        }

        let result = match request.method.as_str() {
            "initialize" => self.handle_initialize(request.params),
            "notifications/initialized" => return None,
            "tools/list" => self.handle_tools_list(),
            "tools/call" => self.handle_tools_call(request.params).await,
            "ping" => Ok(serde_json::json!({})),
            method => {
                warn!("unknown method: {}", method);
                Err(JsonRpcError::method_not_found())
            }
        };

        Some(match result {
            Ok(value) => JsonRpcResponse::success(request.id, value),
            Err(error) => JsonRpcResponse::error(request.id, error),
        })
    }

    fn handle_initialize(&mut self, params: Option<Value>) -> Result<Value, JsonRpcError> {
        let request: InitializeRequest = match params {
            Some(p) => serde_json::from_value(p)
                .map_err(|e| JsonRpcError::invalid_params(&e.to_string()))?,
            None => InitializeRequest::default(),
        };

        // Use the client's version when it is older; newer clients get ours.
        let negotiated = if request.protocol_version.as_str() < MCP_VERSION {
            info!("client requested protocol {}, using it", request.protocol_version);
            request.protocol_version
        } else {
            MCP_VERSION.to_string()
        };

        self.initialized = true;
        info!("session initialized with protocol {}", negotiated);

        let result = InitializeResult {
            protocol_version: negotiated,
            server_info: ServerInfo {
                name: "engram".to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
            },
            capabilities: ServerCapabilities {
                tools: Some({
                    let mut map = HashMap::new();
                    map.insert("listChanged".to_string(), serde_json::json!(false));
                    map
                }),
            },
            instructions: Some(
                "Engram is a per-user long-term memory: free-text memories live in a semantic \
                 graph, and time-bounded subject/predicate/object facts in a temporal graph. \
                 Always pass the end user's id in the 'user' argument; use 'store' to remember, \
                 'query' to recall, and 'reinforce' when a recalled memory proved useful."
                    .to_string(),
            ),
        };

        serde_json::to_value(result).map_err(|e| JsonRpcError::internal_error(&e.to_string()))
    }

    fn handle_tools_list(&self) -> Result<Value, JsonRpcError> {
        serde_json::to_value(serde_json::json!({ "tools": tools::descriptions() }))
            .map_err(|e| JsonRpcError::internal_error(&e.to_string()))
    }

    async fn handle_tools_call(&self, params: Option<Value>) -> Result<Value, JsonRpcError> {
        let request: CallToolRequest = match params {
            Some(p) => serde_json::from_value(p)
                .map_err(|e| JsonRpcError::invalid_params(&e.to_string()))?,
            None => return Err(JsonRpcError::invalid_params("missing params")),
        };

        let engine = self.engine.clone();
        let name = request.name.clone();
        let arguments = request.arguments.clone();
        let outcome = tokio::task::spawn_blocking(move || {
            let first = tools::dispatch(&engine, &name, arguments.clone());
            match first {
                // One boundary retry for transport failures, per the error
                // contract; everything else surfaces as-is.
                Err(e) if e.is_retryable() => {
                    warn!(tool = %name, error = %e, "retrying after backend failure");
                    tools::dispatch(&engine, &name, arguments)
                }
                other => other,
            }
        })
        .await
        .map_err(|e| JsonRpcError::internal_error(&format!("tool task failed: {e}")))?;

        match outcome {
            Ok(value) => Ok(serde_json::json!({
                "content": [{
                    "type": "text",
                    "text": value.to_string(),
                }],
                "isError": false,
            })),
            Err(e) => Ok(tool_error(&e)),
        }
    }
}

/// Tool failures are data, not protocol errors: the model reads them.
fn tool_error(error: &EngineError) -> Value {
    let mut text = error.to_string();
    if let Some(hint) = error.hint() {
        text.push_str(" (hint: ");
        text.push_str(hint);
        text.push(')');
    }
    serde_json::json!({
        "content": [{ "type": "text", "text": text }],
        "isError": true,
    })
}

// ============================================================================
// TESTS
// ============================================================================
