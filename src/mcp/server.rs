//! MCP server with stdio transport
//!
//! Reads one JSON-RPC message per line and writes one response per line.
//! Requests are handled concurrently so a long selection wait does not hold
//! up other calls; responses are written as they complete. Notifications are
//! consumed silently.

use super::protocol::{initialize_result, JsonRpcError, JsonRpcRequest, JsonRpcResponse, ToolCallParams, ToolCallResult};
use super::tools::ToolHandler;
use crate::error::Result;
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

/// MCP server that handles JSON-RPC requests over stdio
pub struct McpServer {
    tool_handler: Arc<ToolHandler>,
}

impl McpServer {
    pub fn new(tool_handler: Arc<ToolHandler>) -> Self {
        Self { tool_handler }
    }

    /// Serve stdin/stdout until EOF
    pub async fn run(&self) -> Result<()> {
        self.serve(BufReader::new(tokio::io::stdin()), tokio::io::stdout())
            .await
    }

    /// Serve an arbitrary line-oriented transport until EOF.
    ///
    /// Requests still in flight at EOF are abandoned.
    pub async fn serve<R, W>(&self, reader: R, mut writer: W) -> Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        info!("MCP server started, listening on stdin...");

        let mut lines = reader.lines();
        let (tx, mut rx) = mpsc::unbounded_channel::<JsonRpcResponse>();
        let mut in_flight = JoinSet::new();

        loop {
            tokio::select! {
                line = lines.next_line() => {
                    let Some(line) = line? else {
                        debug!("Received EOF, shutting down");
                        break;
                    };
                    let line = line.trim().to_string();
                    if line.is_empty() {
                        continue;
                    }
                    debug!("Received request: {}", line);

                    let handler = self.tool_handler.clone();
                    let tx = tx.clone();
                    in_flight.spawn(async move {
                        if let Some(response) = dispatch(&handler, &line).await {
                            let _ = tx.send(response);
                        }
                    });
                }
                Some(response) = rx.recv() => {
                    write_response(&mut writer, &response).await?;
                }
                Some(joined) = in_flight.join_next(), if !in_flight.is_empty() => {
                    if let Err(e) = joined {
                        error!("Request task failed: {}", e);
                    }
                }
            }
        }

        in_flight.shutdown().await;
        // Flush anything that finished before EOF was seen.
        while let Ok(response) = rx.try_recv() {
            write_response(&mut writer, &response).await?;
        }

        info!("MCP server shutting down");
        Ok(())
    }

    /// Handle one raw message; `None` for notifications
    pub async fn process_request(&self, line: &str) -> Option<JsonRpcResponse> {
        dispatch(&self.tool_handler, line).await
    }
}

async fn write_response<W: AsyncWrite + Unpin>(writer: &mut W, response: &JsonRpcResponse) -> Result<()> {
    let encoded = match serde_json::to_string(response) {
        Ok(encoded) => encoded,
        Err(e) => {
            error!("Failed to serialize response: {}", e);
            json!({
                "jsonrpc": "2.0",
                "error": {"code": -32603, "message": "Serialization error"},
                "id": response.id,
            })
            .to_string()
        }
    };
    debug!("Sending response: {}", encoded);

    writer.write_all(encoded.as_bytes()).await?;
    writer.write_all(b"\n").await?;
    writer.flush().await?;
    Ok(())
}

async fn dispatch(handler: &ToolHandler, line: &str) -> Option<JsonRpcResponse> {
    let request: JsonRpcRequest = match serde_json::from_str(line) {
        Ok(request) => request,
        Err(e) => {
            return Some(JsonRpcResponse::error(
                None,
                JsonRpcError::parse_error(format!("Invalid JSON: {}", e)),
            ));
        }
    };

    if request.jsonrpc != "2.0" {
        return Some(JsonRpcResponse::error(
            request.id,
            JsonRpcError::invalid_request("jsonrpc must be '2.0'"),
        ));
    }

    if request.is_notification() {
        debug!("Notification: {}", request.method);
        return None;
    }

    let response = match request.method.as_str() {
        "initialize" => JsonRpcResponse::success(request.id, initialize_result()),
        "ping" => JsonRpcResponse::success(request.id, json!({})),
        "tools/list" => JsonRpcResponse::success(request.id, json!({ "tools": handler.list_tools() })),
        "tools/call" => handle_tools_call(handler, request).await,
        _ => JsonRpcResponse::error(request.id, JsonRpcError::method_not_found(&request.method)),
    };
    Some(response)
}

async fn handle_tools_call(handler: &ToolHandler, request: JsonRpcRequest) -> JsonRpcResponse {
    let params: ToolCallParams = match serde_json::from_value(request.params) {
        Ok(params) => params,
        Err(e) => {
            return JsonRpcResponse::error(
                request.id,
                JsonRpcError::invalid_params(format!("Invalid tools/call params: {}", e)),
            );
        }
    };

    let arguments = params.arguments.unwrap_or(Value::Null);
    let result = match handler.execute(&params.name, arguments).await {
        Ok(payload) => ToolCallResult::json(&payload, false),
        Err(e) => {
            warn!("Tool {} failed: {}", params.name, e);
            ToolCallResult::json(&json!({ "error": e.message(), "kind": e.kind() }), true)
        }
    };

    match serde_json::to_value(result) {
        Ok(value) => JsonRpcResponse::success(request.id, value),
        Err(e) => JsonRpcResponse::error(request.id, JsonRpcError::internal_error(e.to_string())),
    }
}
