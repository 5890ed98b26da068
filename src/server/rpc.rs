//! JSON-RPC 2.0 over line-delimited stdio.
//!
//! Every request line gets exactly one response line, except notifications
//! (no `id`), which get none. Streaming methods first emit `stream/event`
//! notifications tagged with the request id, then the final response.

use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tracing::{debug, error, info, warn};

use super::{handle_method, handle_stream_method, is_streaming_method, SharedState};
use super::{METHODS, STREAMING_METHODS};
use crate::error::RpcError;
use crate::stream::StreamEvent;

pub const PARSE_ERROR: i32 = -32700;
pub const INVALID_REQUEST: i32 = -32600;
pub const METHOD_NOT_FOUND: i32 = -32601;
pub const INVALID_PARAMS: i32 = -32602;
pub const INTERNAL_ERROR: i32 = -32603;
/// Application-defined: the named conversation does not exist.
pub const NOT_FOUND: i32 = -32004;

/// Notification method carrying one streamed event.
pub const STREAM_EVENT_METHOD: &str = "stream/event";

/// JSON-RPC 2.0 request structure.
#[derive(Debug, Deserialize)]
pub struct JsonRpcRequest {
    /// JSON-RPC version (must be "2.0").
    pub jsonrpc: String,
    /// Request identifier (None for notifications).
    pub id: Option<Value>,
    /// The method name to invoke.
    pub method: String,
    /// Optional parameters for the method.
    #[serde(default)]
    pub params: Option<Value>,
}

/// JSON-RPC 2.0 response structure.
#[derive(Debug, Serialize)]
pub struct JsonRpcResponse {
    /// JSON-RPC version (always "2.0").
    pub jsonrpc: String,
    /// Request identifier (null when the request could not be read).
    pub id: Value,
    /// The result on success (mutually exclusive with error).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// The error on failure (mutually exclusive with result).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

/// JSON-RPC 2.0 error object.
#[derive(Debug, Serialize)]
pub struct JsonRpcError {
    /// Error code (negative for predefined errors).
    pub code: i32,
    /// Human-readable error message.
    pub message: String,
    /// Optional additional error data.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// Server identification returned from `initialize`.
#[derive(Debug, Serialize)]
pub struct ServerInfo {
    pub name: String,
    pub version: String,
}

/// Result of the `initialize` handshake.
#[derive(Debug, Serialize)]
pub struct InitializeResult {
    #[serde(rename = "serverInfo")]
    pub server_info: ServerInfo,
    pub methods: Vec<String>,
    #[serde(rename = "streamingMethods")]
    pub streaming_methods: Vec<String>,
}

impl JsonRpcResponse {
    /// Create a success response
    pub fn success(id: Option<Value>, result: Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id: id.unwrap_or(Value::Null),
            result: Some(result),
            error: None,
        }
    }

    /// Create an error response
    pub fn error(id: Option<Value>, code: i32, message: impl Into<String>) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id: id.unwrap_or(Value::Null),
            result: None,
            error: Some(JsonRpcError {
                code,
                message: message.into(),
                data: None,
            }),
        }
    }

    /// Create an error response from a handler error.
    pub fn from_rpc_error(id: Option<Value>, err: &RpcError) -> Self {
        Self::error(id, error_code(err), err.to_string())
    }
}

/// JSON-RPC error code for a handler error.
pub fn error_code(err: &RpcError) -> i32 {
    match err {
        RpcError::InvalidRequest { .. } => INVALID_REQUEST,
        RpcError::UnknownMethod { .. } => METHOD_NOT_FOUND,
        RpcError::InvalidParameters { .. } => INVALID_PARAMS,
        RpcError::NotFound { .. } => NOT_FOUND,
        RpcError::ExecutionFailed { .. } | RpcError::Json(_) => INTERNAL_ERROR,
    }
}

/// JSON-RPC server over any line-oriented reader and writer.
pub struct RpcServer {
    state: SharedState,
}

impl RpcServer {
    pub fn new(state: SharedState) -> Self {
        Self { state }
    }

    /// Serve stdin/stdout until EOF.
    pub async fn run(&self) -> std::io::Result<()> {
        info!("AI mentor RPC server starting...");
        let reader = BufReader::new(tokio::io::stdin());
        self.serve(reader, tokio::io::stdout()).await
    }

    /// Serve requests from `reader`, writing responses to `writer`.
    pub async fn serve<R, W>(&self, mut reader: R, mut writer: W) -> std::io::Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut line = String::new();

        loop {
            line.clear();
            let bytes_read = reader.read_line(&mut line).await?;

            if bytes_read == 0 {
                info!("EOF received, shutting down");
                break;
            }

            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }

            debug!(request = %trimmed, "Received request");

            match serde_json::from_str::<JsonRpcRequest>(trimmed) {
                Ok(request) => self.dispatch(request, &mut writer).await?,
                Err(e) => {
                    error!(error = %e, "Failed to parse request");
                    let response =
                        JsonRpcResponse::error(None, PARSE_ERROR, format!("Parse error: {}", e));
                    write_message(&mut writer, &response).await?;
                }
            }
        }

        Ok(())
    }

    async fn dispatch<W>(&self, request: JsonRpcRequest, writer: &mut W) -> std::io::Result<()>
    where
        W: AsyncWrite + Unpin,
    {
        if request.id.is_some() && is_streaming_method(&request.method) {
            return self.handle_streaming(request, writer).await;
        }

        if let Some(response) = self.handle_request(request).await {
            write_message(writer, &response).await?;
        }
        Ok(())
    }

    /// Handle a single-response request.
    ///
    /// Returns None for notifications (requests without id).
    pub async fn handle_request(&self, request: JsonRpcRequest) -> Option<JsonRpcResponse> {
        if request.jsonrpc != "2.0" {
            warn!(version = %request.jsonrpc, "Unsupported JSON-RPC version");
            return request.id.map(|id| {
                JsonRpcResponse::error(
                    Some(id),
                    INVALID_REQUEST,
                    "Invalid request: jsonrpc must be \"2.0\"",
                )
            });
        }

        if request.id.is_none() {
            debug!(method = %request.method, "Notification received, no response");
            return None;
        }

        let response = match request.method.as_str() {
            "initialize" => self.handle_initialize(request.id),
            "ping" => JsonRpcResponse::success(request.id, Value::Object(Default::default())),
            method => match handle_method(&self.state, method, request.params).await {
                Ok(result) => JsonRpcResponse::success(request.id, result),
                Err(e) => {
                    error!(method = %method, error = %e, "Method call failed");
                    JsonRpcResponse::from_rpc_error(request.id, &e)
                }
            },
        };

        Some(response)
    }

    fn handle_initialize(&self, id: Option<Value>) -> JsonRpcResponse {
        info!("Handling initialize request");

        let result = InitializeResult {
            server_info: ServerInfo {
                name: env!("CARGO_PKG_NAME").to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
            },
            methods: METHODS.iter().map(|m| m.to_string()).collect(),
            streaming_methods: STREAMING_METHODS.iter().map(|m| m.to_string()).collect(),
        };

        match serde_json::to_value(result) {
            Ok(val) => JsonRpcResponse::success(id, val),
            Err(e) => {
                error!(error = %e, "Failed to serialize initialize result");
                JsonRpcResponse::error(id, INTERNAL_ERROR, format!("Internal error: {}", e))
            }
        }
    }

    /// Forward every non-terminal event as a notification, then answer the
    /// request from the terminal event.
    async fn handle_streaming<W>(&self, request: JsonRpcRequest, writer: &mut W) -> std::io::Result<()>
    where
        W: AsyncWrite + Unpin,
    {
        let id = request.id;
        let mut stream = match handle_stream_method(&self.state, &request.method, request.params) {
            Ok(stream) => stream,
            Err(e) => {
                error!(method = %request.method, error = %e, "Failed to open stream");
                return write_message(writer, &JsonRpcResponse::from_rpc_error(id, &e)).await;
            }
        };

        let mut events_sent = 0usize;
        let final_response = loop {
            let Some(event) = stream.next().await else {
                break JsonRpcResponse::error(
                    id.clone(),
                    INTERNAL_ERROR,
                    "Stream ended without a result",
                );
            };

            match event {
                StreamEvent::Complete(payload) => match serde_json::to_value(payload) {
                    Ok(result) => break JsonRpcResponse::success(id.clone(), result),
                    Err(e) => {
                        break JsonRpcResponse::error(
                            id.clone(),
                            INTERNAL_ERROR,
                            format!("Internal error: {}", e),
                        )
                    }
                },
                StreamEvent::Error { message } => {
                    break JsonRpcResponse::error(id.clone(), INTERNAL_ERROR, message)
                }
                event => {
                    let notification = json!({
                        "jsonrpc": "2.0",
                        "method": STREAM_EVENT_METHOD,
                        "params": {
                            "id": id.clone().unwrap_or(Value::Null),
                            "event": event,
                        },
                    });
                    write_message(writer, &notification).await?;
                    events_sent += 1;
                }
            }
        };

        debug!(method = %request.method, events_sent, "Stream finished");
        write_message(writer, &final_response).await
    }
}

async fn write_message<W, T>(writer: &mut W, message: &T) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let json = serde_json::to_string(message)?;
    debug!(response = %json, "Sending message");

    writer.write_all(json.as_bytes()).await?;
    writer.write_all(b"\n").await?;
    writer.flush().await
}
