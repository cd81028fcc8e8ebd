//! Tool backends: a remote JSON-RPC tool server over HTTP, or an in-process
//! dispatcher.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use serde_json::{json, Value};
use tokio::sync::OnceCell;

use super::dispatcher::ProtocolDispatcher;
use super::{RpcRequest, RpcResponse, PROTOCOL_VERSION};
use crate::bus::SESSION_HEADER;
use crate::error::{RelayError, Result};
use crate::provider::http::{build_client, status_to_error};
use crate::sse::FrameParser;
use crate::tools::ToolDescriptor;

/// Tool discovery and invocation, wherever the tools live.
#[async_trait]
pub trait ToolBackend: Send + Sync {
    async fn list_tools(&self) -> Result<Vec<ToolDescriptor>>;

    /// Invoke `name` and return its call-tool result object.
    async fn call_tool(&self, name: &str, arguments: Value) -> Result<Value>;
}

const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// HTTP JSON-RPC client bound to one session.
///
/// The first request performs the handshake (`initialize`,
/// `notifications/initialized`, `ping`).
#[derive(Debug)]
pub struct ControlClient {
    client: reqwest::Client,
    endpoint: String,
    session_id: String,
    client_name: String,
    next_id: AtomicU64,
    server: OnceCell<Value>,
}

impl ControlClient {
    pub fn new(endpoint: impl Into<String>, session_id: impl Into<String>) -> Result<Self> {
        Ok(Self {
            client: build_client(REQUEST_TIMEOUT)?,
            endpoint: endpoint.into(),
            session_id: session_id.into(),
            client_name: "agent-relay".to_string(),
            next_id: AtomicU64::new(1),
            server: OnceCell::new(),
        })
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Run the handshake once; later calls return the cached `initialize` result.
    pub async fn connect(&self) -> Result<&Value> {
        self.server
            .get_or_try_init(|| async {
                let init = self
                    .request(
                        "initialize",
                        json!({
                            "protocolVersion": PROTOCOL_VERSION,
                            "capabilities": {},
                            "clientInfo": {
                                "name": self.client_name,
                                "version": env!("CARGO_PKG_VERSION"),
                            },
                        }),
                    )
                    .await?;
                self.notify("notifications/initialized", json!({})).await?;
                self.request("ping", json!({})).await?;
                tracing::info!(session = %self.session_id, endpoint = %self.endpoint, "control channel initialized");
                Ok::<Value, RelayError>(init)
            })
            .await
    }

    pub async fn ping(&self) -> Result<()> {
        self.request("ping", json!({})).await.map(|_| ())
    }

    /// Send a request and return its `result`.
    pub async fn request(&self, method: &str, params: Value) -> Result<Value> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let request = RpcRequest::new(method, Some(json!(id)), Some(params));
        tracing::debug!(session = %self.session_id, method, id, "control request");

        let body = self.post(&request).await?;
        let response = parse_response(&body, id)?;
        match (response.result, response.error) {
            (_, Some(error)) => Err(RelayError::Rpc {
                code: error.code,
                message: error.message,
            }),
            (Some(result), None) => Ok(result),
            (None, None) => Ok(Value::Null),
        }
    }

    /// Send a notification; the body of the reply is ignored.
    pub async fn notify(&self, method: &str, params: Value) -> Result<()> {
        let request = RpcRequest::new(method, None, Some(params));
        self.post(&request).await.map(|_| ())
    }

    async fn post(&self, request: &RpcRequest) -> Result<String> {
        let resp = self
            .client
            .post(&self.endpoint)
            .header(SESSION_HEADER, &self.session_id)
            .header(CONTENT_TYPE, "application/json")
            .header(ACCEPT, "application/json, text/event-stream")
            .json(request)
            .send()
            .await?;

        let status = resp.status().as_u16();
        let body = resp.text().await?;
        if !(200..300).contains(&status) {
            return Err(status_to_error(status, &body));
        }
        Ok(body)
    }
}

/// Decode a reply that is either a JSON envelope or SSE frames carrying one.
fn parse_response(body: &str, id: u64) -> Result<RpcResponse> {
    let trimmed = body.trim_start();
    if trimmed.starts_with('{') {
        return Ok(serde_json::from_str(trimmed)?);
    }

    let mut parser = FrameParser::new();
    let mut frames = parser.push_bytes(body.as_bytes());
    frames.extend(parser.finish());
    frames
        .iter()
        .filter_map(|frame| serde_json::from_str::<RpcResponse>(&frame.data).ok())
        .find(|response| response.id == json!(id))
        .ok_or_else(|| RelayError::Stream(format!("no response for request {id} in event stream")))
}

#[async_trait]
impl ToolBackend for ControlClient {
    async fn list_tools(&self) -> Result<Vec<ToolDescriptor>> {
        self.connect().await?;
        let result = self.request("tools/list", json!({})).await?;
        let tools = result.get("tools").cloned().unwrap_or_else(|| json!([]));
        Ok(serde_json::from_value(tools)?)
    }

    async fn call_tool(&self, name: &str, arguments: Value) -> Result<Value> {
        self.connect().await?;
        self.request("tools/call", json!({ "name": name, "arguments": arguments }))
            .await
    }
}

/// In-process backend that routes calls through a [`ProtocolDispatcher`].
#[derive(Debug, Clone)]
pub struct LocalToolBackend {
    dispatcher: ProtocolDispatcher,
    session: String,
}

impl LocalToolBackend {
    pub fn new(dispatcher: ProtocolDispatcher, session: impl Into<String>) -> Self {
        Self {
            dispatcher,
            session: session.into(),
        }
    }
}

#[async_trait]
impl ToolBackend for LocalToolBackend {
    async fn list_tools(&self) -> Result<Vec<ToolDescriptor>> {
        Ok(self.dispatcher.registry().descriptors())
    }

    async fn call_tool(&self, name: &str, arguments: Value) -> Result<Value> {
        Ok(self.dispatcher.call_tool(&self.session, name, arguments).await)
    }
}
