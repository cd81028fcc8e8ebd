//! Server-side routing of control requests to built-ins and registered tools.

use std::sync::Arc;

use serde_json::{json, Value};

use super::{ensure_call_tool_result, error_result, text_result, RpcRequest, RpcResponse};
use super::{INVALID_PARAMS, METHOD_NOT_FOUND, PROTOCOL_VERSION};
use crate::bus::SessionBus;
use crate::tools::{validate_arguments, ToolArguments, ToolExecutionContext, ToolRegistry, SESSION_ID_ARG};

/// Text returned in-band when a call names an unknown tool.
pub const TOOL_NOT_FOUND_TEXT: &str = "Error: Tool not found";

/// Identity reported by `initialize`.
#[derive(Debug, Clone, PartialEq)]
pub struct ServerInfo {
    pub name: String,
    pub version: String,
}

impl Default for ServerInfo {
    fn default() -> Self {
        Self {
            name: "agent-relay".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// Result of dispatching one request.
#[derive(Debug, Clone, PartialEq)]
pub enum DispatchOutcome {
    /// Send this envelope back to the caller.
    Reply(RpcResponse),
    /// Notification for an unknown method: acknowledge without a body.
    Accepted,
}

impl DispatchOutcome {
    pub fn into_response(self) -> Option<RpcResponse> {
        match self {
            Self::Reply(response) => Some(response),
            Self::Accepted => None,
        }
    }
}

/// Stateless router keyed by method name.
#[derive(Debug, Clone)]
pub struct ProtocolDispatcher {
    registry: Arc<ToolRegistry>,
    bus: Arc<SessionBus>,
    server_info: ServerInfo,
}

impl ProtocolDispatcher {
    pub fn new(registry: Arc<ToolRegistry>, bus: Arc<SessionBus>) -> Self {
        Self {
            registry,
            bus,
            server_info: ServerInfo::default(),
        }
    }

    pub fn with_server_info(mut self, server_info: ServerInfo) -> Self {
        self.server_info = server_info;
        self
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    /// Route `request` on behalf of the (already normalized) `session`.
    pub async fn dispatch(&self, session: &str, request: RpcRequest) -> DispatchOutcome {
        // Tools may publish progress while they run.
        self.bus.get_or_create(session);
        tracing::debug!(session, method = %request.method, "dispatch");

        let RpcRequest {
            method, id, params, ..
        } = request;
        let result = match method.as_str() {
            "initialize" => self.initialize(),
            "ping" | "$/ping" => json!({}),
            "list_tools" | "tools/list" | "workspace/listTools" | "$/listTools" => {
                json!({ "tools": self.registry.descriptors() })
            }
            "call_tool" | "tools/call" | "$/call" => {
                let params = params.unwrap_or(Value::Null);
                let Some(name) = params.get("name").and_then(Value::as_str) else {
                    return DispatchOutcome::Reply(RpcResponse::error(
                        id,
                        INVALID_PARAMS,
                        "missing tool name",
                    ));
                };
                let arguments = params.get("arguments").cloned().unwrap_or_else(|| json!({}));
                self.call_tool(session, name, arguments).await
            }
            name if self.registry.contains(name) => {
                self.call_tool(session, name, params.unwrap_or_else(|| json!({})))
                    .await
            }
            _ if id.is_none() => return DispatchOutcome::Accepted,
            _ => {
                tracing::debug!(session, %method, "method not found");
                return DispatchOutcome::Reply(RpcResponse::error(id, METHOD_NOT_FOUND, "method not found"));
            }
        };
        DispatchOutcome::Reply(RpcResponse::result(id, result))
    }

    fn initialize(&self) -> Value {
        json!({
            "protocolVersion": PROTOCOL_VERSION,
            "serverInfo": {
                "name": self.server_info.name,
                "version": self.server_info.version,
            },
            "capabilities": {
                "tools": { "listChanged": true, "callTool": true },
            },
        })
    }

    /// Invoke a tool and shape its output. Failures come back in-band.
    pub async fn call_tool(&self, session: &str, name: &str, arguments: Value) -> Value {
        let Some(tool) = self.registry.get(name) else {
            tracing::warn!(session, tool = name, "tool not found");
            return text_result(TOOL_NOT_FOUND_TEXT);
        };

        let mut args = ToolArguments::new(arguments);
        if tool.accepts_session_id() {
            args.insert(SESSION_ID_ARG, Value::String(session.to_string()));
        }
        if let Err(error) = validate_arguments(name, args.raw(), &tool.parameters().schema) {
            tracing::warn!(session, tool = name, %error, "rejected tool arguments");
            return error_result(error);
        }

        let ctx = ToolExecutionContext::for_session(session);
        match tool.execute(&args, &ctx).await {
            Ok(output) => ensure_call_tool_result(output),
            Err(error) => {
                tracing::warn!(session, tool = name, %error, "tool failed");
                error_result(error)
            }
        }
    }
}
