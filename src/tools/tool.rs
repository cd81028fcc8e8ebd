//! Tool trait and closure-based tool wrappers.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;

use super::arguments::ToolArguments;
use super::types::ToolParameters;
use crate::error::RelayError;

/// Name of the argument injected for tools that want their caller's session.
pub const SESSION_ID_ARG: &str = "session_id";

/// Context available during tool execution.
#[derive(Debug, Clone, Default)]
pub struct ToolExecutionContext {
    /// Normalized session key of the caller.
    pub session_id: Option<String>,
    pub metadata: serde_json::Value,
}

impl ToolExecutionContext {
    pub fn for_session(session_id: impl Into<String>) -> Self {
        Self {
            session_id: Some(session_id.into()),
            ..Self::default()
        }
    }
}

/// Core tool trait.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Name clients invoke the tool by.
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    fn parameters(&self) -> &ToolParameters;

    /// Whether the dispatcher should inject the caller's `session_id`
    /// argument before execution.
    fn accepts_session_id(&self) -> bool {
        false
    }

    async fn execute(
        &self,
        args: &ToolArguments,
        ctx: &ToolExecutionContext,
    ) -> Result<serde_json::Value, RelayError>;
}

type AsyncHandler = dyn Fn(
        ToolArguments,
        ToolExecutionContext,
    ) -> Pin<Box<dyn Future<Output = Result<serde_json::Value, RelayError>> + Send>>
    + Send
    + Sync;

type BlockingHandler =
    dyn Fn(ToolArguments, ToolExecutionContext) -> Result<serde_json::Value, RelayError> + Send + Sync;

enum Handler {
    Async(Arc<AsyncHandler>),
    Blocking(Arc<BlockingHandler>),
}

/// Closure-based tool.
///
/// Async handlers run on the calling task; blocking handlers (synchronous
/// queries against external systems) run on the blocking pool.
pub struct FnTool {
    name: String,
    description: String,
    parameters: ToolParameters,
    accepts_session_id: bool,
    handler: Handler,
}

impl FnTool {
    pub fn new<F, Fut>(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: ToolParameters,
        handler: F,
    ) -> Self
    where
        F: Fn(ToolArguments, ToolExecutionContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<serde_json::Value, RelayError>> + Send + 'static,
    {
        Self {
            name: name.into(),
            description: description.into(),
            parameters,
            accepts_session_id: false,
            handler: Handler::Async(Arc::new(move |args, ctx| Box::pin(handler(args, ctx)))),
        }
    }

    pub fn blocking<F>(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: ToolParameters,
        handler: F,
    ) -> Self
    where
        F: Fn(ToolArguments, ToolExecutionContext) -> Result<serde_json::Value, RelayError>
            + Send
            + Sync
            + 'static,
    {
        Self {
            name: name.into(),
            description: description.into(),
            parameters,
            accepts_session_id: false,
            handler: Handler::Blocking(Arc::new(handler)),
        }
    }

    /// Declare that the handler takes a `session_id` argument.
    pub fn with_session_id(mut self) -> Self {
        self.accepts_session_id = true;
        self
    }
}

#[async_trait]
impl Tool for FnTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn parameters(&self) -> &ToolParameters {
        &self.parameters
    }

    fn accepts_session_id(&self) -> bool {
        self.accepts_session_id
    }

    async fn execute(
        &self,
        args: &ToolArguments,
        ctx: &ToolExecutionContext,
    ) -> Result<serde_json::Value, RelayError> {
        match &self.handler {
            Handler::Async(handler) => handler(args.clone(), ctx.clone()).await,
            Handler::Blocking(handler) => {
                let handler = handler.clone();
                let (args, ctx) = (args.clone(), ctx.clone());
                tokio::task::spawn_blocking(move || handler(args, ctx))
                    .await
                    .map_err(|e| RelayError::ToolExecution {
                        tool_name: self.name.clone(),
                        message: e.to_string(),
                    })?
            }
        }
    }
}

impl std::fmt::Debug for FnTool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnTool")
            .field("name", &self.name)
            .field("description", &self.description)
            .field("accepts_session_id", &self.accepts_session_id)
            .field(
                "blocking",
                &matches!(self.handler, Handler::Blocking(_)),
            )
            .finish()
    }
}
