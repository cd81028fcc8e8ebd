//! agent-relay: session-scoped event relay and tool-calling run orchestration.
//!
//! The crate connects interactive client sessions to a streaming tool server
//! and to language-model backends:
//!
//! - [`bus`]: per-session ordered event queues.
//! - [`sse`]: event-stream parsing, the reconnecting upstream relay, and
//!   frame delivery to subscribed clients.
//! - [`protocol`]: the JSON-RPC control surface and its HTTP client.
//! - [`tools`]: tool definitions, argument validation, and the registry.
//! - [`agent_loop`]: the approval-driven run flow and the iterative
//!   chat/tool-call flow.
//!
//! # Quick Start
//!
//! ```no_run
//! use agent_relay::prelude::*;
//! use serde_json::json;
//!
//! # async fn example() -> agent_relay::error::Result<()> {
//! let registry = ToolRegistry::builder()
//!     .tool(FnTool::new(
//!         "echo",
//!         "Echo the input",
//!         ToolParameters::object().string("text", "Text to echo", true).build(),
//!         |args, _ctx| async move { Ok(json!(args.get_str("text")?)) },
//!     ))
//!     .build()?;
//! let ctx = RelayContext::new(RelayConfig::from_env()?, registry);
//! let request = RpcRequest::new("tools/list", Some(json!(1)), None);
//! let (_session, outcome) = ctx.handle_control(Some("abc123"), request).await;
//! println!("{:?}", outcome.into_response());
//! # Ok(())
//! # }
//! ```

pub mod agent_loop;
pub mod bus;
pub mod config;
pub mod context;
pub mod error;
pub mod prelude;
pub mod protocol;
pub mod provider;
pub mod sse;
pub mod tools;
pub mod types;
pub mod util;

#[cfg(feature = "cli")]
pub mod cli;

pub use context::RelayContext;
