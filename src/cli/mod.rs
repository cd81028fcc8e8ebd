//! CLI entry point for agent-relay.

use clap::{Parser, Subcommand};

/// agent-relay CLI
#[derive(Parser, Debug)]
#[command(name = "agent-relay", version, about = "Session-scoped event relay and tool-calling chat")]
pub struct Cli {
    /// Tool server endpoint (overrides MCP_SERVER_ENDPOINT)
    #[arg(long, global = true, env = "MCP_SERVER_ENDPOINT")]
    pub endpoint: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Relay upstream progress and log events to a session and print its frames
    Listen(ListenArgs),
    /// List the tools advertised by the tool server
    Tools(ToolsArgs),
    /// Run one chat turn with tool calling
    Chat(ChatArgs),
}

/// Arguments for `agent-relay listen`.
#[derive(Parser, Debug)]
pub struct ListenArgs {
    /// Session whose frames are printed
    #[arg(short, long, default_value = "default")]
    pub session: String,

    /// Upstream session id sent on the event stream request (random when absent)
    #[arg(long)]
    pub upstream_session: Option<String>,
}

/// Arguments for `agent-relay tools`.
#[derive(Parser, Debug)]
pub struct ToolsArgs {
    /// Session id presented to the tool server (random when absent)
    #[arg(short, long)]
    pub session: Option<String>,
}

/// Arguments for `agent-relay chat`.
#[derive(Parser, Debug)]
pub struct ChatArgs {
    /// User id for history and progress routing
    #[arg(short, long)]
    pub user: String,

    /// Client session key
    #[arg(short, long, default_value = "default")]
    pub session: String,

    /// Print progress frames to stderr while the turn runs
    #[arg(long)]
    pub progress: bool,

    /// The question to ask
    pub query: String,
}

impl Cli {
    /// Parse CLI arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
