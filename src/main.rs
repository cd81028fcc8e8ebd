//! agent-relay CLI binary entry point.

use std::sync::Arc;

use agent_relay::cli::{ChatArgs, Cli, Commands, ListenArgs, ToolsArgs};
use agent_relay::config::RelayConfig;
use agent_relay::error::RelayError;
use agent_relay::protocol::{ControlClient, ToolBackend};
use agent_relay::provider::OpenAiChatBackend;
use agent_relay::tools::ToolRegistry;
use agent_relay::RelayContext;
use futures::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse_args();

    let result = match load_config(cli.endpoint) {
        Ok(config) => match cli.command {
            Commands::Listen(args) => handle_listen(config, args).await,
            Commands::Tools(args) => handle_tools(config, args).await,
            Commands::Chat(args) => handle_chat(config, args).await,
        },
        Err(e) => Err(e),
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

fn load_config(endpoint: Option<String>) -> Result<RelayConfig, RelayError> {
    let mut config = RelayConfig::from_env()?;
    if endpoint.is_some() {
        config.mcp_endpoint = endpoint;
    }
    Ok(config)
}

fn random_session() -> String {
    uuid::Uuid::new_v4().to_string()
}

async fn handle_listen(config: RelayConfig, args: ListenArgs) -> Result<(), RelayError> {
    let endpoint = config.require_mcp_endpoint()?.to_string();
    let ctx = RelayContext::new(config, ToolRegistry::empty());
    let upstream = args.upstream_session.unwrap_or_else(random_session);

    let relay = Arc::new(ctx.stream_relay(endpoint, upstream)?);
    relay.set_broadcast_session(args.session.clone());
    let handle = relay.spawn();

    let (_session, frames) = ctx.subscribe(Some(&args.session));
    let mut frames = Box::pin(frames);
    let cancel = CancellationToken::new();
    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            ctrl_c.cancel();
        }
    });

    tracing::info!(session = %args.session, "listening; press Ctrl-C to stop");
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            frame = frames.next() => match frame {
                Some(frame) => print!("{frame}"),
                None => break,
            },
        }
    }

    ctx.close_session(Some(&args.session));
    handle.shutdown().await;
    Ok(())
}

async fn handle_tools(config: RelayConfig, args: ToolsArgs) -> Result<(), RelayError> {
    let endpoint = config.require_mcp_endpoint()?;
    let client = ControlClient::new(endpoint, args.session.unwrap_or_else(random_session))?;
    for tool in client.list_tools().await? {
        println!("{}: {}", tool.name, tool.description);
        println!("  {}", tool.input_schema);
    }
    Ok(())
}

async fn handle_chat(config: RelayConfig, args: ChatArgs) -> Result<(), RelayError> {
    let endpoint = config.require_mcp_endpoint()?.to_string();
    let chat = OpenAiChatBackend::new(config.chat_endpoint()?, config.require_api_key()?)?
        .with_retry(config.retry.clone());
    let tools = ControlClient::new(endpoint.clone(), random_session())?;
    let ctx = RelayContext::new(config, ToolRegistry::empty());

    let relay = Arc::new(ctx.stream_relay(endpoint, tools.session_id())?);
    let handle = relay.clone().spawn();

    let printer = args.progress.then(|| {
        let (_session, frames) = ctx.subscribe(Some(&args.session));
        tokio::spawn(async move {
            let mut frames = Box::pin(frames);
            while let Some(frame) = frames.next().await {
                eprint!("{frame}");
            }
        })
    });

    let chat_loop = ctx.chat_loop(Arc::new(chat), Arc::new(tools)).with_relay(relay);
    let result = chat_loop.handle_query(&args.session, &args.user, &args.query).await;

    ctx.close_session(Some(&args.session));
    if let Some(printer) = printer {
        printer.abort();
    }
    handle.shutdown().await;

    let turn = result?;
    if turn.exhausted {
        tracing::warn!(iterations = turn.iterations, "tool iteration limit reached");
    }
    println!("{}", turn.text());
    Ok(())
}
