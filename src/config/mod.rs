//! Relay configuration (code defaults, overridden by environment).

use std::fmt;
use std::time::Duration;

use crate::bus::EventKind;
use crate::error::{RelayError, Result};
use crate::sse::DeliveryConfig;
use crate::util::{BackoffPolicy, PollPolicy, RetryPolicy};

#[cfg(feature = "openai")]
use crate::provider::ChatEndpoint;

pub const DEFAULT_AZURE_API_VERSION: &str = "2024-02-15-preview";
pub const DEFAULT_OPENAI_MODEL: &str = "gpt-4o";
pub const DEFAULT_SERVER_NAME: &str = "agent-relay";
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful assistant. Use the provided tools to answer \
the user's questions, and answer only from what the tools return. \
If you don't know the answer, say so.";

/// Complete relay configuration.
#[derive(Clone)]
pub struct RelayConfig {
    /// Control/event endpoint of the remote tool server.
    pub mcp_endpoint: Option<String>,
    /// Azure OpenAI resource endpoint. Selects the Azure chat backend when set.
    pub azure_endpoint: Option<String>,
    pub openai_base_url: Option<String>,
    /// Model name, or deployment name for Azure.
    pub model: Option<String>,
    pub api_version: Option<String>,
    pub api_key: Option<String>,
    pub system_prompt: String,
    pub server_name: String,
    pub max_tool_iterations: usize,
    pub delivery: DeliveryConfig,
    pub backoff: BackoffPolicy,
    pub poll: PollPolicy,
    pub retry: RetryPolicy,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            mcp_endpoint: None,
            azure_endpoint: None,
            openai_base_url: None,
            model: None,
            api_version: None,
            api_key: None,
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            server_name: DEFAULT_SERVER_NAME.to_string(),
            max_tool_iterations: crate::agent_loop::DEFAULT_MAX_TOOL_ITERATIONS,
            delivery: DeliveryConfig::default(),
            backoff: BackoffPolicy::default(),
            poll: PollPolicy::default(),
            retry: RetryPolicy::default(),
        }
    }
}

impl fmt::Debug for RelayConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RelayConfig")
            .field("mcp_endpoint", &self.mcp_endpoint)
            .field("azure_endpoint", &self.azure_endpoint)
            .field("openai_base_url", &self.openai_base_url)
            .field("model", &self.model)
            .field("api_version", &self.api_version)
            .field("api_key", &self.api_key.as_ref().map(|_| "[redacted]"))
            .field("server_name", &self.server_name)
            .field("max_tool_iterations", &self.max_tool_iterations)
            .field("delivery", &self.delivery)
            .field("backoff", &self.backoff)
            .finish()
    }
}

impl RelayConfig {
    /// Load `.env` (if present) and read the process environment.
    pub fn from_env() -> Result<Self> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup. Empty values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let first = |keys: &[&str]| keys.iter().find_map(|key| get(key));

        let mut config = Self {
            mcp_endpoint: get("MCP_SERVER_ENDPOINT"),
            azure_endpoint: get("AZURE_OPENAI_ENDPOINT"),
            openai_base_url: get("OPENAI_BASE_URL"),
            model: first(&["AZURE_OPENAI_DEPLOYMENT_NAME", "OPENAI_MODEL"]),
            api_version: get("AZURE_OPENAI_API_VERSION"),
            api_key: first(&["AZURE_OPENAI_API_KEY", "OPENAI_API_KEY"]),
            ..Self::default()
        };

        if let Some(prompt) = get("RELAY_SYSTEM_PROMPT") {
            config.system_prompt = prompt;
        }
        if let Some(name) = get("RELAY_SERVER_NAME") {
            config.server_name = name;
        }
        if let Some(secs) = parse::<u64>("RELAY_HEARTBEAT_SECS", get("RELAY_HEARTBEAT_SECS"))? {
            config.delivery.heartbeat = Duration::from_secs(secs);
        }
        if let Some(kind) = get("RELAY_KEEPALIVE_EVENT") {
            config.delivery.keepalive = match kind.parse::<EventKind>() {
                Ok(kind @ (EventKind::Heartbeat | EventKind::NoEvent)) => kind,
                _ => {
                    return Err(RelayError::Configuration(format!(
                        "RELAY_KEEPALIVE_EVENT must be heartbeat or noevent, got {kind}"
                    )))
                }
            };
        }
        if let Some(secs) = parse::<u64>("RELAY_INITIAL_BACKOFF_SECS", get("RELAY_INITIAL_BACKOFF_SECS"))? {
            config.backoff.initial = Duration::from_secs(secs);
        }
        if let Some(secs) = parse::<u64>("RELAY_MAX_BACKOFF_SECS", get("RELAY_MAX_BACKOFF_SECS"))? {
            config.backoff.max = Duration::from_secs(secs);
        }
        if let Some(n) = parse::<usize>("RELAY_MAX_TOOL_ITERATIONS", get("RELAY_MAX_TOOL_ITERATIONS"))? {
            config.max_tool_iterations = n;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.backoff.initial.is_zero() {
            return Err(RelayError::Configuration("initial backoff must be positive".into()));
        }
        if self.backoff.max < self.backoff.initial {
            return Err(RelayError::Configuration(
                "max backoff must not be below the initial backoff".into(),
            ));
        }
        if self.max_tool_iterations == 0 {
            return Err(RelayError::Configuration("max tool iterations must be positive".into()));
        }
        Ok(())
    }

    pub fn require_mcp_endpoint(&self) -> Result<&str> {
        self.mcp_endpoint
            .as_deref()
            .ok_or_else(|| RelayError::Configuration("MCP_SERVER_ENDPOINT is not set".into()))
    }

    pub fn require_api_key(&self) -> Result<&str> {
        self.api_key.as_deref().ok_or_else(|| {
            RelayError::Configuration("AZURE_OPENAI_API_KEY or OPENAI_API_KEY is not set".into())
        })
    }

    /// Chat endpoint: Azure when an Azure endpoint is configured, OpenAI otherwise.
    #[cfg(feature = "openai")]
    pub fn chat_endpoint(&self) -> Result<ChatEndpoint> {
        match &self.azure_endpoint {
            Some(endpoint) => {
                let deployment = self.model.clone().ok_or_else(|| {
                    RelayError::Configuration("AZURE_OPENAI_DEPLOYMENT_NAME is not set".into())
                })?;
                Ok(ChatEndpoint::Azure {
                    endpoint: endpoint.clone(),
                    deployment,
                    api_version: self
                        .api_version
                        .clone()
                        .unwrap_or_else(|| DEFAULT_AZURE_API_VERSION.to_string()),
                })
            }
            None => Ok(ChatEndpoint::OpenAi {
                base_url: self
                    .openai_base_url
                    .clone()
                    .unwrap_or_else(|| crate::provider::openai::DEFAULT_BASE_URL.to_string()),
                model: self.model.clone().unwrap_or_else(|| DEFAULT_OPENAI_MODEL.to_string()),
            }),
        }
    }
}

fn parse<T: std::str::FromStr>(key: &str, raw: Option<String>) -> Result<Option<T>>
where
    T::Err: fmt::Display,
{
    raw.map(|value| {
        value
            .parse::<T>()
            .map_err(|e| RelayError::Configuration(format!("{key}: invalid value {value:?}: {e}")))
    })
    .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_when_environment_is_empty() {
        let config = RelayConfig::from_lookup(lookup(&[])).expect("config");
        assert_eq!(config.backoff, BackoffPolicy::default());
        assert_eq!(config.max_tool_iterations, 16);
        assert!(config.require_mcp_endpoint().is_err());
    }

    #[test]
    fn invalid_numbers_are_configuration_errors() {
        let err = RelayConfig::from_lookup(lookup(&[("RELAY_HEARTBEAT_SECS", "soon")])).unwrap_err();
        assert!(matches!(err, RelayError::Configuration(msg) if msg.contains("RELAY_HEARTBEAT_SECS")));
        let err = RelayConfig::from_lookup(lookup(&[
            ("RELAY_INITIAL_BACKOFF_SECS", "40"),
            ("RELAY_MAX_BACKOFF_SECS", "30"),
        ]))
        .unwrap_err();
        assert!(matches!(err, RelayError::Configuration(_)));
    }

    #[test]
    fn debug_redacts_api_key() {
        let config = RelayConfig::from_lookup(lookup(&[("OPENAI_API_KEY", "sk-secret")])).expect("config");
        let rendered = format!("{config:?}");
        assert!(!rendered.contains("sk-secret"));
        assert!(rendered.contains("[redacted]"));
    }
}
