//! Name → tool mapping built once at startup.

use std::collections::HashMap;
use std::sync::Arc;

use super::tool::{Tool, SESSION_ID_ARG};
use super::types::ToolDescriptor;
use crate::error::{RelayError, Result};

/// Immutable set of registered tools, listed in registration order.
#[derive(Clone, Default)]
pub struct ToolRegistry {
    tools: Vec<Arc<dyn Tool>>,
    by_name: HashMap<String, usize>,
}

impl ToolRegistry {
    pub fn builder() -> ToolRegistryBuilder {
        ToolRegistryBuilder::default()
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn Tool>> {
        self.by_name.get(name).map(|idx| &self.tools[*idx])
    }

    pub fn contains(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.tools.iter().map(|t| t.name())
    }

    /// Descriptors for every tool. The injected `session_id` argument is
    /// never advertised.
    pub fn descriptors(&self) -> Vec<ToolDescriptor> {
        self.tools.iter().map(|tool| descriptor_for(tool.as_ref())).collect()
    }
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("tools", &self.names().collect::<Vec<_>>())
            .finish()
    }
}

fn descriptor_for(tool: &dyn Tool) -> ToolDescriptor {
    let mut schema = tool.parameters().schema.clone();
    if tool.accepts_session_id() {
        if let Some(props) = schema.get_mut("properties").and_then(|p| p.as_object_mut()) {
            props.remove(SESSION_ID_ARG);
        }
        if let Some(required) = schema.get_mut("required").and_then(|r| r.as_array_mut()) {
            required.retain(|name| name.as_str() != Some(SESSION_ID_ARG));
        }
    }
    ToolDescriptor {
        name: tool.name().to_string(),
        description: tool.description().to_string(),
        input_schema: schema,
    }
}

/// Collects tools during startup composition.
#[derive(Default)]
pub struct ToolRegistryBuilder {
    tools: Vec<Arc<dyn Tool>>,
}

impl ToolRegistryBuilder {
    pub fn tool(mut self, tool: impl Tool + 'static) -> Self {
        self.tools.push(Arc::new(tool));
        self
    }

    pub fn shared(mut self, tool: Arc<dyn Tool>) -> Self {
        self.tools.push(tool);
        self
    }

    /// Fails on duplicate or empty names.
    pub fn build(self) -> Result<ToolRegistry> {
        let mut by_name = HashMap::with_capacity(self.tools.len());
        for (idx, tool) in self.tools.iter().enumerate() {
            let name = tool.name();
            if name.is_empty() {
                return Err(RelayError::Configuration("tool name must not be empty".into()));
            }
            if by_name.insert(name.to_string(), idx).is_some() {
                return Err(RelayError::Configuration(format!("duplicate tool name: {name}")));
            }
        }
        tracing::debug!(tools = by_name.len(), "tool registry built");
        Ok(ToolRegistry {
            tools: self.tools,
            by_name,
        })
    }
}
