//! Tool registry: immutable catalogue of tool descriptors and their handlers.
//!
//! Built once at startup through [`RegistryBuilder`]; after `build()` there is
//! no way to add or remove tools. Listing order is registration order.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::handlers::common::ToolContext;
use crate::error::NexusError;

/// Public description of a tool, as returned by `tools/list`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    #[serde(rename = "inputSchema")]
    pub input_schema: Value,
}

impl ToolDescriptor {
    pub fn new(name: impl Into<String>, description: impl Into<String>, input_schema: Value) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            input_schema,
        }
    }
}

/// A single callable tool. Failures are returned, never interpreted here.
#[async_trait]
pub trait ToolHandler: Send + Sync {
    async fn invoke(&self, params: Value) -> Result<Value>;
}

/// Adapts an async `fn(args, ctx)` into a [`ToolHandler`] bound to a context.
pub struct ContextTool<F> {
    ctx: ToolContext,
    f: F,
}

impl<F> ContextTool<F> {
    pub fn new(ctx: ToolContext, f: F) -> Self {
        Self { ctx, f }
    }
}

#[async_trait]
impl<F, Fut> ToolHandler for ContextTool<F>
where
    F: Fn(Value, ToolContext) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Value>> + Send + 'static,
{
    async fn invoke(&self, params: Value) -> Result<Value> {
        (self.f)(params, self.ctx.clone()).await
    }
}

struct RegisteredTool {
    descriptor: ToolDescriptor,
    handler: Arc<dyn ToolHandler>,
}

/// Collects tools before the registry is frozen.
#[derive(Default)]
pub struct RegistryBuilder {
    namespace: Option<String>,
    tools: Vec<RegisteredTool>,
    index: HashMap<String, usize>,
}

impl RegistryBuilder {
    /// Prefix prepended to every listed tool name (e.g. `mcp__Nexushub__`).
    pub fn namespace(mut self, prefix: impl Into<String>) -> Self {
        self.namespace = Some(prefix.into());
        self
    }

    /// Register a tool. A second tool with the same bare name is rejected.
    pub fn register<H>(mut self, descriptor: ToolDescriptor, handler: H) -> Result<Self, NexusError>
    where
        H: ToolHandler + 'static,
    {
        if self.index.contains_key(&descriptor.name) {
            return Err(NexusError::DuplicateTool(descriptor.name));
        }

        self.index.insert(descriptor.name.clone(), self.tools.len());
        self.tools.push(RegisteredTool {
            descriptor,
            handler: Arc::new(handler),
        });
        Ok(self)
    }

    pub fn build(self) -> ToolRegistry {
        ToolRegistry {
            namespace: self.namespace,
            tools: self.tools,
            index: self.index,
        }
    }
}

/// Read-only tool catalogue shared by every transport.
pub struct ToolRegistry {
    namespace: Option<String>,
    tools: Vec<RegisteredTool>,
    index: HashMap<String, usize>,
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("namespace", &self.namespace)
            .field("tools", &self.tools.len())
            .finish()
    }
}

impl ToolRegistry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::default()
    }

    /// Descriptors in registration order, names carrying the namespace prefix.
    pub fn list(&self) -> Vec<ToolDescriptor> {
        self.tools
            .iter()
            .map(|t| {
                let mut descriptor = t.descriptor.clone();
                if let Some(ns) = &self.namespace {
                    descriptor.name = format!("{}{}", ns, descriptor.name);
                }
                descriptor
            })
            .collect()
    }

    /// Look up a handler by bare or namespaced name.
    pub fn resolve(&self, name: &str) -> Result<Arc<dyn ToolHandler>, NexusError> {
        let bare = self
            .namespace
            .as_deref()
            .and_then(|ns| name.strip_prefix(ns))
            .unwrap_or(name);

        self.index
            .get(bare)
            .map(|&i| Arc::clone(&self.tools[i].handler))
            .ok_or_else(|| NexusError::ToolNotFound(name.to_string()))
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct Echo;

    #[async_trait]
    impl ToolHandler for Echo {
        async fn invoke(&self, params: Value) -> Result<Value> {
            Ok(params)
        }
    }

    fn descriptor(name: &str) -> ToolDescriptor {
        ToolDescriptor::new(name, format!("{} tool", name), json!({"type": "object"}))
    }

    #[test]
    fn test_list_keeps_registration_order() {
        let registry = ToolRegistry::builder()
            .register(descriptor("zeta"), Echo)
            .unwrap()
            .register(descriptor("alpha"), Echo)
            .unwrap()
            .register(descriptor("mid"), Echo)
            .unwrap()
            .build();

        let names: Vec<String> = registry.list().into_iter().map(|d| d.name).collect();
        assert_eq!(names, vec!["zeta", "alpha", "mid"]);
        // Stable across calls.
        assert_eq!(registry.list(), registry.list());
    }

    #[test]
    fn test_duplicate_name_rejected() {
        let result = ToolRegistry::builder()
            .register(descriptor("echo"), Echo)
            .unwrap()
            .register(descriptor("echo"), Echo);

        match result {
            Err(NexusError::DuplicateTool(name)) => assert_eq!(name, "echo"),
            Err(e) => panic!("unexpected error: {e}"),
            Ok(_) => panic!("duplicate registration accepted"),
        }
    }

    #[tokio::test]
    async fn test_resolve_bare_and_namespaced() {
        let registry = ToolRegistry::builder()
            .namespace("mcp__Nexushub__")
            .register(descriptor("echo"), Echo)
            .unwrap()
            .build();

        assert_eq!(registry.list()[0].name, "mcp__Nexushub__echo");

        let bare = registry.resolve("echo").unwrap();
        assert_eq!(bare.invoke(json!({"a": 1})).await.unwrap(), json!({"a": 1}));
        assert!(registry.resolve("mcp__Nexushub__echo").is_ok());
        assert!(matches!(
            registry.resolve("missing"),
            Err(NexusError::ToolNotFound(_))
        ));
    }

    #[test]
    fn test_descriptor_serializes_input_schema_camel_case() {
        let value = serde_json::to_value(descriptor("echo")).unwrap();
        assert!(value.get("inputSchema").is_some());
        assert!(value.get("input_schema").is_none());
    }
}
