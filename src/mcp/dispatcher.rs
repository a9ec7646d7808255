//! Method router shared by the stdio and HTTP transports.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use super::registry::ToolRegistry;
use crate::error::{NexusError, SERVER_ERROR};
use crate::ipc::protocol::{Message, MessageHandler, Method, Response};

pub const PROTOCOL_VERSION: &str = "2024-11-05";
pub const SERVER_NAME: &str = "NexusHub MCP Server";

/// Fixed `initialize` result.
pub fn server_capabilities() -> Value {
    json!({
        "protocolVersion": PROTOCOL_VERSION,
        "capabilities": {
            "tools": {}
        },
        "serverInfo": {
            "name": SERVER_NAME,
            "version": env!("CARGO_PKG_VERSION")
        }
    })
}

/// Routes a [`Message`] to the registry. Holds no mutable state.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    registry: Arc<ToolRegistry>,
}

impl Dispatcher {
    pub fn new(registry: Arc<ToolRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    /// Route one message. `None` means the message gets no reply.
    pub async fn dispatch(&self, message: Message) -> Option<Response> {
        let id = message.id.clone();

        match message.kind() {
            Method::Initialize => Some(Response::success(id, server_capabilities())),

            Method::ListTools => {
                let tools = self.registry.list();
                match serde_json::to_value(&tools) {
                    Ok(tools) => Some(Response::success(id, json!({ "tools": tools }))),
                    Err(e) => Some(Response::error(
                        id,
                        SERVER_ERROR,
                        format!("Error listing tools: {}", e),
                    )),
                }
            }

            Method::CallTool(name) => Some(self.call_tool(id, &name, message.params_value()).await),

            Method::Notification(kind) => {
                tracing::debug!("Notification received: {}", kind);
                None
            }

            Method::Unknown(method) => {
                tracing::warn!("Method not found: {}", method);
                Some(Response::from_nexus_error(id, NexusError::MethodNotFound(method)))
            }
        }
    }

    async fn call_tool(&self, id: Option<Value>, name: &str, params: Value) -> Response {
        let start = std::time::Instant::now();

        let outcome = match self.registry.resolve(name) {
            Ok(handler) => handler.invoke(params).await,
            Err(e) => Err(e.into()),
        };

        match outcome {
            Ok(result) => {
                tracing::debug!("Tool {} completed in {:?}", name, start.elapsed());
                Response::success(id, result)
            }
            Err(e) => {
                tracing::warn!("Tool {} failed after {:?}: {:#}", name, start.elapsed(), e);
                Response::error(
                    id,
                    SERVER_ERROR,
                    format!("Error calling tool {}: {:#}", name, e),
                )
            }
        }
    }
}

#[async_trait]
impl MessageHandler for Dispatcher {
    async fn handle(&self, message: Message) -> Option<Response> {
        self.dispatch(message).await
    }
}
