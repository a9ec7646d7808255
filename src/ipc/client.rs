//! HTTP client used by the stdio bridge to reach a running HTTP transport.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::json;

use super::protocol::{Message, MessageHandler, Method, Response};
use crate::error::{NexusError, SERVER_ERROR};
use crate::mcp::dispatcher::server_capabilities;

/// Forwards `tools/list` and `tools/call/<name>` to `<base_url>/mcp/...`.
pub struct HttpBridge {
    base_url: String,
    client: reqwest::Client,
}

impl HttpBridge {
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("nexushub-bridge/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self::with_client(base_url, client))
    }

    pub fn with_client(base_url: impl Into<String>, client: reqwest::Client) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// POST the message to `path` and decode the server's response.
    async fn forward(&self, path: &str, message: &Message) -> Result<Response> {
        let url = format!("{}/mcp/{}", self.base_url, path);
        let mut body = json!({ "params": message.params_value() });
        if let Some(id) = &message.id {
            body["id"] = id.clone();
        }

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .with_context(|| format!("POST {}", url))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            anyhow::bail!("HTTP {} from {}: {}", status, url, text.trim());
        }

        let mut decoded: Response = response
            .json()
            .await
            .with_context(|| format!("invalid response from {}", url))?;
        // Correlation is by the caller's id, whatever the server echoed.
        decoded.id = message.id.clone();
        Ok(decoded)
    }
}

#[async_trait]
impl MessageHandler for HttpBridge {
    async fn handle(&self, message: Message) -> Option<Response> {
        let id = message.id.clone();

        let path = match message.kind() {
            Method::Initialize => return Some(Response::success(id, server_capabilities())),
            Method::ListTools => "tools/list".to_string(),
            Method::CallTool(name) => format!("tools/call/{}", name),
            Method::Notification(kind) => {
                tracing::debug!("Notification received: {}", kind);
                return None;
            }
            Method::Unknown(method) => {
                tracing::warn!("Method not found: {}", method);
                return Some(Response::from_nexus_error(id, NexusError::MethodNotFound(method)));
            }
        };

        match self.forward(&path, &message).await {
            Ok(response) => Some(response),
            Err(e) => {
                tracing::error!("Bridge request {} failed: {:#}", path, e);
                Some(Response::error(
                    id,
                    SERVER_ERROR,
                    format!("Error sending request: {:#}", e),
                ))
            }
        }
    }
}
