use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde_json::Value;
use url::Url;

use super::common::{optional_u64, required_str, ToolContext};
use crate::error::NexusError;

const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 30;

/// Return the curated latest-library-versions document.
pub async fn tool_get_latest_libs(_args: Value, ctx: ToolContext) -> Result<Value> {
    let raw = tokio::fs::read_to_string(ctx.latest_libs.as_path())
        .await
        .with_context(|| {
            format!(
                "Failed to get latest libraries from {}",
                ctx.latest_libs.display()
            )
        })?;

    serde_json::from_str(&raw).context("Failed to get latest libraries: invalid JSON")
}

/// Content types returned as text; anything else gets a placeholder.
fn is_textual(content_type: &str) -> bool {
    content_type.contains("text/") || content_type.contains("application/json")
}

/// HTTP GET a URL and return its body as text.
pub async fn tool_fetch_url(args: Value, ctx: ToolContext) -> Result<Value> {
    let raw_url = required_str(&args, "url")?;
    let url = Url::parse(raw_url)
        .map_err(|e| NexusError::InvalidParams(format!("invalid url {:?}: {}", raw_url, e)))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(NexusError::InvalidParams(format!("unsupported scheme: {}", url.scheme())).into());
    }

    let timeout = optional_u64(&args, "timeout").unwrap_or(DEFAULT_FETCH_TIMEOUT_SECS);

    let response = ctx
        .http
        .get(url.clone())
        .timeout(Duration::from_secs(timeout))
        .send()
        .await
        .with_context(|| format!("Failed to fetch URL {}", url))?;

    let status = response.status();
    if !status.is_success() {
        bail!("Failed to fetch URL {}: HTTP error {}", url, status);
    }

    let content_type = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();

    if is_textual(&content_type) {
        let body = response
            .text()
            .await
            .with_context(|| format!("Failed to fetch URL {}", url))?;
        Ok(Value::String(body))
    } else {
        Ok(Value::String(format!(
            "[Binary content of type {}]",
            content_type
        )))
    }
}
