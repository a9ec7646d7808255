//! Web search through the Serper API.

use anyhow::{bail, Context, Result};
use serde_json::{json, Value};

use super::common::{optional_str, optional_u64, required_str, ToolContext};
use crate::error::NexusError;

const DEFAULT_NUM_RESULTS: u64 = 10;

/// Build the Serper request body.
fn serper_body(
    query: &str,
    search_type: Option<&str>,
    num_results: Option<u64>,
    gl: Option<&str>,
    hl: Option<&str>,
) -> Result<Value, NexusError> {
    let mut body = json!({
        "q": query,
        "gl": gl.unwrap_or("us"),
        "hl": hl.unwrap_or("en"),
        "num": num_results.unwrap_or(DEFAULT_NUM_RESULTS),
    });

    match search_type.unwrap_or("search") {
        "search" => {}
        kind @ ("news" | "images" | "places") => {
            body["type"] = json!(kind);
        }
        other => {
            return Err(NexusError::InvalidParams(format!(
                "search_type must be one of search, news, images, places (got {:?})",
                other
            )));
        }
    }

    Ok(body)
}

pub async fn tool_serper_search(args: Value, ctx: ToolContext) -> Result<Value> {
    let query = required_str(&args, "query")?;
    let body = serper_body(
        query,
        optional_str(&args, "search_type"),
        optional_u64(&args, "num_results"),
        optional_str(&args, "gl"),
        optional_str(&args, "hl"),
    )?;

    let Some(api_key) = ctx.serper_api_key.as_deref() else {
        bail!("Failed to perform search: Serper API key is not configured");
    };

    tracing::debug!("Serper search: {:?}", query);

    let response = ctx
        .http
        .post(&*ctx.serper_endpoint)
        .header("X-API-KEY", api_key)
        .json(&body)
        .send()
        .await
        .context("Failed to perform search")?;

    let status = response.status();
    if !status.is_success() {
        bail!("Failed to perform search: Serper API error: {}", status);
    }

    response
        .json::<Value>()
        .await
        .context("Failed to perform search: invalid response body")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mcp::handlers::test_support::{spawn_router, test_context};
    use axum::http::HeaderMap;
    use axum::routing::post;
    use axum::{Json, Router};
    use std::sync::Arc;

    #[test]
    fn test_serper_body() {
        let body = serper_body("rust async", None, None, None, None).unwrap();
        assert_eq!(body, json!({"q": "rust async", "gl": "us", "hl": "en", "num": 10}));

        let news = serper_body("tokio", Some("news"), Some(3), Some("de"), Some("de")).unwrap();
        assert_eq!(news["type"], json!("news"));
        assert_eq!(news["num"], json!(3));
        assert_eq!(news["gl"], json!("de"));

        assert!(serper_body("x", Some("videos"), None, None, None).is_err());
    }

    #[tokio::test]
    async fn test_missing_api_key() {
        let (ctx, _temp) = test_context().await;
        let err = tool_serper_search(json!({"query": "x"}), ctx).await.unwrap_err();
        assert!(err.to_string().contains("Serper API key is not configured"));
    }

    #[tokio::test]
    async fn test_search_posts_body_with_key() {
        let router = Router::new().route(
            "/search",
            post(|headers: HeaderMap, Json(body): Json<Value>| async move {
                let key = headers
                    .get("x-api-key")
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or_default()
                    .to_string();
                Json(json!({"key": key, "echo": body}))
            }),
        );
        let addr = spawn_router(router).await;

        let (mut ctx, _temp) = test_context().await;
        ctx.serper_api_key = Some(Arc::from("secret"));
        ctx.serper_endpoint = Arc::from(format!("http://{}/search", addr).as_str());

        let result = tool_serper_search(json!({"query": "mcp", "search_type": "images"}), ctx)
            .await
            .unwrap();
        assert_eq!(result["key"], json!("secret"));
        assert_eq!(result["echo"]["q"], json!("mcp"));
        assert_eq!(result["echo"]["type"], json!("images"));
    }
}
