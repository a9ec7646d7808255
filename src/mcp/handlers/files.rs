//! Filesystem tools confined to the shared-fs root.
//!
//! Implements:
//! - fs_list_files - one-level directory listing
//! - fs_read_file - read a UTF-8 file
//! - fs_write_file - create/overwrite a file, creating parents

use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{json, Value};

use super::common::{make_relative, optional_str, required_str, secure_join, ToolContext};

/// List entries of a directory under the shared root. Creates the directory if missing.
pub async fn tool_fs_list_files(args: Value, ctx: ToolContext) -> Result<Value> {
    let root = ctx.shared_fs.as_path();
    let dir = secure_join(root, optional_str(&args, "path").unwrap_or("."))?;

    tokio::fs::create_dir_all(&dir)
        .await
        .with_context(|| format!("Failed to list files: cannot create {}", dir.display()))?;

    let mut read_dir = tokio::fs::read_dir(&dir)
        .await
        .context("Failed to list files")?;

    let mut entries = Vec::new();
    while let Some(entry) = read_dir.next_entry().await.context("Failed to list files")? {
        let metadata = entry.metadata().await.context("Failed to list files")?;
        let modified = metadata
            .modified()
            .ok()
            .map(|t| DateTime::<Utc>::from(t).to_rfc3339_opts(SecondsFormat::Millis, true));

        entries.push(json!({
            "name": entry.file_name().to_string_lossy(),
            "path": make_relative(root, &entry.path()),
            "type": if metadata.is_dir() { "directory" } else { "file" },
            "size": metadata.len(),
            "modified": modified,
        }));
    }

    // read_dir order is platform-defined
    entries.sort_by(|a, b| a["name"].as_str().cmp(&b["name"].as_str()));

    Ok(Value::Array(entries))
}

/// Read a file under the shared root as UTF-8 text.
pub async fn tool_fs_read_file(args: Value, ctx: ToolContext) -> Result<Value> {
    let path = secure_join(&ctx.shared_fs, required_str(&args, "path")?)?;

    let content = tokio::fs::read_to_string(&path)
        .await
        .with_context(|| format!("Failed to read file {}", make_relative(&ctx.shared_fs, &path)))?;

    Ok(Value::String(content))
}

/// Write a file under the shared root, creating parent directories.
pub async fn tool_fs_write_file(args: Value, ctx: ToolContext) -> Result<Value> {
    let root = ctx.shared_fs.as_path();
    let path = secure_join(root, required_str(&args, "path")?)?;
    let content = required_str(&args, "content")?;

    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .context("Failed to write file")?;
    }
    tokio::fs::write(&path, content)
        .await
        .context("Failed to write file")?;

    tracing::debug!("Wrote {} bytes to {:?}", content.len(), path);

    Ok(json!({
        "success": true,
        "path": make_relative(root, &path),
        "message": "File written successfully",
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mcp::handlers::test_support::test_context;

    #[tokio::test]
    async fn test_write_then_read_and_list() {
        let (ctx, _temp) = test_context().await;

        let written = tool_fs_write_file(
            json!({"path": "notes/today.txt", "content": "hello"}),
            ctx.clone(),
        )
        .await
        .unwrap();
        assert_eq!(written["success"], json!(true));
        assert_eq!(written["path"], json!("notes/today.txt"));

        let content = tool_fs_read_file(json!({"path": "notes/today.txt"}), ctx.clone())
            .await
            .unwrap();
        assert_eq!(content, json!("hello"));

        let listing = tool_fs_list_files(json!({}), ctx.clone()).await.unwrap();
        let entries = listing.as_array().unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0]["name"], json!("notes"));
        assert_eq!(entries[0]["type"], json!("directory"));

        let nested = tool_fs_list_files(json!({"path": "notes"}), ctx).await.unwrap();
        assert_eq!(nested[0]["path"], json!("notes/today.txt"));
        assert_eq!(nested[0]["size"], json!(5));
        assert!(nested[0]["modified"].as_str().unwrap().ends_with('Z'));
    }

    #[tokio::test]
    async fn test_traversal_is_rejected() {
        let (ctx, _temp) = test_context().await;

        let err = tool_fs_read_file(json!({"path": "../outside.txt"}), ctx.clone())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Path traversal attempt detected"));

        let err = tool_fs_write_file(json!({"path": "a/../../x", "content": ""}), ctx)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Path traversal attempt detected"));
    }

    #[tokio::test]
    async fn test_missing_arguments() {
        let (ctx, _temp) = test_context().await;
        let err = tool_fs_write_file(json!({"path": "x.txt"}), ctx).await.unwrap_err();
        assert!(err.to_string().contains("content is required"));
    }

    #[tokio::test]
    async fn test_list_creates_missing_directory() {
        let (ctx, _temp) = test_context().await;
        let listing = tool_fs_list_files(json!({"path": "fresh"}), ctx.clone()).await.unwrap();
        assert_eq!(listing, json!([]));
        assert!(ctx.shared_fs.join("fresh").is_dir());
    }
}
