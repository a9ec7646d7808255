//! Database tools over the shared SQLite pool.

use anyhow::{Context, Result};
use serde_json::{json, Value};

use super::common::{required_str, ToolContext};
use crate::error::NexusError;

/// Read-only query. `params` is a positional array; absent or `null` means none.
pub async fn tool_db_execute_query(args: Value, ctx: ToolContext) -> Result<Value> {
    let query = required_str(&args, "query")?;

    let params = match args.get("params") {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(items)) => items.clone(),
        Some(Value::Object(map)) if map.is_empty() => Vec::new(),
        Some(_) => {
            return Err(NexusError::InvalidParams("params must be an array".into()).into());
        }
    };

    let rows = ctx
        .sqlite
        .execute_select(query, &params)
        .await
        .context("Failed to execute query")?;

    Ok(Value::Array(rows))
}

pub async fn tool_db_list_tables(_args: Value, ctx: ToolContext) -> Result<Value> {
    let tables = ctx
        .sqlite
        .list_tables()
        .await
        .context("Failed to list tables")?;
    Ok(json!(tables))
}

pub async fn tool_db_describe_table(args: Value, ctx: ToolContext) -> Result<Value> {
    let table = required_str(&args, "table_name")?;
    let columns = ctx
        .sqlite
        .describe_table(table)
        .await
        .context("Failed to describe table")?;
    Ok(serde_json::to_value(columns)?)
}

pub async fn tool_db_insert_data(args: Value, ctx: ToolContext) -> Result<Value> {
    let table = required_str(&args, "table_name")?;
    let data = args
        .get("data")
        .and_then(|v| v.as_object())
        .ok_or_else(|| NexusError::InvalidParams("data must be an object".into()))?;

    let id = ctx
        .sqlite
        .insert_row(table, data)
        .await
        .context("Failed to insert data")?;

    Ok(json!({
        "success": true,
        "id": id,
        "message": format!("Data inserted into {} successfully", table),
    }))
}
