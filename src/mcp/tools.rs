//! The NexusHub tool catalogue: descriptors plus handler wiring.

use serde_json::json;

use super::handlers::common::ToolContext;
use super::handlers::{database, docker, files, general, search, vector};
use super::registry::{ContextTool, ToolDescriptor, ToolRegistry};
use crate::error::NexusError;

/// Prefix carried by every listed tool name.
pub const TOOL_NAMESPACE: &str = "mcp__Nexushub__";

/// Build the immutable registry. Fails only on a duplicate tool name.
pub fn build_registry(ctx: ToolContext) -> Result<ToolRegistry, NexusError> {
    let registry = ToolRegistry::builder()
        .namespace(TOOL_NAMESPACE)
        // General
        .register(
            ToolDescriptor::new(
                "get_latest_libs",
                "Returns a JSON object with latest secure/stable package versions for Python.",
                json!({ "type": "object", "properties": {} }),
            ),
            ContextTool::new(ctx.clone(), general::tool_get_latest_libs),
        )?
        .register(
            ToolDescriptor::new(
                "fetch_url",
                "Fetches content from a given URL.",
                json!({
                    "type": "object",
                    "properties": {
                        "url": { "type": "string", "description": "The URL to fetch" },
                        "timeout": { "type": "number", "description": "Timeout in seconds (default: 30)" }
                    },
                    "required": ["url"]
                }),
            ),
            ContextTool::new(ctx.clone(), general::tool_fetch_url),
        )?
        // Filesystem
        .register(
            ToolDescriptor::new(
                "fs_list_files",
                "Lists files and directories within a secure path.",
                json!({
                    "type": "object",
                    "properties": {
                        "path": { "type": "string", "description": "Path to list (relative to secure base path)" }
                    }
                }),
            ),
            ContextTool::new(ctx.clone(), files::tool_fs_list_files),
        )?
        .register(
            ToolDescriptor::new(
                "fs_read_file",
                "Reads the content of a file within a secure path.",
                json!({
                    "type": "object",
                    "properties": {
                        "path": { "type": "string", "description": "Path to file (relative to secure base path)" }
                    },
                    "required": ["path"]
                }),
            ),
            ContextTool::new(ctx.clone(), files::tool_fs_read_file),
        )?
        .register(
            ToolDescriptor::new(
                "fs_write_file",
                "Writes content to a file within a secure path.",
                json!({
                    "type": "object",
                    "properties": {
                        "path": { "type": "string", "description": "Path to file (relative to secure base path)" },
                        "content": { "type": "string", "description": "Content to write to the file" }
                    },
                    "required": ["path", "content"]
                }),
            ),
            ContextTool::new(ctx.clone(), files::tool_fs_write_file),
        )?
        // Database
        .register(
            ToolDescriptor::new(
                "db_execute_query",
                "Executes a read-only SQL query against the database.",
                json!({
                    "type": "object",
                    "properties": {
                        "query": { "type": "string", "description": "The SQL query to execute (SELECT only)" },
                        "params": { "type": "array", "description": "Positional query parameters" }
                    },
                    "required": ["query"]
                }),
            ),
            ContextTool::new(ctx.clone(), database::tool_db_execute_query),
        )?
        .register(
            ToolDescriptor::new(
                "db_list_tables",
                "Lists all tables in the database.",
                json!({ "type": "object", "properties": {} }),
            ),
            ContextTool::new(ctx.clone(), database::tool_db_list_tables),
        )?
        .register(
            ToolDescriptor::new(
                "db_describe_table",
                "Describes the columns of a specific table.",
                json!({
                    "type": "object",
                    "properties": {
                        "table_name": { "type": "string", "description": "The name of the table to describe" }
                    },
                    "required": ["table_name"]
                }),
            ),
            ContextTool::new(ctx.clone(), database::tool_db_describe_table),
        )?
        .register(
            ToolDescriptor::new(
                "db_insert_data",
                "Inserts a single row into the specified table.",
                json!({
                    "type": "object",
                    "properties": {
                        "table_name": { "type": "string", "description": "The name of the table" },
                        "data": { "type": "object", "description": "The data to insert (column/value pairs)" }
                    },
                    "required": ["table_name", "data"]
                }),
            ),
            ContextTool::new(ctx.clone(), database::tool_db_insert_data),
        )?
        // Docker
        .register(
            ToolDescriptor::new(
                "docker_list_containers",
                "Lists Docker containers.",
                json!({
                    "type": "object",
                    "properties": {
                        "all_containers": { "type": "boolean", "description": "Whether to list all containers or only running ones" }
                    }
                }),
            ),
            ContextTool::new(ctx.clone(), docker::tool_docker_list_containers),
        )?
        .register(
            ToolDescriptor::new(
                "docker_start_container",
                "Starts a stopped Docker container.",
                json!({
                    "type": "object",
                    "properties": {
                        "container_id_or_name": { "type": "string", "description": "The ID or name of the container to start" }
                    },
                    "required": ["container_id_or_name"]
                }),
            ),
            ContextTool::new(ctx.clone(), docker::tool_docker_start_container),
        )?
        .register(
            ToolDescriptor::new(
                "docker_stop_container",
                "Stops a running Docker container.",
                json!({
                    "type": "object",
                    "properties": {
                        "container_id_or_name": { "type": "string", "description": "The ID or name of the container to stop" },
                        "timeout": { "type": "number", "description": "Timeout in seconds before the container is killed" }
                    },
                    "required": ["container_id_or_name"]
                }),
            ),
            ContextTool::new(ctx.clone(), docker::tool_docker_stop_container),
        )?
        .register(
            ToolDescriptor::new(
                "docker_get_container_logs",
                "Fetches logs from a Docker container.",
                json!({
                    "type": "object",
                    "properties": {
                        "container_id_or_name": { "type": "string", "description": "The ID or name of the container" },
                        "tail": { "type": "number", "description": "Number of lines to show from the end of the logs" }
                    },
                    "required": ["container_id_or_name"]
                }),
            ),
            ContextTool::new(ctx.clone(), docker::tool_docker_get_container_logs),
        )?
        // Search
        .register(
            ToolDescriptor::new(
                "serper_search",
                "Performs a search using the Serper API.",
                json!({
                    "type": "object",
                    "properties": {
                        "query": { "type": "string", "description": "The search query" },
                        "search_type": {
                            "type": "string",
                            "description": "Type of search (search, news, images, etc.)",
                            "enum": ["search", "news", "images", "places"]
                        },
                        "num_results": { "type": "number", "description": "Number of results to return" }
                    },
                    "required": ["query"]
                }),
            ),
            ContextTool::new(ctx.clone(), search::tool_serper_search),
        )?
        // Vector store
        .register(
            ToolDescriptor::new(
                "ingest_docs",
                "Ingests Markdown documentation into the vector store.",
                json!({
                    "type": "object",
                    "properties": {
                        "source_dir": { "type": "string", "description": "Source directory for documentation (relative to docs directory)" }
                    }
                }),
            ),
            ContextTool::new(ctx.clone(), vector::tool_ingest_docs),
        )?
        .register(
            ToolDescriptor::new(
                "vector_search",
                "Performs a similarity search over ingested documentation.",
                json!({
                    "type": "object",
                    "properties": {
                        "query": { "type": "string", "description": "The search query" },
                        "n_results": { "type": "number", "description": "Number of results to return" }
                    },
                    "required": ["query"]
                }),
            ),
            ContextTool::new(ctx, vector::tool_vector_search),
        )?
        .build();

    tracing::debug!("Registered {} tools with Nexushub namespace", registry.len());
    Ok(registry)
}
