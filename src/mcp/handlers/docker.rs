//! Container tools. The docker CLI is invoked directly with an argv, never through a shell.

use anyhow::{bail, Context, Result};
use serde_json::{json, Value};
use tokio::process::Command;

use super::common::{optional_u64, required_str, ToolContext};
use crate::error::NexusError;

const DEFAULT_STOP_TIMEOUT: u64 = 10;
const DEFAULT_LOG_TAIL: u64 = 100;

fn container_arg(args: &Value) -> Result<&str, NexusError> {
    let container = required_str(args, "container_id_or_name")?;
    // Would otherwise be parsed as a docker flag.
    if container.is_empty() || container.starts_with('-') {
        return Err(NexusError::InvalidParams(format!(
            "invalid container id or name: {:?}",
            container
        )));
    }
    Ok(container)
}

fn list_args(all: bool) -> Vec<String> {
    let mut args = vec!["ps".to_string()];
    if all {
        args.push("-a".into());
    }
    args.extend(["--format".into(), "json".into()]);
    args
}

fn start_args(container: &str) -> Vec<String> {
    vec!["start".into(), container.into()]
}

fn stop_args(container: &str, timeout: u64) -> Vec<String> {
    vec!["stop".into(), "-t".into(), timeout.to_string(), container.into()]
}

fn logs_args(container: &str, tail: u64) -> Vec<String> {
    vec!["logs".into(), "--tail".into(), tail.to_string(), container.into()]
}

/// `docker ps --format json` prints one object per line (docker >= 24).
fn parse_json_lines(stdout: &str) -> Result<Vec<Value>> {
    stdout
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(|l| serde_json::from_str(l).with_context(|| format!("unexpected docker output: {}", l)))
        .collect()
}

async fn run_docker(ctx: &ToolContext, args: &[String]) -> Result<String> {
    tracing::debug!("Running {} {}", ctx.docker_binary, args.join(" "));

    let output = Command::new(&*ctx.docker_binary)
        .args(args)
        .kill_on_drop(true)
        .output()
        .await
        .with_context(|| format!("failed to run {}", ctx.docker_binary))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        bail!(
            "{} {} exited with {}: {}",
            ctx.docker_binary,
            args.first().map(String::as_str).unwrap_or_default(),
            output.status,
            stderr.trim()
        );
    }

    Ok(String::from_utf8_lossy(&output.stdout).to_string())
}

pub async fn tool_docker_list_containers(args: Value, ctx: ToolContext) -> Result<Value> {
    let all = args
        .get("all_containers")
        .and_then(|v| v.as_bool())
        .unwrap_or(false);

    let stdout = run_docker(&ctx, &list_args(all))
        .await
        .context("Failed to list containers")?;
    Ok(Value::Array(parse_json_lines(&stdout)?))
}

pub async fn tool_docker_start_container(args: Value, ctx: ToolContext) -> Result<Value> {
    let container = container_arg(&args)?;
    let stdout = run_docker(&ctx, &start_args(container))
        .await
        .context("Failed to start container")?;

    let message = match stdout.trim() {
        "" => format!("Container {} started", container),
        out => out.to_string(),
    };
    Ok(json!({"success": true, "container": container, "message": message}))
}

pub async fn tool_docker_stop_container(args: Value, ctx: ToolContext) -> Result<Value> {
    let container = container_arg(&args)?;
    let timeout = optional_u64(&args, "timeout").unwrap_or(DEFAULT_STOP_TIMEOUT);

    let stdout = run_docker(&ctx, &stop_args(container, timeout))
        .await
        .context("Failed to stop container")?;

    let message = match stdout.trim() {
        "" => format!("Container {} stopped", container),
        out => out.to_string(),
    };
    Ok(json!({"success": true, "container": container, "message": message}))
}

pub async fn tool_docker_get_container_logs(args: Value, ctx: ToolContext) -> Result<Value> {
    let container = container_arg(&args)?;
    let tail = optional_u64(&args, "tail").unwrap_or(DEFAULT_LOG_TAIL);

    let stdout = run_docker(&ctx, &logs_args(container, tail))
        .await
        .context("Failed to get container logs")?;
    Ok(Value::String(stdout))
}
