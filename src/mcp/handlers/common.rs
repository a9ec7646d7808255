use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use anyhow::Result;
use serde_json::Value;

use crate::config::NexusConfig;
use crate::error::NexusError;
use crate::storage::SqliteStorage;

/// Context for executing tools: Arc-wrapped resources for cloning across async tasks.
#[derive(Clone)]
pub struct ToolContext {
    pub sqlite: Arc<SqliteStorage>,
    pub http: reqwest::Client,
    /// Root every filesystem tool is confined to.
    pub shared_fs: Arc<PathBuf>,
    /// Base directory for `ingest_docs`.
    pub docs_dir: Arc<PathBuf>,
    pub latest_libs: Arc<PathBuf>,
    pub serper_api_key: Option<Arc<str>>,
    pub serper_endpoint: Arc<str>,
    pub docker_binary: Arc<str>,
}

impl ToolContext {
    pub fn new(config: &NexusConfig, sqlite: Arc<SqliteStorage>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("NexusHub MCP Server/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            sqlite,
            http,
            shared_fs: Arc::new(config.paths.shared_fs.clone()),
            docs_dir: Arc::new(config.paths.docs_dir.clone()),
            latest_libs: Arc::new(config.paths.latest_libs.clone()),
            serper_api_key: config
                .search
                .serper_api_key
                .as_deref()
                .filter(|k| !k.is_empty())
                .map(Arc::from),
            serper_endpoint: Arc::from(config.search.endpoint.as_str()),
            docker_binary: Arc::from(config.docker.binary.as_str()),
        })
    }
}

/// Required string argument.
pub fn required_str<'a>(args: &'a Value, key: &str) -> Result<&'a str, NexusError> {
    args.get(key)
        .and_then(|v| v.as_str())
        .ok_or_else(|| NexusError::InvalidParams(format!("{} is required", key)))
}

/// Optional string argument; `null` counts as absent.
pub fn optional_str<'a>(args: &'a Value, key: &str) -> Option<&'a str> {
    args.get(key).and_then(|v| v.as_str())
}

/// Optional non-negative integer argument. Accepts JSON numbers and numeric strings.
pub fn optional_u64(args: &Value, key: &str) -> Option<u64> {
    match args.get(key)? {
        Value::Number(n) => n.as_u64().or_else(|| n.as_f64().filter(|f| *f >= 0.0).map(|f| f as u64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Join `relative` onto `root` lexically, refusing anything that climbs out of `root`.
///
/// Absolute inputs are treated as relative to `root`. No filesystem access, so
/// the target does not need to exist yet.
pub fn secure_join(root: &Path, relative: &str) -> Result<PathBuf, NexusError> {
    let mut parts: Vec<&std::ffi::OsStr> = Vec::new();

    for component in Path::new(relative).components() {
        match component {
            Component::Normal(part) => parts.push(part),
            Component::CurDir | Component::RootDir | Component::Prefix(_) => {}
            Component::ParentDir => {
                if parts.pop().is_none() {
                    return Err(NexusError::InvalidParams(
                        "Path traversal attempt detected".into(),
                    ));
                }
            }
        }
    }

    let mut resolved = root.to_path_buf();
    resolved.extend(parts);
    Ok(resolved)
}

/// Strip `root` from `path` for display; falls back to the full path.
pub fn make_relative(root: &Path, path: &Path) -> String {
    path.strip_prefix(root)
        .ok()
        .map(|p| p.to_string_lossy().to_string())
        .unwrap_or_else(|| path.to_string_lossy().to_string())
}
