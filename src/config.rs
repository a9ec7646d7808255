//! nexushub configuration from nexushub.toml, with environment overrides.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::NexusError;

pub const DEFAULT_CONFIG_FILE: &str = "nexushub.toml";
const REDACTED: &str = "<redacted>";

/// Written by `nexushub config init`.
pub const DEFAULT_CONFIG: &str = r#"# nexushub configuration
# Environment variables PORT, DATABASE_PATH, SERPER_API_KEY,
# DEFAULT_DOCS_SOURCE_DIR and LOG_LEVEL override the values below.

[server]
host = "127.0.0.1"
port = 8001

[paths]
shared_fs = "data/shared_fs"
database = "data/mcp_server.db"
docs_dir = "docs"
latest_libs = "data/latest_libs.json"

[search]
# serper_api_key = ""
endpoint = "https://google.serper.dev/search"

[docker]
binary = "docker"

[supervisor]
# Side log directory; defaults to the system temp dir.
# log_dir = "/tmp"

[logging]
level = "info"
json = false
"#;

#[derive(Debug, Deserialize, Serialize, Default, Clone)]
pub struct NexusConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub docker: DockerConfig,
    #[serde(default)]
    pub supervisor: SupervisorConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8001
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct PathsConfig {
    #[serde(default = "default_shared_fs")]
    pub shared_fs: PathBuf,
    #[serde(default = "default_database")]
    pub database: PathBuf,
    #[serde(default = "default_docs_dir")]
    pub docs_dir: PathBuf,
    #[serde(default = "default_latest_libs")]
    pub latest_libs: PathBuf,
}

fn default_shared_fs() -> PathBuf {
    PathBuf::from("data/shared_fs")
}

fn default_database() -> PathBuf {
    PathBuf::from("data/mcp_server.db")
}

fn default_docs_dir() -> PathBuf {
    PathBuf::from("docs")
}

fn default_latest_libs() -> PathBuf {
    PathBuf::from("data/latest_libs.json")
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            shared_fs: default_shared_fs(),
            database: default_database(),
            docs_dir: default_docs_dir(),
            latest_libs: default_latest_libs(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SearchConfig {
    #[serde(default)]
    pub serper_api_key: Option<String>,
    #[serde(default = "default_serper_endpoint")]
    pub endpoint: String,
}

fn default_serper_endpoint() -> String {
    "https://google.serper.dev/search".to_string()
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            serper_api_key: None,
            endpoint: default_serper_endpoint(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct DockerConfig {
    #[serde(default = "default_docker_binary")]
    pub binary: String,
}

fn default_docker_binary() -> String {
    "docker".to_string()
}

impl Default for DockerConfig {
    fn default() -> Self {
        Self {
            binary: default_docker_binary(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Default, Clone)]
pub struct SupervisorConfig {
    #[serde(default)]
    pub log_dir: Option<PathBuf>,
}

impl SupervisorConfig {
    pub fn log_dir(&self) -> PathBuf {
        self.log_dir.clone().unwrap_or_else(std::env::temp_dir)
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub json: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

/// Resolve the config path: explicit flag, then `NEXUSHUB_CONFIG`, then `./nexushub.toml`.
pub fn config_path(explicit: Option<&Path>) -> PathBuf {
    explicit
        .map(Path::to_path_buf)
        .or_else(|| std::env::var_os("NEXUSHUB_CONFIG").map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE))
}

/// Load config from `path`. A missing file yields defaults; a malformed one is an error.
pub fn load_config(path: &Path) -> Result<NexusConfig, NexusError> {
    if !path.exists() {
        return Ok(NexusConfig::default());
    }

    let content = std::fs::read_to_string(path)?;
    toml::from_str(&content)
        .map_err(|e| NexusError::Config(format!("{}: {}", path.display(), e)))
}

impl NexusConfig {
    /// Apply environment overrides through `lookup` (normally `std::env::var`).
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), NexusError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(port) = lookup("PORT") {
            self.server.port = port
                .trim()
                .parse()
                .map_err(|_| NexusError::Config(format!("PORT is not a valid port: {:?}", port)))?;
        }
        if let Some(db) = lookup("DATABASE_PATH") {
            self.paths.database = PathBuf::from(db);
        }
        if let Some(key) = lookup("SERPER_API_KEY") {
            self.search.serper_api_key = Some(key);
        }
        if let Some(dir) = lookup("DEFAULT_DOCS_SOURCE_DIR") {
            self.paths.docs_dir = PathBuf::from(dir);
        }
        if let Some(level) = lookup("LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Some(json) = lookup("NEXUSHUB_LOG_JSON") {
            self.logging.json = matches!(json.trim(), "1" | "true" | "yes");
        }
        Ok(())
    }

    /// Copy safe to print: secrets are masked.
    pub fn redacted(&self) -> Self {
        let mut config = self.clone();
        if config.search.serper_api_key.is_some() {
            config.search.serper_api_key = Some(REDACTED.to_string());
        }
        config
    }

    /// Load from `path` and apply process environment overrides.
    pub fn load(path: &Path) -> Result<Self, NexusError> {
        let mut config = load_config(path)?;
        config.apply_overrides(|key| std::env::var(key).ok().filter(|v| !v.is_empty()))?;
        Ok(config)
    }
}
