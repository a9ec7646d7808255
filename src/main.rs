#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

mod config;
mod error;
mod ipc;
mod logging;
mod mcp;
mod storage;

use std::ffi::OsString;
use std::future::Future;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use serde_json::json;

use config::NexusConfig;
use ipc::client::HttpBridge;
use mcp::ServerState;

#[derive(Parser)]
#[command(name = "nexushub")]
#[command(about = "MCP tool server over stdio and HTTP", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file (default: $NEXUSHUB_CONFIG or ./nexushub.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log filter (e.g. debug, nexushub=trace); overrides RUST_LOG and the config
    #[arg(long, global = true)]
    log_level: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the HTTP transport
    Serve {
        #[arg(long)]
        host: Option<String>,
        #[arg(long)]
        port: Option<u16>,
    },

    /// Run the stdio engine directly (no output filtering)
    Stdio,

    /// Run a child under the supervisor, forwarding only JSON lines to stdout
    Wrap {
        /// Directory for the side log (default: config, then the temp dir)
        #[arg(long)]
        log_dir: Option<PathBuf>,
        /// Child program and arguments (default: this binary's stdio engine)
        #[arg(last = true)]
        program: Vec<OsString>,
    },

    /// Stdio front-end that forwards to a running HTTP transport
    Bridge {
        /// Base URL of the HTTP transport (default: from [server])
        #[arg(long)]
        url: Option<String>,
    },

    /// Print the tool catalogue
    Tools,

    /// Show effective config, or manage the config file
    Config {
        #[command(subcommand)]
        action: Option<ConfigAction>,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Write a default config file
    Init,
    /// Show path to the config file
    Path,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config_path = config::config_path(cli.config.as_deref());
    let log_level = cli.log_level.as_deref();

    match cli.command {
        Commands::Serve { host, port } => handle_serve(&config_path, log_level, host, port),
        Commands::Stdio => handle_stdio(&config_path, log_level),
        Commands::Wrap { log_dir, program } => handle_wrap(&config_path, log_level, log_dir, program),
        Commands::Bridge { url } => handle_bridge(&config_path, log_level, url),
        Commands::Tools => handle_tools(&config_path, log_level),
        Commands::Config { action } => handle_config(&config_path, action),
    }
}

fn load(config_path: &Path) -> anyhow::Result<NexusConfig> {
    NexusConfig::load(config_path).with_context(|| format!("loading {}", config_path.display()))
}

/// How long a stdio engine waits for its blocking stdin reader on exit.
const STDIN_RELEASE_TIMEOUT: Duration = Duration::from_millis(100);

/// Stdio-facing commands share the cooperative single-threaded runtime.
fn stdio_runtime() -> anyhow::Result<tokio::runtime::Runtime> {
    Ok(tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?)
}

/// Run a stdio engine to completion.
///
/// The stdin reader sits on a blocking-pool thread until the next line
/// arrives, so the runtime is shut down with a timeout instead of dropped.
fn run_engine<F>(engine: F) -> anyhow::Result<()>
where
    F: Future<Output = anyhow::Result<()>>,
{
    let rt = stdio_runtime()?;
    let result = rt.block_on(engine);
    rt.shutdown_timeout(STDIN_RELEASE_TIMEOUT);
    result
}

fn handle_serve(
    config_path: &Path,
    log_level: Option<&str>,
    host: Option<String>,
    port: Option<u16>,
) -> anyhow::Result<()> {
    let mut config = load(config_path)?;
    if let Some(host) = host {
        config.server.host = host;
    }
    if let Some(port) = port {
        config.server.port = port;
    }

    logging::init_stderr(
        logging::resolve_filter(log_level, &config.logging.level),
        config.logging.json,
    );

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .with_context(|| {
            format!(
                "invalid listen address {}:{}",
                config.server.host, config.server.port
            )
        })?;

    let rt = tokio::runtime::Builder::new_multi_thread()
        .thread_name("nexushub-worker")
        .enable_all()
        .build()?;

    rt.block_on(async {
        tracing::info!("nexushub {} starting (pid {})", env!("CARGO_PKG_VERSION"), std::process::id());
        let state = ServerState::new(config).await?;
        if let Err(e) = state.sqlite.health_check().await {
            tracing::warn!("Database health check failed: {}", e);
        }
        ipc::http::serve(state.dispatcher, addr, ipc::stdio::shutdown_signal()).await
    })
}

fn handle_stdio(config_path: &Path, log_level: Option<&str>) -> anyhow::Result<()> {
    let config = load(config_path)?;
    logging::init_stderr(
        logging::resolve_filter(log_level, &config.logging.level),
        config.logging.json,
    );

    run_engine(async {
        let state = ServerState::new(config).await?;
        ipc::stdio::run_stdio(state.dispatcher).await
    })
}

fn handle_wrap(
    config_path: &Path,
    log_level: Option<&str>,
    log_dir: Option<PathBuf>,
    program: Vec<OsString>,
) -> anyhow::Result<()> {
    let config = load(config_path)?;
    let log_dir = log_dir.unwrap_or_else(|| config.supervisor.log_dir());
    let (guard, log_file) = logging::init_side_log(
        &log_dir,
        logging::resolve_filter(log_level, &config.logging.level),
    )?;
    tracing::info!("Supervisor starting (pid {}), side log {}", std::process::id(), log_file.display());

    let command = match program.split_first() {
        Some((program, args)) => ipc::supervisor::program_command(program, args),
        None => ipc::supervisor::engine_command(config_path, log_level)?,
    };

    let code = stdio_runtime()?.block_on(async {
        let signals = ipc::supervisor::relay_os_signals()?;
        let mut stdout = tokio::io::stdout();
        anyhow::Ok(ipc::supervisor::supervise(command, &mut stdout, signals).await)
    })?;

    tracing::info!("Supervisor exiting with {}", code);
    // process::exit skips destructors; flush the side log first.
    drop(guard);
    std::process::exit(code)
}

fn handle_bridge(config_path: &Path, log_level: Option<&str>, url: Option<String>) -> anyhow::Result<()> {
    let config = load(config_path)?;
    logging::init_stderr(
        logging::resolve_filter(log_level, &config.logging.level),
        config.logging.json,
    );

    let url = url.unwrap_or_else(|| format!("http://{}:{}", config.server.host, config.server.port));
    let bridge = Arc::new(HttpBridge::new(url)?);
    tracing::info!("Bridging stdio to {}", bridge.base_url());

    run_engine(ipc::stdio::run_stdio(bridge))
}

fn handle_tools(config_path: &Path, log_level: Option<&str>) -> anyhow::Result<()> {
    let config = load(config_path)?;
    logging::init_stderr(
        logging::resolve_filter(log_level, &config.logging.level),
        config.logging.json,
    );

    stdio_runtime()?.block_on(async {
        let state = ServerState::new(config).await?;
        let tools = state.dispatcher.registry().list();
        println!("{}", serde_json::to_string_pretty(&json!({ "tools": tools }))?);
        anyhow::Ok(())
    })
}

fn handle_config(config_path: &Path, action: Option<ConfigAction>) -> anyhow::Result<()> {
    match action {
        Some(ConfigAction::Path) => {
            println!("{}", config_path.display());
        }
        Some(ConfigAction::Init) => {
            if config_path.exists() {
                eprintln!("Config already exists: {}", config_path.display());
                return Ok(());
            }
            if let Some(parent) = config_path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(config_path, config::DEFAULT_CONFIG)?;
            println!("Created: {}", config_path.display());
        }
        None => {
            let config = load(config_path)?;
            println!("# Effective config ({})\n", config_path.display());
            println!("{}", toml::to_string_pretty(&config.redacted())?);
        }
    }

    Ok(())
}
