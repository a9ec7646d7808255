//! Runs the nexushub binary over real pipes: the bare stdio engine, and the
//! supervisor with its default child.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use serde_json::{json, Value};
use tempfile::TempDir;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, Command};

const BIN: &str = env!("CARGO_BIN_EXE_nexushub");
const TIMEOUT: Duration = Duration::from_secs(15);

/// Config with every path inside `dir`.
fn write_config(dir: &Path) -> PathBuf {
    let path_in = |name: &str| dir.join(name).display().to_string();
    let config = format!(
        "[paths]\nshared_fs = {:?}\ndatabase = {:?}\ndocs_dir = {:?}\nlatest_libs = {:?}\n\n[logging]\nlevel = \"debug\"\n",
        path_in("shared_fs"),
        path_in("mcp_server.db"),
        path_in("docs"),
        path_in("latest_libs.json"),
    );
    let path = dir.join("nexushub.toml");
    std::fs::write(&path, config).unwrap();
    path
}

fn spawn(config: &Path, args: &[&str]) -> Child {
    let mut command = Command::new(BIN);
    for key in [
        "PORT",
        "DATABASE_PATH",
        "SERPER_API_KEY",
        "DEFAULT_DOCS_SOURCE_DIR",
        "LOG_LEVEL",
        "RUST_LOG",
        "NEXUSHUB_SUPERVISED",
    ] {
        command.env_remove(key);
    }
    command
        .arg("--config")
        .arg(config)
        .args(args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .kill_on_drop(true)
        .spawn()
        .unwrap()
}

/// Send `initialize` and return the first stdout line, keeping stdin open.
async fn initialize(child: &mut Child) -> (ChildStdin, Value) {
    let mut stdin = child.stdin.take().unwrap();
    stdin
        .write_all(b"{\"jsonrpc\":\"2.0\",\"id\":1,\"method\":\"initialize\",\"params\":{}}\n")
        .await
        .unwrap();
    stdin.flush().await.unwrap();

    let mut lines = BufReader::new(child.stdout.take().unwrap()).lines();
    let line = tokio::time::timeout(TIMEOUT, lines.next_line())
        .await
        .expect("no response to initialize")
        .unwrap()
        .expect("stdout closed before a response");
    (stdin, serde_json::from_str(&line).unwrap())
}

async fn terminate(child: &mut Child) -> std::process::ExitStatus {
    let pid = child.id().expect("child already reaped");
    kill(Pid::from_raw(pid as i32), Signal::SIGTERM).unwrap();
    tokio::time::timeout(TIMEOUT, child.wait())
        .await
        .expect("process did not exit after SIGTERM")
        .unwrap()
}

fn assert_initialized(response: &Value) {
    assert_eq!(response["jsonrpc"], json!("2.0"));
    assert_eq!(response["id"], json!(1));
    assert_eq!(response["result"]["serverInfo"]["name"], json!("NexusHub MCP Server"));
}

#[tokio::test]
async fn test_stdio_engine_exits_on_sigterm_with_stdin_open() {
    let dir = TempDir::new().unwrap();
    let config = write_config(dir.path());

    let mut child = spawn(&config, &["stdio"]);
    let (_stdin, response) = initialize(&mut child).await;
    assert_initialized(&response);

    let status = terminate(&mut child).await;
    assert!(status.success(), "stdio engine exited with {}", status);
}

#[tokio::test]
async fn test_stdio_engine_exits_on_eof() {
    let dir = TempDir::new().unwrap();
    let config = write_config(dir.path());

    let mut child = spawn(&config, &["stdio"]);
    let (stdin, response) = initialize(&mut child).await;
    assert_initialized(&response);

    drop(stdin);
    let status = tokio::time::timeout(TIMEOUT, child.wait())
        .await
        .expect("stdio engine did not exit on EOF")
        .unwrap();
    assert!(status.success(), "stdio engine exited with {}", status);
}

#[tokio::test]
async fn test_wrap_runs_default_engine_and_mirrors_clean_exit() {
    let dir = TempDir::new().unwrap();
    let config = write_config(dir.path());
    let log_dir = dir.path().join("logs");

    let mut child = spawn(
        &config,
        &["wrap", "--log-dir", log_dir.to_str().unwrap()],
    );
    let (_stdin, response) = initialize(&mut child).await;
    assert_initialized(&response);

    let status = terminate(&mut child).await;
    assert_eq!(status.code(), Some(0), "supervisor exited with {}", status);

    let side_logs: Vec<_> = std::fs::read_dir(&log_dir)
        .unwrap()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_name().to_string_lossy().starts_with("nexushub-"))
        .collect();
    assert_eq!(side_logs.len(), 1);
}
