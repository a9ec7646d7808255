//! Supervisor: runs the stdio engine as a child and keeps our stdout pure.
//!
//! Child stdout is split into lines by [`LineFilter`]; only lines that are a
//! complete JSON object reach the real stdout, everything else (and all of the
//! child's stderr) goes to the side log. Signals received here are relayed to
//! the child and the child's exit status is mirrored.

use std::ffi::OsString;
use std::os::unix::process::ExitStatusExt;
use std::path::Path;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use anyhow::Result;
use futures::StreamExt;
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use tokio::io::{AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::process::Command;
use tokio::sync::mpsc;
use tokio_util::codec::FramedRead;

use super::filter::{Classified, DropReason, LineFilter};
use super::stdio::{line_codec, SUPERVISED_ENV};

/// Exit code when the child cannot be started.
pub const SPAWN_FAILURE_EXIT: i32 = 1;
/// How long to keep reading child output after it exits.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(2);
const READ_CHUNK: usize = 8192;

/// Command for the default child: this executable running the stdio engine.
pub fn engine_command(config_path: &Path, log_level: Option<&str>) -> Result<Command> {
    let exe = std::env::current_exe()?;
    let mut command = Command::new(exe);
    command.arg("--config").arg(config_path);
    if let Some(level) = log_level {
        command.arg("--log-level").arg(level);
    }
    command.arg("stdio");
    Ok(command)
}

/// Command for an explicit child program.
pub fn program_command(program: &OsString, args: &[OsString]) -> Command {
    let mut command = Command::new(program);
    command.args(args);
    command
}

/// Relay SIGINT, SIGTERM and SIGQUIT received by this process into a channel.
pub fn relay_os_signals() -> std::io::Result<mpsc::Receiver<Signal>> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut interrupt = signal(SignalKind::interrupt())?;
    let mut terminate = signal(SignalKind::terminate())?;
    let mut quit = signal(SignalKind::quit())?;
    let (tx, rx) = mpsc::channel(8);

    tokio::spawn(async move {
        loop {
            let sig = tokio::select! {
                _ = interrupt.recv() => Signal::SIGINT,
                _ = terminate.recv() => Signal::SIGTERM,
                _ = quit.recv() => Signal::SIGQUIT,
            };
            tracing::info!("Received {:?}", sig);
            if tx.send(sig).await.is_err() {
                break;
            }
        }
    });

    Ok(rx)
}

/// Spawn `command`, filter its output into `out`, and return the exit code to mirror.
///
/// Every signal arriving on `signals` is forwarded to the child.
pub async fn supervise<W>(mut command: Command, out: &mut W, mut signals: mpsc::Receiver<Signal>) -> i32
where
    W: AsyncWrite + Unpin,
{
    command
        .stdin(Stdio::inherit())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .env(SUPERVISED_ENV, "1");

    let mut child = match command.spawn() {
        Ok(child) => child,
        Err(e) => {
            tracing::error!("Failed to spawn child process: {}", e);
            return SPAWN_FAILURE_EXIT;
        }
    };

    let pid = child.id();
    tracing::info!("Child started (pid {:?})", pid);

    let (Some(mut stdout), Some(stderr)) = (child.stdout.take(), child.stderr.take()) else {
        tracing::error!("Child pipes unavailable");
        let _ = child.start_kill();
        return SPAWN_FAILURE_EXIT;
    };
    // Raw frames: stderr is free text and need not be UTF-8.
    let mut err_lines = FramedRead::new(stderr, line_codec());

    let mut filter = LineFilter::new();
    let mut buf = vec![0u8; READ_CHUNK];
    let mut stdout_open = true;
    let mut stderr_open = true;
    let mut signals_open = true;

    let status = loop {
        tokio::select! {
            read = stdout.read(&mut buf), if stdout_open => match read {
                Ok(0) => stdout_open = false,
                Ok(n) => pass_stdout(filter.feed(&buf[..n]), out).await,
                Err(e) => {
                    tracing::warn!("Child stdout read error: {}", e);
                    stdout_open = false;
                }
            },
            line = err_lines.next(), if stderr_open => match line {
                Some(Ok(line)) => log_stderr(&line),
                None => stderr_open = false,
                Some(Err(e)) => {
                    tracing::warn!("Child stderr read error: {}", e);
                    stderr_open = false;
                }
            },
            sig = signals.recv(), if signals_open => match sig {
                Some(sig) => forward_signal(pid, sig),
                None => signals_open = false,
            },
            status = child.wait() => break status,
        }
    };

    // The child may exit with output still sitting in the pipes.
    let drain = async {
        while stdout_open || stderr_open {
            tokio::select! {
                read = stdout.read(&mut buf), if stdout_open => match read {
                    Ok(0) | Err(_) => stdout_open = false,
                    Ok(n) => pass_stdout(filter.feed(&buf[..n]), out).await,
                },
                line = err_lines.next(), if stderr_open => match line {
                    Some(Ok(line)) => log_stderr(&line),
                    None | Some(Err(_)) => stderr_open = false,
                },
            }
        }
    };
    if tokio::time::timeout(DRAIN_TIMEOUT, drain).await.is_err() {
        tracing::warn!("Child output not closed {:?} after exit", DRAIN_TIMEOUT);
    }
    if filter.buffered() > 0 {
        tracing::debug!("Child output ended without a newline ({} bytes)", filter.buffered());
    }
    if let Some(last) = filter.finish() {
        pass_stdout(vec![last], out).await;
    }

    match status {
        Ok(status) => {
            let code = exit_code(status);
            tracing::info!("Child exited with {} (mirroring {})", status, code);
            code
        }
        Err(e) => {
            tracing::error!("Failed to wait for child: {}", e);
            1
        }
    }
}

/// Exit code of the child, or `128 + signo` when it was killed by a signal.
pub fn exit_code(status: ExitStatus) -> i32 {
    match (status.code(), status.signal()) {
        (Some(code), _) => code,
        (None, Some(signo)) => 128 + signo,
        (None, None) => 1,
    }
}

async fn pass_stdout<W>(verdicts: Vec<Classified>, out: &mut W)
where
    W: AsyncWrite + Unpin,
{
    for verdict in verdicts {
        match verdict {
            Classified::Forward(line) => {
                let written = async {
                    out.write_all(line.as_bytes()).await?;
                    out.write_all(b"\n").await?;
                    out.flush().await
                }
                .await;
                if let Err(e) = written {
                    tracing::error!("Failed to write to stdout: {}", e);
                }
            }
            Classified::Drop {
                reason: DropReason::Blank,
                ..
            } => {}
            Classified::Drop { line, reason } => {
                tracing::info!(target: "child_stdout", "[filtered: {}] {}", reason, line);
            }
        }
    }
}

fn log_stderr(line: &[u8]) {
    let line = String::from_utf8_lossy(line);
    let line = line.trim_end();
    if !line.is_empty() {
        tracing::info!(target: "child_stderr", "{}", line);
    }
}

fn forward_signal(pid: Option<u32>, sig: Signal) {
    let Some(pid) = pid else {
        return;
    };
    match kill(Pid::from_raw(pid as i32), sig) {
        Ok(()) => tracing::info!("Forwarded {:?} to child {}", sig, pid),
        Err(e) => tracing::warn!("Failed to forward {:?} to child {}: {}", sig, pid, e),
    }
}
