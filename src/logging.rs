//! Subscriber setup. Stdout is reserved for protocol traffic, so every
//! subscriber here writes to stderr or to the supervisor's side log.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const FALLBACK_FILTER: &str = "info";

/// `--log-level` wins, then `RUST_LOG`, then the configured level.
pub fn resolve_filter(cli_level: Option<&str>, config_level: &str) -> EnvFilter {
    let rust_log = std::env::var("RUST_LOG").ok().filter(|v| !v.trim().is_empty());
    let directive = cli_level
        .map(str::to_string)
        .or(rust_log)
        .unwrap_or_else(|| config_level.to_string());

    EnvFilter::try_new(&directive).unwrap_or_else(|e| {
        eprintln!("Invalid log filter {:?} ({}), using {:?}", directive, e, FALLBACK_FILTER);
        EnvFilter::new(FALLBACK_FILTER)
    })
}

/// Text or JSON logs on stderr.
pub fn init_stderr(filter: EnvFilter, json: bool) {
    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

/// Log to a fresh `nexushub-<timestamp>.log` under `dir`.
///
/// The returned guard flushes the background writer when dropped; hold it
/// until the process is about to exit.
pub fn init_side_log(dir: &Path, filter: EnvFilter) -> Result<(WorkerGuard, PathBuf)> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("cannot create log directory {}", dir.display()))?;

    let file_name = side_log_name(chrono::Local::now());
    let appender = tracing_appender::rolling::never(dir, &file_name);
    let (writer, guard) = tracing_appender::non_blocking(appender);

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(writer),
        )
        .init();

    Ok((guard, dir.join(file_name)))
}

fn side_log_name<Tz: chrono::TimeZone>(now: chrono::DateTime<Tz>) -> String
where
    Tz::Offset: std::fmt::Display,
{
    format!("nexushub-{}.log", now.format("%Y%m%d-%H%M%S"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_side_log_name() {
        let at = chrono::Utc.with_ymd_and_hms(2024, 3, 9, 7, 5, 1).unwrap();
        assert_eq!(side_log_name(at), "nexushub-20240309-070501.log");
    }

    #[test]
    fn test_cli_level_wins() {
        let filter = resolve_filter(Some("debug"), "warn");
        assert_eq!(filter.to_string(), "debug");
    }

    #[test]
    fn test_invalid_level_falls_back() {
        let filter = resolve_filter(Some("nexushub=verbose"), "warn");
        assert_eq!(filter.to_string(), FALLBACK_FILTER);
    }
}
