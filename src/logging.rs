//! Log output for the trustgate binary.
//!
//! [`init`] picks a mode from [`LoggingConfig`]. With a `json_dir` set,
//! events are also written as one JSON object per line to a daily-rotated
//! audit file; without it, output is console only. `RUST_LOG` overrides the
//! configured level.

use std::path::Path;

use anyhow::Context;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use crate::config::LoggingConfig;

/// File name prefix for the audit log; the appender adds `.YYYY-MM-DD`.
pub const AUDIT_LOG_PREFIX: &str = "trustgate-audit.log";

/// Keeps the audit log writer thread alive. Dropping it flushes the file.
pub struct LoggingGuard {
    _writer: WorkerGuard,
}

/// Install the global subscriber described by `config`.
///
/// # Errors
///
/// Fails when the audit directory cannot be created or a subscriber is
/// already installed.
pub fn init(config: &LoggingConfig) -> anyhow::Result<Option<LoggingGuard>> {
    match &config.json_dir {
        Some(dir) => init_production(dir, &config.level).map(Some),
        None => init_cli(&config.level).map(|()| None),
    }
}

/// Console output on stderr plus a JSON audit log under `logs_dir`.
///
/// # Errors
///
/// Fails when `logs_dir` cannot be created or a subscriber is already
/// installed.
pub fn init_production(logs_dir: &Path, level: &str) -> anyhow::Result<LoggingGuard> {
    std::fs::create_dir_all(logs_dir)
        .with_context(|| format!("cannot create audit log directory {}", logs_dir.display()))?;

    let (writer, guard) =
        tracing_appender::non_blocking(tracing_appender::rolling::daily(logs_dir, AUDIT_LOG_PREFIX));

    tracing_subscriber::registry()
        .with(filter(level))
        .with(tracing_subscriber::fmt::layer().json().with_writer(writer))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .try_init()
        .context("a log subscriber is already installed")?;

    Ok(LoggingGuard { _writer: guard })
}

/// Console output on stderr only.
///
/// # Errors
///
/// Fails when a subscriber is already installed.
pub fn init_cli(level: &str) -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(filter(level))
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| anyhow::anyhow!("a log subscriber is already installed: {e}"))
}

/// `RUST_LOG` when set and non-blank, else the configured level. Invalid
/// directives are skipped rather than rejected.
fn filter(level: &str) -> EnvFilter {
    let directives = std::env::var(EnvFilter::DEFAULT_ENV)
        .ok()
        .filter(|d| !d.trim().is_empty())
        .unwrap_or_else(|| level.to_owned());
    EnvFilter::builder().parse_lossy(directives)
}
