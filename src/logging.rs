//! Log setup: stderr plus a per-job pair of files, one with the full
//! INFO stream and one holding only warnings and errors so that failed
//! runs can be triaged without scrolling the whole crawl.

use std::io;
use std::path::{Path, PathBuf};

use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer};

/// File names for a job's log pair.
pub fn log_pair(logs_dir: &Path, job: &str) -> (PathBuf, PathBuf) {
    (
        logs_dir.join(format!("{job}_info.log")),
        logs_dir.join(format!("{job}_error.log")),
    )
}

/// Install the global subscriber. The returned guards must be held for
/// the life of the process or buffered log lines are lost.
pub fn init(logs_dir: &Path, job: &str) -> io::Result<Vec<WorkerGuard>> {
    std::fs::create_dir_all(logs_dir)?;

    let info_appender = rolling::never(logs_dir, format!("{job}_info.log"));
    let error_appender = rolling::never(logs_dir, format!("{job}_error.log"));
    let (info_writer, info_guard) = tracing_appender::non_blocking(info_appender);
    let (error_writer, error_guard) = tracing_appender::non_blocking(error_appender);

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().with_writer(io::stderr))
        .with(fmt::layer().with_ansi(false).with_writer(info_writer))
        .with(
            fmt::layer()
                .with_ansi(false)
                .with_writer(error_writer)
                .with_filter(LevelFilter::WARN),
        )
        .init();

    Ok(vec![info_guard, error_guard])
}
