//! Tracing setup.
//!
//! Events always reach stdout through a compact formatter. When the
//! configuration names a log file, the same events are appended there
//! through a non-blocking writer so ingestion hot paths never wait on disk.

use std::io;
use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Install the global tracing subscriber.
///
/// Filtering follows `RUST_LOG`, defaulting to `info`. The returned guard
/// flushes buffered file output when dropped, so the caller must keep it
/// alive for the life of the process; `None` means no file logging was
/// requested.
pub fn init_tracing(log_file: Option<&Path>) -> io::Result<Option<WorkerGuard>> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().with_target(false).compact());

    let Some(path) = log_file else {
        registry.init();
        return Ok(None);
    };

    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)?;
    let (writer, guard) = tracing_appender::non_blocking(file);
    registry
        .with(fmt::layer().with_writer(writer).with_ansi(false))
        .init();
    Ok(Some(guard))
}

#[cfg(test)]
mod tests {
    use super::*;

    // The error path returns before the subscriber is installed, so this
    // does not poison the process-wide default for other tests.
    #[test]
    fn unwritable_log_file_fails_before_subscriber_install() {
        let result = init_tracing(Some(Path::new("/nonexistent-ragserve-dir/run.log")));
        assert!(result.is_err());
    }
}
