//! Log setup shared by the server and the batch jobs.
//!
//! Console output always goes to stderr so job output on stdout stays
//! clean. When a log directory is configured, a second sink writes the
//! same events to a daily rolling file `<dir>/<prefix>.YYYY-MM-DD`.

use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Keeps the file writer alive. Drop it only at process exit or buffered
/// lines are lost.
#[must_use]
pub struct LogGuard {
    _file: Option<WorkerGuard>,
}

/// `RUST_LOG` takes precedence over `level`.
pub fn init_logging(level: &str, log_dir: Option<&Path>, file_prefix: &str) -> LogGuard {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let (file_layer, guard) = match log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, file_prefix);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer().with_ansi(false).with_writer(writer);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    let _ = tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(file_layer)
        .try_init();

    LogGuard { _file: guard }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_sink_writes_into_directory() {
        let dir = std::env::temp_dir().join(format!("storage-ingestor-log-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();

        let guard = init_logging("info", Some(&dir), "test");
        tracing::info!("hello from the logging test");
        drop(guard);

        let created = std::fs::read_dir(&dir)
            .unwrap()
            .filter_map(|entry| entry.ok())
            .any(|entry| entry.file_name().to_string_lossy().starts_with("test"));
        assert!(created);
        let _ = std::fs::remove_dir_all(&dir);
    }
}
