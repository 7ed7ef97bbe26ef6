//! File-backed diagnostic logging.
//!
//! The terminal belongs to the UI, so tracing output goes to a file and only
//! when asked for: `--debug` or `STREAMVIZ_DEBUG=1`. `RUST_LOG` refines the
//! filter; without it everything at DEBUG and above is written.

use std::fs::File;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use tracing::trace;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

use crate::config::is_truthy;
use crate::error::{Result, StreamvizError};

/// Environment switch for debug logging.
pub const ENV_DEBUG: &str = "STREAMVIZ_DEBUG";

/// Default debug log file name.
pub const DEFAULT_LOG_FILE: &str = "streamviz-debug.log";

/// True when the environment asks for debug logging.
pub fn env_enabled() -> bool {
    std::env::var(ENV_DEBUG).is_ok_and(|v| is_truthy(&v))
}

/// Builds the subscriber writing to `log_file`.
pub fn build_subscriber(log_file: File) -> impl tracing::Subscriber + Send + Sync {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"));
    let fmt_layer = fmt::layer()
        .with_writer(Arc::new(log_file))
        .with_ansi(false)
        .with_target(true);

    tracing_subscriber::registry().with(fmt_layer).with(env_filter)
}

/// Installs the global subscriber, truncating `path`.
///
/// # Errors
///
/// Returns [`StreamvizError::LogSetup`] if the file cannot be created or a
/// global subscriber is already installed.
pub fn init(path: &Path) -> Result<()> {
    let file = File::create(path)
        .map_err(|e| StreamvizError::LogSetup(format!("{}: {e}", path.display())))?;
    tracing::subscriber::set_global_default(build_subscriber(file))
        .map_err(|e| StreamvizError::LogSetup(e.to_string()))
}

/// Logs the duration of a scope at TRACE level when dropped.
pub struct TimingGuard {
    operation: &'static str,
    start: Instant,
}

impl TimingGuard {
    /// Starts timing `operation`.
    pub fn new(operation: &'static str) -> Self {
        Self {
            operation,
            start: Instant::now(),
        }
    }
}

impl Drop for TimingGuard {
    fn drop(&mut self) {
        let elapsed = self.start.elapsed();
        trace!(
            operation = self.operation,
            elapsed_ms = elapsed.as_secs_f64() * 1000.0,
            "timed scope"
        );
    }
}

/// Times the rest of the enclosing scope.
#[macro_export]
macro_rules! time_scope {
    ($operation:expr) => {
        let _guard = $crate::debug::TimingGuard::new($operation);
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn test_subscriber_writes_to_file() {
        let log_file = NamedTempFile::new().unwrap();
        let subscriber = build_subscriber(log_file.reopen().unwrap());

        tracing::subscriber::with_default(subscriber, || {
            tracing::warn!(path = "a.log", "log file missing");
        });

        let contents = std::fs::read_to_string(log_file.path()).unwrap();
        assert!(contents.contains("WARN"), "{contents}");
        assert!(contents.contains("log file missing"), "{contents}");
    }

    #[test]
    fn test_timing_guard_logs_on_drop() {
        let log_file = NamedTempFile::new().unwrap();
        let subscriber = tracing_subscriber::registry().with(
            fmt::layer()
                .with_writer(Arc::new(log_file.reopen().unwrap()))
                .with_ansi(false)
                .with_filter(tracing_subscriber::filter::LevelFilter::TRACE),
        );

        tracing::subscriber::with_default(subscriber, || {
            time_scope!("tick");
        });

        let contents = std::fs::read_to_string(log_file.path()).unwrap();
        assert!(contents.contains("timed scope"), "{contents}");
        assert!(contents.contains("tick"), "{contents}");
    }

    #[test]
    fn test_init_reports_bad_path() {
        let err = init(Path::new("/nonexistent/dir/streamviz.log")).unwrap_err();
        assert!(matches!(err, StreamvizError::LogSetup(_)));
    }
}
