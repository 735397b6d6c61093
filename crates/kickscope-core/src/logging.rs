//! Logging setup shared by the command line client.

use std::path::PathBuf;
use std::sync::OnceLock;

use tracing::Level;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

/// Log file name prefix inside the log directory
pub const LOG_FILE_PREFIX: &str = "kickscope.log";

static LOG_GUARD: OnceLock<tracing_appender::non_blocking::WorkerGuard> = OnceLock::new();

/// How much to log and where
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoggingOptions {
    /// Number of `-v` flags given
    pub verbosity: u8,
    /// Directory for a daily rolling log file
    pub log_dir: Option<PathBuf>,
}

impl LoggingOptions {
    /// Default level when `RUST_LOG` does not say otherwise
    pub fn level(&self) -> Level {
        match self.verbosity {
            0 => Level::WARN,
            1 => Level::INFO,
            2 => Level::DEBUG,
            _ => Level::TRACE,
        }
    }
}

/// Installs the global subscriber. Logs go to stderr so that stdout only
/// carries command output.
pub fn init_logging(options: &LoggingOptions) {
    let env_filter = EnvFilter::builder()
        .with_default_directive(options.level().into())
        .from_env_lossy();

    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_ansi(cfg!(debug_assertions));

    // Log to file when asked (best effort).
    let file_layer = options.log_dir.as_ref().and_then(|log_dir| {
        std::fs::create_dir_all(log_dir).ok()?;
        let file_appender = tracing_appender::rolling::daily(log_dir, LOG_FILE_PREFIX);
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
        let _ = LOG_GUARD.set(guard);

        Some(
            tracing_subscriber::fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false),
        )
    });

    let subscriber = tracing_subscriber::registry()
        .with(env_filter)
        .with(stderr_layer)
        .with(file_layer);

    // Avoid panics if already initialized (tests).
    let _ = tracing::subscriber::set_global_default(subscriber);
}
