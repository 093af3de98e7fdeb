use std::path::{Path, PathBuf};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const LOG_FILE: &str = "harvester.log";

fn default_log_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("harvester")
        .join("logs")
}

/// Console logging on stderr plus a daily rolling file. The returned guard
/// flushes the file writer when dropped, so keep it alive until exit.
pub fn init_logging(log_dir: Option<&Path>) -> Option<WorkerGuard> {
    let log_dir = log_dir.map(Path::to_path_buf).unwrap_or_else(default_log_dir);

    let console = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);
    let filter = || {
        // Respect RUST_LOG if provided, else default to info
        tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into())
    };

    if let Err(e) = std::fs::create_dir_all(&log_dir) {
        eprintln!("Cannot create log directory {}: {e}", log_dir.display());
        let _ = tracing_subscriber::registry()
            .with(filter())
            .with(console)
            .try_init();
        return None;
    }

    let (file_writer, guard) = tracing_appender::non_blocking(rolling::daily(&log_dir, LOG_FILE));
    let _ = tracing_subscriber::registry()
        .with(filter())
        .with(console)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(file_writer)
                .with_ansi(false)
                .with_target(true)
                .with_file(true)
                .with_line_number(true),
        )
        .try_init();
    Some(guard)
}
