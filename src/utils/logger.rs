use std::path::PathBuf;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

/// Environment variable that switches logging to a debug file
pub const DEBUG_ENV: &str = "TWITCHDL_DEBUG";

/// Initialize logging.
///
/// With `TWITCHDL_DEBUG` set, everything down to DEBUG goes to a daily
/// rolling file under the user's data directory and the returned guard must
/// be kept alive. Otherwise compact output goes to stderr, filtered by
/// `RUST_LOG` (default `info`).
pub fn init_logging() -> Option<WorkerGuard> {
    if std::env::var_os(DEBUG_ENV).is_some() {
        let log_dir = log_dir();
        let _ = std::fs::create_dir_all(&log_dir);

        let file_appender = tracing_appender::rolling::daily(&log_dir, "twitch-dl.log");
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

        tracing_subscriber::fmt()
            .with_writer(non_blocking)
            .with_ansi(false)
            .with_env_filter(
                EnvFilter::from_default_env().add_directive(tracing::Level::DEBUG.into()),
            )
            .init();

        tracing::info!("twitch-dl logging to {}", log_dir.display());
        Some(guard)
    } else {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
        tracing_subscriber::fmt()
            .with_writer(std::io::stderr)
            .with_target(false)
            .compact()
            .with_env_filter(filter)
            .init();
        None
    }
}

/// `$XDG_DATA_HOME/twitch-dl`, or the platform data directory
pub fn log_dir() -> PathBuf {
    std::env::var_os("XDG_DATA_HOME")
        .map(PathBuf::from)
        .or_else(dirs::data_local_dir)
        .unwrap_or_else(|| PathBuf::from("."))
        .join("twitch-dl")
}
