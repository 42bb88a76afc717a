use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const LOG_FILE_NAME: &str = "valorant-rpc.log";
const KEEP_LOGS_FOR: Duration = Duration::from_secs(7 * 24 * 60 * 60);
const DEFAULT_FILTER: &str = "info,hyper=warn,reqwest=warn,tungstenite=warn,notify=warn";

/// Log to the console and to a daily rolling file. Keep the returned guard
/// alive for as long as file output is wanted.
pub fn init_logging() -> WorkerGuard {
    let log_dir = get_log_directory();

    let file_appender = tracing_appender::rolling::daily(&log_dir, LOG_FILE_NAME);
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let console_layer = fmt::layer().with_target(true).with_thread_ids(false);

    let file_layer = fmt::layer()
        .with_target(true)
        .with_file(true)
        .with_line_number(true)
        .with_ansi(false)
        .with_writer(file_writer);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer)
        .init();

    tracing::info!(
        "valorant-rpc {} logging to {}",
        env!("CARGO_PKG_VERSION"),
        log_dir.display()
    );

    let cutoff = SystemTime::now() - KEEP_LOGS_FOR;
    for path in stale_log_files(&log_dir, cutoff) {
        match fs::remove_file(&path) {
            Ok(()) => tracing::debug!("Removed old log file: {:?}", path),
            Err(e) => tracing::warn!("Failed to remove old log file {:?}: {}", path, e),
        }
    }

    guard
}

fn get_log_directory() -> PathBuf {
    let log_dir = dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("valorant-rpc")
        .join("logs");

    if let Err(e) = fs::create_dir_all(&log_dir) {
        eprintln!("Warning: Failed to create log directory: {}", e);
    }

    log_dir
}

/// Rotated log files last modified before `cutoff`
fn stale_log_files(log_dir: &Path, cutoff: SystemTime) -> Vec<PathBuf> {
    let entries = match fs::read_dir(log_dir) {
        Ok(entries) => entries,
        Err(e) => {
            tracing::warn!("Failed to read log directory for cleanup: {}", e);
            return Vec::new();
        }
    };

    entries
        .flatten()
        .filter(|entry| {
            let name = entry.file_name();
            let name = name.to_string_lossy();
            name.starts_with(LOG_FILE_NAME) && name != LOG_FILE_NAME
        })
        .filter(|entry| {
            entry
                .metadata()
                .and_then(|m| m.modified())
                .is_ok_and(|modified| modified < cutoff)
        })
        .map(|entry| entry.path())
        .collect()
}
