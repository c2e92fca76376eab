use std::fs;
use std::path::Path;
use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{
    fmt::{self},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter, Layer,
};

const LOG_FILE_PREFIX: &str = "banking-accounts.log";

/// Configuration for console and file logging
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub log_dir: String,
    /// Rotated files kept in `log_dir`; older ones are deleted at startup.
    pub max_files: usize,
    pub enable_console: bool,
    pub enable_file: bool,
    pub log_level: Level,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            log_dir: "logs".to_string(),
            max_files: 30,
            enable_console: true,
            enable_file: false,
            log_level: Level::INFO,
        }
    }
}

/// Default directive used when `RUST_LOG` is not set.
pub fn default_filter(level: Level) -> String {
    format!(
        "{}={},sqlx=warn,tower_http=info",
        env!("CARGO_PKG_NAME").replace('-', "_"),
        level
    )
}

/// Installs the global subscriber. The returned guard flushes the file
/// writer on drop and must be held for the lifetime of the process.
pub fn init_logging(
    config: LoggingConfig,
) -> Result<Option<WorkerGuard>, Box<dyn std::error::Error>> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter(config.log_level)));

    let mut layers: Vec<Box<dyn Layer<_> + Send + Sync>> = Vec::new();

    if config.enable_console {
        let console_layer = fmt::layer()
            .with_target(true)
            .with_thread_ids(true)
            .with_level(true)
            .with_ansi(true);
        layers.push(Box::new(console_layer));
    }

    let mut guard = None;
    if config.enable_file {
        fs::create_dir_all(&config.log_dir)?;
        cleanup_old_logs(&config.log_dir, config.max_files)?;

        let appender = RollingFileAppender::new(Rotation::DAILY, &config.log_dir, LOG_FILE_PREFIX);
        let (writer, file_guard) = tracing_appender::non_blocking(appender);
        let file_layer = fmt::layer()
            .with_writer(writer)
            .with_target(true)
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true)
            .with_ansi(false);
        layers.push(Box::new(file_layer));
        guard = Some(file_guard);
    }

    tracing_subscriber::registry()
        .with(env_filter)
        .with(layers)
        .try_init()?;

    Ok(guard)
}

/// Keep at most `max_files` rotated log files, deleting the oldest first.
/// Returns the number of files removed.
pub fn cleanup_old_logs(log_dir: &str, max_files: usize) -> std::io::Result<usize> {
    let log_path = Path::new(log_dir);
    if !log_path.exists() {
        return Ok(0);
    }

    let mut log_files: Vec<_> = fs::read_dir(log_path)?
        .filter_map(|entry| entry.ok())
        .filter(|entry| {
            entry
                .file_name()
                .to_str()
                .map(|name| name.starts_with(LOG_FILE_PREFIX))
                .unwrap_or(false)
        })
        .collect();

    if log_files.len() <= max_files {
        return Ok(0);
    }

    // oldest first
    log_files.sort_by_key(|entry| {
        entry
            .metadata()
            .and_then(|meta| meta.modified())
            .unwrap_or(std::time::SystemTime::UNIX_EPOCH)
    });

    let excess = log_files.len() - max_files;
    let mut removed = 0;
    for entry in log_files.iter().take(excess) {
        if fs::remove_file(entry.path()).is_ok() {
            removed += 1;
        }
    }
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_filter_targets_this_crate() {
        assert_eq!(
            default_filter(Level::DEBUG),
            "banking_accounts=DEBUG,sqlx=warn,tower_http=info"
        );
    }

    #[test]
    fn test_cleanup_keeps_newest_files() {
        let dir = std::env::temp_dir().join(format!("banking-logs-{}", uuid::Uuid::new_v4()));
        fs::create_dir_all(&dir).unwrap();
        for day in 1..=4 {
            fs::write(dir.join(format!("{}.2024-01-0{}", LOG_FILE_PREFIX, day)), b"x").unwrap();
        }
        fs::write(dir.join("unrelated.txt"), b"x").unwrap();

        let removed = cleanup_old_logs(dir.to_str().unwrap(), 2).unwrap();
        let remaining = fs::read_dir(&dir).unwrap().count();
        fs::remove_dir_all(&dir).unwrap();

        assert_eq!(removed, 2);
        assert_eq!(remaining, 3);
    }

    #[test]
    fn test_cleanup_of_missing_directory_is_noop() {
        assert_eq!(cleanup_old_logs("/nonexistent/banking-logs", 1).unwrap(), 0);
    }
}
