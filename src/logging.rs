// Logging module, powered by tracing-subscriber
//
// Every run appends to a per-day log file under the configured directory.
// Warnings and errors are mirrored to stderr so a failing run is visible
// without opening the file.

use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

use crate::config::LoggingSection;

/// Build the `EnvFilter` from the base level plus quiet defaults for
/// third-party crates. `RUST_LOG`, when set, replaces all of it.
fn build_env_filter(level: &str) -> anyhow::Result<EnvFilter> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }

    let mut directives = vec![level.to_string()];

    let noisy: &[(&str, &str)] = &[
        ("tokio_postgres", "warn"),
        ("postgres_protocol", "warn"),
        ("tokio_util", "warn"),
    ];
    for (target, lvl) in noisy {
        directives.push(format!("{}={}", target, lvl));
    }

    let filter_str = directives.join(",");
    EnvFilter::try_new(&filter_str)
        .map_err(|e| anyhow::anyhow!("Invalid tracing filter '{}': {}", filter_str, e))
}

/// Path of today's log file inside `directory`
pub fn log_file_path(directory: &Path) -> PathBuf {
    directory.join(format!("{}.log", chrono::Local::now().format("%Y-%m-%d")))
}

/// Initialize logging based on configuration.
///
/// Sets up `tracing-subscriber` with:
///  - File layer: timestamped plain-text lines in `<directory>/<YYYY-MM-DD>.log`
///  - Stderr layer: warnings and above
///
/// Returns the path of the log file.
pub fn init_logging(section: &LoggingSection) -> anyhow::Result<PathBuf> {
    fs::create_dir_all(&section.directory)?;

    let file_path = log_file_path(&section.directory);
    let log_file = OpenOptions::new().create(true).append(true).open(&file_path)?;

    let file_layer = tracing_subscriber::fmt::layer()
        .with_ansi(false)
        .with_writer(Mutex::new(log_file))
        .with_target(true)
        .with_filter(build_env_filter(&section.level)?);

    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .without_time()
        .with_filter(tracing_subscriber::filter::LevelFilter::WARN);

    // A second initialization in the same process keeps the first subscriber
    if let Err(e) = tracing_subscriber::registry()
        .with(file_layer)
        .with(stderr_layer)
        .try_init()
    {
        tracing::debug!("Logging already initialized: {}", e);
    }

    tracing::debug!(
        "Logging initialized: level={}, file={}",
        section.level,
        file_path.display()
    );

    Ok(file_path)
}
