//! Tracing subscriber setup

use crate::config::LoggingConfig;
use crate::error::{ControlError, Result};
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Install the global subscriber.
///
/// `RUST_LOG` wins over `config.level` when set. With `config.dir` set, logs
/// are also written to a daily rolling file; the returned guard must be kept
/// alive for buffered lines to be flushed.
pub fn init_logging(config: &LoggingConfig) -> Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("{},tradectl=debug,sqlx=warn", config.level)));

    let (file_layer, guard) = match config.dir.as_deref() {
        Some(dir) => match prepare_log_dir(dir) {
            Ok(()) => {
                let appender = tracing_appender::rolling::daily(dir, "tradectl.log");
                let (writer, guard) = tracing_appender::non_blocking(appender);
                let layer = tracing_subscriber::fmt::layer()
                    .with_writer(writer)
                    .with_ansi(false)
                    .with_target(true);
                (Some(layer), Some(guard))
            }
            Err(e) => {
                eprintln!("Warning: log directory {dir} is not writable ({e}), file logging disabled");
                (None, None)
            }
        },
        None => (None, None),
    };

    let plain_layer = (!config.json).then(|| {
        tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_thread_ids(false)
    });
    let json_layer = config.json.then(|| {
        tracing_subscriber::fmt::layer()
            .json()
            .with_current_span(true)
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(plain_layer)
        .with(json_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| ControlError::Internal(format!("failed to install subscriber: {e}")))?;

    Ok(guard)
}

// `rolling::daily` panics if it cannot create its first file.
fn prepare_log_dir(dir: &str) -> std::io::Result<()> {
    std::fs::create_dir_all(dir)?;
    let marker = Path::new(dir).join(".tradectl_write_test");
    std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&marker)?;
    std::fs::remove_file(&marker)
}
