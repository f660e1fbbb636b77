use std::fs;

use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::paths;

/// Default filter when `RUST_LOG` is unset. Audio and HTTP internals are
/// held at `warn`.
const DEFAULT_FILTER: &str = "info,symphonia=warn,cpal=warn,rodio=warn,reqwest=warn,hyper=warn,mio=warn";

/// Initialize the structured logging system.
///
/// Sets up:
/// - File output: rolling log files in `{data_dir}/logs/voice-tts.log`
///   with daily rotation, keeping the latest 5 files.
/// - Console output (stderr; stdout carries IPC): compact human-readable format.
/// - Environment filter: defaults to `info`, configurable via `RUST_LOG`.
///
/// Fails if the log directory cannot be created or a global subscriber is
/// already set.
pub fn try_init() -> anyhow::Result<()> {
    let log_dir = paths::get_log_dir();
    fs::create_dir_all(&log_dir)?;

    let file_appender = RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix("voice-tts")
        .filename_suffix("log")
        .max_log_files(5)
        .build(&log_dir)?;

    let file_layer = fmt::layer()
        .with_writer(file_appender)
        .with_ansi(false)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true);

    let console_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_ansi(true)
        .with_target(true)
        .compact();

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    tracing_subscriber::registry()
        .with(filter)
        .with(file_layer)
        .with(console_layer)
        .try_init()?;

    tracing::info!(
        log_dir = %log_dir.display(),
        "Logger initialized"
    );
    Ok(())
}

/// Console-only fallback for when the log directory is unusable.
pub fn init_stderr_only() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}
