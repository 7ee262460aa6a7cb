use crate::host::config::Config;
use std::{env, path::PathBuf};
use tracing::Level;
use tracing_appender::{
    non_blocking::WorkerGuard,
    rolling::{RollingFileAppender, Rotation},
};
use tracing_subscriber::{filter::Targets, fmt, layer::SubscriberExt, util::SubscriberInitExt};

fn default_filter() -> Targets {
    let level = if cfg!(debug_assertions) {
        Level::DEBUG
    } else {
        Level::INFO
    };
    Targets::new()
        .with_target("emuhost", level)
        .with_target("emuhost_core", level)
}

fn create_filter() -> Targets {
    match env::var("RUST_LOG") {
        Ok(filter) => filter.parse::<Targets>().unwrap_or_else(|err| {
            eprintln!("invalid RUST_LOG filter {filter:?}: {err}");
            default_filter()
        }),
        Err(_) => default_filter(),
    }
}

/// Directory rolling log files are written to.
#[must_use]
pub fn log_dir() -> PathBuf {
    Config::default_data_dir().join("logs")
}

/// Keeps the non-blocking file writer flushing until dropped.
#[derive(Debug)]
#[must_use]
pub struct Log {
    _guard: Option<WorkerGuard>,
}

/// Initialize logging to stderr and a daily rotating log file.
pub fn init() -> Log {
    let appender = RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .max_log_files(3)
        .filename_prefix("emuhost")
        .filename_suffix("log")
        .build(log_dir());
    let (file_layer, guard) = match appender {
        Ok(appender) => {
            let (file_writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer()
                .compact()
                .with_ansi(false)
                .with_line_number(true)
                .with_thread_names(true)
                .with_writer(file_writer);
            (Some(layer), Some(guard))
        }
        Err(err) => {
            eprintln!("failed to create log file: {err}");
            (None, None)
        }
    };

    let registry = tracing_subscriber::registry()
        .with(create_filter())
        .with(file_layer)
        .with(
            fmt::layer()
                .compact()
                .with_line_number(true)
                .with_thread_names(true)
                .with_writer(std::io::stderr),
        );

    if let Err(err) = registry.try_init() {
        eprintln!("setting tracing default failed: {err:?}");
    }

    Log { _guard: guard }
}
