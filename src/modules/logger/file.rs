// Copyright © 2025 The mailbridge developers
// Licensed under the mailbridge License v1.0
// Unauthorized copying, modification, or distribution is prohibited.

use crate::modules::logger::LocalTimer;
use crate::modules::settings::cli::Settings;
use std::sync::OnceLock;
use tracing::level_filters::LevelFilter;
use tracing::Level;
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::fmt;
use tracing_subscriber::layer::SubscriberExt;

/// Keeps the background writer alive; dropping it loses buffered lines.
pub static LOG_WORKER_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

#[derive(Debug)]
pub enum FileLoggerError {
    Appender(tracing_appender::rolling::InitError),
    Subscriber(tracing::dispatcher::SetGlobalDefaultError),
}

impl std::fmt::Display for FileLoggerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FileLoggerError::Appender(e) => write!(f, "rolling file appender: {e}"),
            FileLoggerError::Subscriber(e) => write!(f, "{e}"),
        }
    }
}

pub fn setup_file_logger(settings: &Settings, level: Level) -> Result<(), FileLoggerError> {
    let (writer, guard) = log_writer(settings).map_err(FileLoggerError::Appender)?;
    // A second initialization keeps the first guard; its subscriber is rejected below anyway.
    let _ = LOG_WORKER_GUARD.set(guard);

    let layer = fmt::layer()
        .with_timer(LocalTimer)
        .with_ansi(settings.mailbridge_ansi_logs)
        .with_level(true)
        .with_writer(writer)
        .with_target(true);

    let subscriber = tracing_subscriber::registry()
        .with(LevelFilter::from_level(level))
        .with(layer);

    tracing::subscriber::set_global_default(subscriber).map_err(FileLoggerError::Subscriber)
}

fn log_writer(
    settings: &Settings,
) -> Result<(NonBlocking, WorkerGuard), tracing_appender::rolling::InitError> {
    let rolling = RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix("mailbridge")
        .filename_suffix("log")
        .max_log_files(settings.mailbridge_max_log_files)
        .build(&settings.mailbridge_log_dir)?;
    Ok(tracing_appender::non_blocking(rolling))
}
