// Copyright © 2025 The mailbridge developers
// Licensed under the mailbridge License v1.0
// Unauthorized copying, modification, or distribution is prohibited.

use crate::modules::logger::file::setup_file_logger;
use crate::modules::settings::cli::Settings;
use chrono::Local;
use std::process;
use tracing::Level;
use tracing_subscriber::fmt::{format::Writer, time::FormatTime};

mod file;

struct LocalTimer;

impl FormatTime for LocalTimer {
    fn format_time(&self, w: &mut Writer<'_>) -> std::fmt::Result {
        write!(w, "{}", Local::now().format("%Y-%m-%dT%H:%M:%S%.3f%:z"))
    }
}

pub fn initialize_logging(settings: &Settings) {
    let level = validate_log_level(&settings.mailbridge_log_level);
    if settings.mailbridge_log_to_file {
        if let Err(e) = setup_file_logger(settings, level) {
            abort(e);
        }
    } else if let Err(e) = setup_stdout_logger(settings, level) {
        abort(e);
    }
}

fn abort(error: impl std::fmt::Display) -> ! {
    eprintln!("Failed to install the log subscriber: {error}");
    process::exit(1);
}

fn setup_stdout_logger(
    settings: &Settings,
    level: Level,
) -> Result<(), tracing::dispatcher::SetGlobalDefaultError> {
    let format = tracing_subscriber::fmt::format()
        .with_level(true)
        .with_target(true)
        .with_timer(LocalTimer);

    let subscriber = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_ansi(settings.mailbridge_ansi_logs)
        .with_writer(std::io::stdout)
        .event_format(format)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
}

fn validate_log_level(value: &str) -> Level {
    match value.parse::<Level>() {
        Ok(level) => level,
        Err(_) => {
            eprintln!(
                "Invalid log level specified. Use one of: error, warn, info, debug, trace.
        The log level you currently specified is 'mailbridge_log_level'='{}'",
                value
            );
            process::exit(1);
        }
    }
}
