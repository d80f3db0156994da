//! Logging infrastructure
//!
//! Structured logging to stdout, with optional daily-rolling file output
//! for unattended deployments.

/// Initialize the logger with defaults (info, stdout only)
pub fn init_logger() {
    init_logger_with_file(None, None);
}

/// Initialize the logger, optionally writing daily files under a log
/// directory instead of stdout
///
/// The directory is created if missing; when that fails the worker still
/// runs with stdout logging only.
pub fn init_logger_with_file(log_level: Option<&str>, log_dir: Option<&str>) {
    let level = log_level.unwrap_or("info");

    let subscriber = tracing_subscriber::fmt()
        .with_max_level(level.parse().unwrap_or(tracing::Level::INFO))
        .with_file(false)
        .with_line_number(false)
        .with_thread_ids(false)
        .with_target(false);

    if let Some(dir) = log_dir {
        match std::fs::create_dir_all(dir) {
            Ok(()) => {
                let file_appender = tracing_appender::rolling::daily(dir, "label-worker");
                subscriber.with_writer(file_appender).init();
                return;
            }
            Err(e) => {
                eprintln!("Log directory {dir} unusable ({e}), logging to stdout");
            }
        }
    }

    subscriber.init();
}
