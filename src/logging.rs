use crate::config::LoggingConfig;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Daily-rolling file log plus stdout. Keep the guard alive for the
/// lifetime of the process or buffered lines are lost.
pub fn initialize_logging(config: &LoggingConfig) -> WorkerGuard {
    // Create the log directory if it doesn't exist
    let _ = std::fs::create_dir_all(&config.directory);

    let file_appender = tracing_appender::rolling::daily(&config.directory, &config.file_name);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .with(fmt::layer().with_writer(non_blocking).with_ansi(false))
        .with(fmt::layer().with_writer(std::io::stdout))
        .init();

    tracing::info!("Logging initialized successfully.");
    guard
}
