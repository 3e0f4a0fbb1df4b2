use crate::error::ConfigError;
use crate::settings::{LogRotation, LoggingConfig};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

impl From<LogRotation> for Rotation {
    fn from(rotation: LogRotation) -> Self {
        match rotation {
            LogRotation::Minutely => Rotation::MINUTELY,
            LogRotation::Hourly => Rotation::HOURLY,
            LogRotation::Daily => Rotation::DAILY,
            LogRotation::Never => Rotation::NEVER,
        }
    }
}

/// Installs the process-wide subscriber: human-readable output on stdout plus
/// a rolling log file written from a background thread.
///
/// The returned guard flushes the file writer when dropped, so the caller must
/// hold it until shutdown.
pub fn init_logging(cfg: &LoggingConfig) -> Result<WorkerGuard, ConfigError> {
    let appender = RollingFileAppender::builder()
        .rotation(cfg.rotation.into())
        .filename_prefix(cfg.file_name.as_str())
        .max_log_files(cfg.max_files)
        .build(&cfg.directory)
        .map_err(|e| ConfigError::Logging(format!("{}: {}", cfg.directory.display(), e)))?;
    let (file_writer, guard) = tracing_appender::non_blocking(appender);

    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&cfg.level)
            .map_err(|e| ConfigError::Logging(format!("invalid level '{}': {}", cfg.level, e)))?,
    }
    .add_directive(
        "hyper=warn"
            .parse()
            .map_err(|e| ConfigError::Logging(format!("{e}")))?,
    )
    .add_directive(
        "sqlx=warn"
            .parse()
            .map_err(|e| ConfigError::Logging(format!("{e}")))?,
    );

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false))
        .with(fmt::layer().with_ansi(false).with_writer(file_writer))
        .try_init()
        .map_err(|e| ConfigError::Logging(e.to_string()))?;

    Ok(guard)
}
