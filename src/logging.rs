use anyhow::{Context, Result};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::LoggingConfig;

/// Install the global subscriber: compact stdout plus, when enabled, a JSON
/// file rotated daily. `RUST_LOG` overrides `config.level`.
///
/// Keep the returned guard alive for the life of the process or buffered file
/// output is lost.
pub fn init_logging(config: &LoggingConfig) -> Result<Option<WorkerGuard>> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    let (file_layer, guard) = if config.json_file {
        std::fs::create_dir_all(&config.dir)
            .with_context(|| format!("failed to create log dir {}", config.dir))?;
        let file_appender = RollingFileAppender::new(Rotation::DAILY, &config.dir, &config.file);
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
        let layer = fmt::layer()
            .with_writer(non_blocking)
            .with_ansi(false)
            .json();
        (Some(layer), Some(guard))
    } else {
        (None, None)
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            fmt::layer()
                .with_writer(std::io::stdout)
                .with_ansi(true)
                .with_target(false)
                .compact(),
        )
        .with(file_layer)
        .try_init()
        .context("logging already initialised")?;

    Ok(guard)
}
