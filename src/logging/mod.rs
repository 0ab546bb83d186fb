//! Logging setup
//!
//! Console tracing output is always installed; ingest jobs that run under a
//! scheduler can additionally enable a JSON rolling-file layer from the
//! `logging` config section. `RUST_LOG` overrides the configured level,
//! following the usual tracing convention.

use crate::config::LoggingConfig;
use crate::domain::{PrismError, Result};
use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// Keeps the non-blocking file writer alive; drop it only at process exit
/// or buffered lines are lost.
pub struct LoggingGuard {
    _file_guard: Option<WorkerGuard>,
}

/// Installs the global tracing subscriber.
///
/// Returns a [`LoggingGuard`] the caller must hold for the program's
/// lifetime. Calling twice panics (the subscriber is global), so this
/// belongs in `main` and nowhere else.
pub fn init_logging(level_str: &str, config: &LoggingConfig) -> Result<LoggingGuard> {
    let level = parse_log_level(level_str)?;
    // EnvFilter is not Clone; build one per layer.
    let filter = |level: Level| {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(format!("prism={level}")))
    };

    let console = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_filter(filter(level));

    let (file_layer, file_guard) = if config.json_file_enabled {
        let (layer, guard) = json_file_layer(config, filter(level))?;
        (Some(layer), Some(guard))
    } else {
        (None, None)
    };

    // The boxed file layer is pinned to the registry type, so it goes on
    // first; the console layer is generic over whatever sits below it.
    tracing_subscriber::registry()
        .with(file_layer)
        .with(console)
        .init();

    tracing::info!(%level, json_file = config.json_file_enabled, "Logging initialized");

    Ok(LoggingGuard {
        _file_guard: file_guard,
    })
}

type BoxedLayer = Box<dyn Layer<tracing_subscriber::Registry> + Send + Sync>;

/// Daily-rolling JSON file layer under the configured directory
fn json_file_layer(
    config: &LoggingConfig,
    filter: EnvFilter,
) -> Result<(BoxedLayer, WorkerGuard)> {
    std::fs::create_dir_all(&config.directory).map_err(|e| {
        PrismError::Configuration(format!(
            "Failed to create log directory {}: {e}",
            config.directory
        ))
    })?;

    let appender = RollingFileAppender::new(Rotation::DAILY, &config.directory, "prism.log");
    let (writer, guard) = tracing_appender::non_blocking(appender);

    let layer = tracing_subscriber::fmt::layer()
        .json()
        .with_target(true)
        .with_writer(writer)
        .with_filter(filter)
        .boxed();

    Ok((layer, guard))
}

fn parse_log_level(level_str: &str) -> Result<Level> {
    match level_str.to_lowercase().as_str() {
        "trace" => Ok(Level::TRACE),
        "debug" => Ok(Level::DEBUG),
        "info" => Ok(Level::INFO),
        "warn" => Ok(Level::WARN),
        "error" => Ok(Level::ERROR),
        other => Err(PrismError::Configuration(format!(
            "Invalid log level '{other}'; use trace, debug, info, warn or error"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_parsing() {
        assert_eq!(parse_log_level("debug").unwrap(), Level::DEBUG);
        assert_eq!(parse_log_level("ERROR").unwrap(), Level::ERROR);
        assert!(parse_log_level("chatty").is_err());
        assert!(parse_log_level("").is_err());
    }

    #[test]
    fn test_file_layer_creates_directory() {
        let dir = tempfile::TempDir::new().unwrap();
        let config = LoggingConfig {
            level: "info".to_string(),
            json_file_enabled: true,
            directory: dir
                .path()
                .join("logs/nested")
                .to_string_lossy()
                .to_string(),
        };
        let filter = EnvFilter::new("prism=info");
        let result = json_file_layer(&config, filter);
        assert!(result.is_ok());
        assert!(dir.path().join("logs/nested").exists());
    }
}
