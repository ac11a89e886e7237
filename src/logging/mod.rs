// Logging module - tracing subscriber setup
//
// Terminal output goes to stderr so it never mixes with whatever the host
// program prints. File output, when enabled, is JSON written by a
// non-blocking rolling appender.
//
// Filter precedence: RUST_LOG env var > config `[logging].level` > "info"

use crate::config::{LogRotation, LoggingConfig};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Filter directive for a configured level
///
/// A bare level ("debug") applies to this crate only; anything that already
/// looks like a directive ("gemini_inspector=trace,reqwest=debug") is used
/// as written.
pub fn filter_directive(level: &str) -> String {
    let level = level.trim();
    if level.contains('=') || level.contains(',') {
        level.to_string()
    } else {
        format!("gemini_inspector={},axum=warn,hyper=warn", level)
    }
}

/// Install the global subscriber
///
/// Returns the file writer guard when file logging is active; keep it alive
/// for the life of the program so buffered lines are flushed. Does nothing if
/// a subscriber is already installed (e.g. by a host program).
pub fn init(config: &LoggingConfig) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter_directive(&config.level)));

    let terminal = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);

    let (file_layer, guard) = if config.file_enabled {
        match std::fs::create_dir_all(&config.file_dir) {
            Ok(()) => {
                let appender = match config.file_rotation {
                    LogRotation::Hourly => {
                        tracing_appender::rolling::hourly(&config.file_dir, &config.file_prefix)
                    }
                    LogRotation::Daily => {
                        tracing_appender::rolling::daily(&config.file_dir, &config.file_prefix)
                    }
                    LogRotation::Never => {
                        tracing_appender::rolling::never(&config.file_dir, &config.file_prefix)
                    }
                };
                let (writer, guard) = tracing_appender::non_blocking(appender);
                let layer = tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(writer)
                    .with_ansi(false);
                (Some(layer), Some(guard))
            }
            Err(e) => {
                eprintln!(
                    "Warning: Could not create log directory {:?}: {}",
                    config.file_dir, e
                );
                (None, None)
            }
        }
    } else {
        (None, None)
    };

    let installed = tracing_subscriber::registry()
        .with(filter)
        .with(terminal)
        .with(file_layer)
        .try_init();

    match installed {
        Ok(()) => guard,
        Err(_) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bare_level_scoped_to_crate() {
        assert_eq!(
            filter_directive("debug"),
            "gemini_inspector=debug,axum=warn,hyper=warn"
        );
    }

    #[test]
    fn test_directive_used_verbatim() {
        assert_eq!(
            filter_directive("gemini_inspector=trace,reqwest=debug"),
            "gemini_inspector=trace,reqwest=debug"
        );
    }

    #[test]
    fn test_init_twice_is_harmless() {
        let config = LoggingConfig::default();
        let _first = init(&config);
        assert!(init(&config).is_none());
    }
}
