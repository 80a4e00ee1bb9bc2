//! Logging infrastructure.
//!
//! Initializes the tracing subscriber for structured logging. All logs go to
//! stderr so stdout stays clean for command output.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::error::{AppError, AppResult};

/// Options for the tracing subscriber.
#[derive(Debug, Clone, Default)]
pub struct LogOptions<'a> {
    /// Level or filter directive override (e.g. "debug", "kbqa_knowledge=trace")
    pub level: Option<&'a str>,

    /// Disable ANSI colors
    pub no_color: bool,

    /// Emit one JSON object per event instead of human-readable lines
    pub json: bool,
}

/// Initialize the tracing subscriber with stderr output.
///
/// The filter comes from `options.level`, falling back to `RUST_LOG` and
/// then to `info`.
///
/// # Example
/// ```no_run
/// use kbqa_core::logging::{init_logging, LogOptions};
///
/// init_logging(&LogOptions::default()).expect("Failed to initialize logging");
/// ```
pub fn init_logging(options: &LogOptions<'_>) -> AppResult<()> {
    let default_level = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
    let filter_str = options.level.unwrap_or(&default_level);

    let env_filter = EnvFilter::try_new(filter_str)
        .map_err(|e| AppError::Config(format!("Invalid log filter: {}", e)))?;

    let registry = tracing_subscriber::registry().with(env_filter);

    let result = if options.json {
        registry
            .with(
                fmt::layer()
                    .json()
                    .with_writer(std::io::stderr)
                    .with_target(true),
            )
            .try_init()
    } else {
        registry
            .with(
                fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_target(true)
                    .with_level(true)
                    .with_ansi(!options.no_color && supports_color()),
            )
            .try_init()
    };

    result.map_err(|e| AppError::Config(format!("Failed to init logging: {}", e)))
}

/// Check if color output is allowed.
fn supports_color() -> bool {
    std::env::var("NO_COLOR").is_err()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_filter_is_config_error() {
        let options = LogOptions {
            level: Some("kbqa=notalevel"),
            ..Default::default()
        };
        let err = init_logging(&options).unwrap_err();
        assert_eq!(err.code(), "CONFIG_ERROR");
    }

    #[test]
    fn test_init_logging() {
        // Can only succeed once per process
        let result = init_logging(&LogOptions::default());
        assert!(result.is_ok() || result.is_err());
    }
}
