//! Structured logging configuration.
//!
//! Logging goes through `tracing`; this module installs the global
//! `tracing-subscriber` pipeline.
//!
//! # Log Format
//!
//! When JSON formatting is enabled, log entries are output as JSON objects:
//!
//! ```json
//! {"timestamp":"2024-01-15T10:30:00.000Z","level":"INFO","target":"rsauthz::audit","fields":{"message":"role assigned","actor":"admin","user_id":"alice"}}
//! ```
//!
//! # Audit Events
//!
//! Administrative mutations emit one `info` event each under the
//! [`AUDIT_TARGET`] target, so they can be routed or filtered separately
//! (e.g. `RUST_LOG=info,rsauthz::audit=info`).
//!
//! # Usage
//!
//! ```ignore
//! use rsauthz_server::logging::{init_logging, LoggingConfig};
//!
//! // Production: JSON format
//! init_logging(LoggingConfig::json());
//!
//! // Development: pretty text at debug level
//! init_logging(LoggingConfig::pretty().with_level("debug"));
//! ```

use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    prelude::*,
    EnvFilter,
};

/// Tracing target for audit events.
pub const AUDIT_TARGET: &str = "rsauthz::audit";

/// Output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Human-readable multi-line output for development.
    #[default]
    Pretty,
    /// One JSON object per line for production.
    Json,
}

/// Configuration for structured logging.
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Output format
    pub format: LogFormat,
    /// The default filter directive if RUST_LOG is not set (e.g. "info")
    pub level: String,
    /// Whether to include span events (enter/exit)
    pub include_spans: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::Pretty,
            level: "info".to_string(),
            include_spans: false,
        }
    }
}

impl LoggingConfig {
    /// Create a new logging configuration for JSON output.
    pub fn json() -> Self {
        Self {
            format: LogFormat::Json,
            ..Default::default()
        }
    }

    /// Create a new logging configuration for text output (development).
    pub fn pretty() -> Self {
        Self::default()
    }

    /// Set the default filter directive.
    pub fn with_level(mut self, level: impl Into<String>) -> Self {
        self.level = level.into();
        self
    }

    /// Include span events in the output.
    pub fn with_spans(mut self) -> Self {
        self.include_spans = true;
        self
    }

    fn filter(&self) -> EnvFilter {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&self.level))
    }
}

/// Initialize the logging subsystem with the given configuration.
///
/// Call once at startup. Later calls have no effect (the subscriber is global).
pub fn init_logging(config: LoggingConfig) {
    let filter = config.filter();

    let span_events = if config.include_spans {
        FmtSpan::ENTER | FmtSpan::EXIT
    } else {
        FmtSpan::NONE
    };

    match config.format {
        LogFormat::Json => {
            let subscriber = tracing_subscriber::registry().with(filter).with(
                fmt::layer()
                    .json()
                    .with_span_events(span_events)
                    .with_current_span(true)
                    .with_target(true)
                    .with_file(false)
                    .with_line_number(false),
            );
            let _ = tracing::subscriber::set_global_default(subscriber);
        }
        LogFormat::Pretty => {
            let subscriber = tracing_subscriber::registry().with(filter).with(
                fmt::layer()
                    .pretty()
                    .with_span_events(span_events)
                    .with_target(true),
            );
            let _ = tracing::subscriber::set_global_default(subscriber);
        }
    }
}

/// Creates a JSON subscriber writing to `writer`.
///
/// Used to capture and inspect log output, e.g. audit events in tests.
pub fn json_subscriber<W>(writer: W) -> impl tracing::Subscriber + Send + Sync
where
    W: for<'writer> tracing_subscriber::fmt::MakeWriter<'writer> + Send + Sync + 'static,
{
    tracing_subscriber::registry()
        .with(EnvFilter::new("trace"))
        .with(
            fmt::layer()
                .json()
                .with_writer(writer)
                .with_target(true)
                .with_current_span(true),
        )
}
