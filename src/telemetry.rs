//! Diagnostics for the CLI: tracing to stderr, plus request correlation IDs.
//!
//! stdout is reserved for command output, so every log line goes to stderr.

use std::any::type_name_of_val;
use std::io::IsTerminal;
use std::sync::atomic::{AtomicBool, Ordering};

use log::LevelFilter;
use thiserror::Error;
use tracing_log::LogTracer;
use tracing_subscriber::{
    EnvFilter, fmt,
    layer::Layer,
    layer::SubscriberExt,
    util::{SubscriberInitExt, TryInitError},
};
use uuid::Uuid;

use crate::config::AppConfig;

#[derive(Debug, Error)]
pub enum TelemetryInitError {
    #[error("failed to install log tracer bridge: {0}")]
    LogTracer(#[from] log::SetLoggerError),
    #[error("failed to install tracing subscriber: {0}")]
    Subscriber(#[from] TryInitError),
}

/// Layout of diagnostic lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// One JSON object per event, carrying the fields of the current span.
    Json,
    /// Human-readable, colored when stderr is a terminal.
    Pretty,
}

impl LogFormat {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "json" => Some(Self::Json),
            "pretty" => Some(Self::Pretty),
            _ => None,
        }
    }
}

/// Filter used when `RUST_LOG` is unset: dependencies stay at `warn`, this
/// crate logs at the configured level.
pub fn default_directives(level: &str) -> String {
    format!("warn,shipit_admin={}", level)
}

static TELEMETRY_INITIALIZED: AtomicBool = AtomicBool::new(false);

/// Install the global subscriber. Later calls are no-ops.
pub fn init_tracing(config: &AppConfig) -> Result<(), TelemetryInitError> {
    if TELEMETRY_INITIALIZED.swap(true, Ordering::SeqCst) {
        return Ok(());
    }

    // reqwest and hyper still log through `log`.
    if let Err(err) = LogTracer::builder()
        .with_max_level(LevelFilter::Trace)
        .init()
        && !type_name_of_val(log::logger()).contains("LogTracer")
    {
        TELEMETRY_INITIALIZED.store(false, Ordering::SeqCst);
        return Err(err.into());
    }

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directives(&config.log_level)));

    let layer = match LogFormat::parse(&config.log_format).unwrap_or(LogFormat::Json) {
        LogFormat::Pretty => fmt::layer()
            .pretty()
            .with_target(false)
            .with_ansi(std::io::stderr().is_terminal())
            .with_writer(std::io::stderr)
            .boxed(),
        LogFormat::Json => fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(false)
            .with_writer(std::io::stderr)
            .boxed(),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(layer)
        .try_init()
        .inspect_err(|_| TELEMETRY_INITIALIZED.store(false, Ordering::SeqCst))?;

    Ok(())
}

/// Generate a short correlation ID attached to outbound requests.
pub fn new_request_id() -> String {
    format!("req-{}", &Uuid::new_v4().simple().to_string()[..12])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_ids_are_unique() {
        let a = new_request_id();
        let b = new_request_id();
        assert!(a.starts_with("req-"));
        assert_eq!(a.len(), 16);
        assert_ne!(a, b);
    }

    #[test]
    fn test_log_format_parsing() {
        assert_eq!(LogFormat::parse("json"), Some(LogFormat::Json));
        assert_eq!(LogFormat::parse("pretty"), Some(LogFormat::Pretty));
        assert_eq!(LogFormat::parse("PRETTY"), None);
    }

    #[test]
    fn test_default_directives_scope_level_to_this_crate() {
        let directives = default_directives("debug");
        assert_eq!(directives, "warn,shipit_admin=debug");
        assert!(EnvFilter::try_new(&directives).is_ok());
    }
}
