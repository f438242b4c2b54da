//! # Error Handling
//!
//! Unified error type for every outbound call the client makes. Backend
//! failures are normalized into a single `Api` shape so callers can render
//! one error message everywhere, regardless of which endpoint failed.

use serde::Deserialize;
use thiserror::Error;

use crate::auth::AuthError;
use crate::config::ConfigError;

/// Coarse classification used by callers to decide how to surface a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Network or transport level failure
    Transport,
    /// Structured error reported by the backend
    Backend,
    /// Input the client cannot handle (e.g. unknown repository host)
    Unsupported,
    /// Local configuration, credential or data problem
    Client,
}

/// Errors returned by the Ship It client.
#[derive(Debug, Error)]
pub enum ShipitError {
    #[error("{0}")]
    Transport(#[from] reqwest::Error),

    #[error("{message}")]
    Api { status: u16, message: String },

    #[error("Unsupported repo: {0}")]
    UnsupportedRepository(String),

    #[error("authentication error: {0}")]
    Auth(#[from] AuthError),

    #[error("invalid response payload: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("invalid URL: {0}")]
    Url(#[from] url::ParseError),

    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("background task failed: {0}")]
    Join(#[from] tokio::task::JoinError),

    #[error("{0}")]
    Invalid(String),
}

impl ShipitError {
    /// Build an API error from a status code and a raw response body.
    pub fn from_response(status: u16, body: &str) -> Self {
        Self::Api {
            status,
            message: extract_error_message(status, body),
        }
    }

    /// HTTP status associated with this error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            ShipitError::Api { status, .. } => Some(*status),
            ShipitError::Transport(err) => err.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.status() == Some(404)
    }

    pub fn class(&self) -> ErrorClass {
        match self {
            ShipitError::Transport(_) => ErrorClass::Transport,
            ShipitError::Api { .. } => ErrorClass::Backend,
            ShipitError::UnsupportedRepository(_) => ErrorClass::Unsupported,
            ShipitError::Auth(_)
            | ShipitError::Decode(_)
            | ShipitError::Url(_)
            | ShipitError::Config(_)
            | ShipitError::Join(_)
            | ShipitError::Invalid(_) => ErrorClass::Client,
        }
    }
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, ShipitError>;

#[derive(Debug, Deserialize)]
struct ErrorPayload {
    #[serde(default)]
    exception: Option<serde_json::Value>,
    #[serde(default)]
    detail: Option<serde_json::Value>,
}

/// Pick the most specific message from a backend error body.
///
/// Preference order is `exception`, then `detail`, then a transport-style
/// fallback naming the status code.
pub fn extract_error_message(status: u16, body: &str) -> String {
    let fallback = || format!("Request failed with status code {}", status);

    let Ok(payload) = serde_json::from_str::<ErrorPayload>(body) else {
        return fallback();
    };

    payload
        .exception
        .and_then(value_to_message)
        .or_else(|| payload.detail.and_then(value_to_message))
        .unwrap_or_else(fallback)
}

fn value_to_message(value: serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::Null => None,
        serde_json::Value::String(s) if s.trim().is_empty() => None,
        serde_json::Value::String(s) => Some(s),
        other => Some(other.to_string()),
    }
}
