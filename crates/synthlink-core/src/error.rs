// ── Core error types ──
//
// User-facing errors from synthlink-core. Consumers never see raw HTTP
// status codes or JSON parse failures; the `From<synthlink_api::Error>`
// impl translates transport-layer errors into session-level variants.

use synthlink_api::PortDirection;
use thiserror::Error;

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Connection errors ────────────────────────────────────────────
    #[error("Controller request failed: {message}")]
    Network {
        message: String,
        /// HTTP status code (if the controller answered at all).
        status: Option<u16>,
    },

    #[error("Cannot open duplex channel: {reason}")]
    ConnectionFailed { reason: String },

    #[error("Duplex channel is not connected")]
    NotConnected,

    #[error("Controller request timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    #[error("Malformed message from controller: {message}")]
    MalformedMessage { message: String },

    // ── Data errors ──────────────────────────────────────────────────
    #[error("Parameter not found: {address}")]
    ParameterNotFound { address: String },

    #[error("No {direction} device named {name:?}")]
    DeviceNotFound {
        direction: PortDirection,
        name: String,
    },

    #[error("Validation failed: {message}")]
    ValidationFailed { message: String },

    // ── Operation errors ─────────────────────────────────────────────
    #[error("A parameter refresh is already in progress")]
    Busy,

    #[error("Parameter refresh did not finish within {timeout_secs}s")]
    RefreshTimedOut { timeout_secs: u64 },

    #[error("Session already started")]
    AlreadyStarted,

    #[error("Session is not running")]
    SessionClosed,

    // ── Configuration errors ─────────────────────────────────────────
    #[error("Configuration error: {message}")]
    Config { message: String },

    // ── Internal errors ──────────────────────────────────────────────
    #[error("Internal error: {0}")]
    Internal(String),
}

impl CoreError {
    /// Returns `true` for failures worth retrying at the call site.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Network { status, .. } => status.is_none_or(|s| s >= 500),
            Self::ConnectionFailed { .. } | Self::Timeout { .. } | Self::RefreshTimedOut { .. } => true,
            _ => false,
        }
    }
}

// ── Conversion from transport-layer errors ───────────────────────────

impl From<synthlink_api::Error> for CoreError {
    fn from(err: synthlink_api::Error) -> Self {
        match err {
            synthlink_api::Error::Transport(ref e) => {
                if e.is_timeout() {
                    CoreError::Timeout { timeout_secs: 0 }
                } else {
                    CoreError::Network {
                        message: e.to_string(),
                        status: e.status().map(|s| s.as_u16()),
                    }
                }
            }
            synthlink_api::Error::Status {
                endpoint,
                status,
                body,
            } => CoreError::Network {
                message: if body.is_empty() {
                    format!("{endpoint} answered {status}")
                } else {
                    format!("{endpoint} answered {status}: {body}")
                },
                status: Some(status),
            },
            synthlink_api::Error::Deserialization { message, body: _ } => CoreError::Network {
                message: format!("unexpected response body: {message}"),
                status: None,
            },
            synthlink_api::Error::InvalidUrl(e) => CoreError::Config {
                message: format!("Invalid URL: {e}"),
            },
            synthlink_api::Error::Timeout { timeout_secs } => CoreError::Timeout { timeout_secs },
            synthlink_api::Error::WebSocketConnect(reason) => CoreError::ConnectionFailed { reason },
            synthlink_api::Error::NotConnected => CoreError::NotConnected,
            synthlink_api::Error::MalformedMessage { message, raw: _ } => {
                CoreError::MalformedMessage { message }
            }
        }
    }
}
