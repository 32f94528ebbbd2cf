use thiserror::Error;

/// Top-level error type for the `synthlink-api` crate.
///
/// Covers every failure mode across both surfaces the controller exposes:
/// the HTTP discovery/selection endpoints and the WebSocket duplex channel.
/// `synthlink-core` maps these into session-level errors.
#[derive(Debug, Error)]
pub enum Error {
    // ── HTTP ────────────────────────────────────────────────────────
    /// HTTP transport error (connection refused, DNS failure, etc.)
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The controller answered with a non-2xx status.
    #[error("HTTP {status} from {endpoint}: {body}")]
    Status {
        endpoint: String,
        status: u16,
        body: String,
    },

    /// URL parsing error.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// Request or handshake timed out.
    #[error("Request timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    // ── Data ────────────────────────────────────────────────────────
    /// JSON deserialization failed, with the raw body for debugging.
    #[error("Deserialization error: {message}")]
    Deserialization { message: String, body: String },

    // ── WebSocket ───────────────────────────────────────────────────
    /// WebSocket connection failed.
    #[error("WebSocket connection failed: {0}")]
    WebSocketConnect(String),

    /// A send was attempted while no duplex channel is open.
    #[error("Duplex channel is not connected")]
    NotConnected,

    /// An inbound frame could not be parsed or carried no `type`.
    #[error("Malformed message: {message}")]
    MalformedMessage { message: String, raw: String },
}

impl Error {
    /// Returns `true` for failures of the request/response surface:
    /// transport errors, non-2xx statuses, and unparseable bodies.
    pub fn is_network(&self) -> bool {
        matches!(
            self,
            Self::Transport(_) | Self::Status { .. } | Self::Deserialization { .. } | Self::Timeout { .. }
        )
    }

    /// Returns `true` if this is a transient error worth retrying.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport(e) => e.is_timeout() || e.is_connect(),
            Self::Status { status, .. } => *status >= 500,
            Self::Timeout { .. } | Self::WebSocketConnect(_) => true,
            _ => false,
        }
    }

    /// Returns `true` if the controller answered 404.
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::Transport(e) => e.status() == Some(reqwest::StatusCode::NOT_FOUND),
            Self::Status { status: 404, .. } => true,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_errors_are_network_errors() {
        let err = Error::Status {
            endpoint: "api/devices".into(),
            status: 502,
            body: String::new(),
        };
        assert!(err.is_network());
        assert!(err.is_transient());
        assert!(!err.is_not_found());
    }

    #[test]
    fn not_connected_is_not_a_network_error() {
        assert!(!Error::NotConnected.is_network());
        assert!(!Error::NotConnected.is_transient());
    }

    #[test]
    fn not_found_status_is_detected() {
        let err = Error::Status {
            endpoint: "api/input/Missing".into(),
            status: 404,
            body: "Device not found".into(),
        };
        assert!(err.is_not_found());
        assert!(!err.is_transient());
    }
}
