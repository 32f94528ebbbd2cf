//! CLI error types with miette diagnostics.
//!
//! Maps `CoreError` and `ConfigError` into user-facing errors with
//! actionable help text and a process exit code.

use miette::Diagnostic;
use thiserror::Error;

use synthlink_config::ConfigError;
use synthlink_core::CoreError;

pub mod exit_code {
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const NOT_FOUND: i32 = 4;
    pub const BUSY: i32 = 6;
    pub const CONNECTION: i32 = 7;
    pub const TIMEOUT: i32 = 8;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Connection ───────────────────────────────────────────────────
    #[error("Could not reach the controller: {reason}")]
    #[diagnostic(
        code(synthlink::connection_failed),
        help(
            "Check that the editor controller is running and reachable.\n\
             Pass --controller http://host:port or set it in your profile."
        )
    )]
    ConnectionFailed { reason: String },

    // ── Resources ────────────────────────────────────────────────────
    #[error("{resource_type} '{identifier}' not found")]
    #[diagnostic(
        code(synthlink::not_found),
        help("Run: synthlink {list_command} to see what the controller offers")
    )]
    NotFound {
        resource_type: String,
        identifier: String,
        list_command: String,
    },

    #[error("A parameter refresh is already running")]
    #[diagnostic(
        code(synthlink::busy),
        help("Wait for the running refresh to finish, then try again.")
    )]
    Busy,

    // ── API ──────────────────────────────────────────────────────────
    #[error("Controller error ({code}): {message}")]
    #[diagnostic(code(synthlink::api_error))]
    ApiError { code: String, message: String },

    // ── Validation ───────────────────────────────────────────────────
    #[error("Invalid value for {field}: {reason}")]
    #[diagnostic(code(synthlink::validation))]
    Validation { field: String, reason: String },

    // ── Configuration ────────────────────────────────────────────────
    #[error("Profile '{name}' not found in configuration")]
    #[diagnostic(
        code(synthlink::profile_not_found),
        help(
            "Available profiles: {available}\n\
             Create one with: synthlink config init"
        )
    )]
    ProfileNotFound { name: String, available: String },

    #[error("No controller configured")]
    #[diagnostic(
        code(synthlink::no_config),
        help(
            "Create a profile with: synthlink config init\n\
             Or pass --controller / set SYNTHLINK_CONTROLLER.\n\
             Expected config at: {path}"
        )
    )]
    NoConfig { path: String },

    #[error(transparent)]
    #[diagnostic(code(synthlink::config))]
    Config(Box<ConfigError>),

    // ── Timeout ──────────────────────────────────────────────────────
    #[error("Timed out after {seconds}s")]
    #[diagnostic(
        code(synthlink::timeout),
        help("Increase the timeout with --timeout or in your profile.")
    )]
    Timeout { seconds: u64 },

    // ── IO ───────────────────────────────────────────────────────────
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl CliError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::ConnectionFailed { .. } => exit_code::CONNECTION,
            Self::NotFound { .. } => exit_code::NOT_FOUND,
            Self::Busy => exit_code::BUSY,
            Self::Timeout { .. } => exit_code::TIMEOUT,
            Self::Validation { .. } => exit_code::USAGE,
            _ => exit_code::GENERAL,
        }
    }
}

// ── CoreError → CliError mapping ─────────────────────────────────────

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Network {
                message,
                status: Some(status),
            } => CliError::ApiError {
                code: status.to_string(),
                message,
            },

            CoreError::Network {
                message: reason,
                status: None,
            }
            | CoreError::ConnectionFailed { reason } => CliError::ConnectionFailed { reason },

            CoreError::NotConnected => CliError::ConnectionFailed {
                reason: "the duplex channel is not open".into(),
            },

            CoreError::Timeout { timeout_secs } | CoreError::RefreshTimedOut { timeout_secs } => {
                CliError::Timeout {
                    seconds: timeout_secs,
                }
            }

            CoreError::MalformedMessage { message } => CliError::ApiError {
                code: "malformed".into(),
                message,
            },

            CoreError::ParameterNotFound { address } => CliError::NotFound {
                resource_type: "parameter".into(),
                identifier: address,
                list_command: "params".into(),
            },

            CoreError::DeviceNotFound { direction, name } => CliError::NotFound {
                resource_type: format!("{direction} device"),
                identifier: name,
                list_command: "devices".into(),
            },

            CoreError::ValidationFailed { message } => CliError::Validation {
                field: "input".into(),
                reason: message,
            },

            CoreError::Busy => CliError::Busy,

            CoreError::Config { message } => CliError::Validation {
                field: "config".into(),
                reason: message,
            },

            session @ (CoreError::AlreadyStarted | CoreError::SessionClosed) => {
                CliError::ApiError {
                    code: "session".into(),
                    message: session.to_string(),
                }
            }

            CoreError::Internal(message) => CliError::ApiError {
                code: "internal".into(),
                message,
            },
        }
    }
}

// ── ConfigError → CliError mapping ───────────────────────────────────

impl From<ConfigError> for CliError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::Validation { field, reason } => CliError::Validation { field, reason },
            other => CliError::Config(Box::new(other)),
        }
    }
}
