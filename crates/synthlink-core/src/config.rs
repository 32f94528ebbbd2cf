// ── Runtime session configuration ──
//
// Describes *how* to talk to a controller. Never touches disk; the CLI
// (via synthlink-config) constructs a `SessionConfig` and hands it in.

use std::time::Duration;

use synthlink_api::ReconnectConfig;
use url::Url;

/// Configuration for a single editor session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Editor base URL (e.g., `http://localhost:8080/`). The duplex
    /// channel lives at `<url>/ws`.
    pub url: Url,
    /// Per-request HTTP timeout.
    pub timeout: Duration,
    /// How long `start` waits for the duplex channel handshake.
    pub connect_timeout: Duration,
    /// Upper bound on a bulk parameter refresh, request plus refetch.
    pub refresh_timeout: Duration,
    /// Duplex channel reconnection policy.
    pub reconnect: ReconnectConfig,
    /// Extra attempts for a failed device selection request.
    pub selection_retries: u32,
    /// Open the duplex channel on start. One-shot listings turn this off.
    pub websocket_enabled: bool,
    /// Select and request the first input and output on start. Off for
    /// callers that must not change the controller's routing; the
    /// selection then starts empty.
    pub apply_default_selection: bool,
}

impl SessionConfig {
    /// Defaults for everything except the URL.
    pub fn new(url: Url) -> Self {
        Self {
            url,
            timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(10),
            refresh_timeout: Duration::from_secs(300),
            reconnect: ReconnectConfig::default(),
            selection_retries: 1,
            websocket_enabled: true,
            apply_default_selection: true,
        }
    }
}
