// Transport seam and shared HTTP client configuration.
//
// `Transport` is the contract the session layer drives: discovery and
// selection over HTTP, plus the duplex channel lifecycle. `LiveTransport`
// is the production implementation; tests substitute fakes.

use std::future::Future;
use std::time::Duration;

use tokio::sync::{mpsc, watch};

use crate::error::Error;
use crate::models::{DeviceListing, InboundEvent, ParameterValue};

// ── ConnectionState ──────────────────────────────────────────────────

/// Lifecycle of the duplex channel. Only `Connected` permits sends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting { attempt: u32 },
}

impl ConnectionState {
    pub fn is_connected(self) -> bool {
        matches!(self, Self::Connected)
    }
}

// ── Transport ────────────────────────────────────────────────────────

/// Everything the session needs from the controller.
///
/// Request/response calls return `Send` futures so the session can run
/// them on spawned tasks; `take_inbound` and `send` are synchronous.
pub trait Transport: Send + Sync + 'static {
    /// `GET api/devices`.
    fn fetch_devices(&self) -> impl Future<Output = Result<DeviceListing, Error>> + Send;

    /// `GET api/parameters`, normalized to an ordered sequence.
    fn fetch_parameters(&self) -> impl Future<Output = Result<Vec<ParameterValue>, Error>> + Send;

    /// `GET api/parameters/update`. Resolves when the controller reports
    /// the hardware refetch finished.
    fn request_refresh(&self) -> impl Future<Output = Result<(), Error>> + Send;

    /// `GET api/input/{name}`.
    fn select_input(&self, name: &str) -> impl Future<Output = Result<(), Error>> + Send;

    /// `GET api/output/{name}`.
    fn select_output(&self, name: &str) -> impl Future<Output = Result<(), Error>> + Send;

    /// Open the duplex channel. A no-op while a channel is already alive.
    fn connect(&self) -> impl Future<Output = Result<(), Error>> + Send;

    /// Claim the inbound event receiver. Only the first caller gets it;
    /// events are delivered in arrival order.
    fn take_inbound(&self) -> Option<mpsc::UnboundedReceiver<InboundEvent>>;

    /// Queue an outbound `{address, value}` frame.
    fn send(&self, update: &ParameterValue) -> Result<(), Error>;

    /// Release the duplex channel. Resolves once frames queued by `send`
    /// have been flushed or the channel task has given up.
    fn close(&self) -> impl Future<Output = ()> + Send;

    /// Observe the duplex channel state.
    fn connection_state(&self) -> watch::Receiver<ConnectionState>;
}

// ── TransportConfig ──────────────────────────────────────────────────

/// Shared configuration for building the HTTP client.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Per-request timeout. `request_refresh` is exempt: its duration is
    /// bounded by the session's refresh timeout instead.
    pub timeout: Duration,
    pub user_agent: String,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            user_agent: concat!("synthlink/", env!("CARGO_PKG_VERSION")).to_owned(),
        }
    }
}

impl TransportConfig {
    /// Build a `reqwest::Client` from this config.
    ///
    /// No client-wide timeout is set; [`EditorClient`](crate::EditorClient)
    /// applies `timeout` per request so the refresh call can outlive it.
    pub fn build_client(&self) -> Result<reqwest::Client, Error> {
        reqwest::Client::builder()
            .connect_timeout(self.timeout)
            .user_agent(self.user_agent.as_str())
            .build()
            .map_err(Error::Transport)
    }
}
