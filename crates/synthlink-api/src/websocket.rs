//! Duplex WebSocket channel with auto-reconnect.
//!
//! Connects to the controller's `/ws` endpoint, forwards parsed
//! [`InboundEvent`]s through an unbounded `mpsc` channel (arrival order is
//! preserved), and writes queued outbound `{address, value}` frames.
//! Dropped connections are retried with bounded exponential backoff;
//! frames accepted by [`WebSocketHandle::send`] but not yet written are
//! carried over to the next connection.
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use synthlink_api::websocket::{ReconnectConfig, WebSocketHandle};
//! use synthlink_api::{ConnectionState, ParameterValue};
//! use tokio::sync::{mpsc, watch};
//! use tokio_util::sync::CancellationToken;
//!
//! let (inbound_tx, mut inbound_rx) = mpsc::unbounded_channel();
//! let (state_tx, _) = watch::channel(ConnectionState::Disconnected);
//! let handle = WebSocketHandle::spawn(
//!     "ws://localhost:8080/ws".parse()?,
//!     ReconnectConfig::default(),
//!     CancellationToken::new(),
//!     inbound_tx,
//!     Arc::new(state_tx),
//! );
//! handle.wait_connected(std::time::Duration::from_secs(5)).await?;
//! handle.send(&ParameterValue::new("synth/env/attack", 64))?;
//!
//! while let Some(event) = inbound_rx.recv().await {
//!     println!("{event:?}");
//! }
//! ```

use std::sync::Arc;
use std::time::Duration;

use futures_util::{Sink, SinkExt, StreamExt};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::error::Error;
use crate::models::{InboundEvent, ParameterValue};
use crate::transport::ConnectionState;

// ── ReconnectConfig ──────────────────────────────────────────────────

/// Exponential backoff configuration for WebSocket reconnection.
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    /// Delay before the first reconnection attempt. Default: 1s.
    pub initial_delay: Duration,

    /// Upper bound on backoff delay. Default: 30s.
    pub max_delay: Duration,

    /// Maximum consecutive failed attempts before giving up.
    /// `None` means retry forever. Default: 10.
    pub max_retries: Option<u32>,

    /// Handshake timeout for each connection attempt. Default: 10s.
    pub handshake_timeout: Duration,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            max_retries: Some(10),
            handshake_timeout: Duration::from_secs(10),
        }
    }
}

// ── WebSocketHandle ──────────────────────────────────────────────────

/// Handle to a running duplex channel task.
///
/// Sends are accepted only while the shared state reads
/// [`ConnectionState::Connected`]; call [`shutdown`](Self::shutdown) to
/// tear the task down.
pub struct WebSocketHandle {
    outbound_tx: mpsc::UnboundedSender<ParameterValue>,
    state_rx: watch::Receiver<ConnectionState>,
    cancel: CancellationToken,
    task: std::sync::Mutex<Option<JoinHandle<()>>>,
}

impl WebSocketHandle {
    /// Spawn the connection loop. Returns immediately; the first
    /// handshake happens in the background.
    pub fn spawn(
        ws_url: Url,
        reconnect: ReconnectConfig,
        cancel: CancellationToken,
        inbound_tx: mpsc::UnboundedSender<InboundEvent>,
        state_tx: Arc<watch::Sender<ConnectionState>>,
    ) -> Self {
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let state_rx = state_tx.subscribe();

        let task_cancel = cancel.clone();
        let task = tokio::spawn(async move {
            ws_loop(ws_url, outbound_rx, inbound_tx, state_tx, reconnect, task_cancel).await;
        });

        Self {
            outbound_tx,
            state_rx,
            cancel,
            task: std::sync::Mutex::new(Some(task)),
        }
    }

    /// Queue an outbound frame. Fails with [`Error::NotConnected`] unless
    /// the channel is currently open.
    pub fn send(&self, update: &ParameterValue) -> Result<(), Error> {
        if !self.state_rx.borrow().is_connected() {
            return Err(Error::NotConnected);
        }
        self.outbound_tx
            .send(update.clone())
            .map_err(|_| Error::NotConnected)
    }

    /// Wait until the channel reports `Connected`.
    pub async fn wait_connected(&self, timeout: Duration) -> Result<(), Error> {
        let mut state_rx = self.state_rx.clone();
        match tokio::time::timeout(timeout, state_rx.wait_for(|s| s.is_connected())).await {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(_)) => Err(Error::WebSocketConnect("connection task ended".into())),
            Err(_) => Err(Error::Timeout {
                timeout_secs: timeout.as_secs(),
            }),
        }
    }

    /// Current channel state.
    pub fn state(&self) -> ConnectionState {
        *self.state_rx.borrow()
    }

    /// `true` once the background loop has exited (shut down or gave up).
    pub fn is_finished(&self) -> bool {
        self.task
            .lock()
            .map_or(true, |task| task.as_ref().is_none_or(JoinHandle::is_finished))
    }

    /// Signal the background task to shut down gracefully.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    /// Wait for the background task to exit. Only the first caller
    /// actually waits.
    pub async fn join(&self) {
        let task = self.task.lock().ok().and_then(|mut task| task.take());
        if let Some(task) = task {
            let _ = task.await;
        }
    }
}

// ── Background reconnection loop ─────────────────────────────────────

/// Main loop: connect → pump frames → on drop, backoff → reconnect.
async fn ws_loop(
    ws_url: Url,
    mut outbound_rx: mpsc::UnboundedReceiver<ParameterValue>,
    inbound_tx: mpsc::UnboundedSender<InboundEvent>,
    state_tx: Arc<watch::Sender<ConnectionState>>,
    reconnect: ReconnectConfig,
    cancel: CancellationToken,
) {
    let mut attempt: u32 = 0;
    let mut carry: Option<ParameterValue> = None;
    state_tx.send_replace(ConnectionState::Connecting);

    loop {
        let result = connect_and_run(
            &ws_url,
            &mut outbound_rx,
            &mut carry,
            &inbound_tx,
            &state_tx,
            &cancel,
            reconnect.handshake_timeout,
            &mut attempt,
        )
        .await;

        if cancel.is_cancelled() {
            break;
        }
        state_tx.send_replace(ConnectionState::Disconnected);

        match result {
            Ok(()) => tracing::info!("WebSocket disconnected cleanly, reconnecting"),
            Err(e) => tracing::warn!(error = %e, attempt, "WebSocket error"),
        }

        if let Some(max) = reconnect.max_retries {
            if attempt >= max {
                tracing::error!(
                    max_retries = max,
                    "WebSocket reconnection limit reached, giving up"
                );
                break;
            }
        }

        let delay = calculate_backoff(attempt, &reconnect);
        attempt += 1;
        state_tx.send_replace(ConnectionState::Reconnecting { attempt });
        tracing::info!(
            delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
            attempt,
            "Waiting before reconnect"
        );

        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            () = tokio::time::sleep(delay) => {}
        }
    }

    if !cancel.is_cancelled() {
        state_tx.send_replace(ConnectionState::Disconnected);
        outbound_rx.close();
        let mut dropped = usize::from(carry.is_some());
        while outbound_rx.try_recv().is_ok() {
            dropped += 1;
        }
        if dropped > 0 {
            tracing::warn!(dropped, "WebSocket gave up with outbound frames unsent");
        }
    }
    tracing::debug!("WebSocket loop exiting");
}

// ── Single connection lifecycle ──────────────────────────────────────

/// Establish one connection and pump frames until it drops or the
/// token is cancelled. Resets `attempt` once the handshake succeeds.
///
/// A frame whose write failed is left in `carry` and goes out first on
/// the next connection; frames still queued follow in order.
async fn connect_and_run(
    url: &Url,
    outbound_rx: &mut mpsc::UnboundedReceiver<ParameterValue>,
    carry: &mut Option<ParameterValue>,
    inbound_tx: &mpsc::UnboundedSender<InboundEvent>,
    state_tx: &watch::Sender<ConnectionState>,
    cancel: &CancellationToken,
    handshake_timeout: Duration,
    attempt: &mut u32,
) -> Result<(), Error> {
    tracing::info!(url = %url, "Connecting to WebSocket");

    let handshake = tokio::time::timeout(handshake_timeout, tokio_tungstenite::connect_async(url.as_str()));
    let (ws_stream, _response) = tokio::select! {
        biased;
        () = cancel.cancelled() => return Ok(()),
        result = handshake => result
            .map_err(|_| Error::Timeout { timeout_secs: handshake_timeout.as_secs() })?
            .map_err(|e| Error::WebSocketConnect(e.to_string()))?,
    };

    *attempt = 0;
    let (mut write, mut read) = ws_stream.split();

    if let Some(update) = carry.take() {
        tracing::debug!(address = %update.address, "Resending frame from the previous connection");
        if let Err(e) = write_frame(&mut write, &update).await {
            *carry = Some(update);
            return Err(e);
        }
    }

    state_tx.send_replace(ConnectionState::Connected);
    tracing::info!("WebSocket connected");

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => {
                // Edits accepted by `send` before shutdown still go out.
                while let Ok(update) = outbound_rx.try_recv() {
                    let _ = write_frame(&mut write, &update).await;
                }
                let _ = write.send(tungstenite::Message::Close(None)).await;
                return Ok(());
            }
            frame = read.next() => {
                match frame {
                    Some(Ok(tungstenite::Message::Text(text))) => {
                        dispatch_frame(&text, inbound_tx);
                    }
                    Some(Ok(tungstenite::Message::Ping(_))) => {
                        // tungstenite handles pong replies automatically
                        tracing::trace!("WebSocket ping");
                    }
                    Some(Ok(tungstenite::Message::Close(frame))) => {
                        if let Some(ref cf) = frame {
                            tracing::info!(
                                code = %cf.code,
                                reason = %cf.reason,
                                "WebSocket close frame received"
                            );
                        } else {
                            tracing::info!("WebSocket close frame received (no payload)");
                        }
                        return Ok(());
                    }
                    Some(Err(e)) => {
                        return Err(Error::WebSocketConnect(e.to_string()));
                    }
                    None => {
                        tracing::info!("WebSocket stream ended");
                        return Ok(());
                    }
                    _ => {
                        // Binary, Pong, Frame -- ignore
                    }
                }
            }
            Some(update) = outbound_rx.recv() => {
                if let Err(e) = write_frame(&mut write, &update).await {
                    *carry = Some(update);
                    return Err(e);
                }
            }
        }
    }
}

/// Encode and write one `{address, value}` frame. Unencodable frames are
/// logged and skipped.
async fn write_frame<S>(write: &mut S, update: &ParameterValue) -> Result<(), Error>
where
    S: Sink<tungstenite::Message, Error = tungstenite::Error> + Unpin,
{
    let json = match serde_json::to_string(update) {
        Ok(json) => json,
        Err(e) => {
            tracing::warn!(error = %e, address = %update.address, "Could not encode outbound frame");
            return Ok(());
        }
    };
    tracing::debug!(address = %update.address, value = update.value, "WebSocket send");
    write
        .send(tungstenite::Message::Text(json.into()))
        .await
        .map_err(|e| Error::WebSocketConnect(e.to_string()))
}

// ── Frame dispatch ───────────────────────────────────────────────────

/// Parse a text frame and forward it. Malformed frames are logged and
/// skipped; they never tear the connection down.
fn dispatch_frame(text: &str, inbound_tx: &mpsc::UnboundedSender<InboundEvent>) {
    match InboundEvent::parse(text) {
        Ok(Some(event)) => {
            // Ignore send errors -- the session has shut down.
            let _ = inbound_tx.send(event);
        }
        Ok(None) => tracing::trace!(frame = text, "Ignoring WebSocket frame"),
        Err(e) => tracing::warn!(error = %e, "Dropping malformed WebSocket frame"),
    }
}

// ── Backoff calculation ──────────────────────────────────────────────

/// Exponential backoff with jitter.
///
/// `delay = min(initial * 2^attempt, max) * jitter`
///
/// Jitter is +-25%, deterministic in the attempt number.
fn calculate_backoff(attempt: u32, config: &ReconnectConfig) -> Duration {
    let exponent = i32::try_from(attempt.min(31)).unwrap_or(31);
    let base = config.initial_delay.as_secs_f64() * 2.0_f64.powi(exponent);
    let capped = base.min(config.max_delay.as_secs_f64());

    let jitter_factor = 1.0 + 0.25 * (f64::from(attempt) * 7.3).sin();
    let with_jitter = (capped * jitter_factor).max(0.0);

    Duration::from_secs_f64(with_jitter)
}

// ── Tests ────────────────────────────────────────────────────────────
