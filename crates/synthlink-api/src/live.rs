// Production `Transport`: HTTP via `EditorClient`, duplex channel via
// a reconnecting `WebSocketHandle`.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use arc_swap::ArcSwapOption;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;

use crate::client::EditorClient;
use crate::error::Error;
use crate::models::{DeviceListing, InboundEvent, ParameterValue};
use crate::transport::{ConnectionState, Transport};
use crate::websocket::{ReconnectConfig, WebSocketHandle};

/// How long `close` waits for queued frames to flush.
const CLOSE_GRACE: Duration = Duration::from_secs(2);

/// Talks to a running controller.
///
/// The inbound receiver is created once and survives reconnects, so a
/// session that claimed it keeps receiving after the channel is rebuilt.
pub struct LiveTransport {
    client: EditorClient,
    ws_url: Url,
    reconnect: ReconnectConfig,
    connect_timeout: Duration,
    ws: ArcSwapOption<WebSocketHandle>,
    connect_lock: tokio::sync::Mutex<()>,
    inbound_tx: mpsc::UnboundedSender<InboundEvent>,
    inbound_rx: Mutex<Option<mpsc::UnboundedReceiver<InboundEvent>>>,
    state_tx: Arc<watch::Sender<ConnectionState>>,
    cancel: CancellationToken,
}

impl LiveTransport {
    pub fn new(client: EditorClient, reconnect: ReconnectConfig, connect_timeout: Duration) -> Result<Self, Error> {
        let ws_url = client.ws_url()?;
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let (state_tx, _) = watch::channel(ConnectionState::Disconnected);

        Ok(Self {
            client,
            ws_url,
            reconnect,
            connect_timeout,
            ws: ArcSwapOption::empty(),
            connect_lock: tokio::sync::Mutex::new(()),
            inbound_tx,
            inbound_rx: Mutex::new(Some(inbound_rx)),
            state_tx: Arc::new(state_tx),
            cancel: CancellationToken::new(),
        })
    }

    /// The underlying HTTP client.
    pub fn client(&self) -> &EditorClient {
        &self.client
    }

    pub fn ws_url(&self) -> &Url {
        &self.ws_url
    }
}

impl Transport for LiveTransport {
    async fn fetch_devices(&self) -> Result<DeviceListing, Error> {
        self.client.list_devices().await
    }

    async fn fetch_parameters(&self) -> Result<Vec<ParameterValue>, Error> {
        self.client.list_parameters().await
    }

    async fn request_refresh(&self) -> Result<(), Error> {
        self.client.update_parameters().await
    }

    async fn select_input(&self, name: &str) -> Result<(), Error> {
        self.client.select_input(name).await
    }

    async fn select_output(&self, name: &str) -> Result<(), Error> {
        self.client.select_output(name).await
    }

    async fn connect(&self) -> Result<(), Error> {
        let _guard = self.connect_lock.lock().await;

        if let Some(handle) = self.ws.load_full() {
            if !handle.is_finished() {
                debug!(state = ?handle.state(), "duplex channel already open, connect is a no-op");
                return Ok(());
            }
        }

        info!(url = %self.ws_url, "opening duplex channel");
        let handle = Arc::new(WebSocketHandle::spawn(
            self.ws_url.clone(),
            self.reconnect.clone(),
            self.cancel.child_token(),
            self.inbound_tx.clone(),
            Arc::clone(&self.state_tx),
        ));
        self.ws.store(Some(Arc::clone(&handle)));

        handle.wait_connected(self.connect_timeout).await
    }

    fn take_inbound(&self) -> Option<mpsc::UnboundedReceiver<InboundEvent>> {
        self.inbound_rx.lock().ok().and_then(|mut slot| slot.take())
    }

    fn send(&self, update: &ParameterValue) -> Result<(), Error> {
        match self.ws.load().as_ref() {
            Some(handle) => handle.send(update),
            None => Err(Error::NotConnected),
        }
    }

    async fn close(&self) {
        if let Some(handle) = self.ws.swap(None) {
            info!("closing duplex channel");
            handle.shutdown();
            if tokio::time::timeout(CLOSE_GRACE, handle.join()).await.is_err() {
                warn!("duplex channel did not close in time");
            }
        }
        self.state_tx.send_replace(ConnectionState::Disconnected);
    }

    fn connection_state(&self) -> watch::Receiver<ConnectionState> {
        self.state_tx.subscribe()
    }
}

impl Drop for LiveTransport {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
