// ── Session ──
//
// Full lifecycle of one editor session: discovery, default device
// selection, and a single actor task that owns the store and serializes
// local commands, inbound events and network completions.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::Utc;
use synthlink_api::{
    ConnectionState, DeviceListing, EditorClient, InboundEvent, LiveTransport, ParameterValue,
    Transport, TransportConfig,
};
use tokio::sync::{Mutex, broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::command::{Command, CommandEnvelope, CommandResult};
use crate::config::SessionConfig;
use crate::error::CoreError;
use crate::model::{DeviceLists, Direction, MAX_VALUE, Parameter, SelectionState};
use crate::refresh::{RefreshCoordinator, RefreshReport, RefreshState, run_refresh};
use crate::selector::{DeviceSelector, SelectionRequest, issue_selection};
use crate::store::{ParameterStore, StoreReaders};
use crate::sync::{EchoOutcome, SendOutcome, SyncController};

const COMMAND_CHANNEL_SIZE: usize = 64;
const EVENT_CHANNEL_SIZE: usize = 256;

// ── SessionEvent ─────────────────────────────────────────────────────

/// Notable things that happened inside the actor.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// The controller changed a parameter and the store followed.
    ParameterEchoed { address: String, value: u8 },
    /// Refresh progress as a `0.0..=1.0` fraction.
    Progress { fraction: f32 },
    RefreshFinished(RefreshReport),
}

// ── Session ──────────────────────────────────────────────────────────

/// The entry point for consumers.
///
/// Cheaply cloneable via `Arc<SessionInner>`. Generic over [`Transport`]
/// so tests can drive it with a fake controller.
pub struct Session<T: Transport> {
    inner: Arc<SessionInner<T>>,
}

/// A session bound to a real controller.
pub type LiveSession = Session<LiveTransport>;

impl<T: Transport> Clone for Session<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

struct SessionInner<T: Transport> {
    config: SessionConfig,
    transport: Arc<T>,
    readers: StoreReaders,
    refresh_state: watch::Receiver<RefreshState>,
    last_report: watch::Receiver<Option<RefreshReport>>,
    event_tx: broadcast::Sender<SessionEvent>,
    command_tx: mpsc::Sender<CommandEnvelope>,
    /// Actor-owned state, taken by `start`.
    pending: Mutex<Option<Pending>>,
    running: AtomicBool,
    cancel: CancellationToken,
    actor: Mutex<Option<JoinHandle<()>>>,
    selection_worker: Mutex<Option<JoinHandle<()>>>,
}

struct Pending {
    store: ParameterStore,
    refresh: RefreshCoordinator,
    command_rx: mpsc::Receiver<CommandEnvelope>,
}

impl<T: Transport> Drop for SessionInner<T> {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

impl Session<LiveTransport> {
    /// Build a session that talks to a real controller.
    pub fn live(config: SessionConfig) -> Result<Self, CoreError> {
        let transport_config = TransportConfig {
            timeout: config.timeout,
            ..TransportConfig::default()
        };
        let client = EditorClient::new(config.url.clone(), &transport_config)?;

        let mut reconnect = config.reconnect.clone();
        reconnect.handshake_timeout = config.connect_timeout;
        let transport = LiveTransport::new(client, reconnect, config.connect_timeout)?;

        Ok(Self::new(transport, config))
    }
}

impl<T: Transport> Session<T> {
    /// Create a session. Does NOT contact the controller -- call
    /// [`start()`](Self::start).
    pub fn new(transport: T, config: SessionConfig) -> Self {
        let store = ParameterStore::new();
        let refresh = RefreshCoordinator::new();
        let (command_tx, command_rx) = mpsc::channel(COMMAND_CHANNEL_SIZE);
        let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_SIZE);

        Self {
            inner: Arc::new(SessionInner {
                config,
                transport: Arc::new(transport),
                readers: store.readers(),
                refresh_state: refresh.subscribe_state(),
                last_report: refresh.subscribe_reports(),
                event_tx,
                command_tx,
                pending: Mutex::new(Some(Pending {
                    store,
                    refresh,
                    command_rx,
                })),
                running: AtomicBool::new(false),
                cancel: CancellationToken::new(),
                actor: Mutex::new(None),
                selection_worker: Mutex::new(None),
            }),
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.inner.config
    }

    pub fn transport(&self) -> &Arc<T> {
        &self.inner.transport
    }

    // ── Lifecycle ────────────────────────────────────────────────────

    /// Connect and load initial state.
    ///
    /// Opens the duplex channel (failure is logged, not fatal), fetches
    /// devices and parameters, applies and requests the default
    /// selection (unless `apply_default_selection` is off), then spawns
    /// the actor. Discovery errors are returned
    /// and leave the session startable again.
    pub async fn start(&self) -> Result<(), CoreError> {
        let mut slot = self.inner.pending.lock().await;
        let Some(pending) = slot.as_mut() else {
            return Err(CoreError::AlreadyStarted);
        };
        let transport = &self.inner.transport;

        if self.inner.config.websocket_enabled {
            if let Err(e) = transport.connect().await {
                warn!(error = %e, "duplex channel unavailable, edits will fail until it connects");
            }
        }

        let listing = transport.fetch_devices().await?;
        let params = transport.fetch_parameters().await?;
        let inbound_rx = transport
            .take_inbound()
            .ok_or_else(|| CoreError::Internal("inbound event receiver already claimed".into()))?;

        pending.store.set_parameters(params);
        let mut selector = DeviceSelector::new();
        let defaults = if self.inner.config.apply_default_selection {
            selector.populate(&mut pending.store, listing.into())
        } else {
            selector.load(&mut pending.store, listing.into());
            Vec::new()
        };

        let Some(pending) = slot.take() else {
            return Err(CoreError::AlreadyStarted);
        };

        let (selection_tx, selection_rx) = mpsc::unbounded_channel();
        let worker = tokio::spawn(selection_worker(
            Arc::clone(transport),
            selection_rx,
            self.inner.config.selection_retries,
        ));
        for request in defaults {
            let _ = selection_tx.send(request);
        }
        selector.attach();

        let (internal_tx, internal_rx) = mpsc::unbounded_channel();
        let actor = Actor {
            transport: Arc::clone(transport),
            config: self.inner.config.clone(),
            store: pending.store,
            sync: SyncController::new(),
            selector,
            refresh: pending.refresh,
            selection_tx,
            internal_tx,
            event_tx: self.inner.event_tx.clone(),
        };
        let handle = tokio::spawn(actor.run(
            pending.command_rx,
            inbound_rx,
            internal_rx,
            self.inner.cancel.clone(),
        ));

        *self.inner.actor.lock().await = Some(handle);
        *self.inner.selection_worker.lock().await = Some(worker);
        self.inner.running.store(true, Ordering::Release);
        info!(url = %self.inner.config.url, "session started");
        Ok(())
    }

    /// Stop the actor and release the duplex channel.
    pub async fn shutdown(&self) {
        self.inner.running.store(false, Ordering::Release);
        self.inner.cancel.cancel();

        if let Some(handle) = self.inner.actor.lock().await.take() {
            let _ = handle.await;
        }
        // The actor held the last queue sender; the worker drains and exits.
        if let Some(worker) = self.inner.selection_worker.lock().await.take() {
            let _ = worker.await;
        }

        self.inner.transport.close().await;
        debug!("session shut down");
    }

    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::Acquire)
    }

    // ── Command execution ────────────────────────────────────────────

    /// Execute a command on the actor and await its result.
    pub async fn execute(&self, command: Command) -> Result<CommandResult, CoreError> {
        if !self.is_running() {
            return Err(CoreError::SessionClosed);
        }

        let (tx, rx) = oneshot::channel();
        self.inner
            .command_tx
            .send(CommandEnvelope {
                command,
                response_tx: tx,
            })
            .await
            .map_err(|_| CoreError::SessionClosed)?;

        rx.await.map_err(|_| CoreError::SessionClosed)?
    }

    /// Local parameter edit. Values above 127 are rejected; a closed
    /// duplex channel yields `NotConnected` with the local value kept.
    pub async fn set_parameter(&self, address: &str, value: u8) -> Result<SendOutcome, CoreError> {
        match self
            .execute(Command::SetParameter {
                address: address.to_owned(),
                value,
            })
            .await?
        {
            CommandResult::Parameter(outcome) => Ok(outcome),
            other => Err(unexpected(&other)),
        }
    }

    /// Returns `true` if the selection changed.
    pub async fn select_device(&self, direction: Direction, name: &str) -> Result<bool, CoreError> {
        match self
            .execute(Command::SelectDevice {
                direction,
                name: name.to_owned(),
            })
            .await?
        {
            CommandResult::Selected(changed) => Ok(changed),
            other => Err(unexpected(&other)),
        }
    }

    pub async fn select_input(&self, name: &str) -> Result<bool, CoreError> {
        self.select_device(Direction::Input, name).await
    }

    pub async fn select_output(&self, name: &str) -> Result<bool, CoreError> {
        self.select_device(Direction::Output, name).await
    }

    /// Begin a bulk refresh; `Busy` while one is in flight.
    pub async fn start_refresh(&self) -> Result<(), CoreError> {
        match self.execute(Command::StartRefresh).await? {
            CommandResult::RefreshStarted => Ok(()),
            other => Err(unexpected(&other)),
        }
    }

    /// Start a refresh and wait for its report.
    pub async fn refresh(&self) -> Result<RefreshReport, CoreError> {
        let mut reports = self.inner.last_report.clone();
        let requested_at = Utc::now();
        self.start_refresh().await?;

        loop {
            if let Some(report) = reports.borrow_and_update().clone() {
                if report.started_at >= requested_at {
                    return Ok(report);
                }
            }
            reports
                .changed()
                .await
                .map_err(|_| CoreError::SessionClosed)?;
        }
    }

    /// Re-fetch the device lists; vanished selections are cleared.
    pub async fn reload_devices(&self) -> Result<SelectionState, CoreError> {
        match self.execute(Command::ReloadDevices).await? {
            CommandResult::Devices(selection) => Ok(selection),
            other => Err(unexpected(&other)),
        }
    }

    // ── State observation ────────────────────────────────────────────

    /// Subscribe to the parameter table. Every store mutation publishes
    /// a fresh snapshot.
    pub fn parameters(&self) -> watch::Receiver<Arc<Vec<Arc<Parameter>>>> {
        self.inner.readers.parameters.clone()
    }

    pub fn parameters_snapshot(&self) -> Arc<Vec<Arc<Parameter>>> {
        self.inner.readers.parameters.borrow().clone()
    }

    /// Look up a single parameter by address.
    pub fn parameter(&self, address: &str) -> Option<Arc<Parameter>> {
        self.inner
            .readers
            .parameters
            .borrow()
            .iter()
            .find(|p| p.address == address)
            .cloned()
    }

    pub fn devices_snapshot(&self) -> Arc<DeviceLists> {
        self.inner.readers.devices.borrow().clone()
    }

    pub fn devices(&self) -> watch::Receiver<Arc<DeviceLists>> {
        self.inner.readers.devices.clone()
    }

    pub fn selection_snapshot(&self) -> SelectionState {
        self.inner.readers.selection.borrow().clone()
    }

    pub fn selection(&self) -> watch::Receiver<SelectionState> {
        self.inner.readers.selection.clone()
    }

    /// Refresh progress as a `0.0..=1.0` fraction.
    pub fn progress(&self) -> watch::Receiver<f32> {
        self.inner.readers.progress.clone()
    }

    /// Whether the refresh indicator should be shown.
    pub fn refresh_visible(&self) -> watch::Receiver<bool> {
        self.inner.readers.refresh_visible.clone()
    }

    pub fn refresh_state(&self) -> watch::Receiver<RefreshState> {
        self.inner.refresh_state.clone()
    }

    pub fn last_refresh(&self) -> Option<RefreshReport> {
        self.inner.last_report.borrow().clone()
    }

    /// Subscribe to duplex channel state changes.
    pub fn connection_state(&self) -> watch::Receiver<ConnectionState> {
        self.inner.transport.connection_state()
    }

    /// Subscribe to actor events.
    pub fn events(&self) -> broadcast::Receiver<SessionEvent> {
        self.inner.event_tx.subscribe()
    }

    // ── One-shot convenience ─────────────────────────────────────────

    /// One-shot: start, run closure, shut down.
    pub async fn oneshot<F, Fut, R>(transport: T, config: SessionConfig, f: F) -> Result<R, CoreError>
    where
        F: FnOnce(Session<T>) -> Fut,
        Fut: Future<Output = Result<R, CoreError>>,
    {
        let session = Session::new(transport, config);
        session.start().await?;
        let result = f(session.clone()).await;
        session.shutdown().await;
        result
    }
}

fn unexpected(result: &CommandResult) -> CoreError {
    CoreError::Internal(format!("unexpected command result: {result:?}"))
}

/// Issues selection requests one at a time, in the order they were made.
async fn selection_worker<T: Transport>(
    transport: Arc<T>,
    mut requests: mpsc::UnboundedReceiver<SelectionRequest>,
    retries: u32,
) {
    while let Some(request) = requests.recv().await {
        let _ = issue_selection(&*transport, &request, retries).await;
    }
    debug!("selection worker exiting");
}

// ── Actor ────────────────────────────────────────────────────────────

/// Completions posted back by spawned network tasks.
enum Internal {
    RefreshSettled(Result<Vec<ParameterValue>, CoreError>),
    DevicesFetched {
        result: Result<DeviceListing, CoreError>,
        response_tx: oneshot::Sender<Result<CommandResult, CoreError>>,
    },
}

/// Owns all mutable session state. Never awaits the network itself, so
/// inbound events keep flowing while requests are outstanding.
struct Actor<T: Transport> {
    transport: Arc<T>,
    config: SessionConfig,
    store: ParameterStore,
    sync: SyncController,
    selector: DeviceSelector,
    refresh: RefreshCoordinator,
    selection_tx: mpsc::UnboundedSender<SelectionRequest>,
    internal_tx: mpsc::UnboundedSender<Internal>,
    event_tx: broadcast::Sender<SessionEvent>,
}

impl<T: Transport> Actor<T> {
    async fn run(
        mut self,
        mut command_rx: mpsc::Receiver<CommandEnvelope>,
        mut inbound_rx: mpsc::UnboundedReceiver<InboundEvent>,
        mut internal_rx: mpsc::UnboundedReceiver<Internal>,
        cancel: CancellationToken,
    ) {
        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                Some(event) = inbound_rx.recv() => self.handle_inbound(event),
                Some(message) = internal_rx.recv() => self.handle_internal(message),
                envelope = command_rx.recv() => {
                    let Some(envelope) = envelope else { break };
                    self.handle_command(envelope);
                }
            }
        }
        debug!("session actor exiting");
    }

    // ── Inbound events ───────────────────────────────────────────────

    fn handle_inbound(&mut self, event: InboundEvent) {
        match event {
            InboundEvent::ParamEcho { address, value } => {
                match self
                    .sync
                    .apply_echo(&mut self.store, &address, value, &*self.transport)
                {
                    Ok(EchoOutcome::Applied) => {
                        let value = self.store.get(&address).map_or(value, |p| p.value);
                        let _ = self
                            .event_tx
                            .send(SessionEvent::ParameterEchoed { address, value });
                    }
                    Ok(EchoOutcome::Unchanged | EchoOutcome::UnknownAddress) => {}
                    Err(e) => warn!(error = %e, address = %address, "failed to apply echo"),
                }
            }
            InboundEvent::Progress { percent } => {
                self.refresh.on_progress(&mut self.store, percent);
                let _ = self.event_tx.send(SessionEvent::Progress {
                    fraction: self.store.progress(),
                });
            }
        }
    }

    // ── Network completions ──────────────────────────────────────────

    fn handle_internal(&mut self, message: Internal) {
        match message {
            Internal::RefreshSettled(result) => {
                let report = self.refresh.complete(&mut self.store, &mut self.sync, result);
                let _ = self.event_tx.send(SessionEvent::RefreshFinished(report));
            }
            Internal::DevicesFetched {
                result,
                response_tx,
            } => {
                let reply = result.map(|listing| {
                    CommandResult::Devices(self.selector.reload(&mut self.store, listing.into()))
                });
                let _ = response_tx.send(reply);
            }
        }
    }

    // ── Commands ─────────────────────────────────────────────────────

    fn handle_command(&mut self, envelope: CommandEnvelope) {
        let CommandEnvelope {
            command,
            response_tx,
        } = envelope;

        let result = match command {
            Command::SetParameter { address, value } => self.set_parameter(&address, value),
            Command::SelectDevice { direction, name } => self.select_device(direction, &name),
            Command::StartRefresh => self.start_refresh(),
            Command::ReloadDevices => {
                // Replies once the fetch completes.
                self.reload_devices(response_tx);
                return;
            }
        };
        let _ = response_tx.send(result);
    }

    fn set_parameter(&mut self, address: &str, value: u8) -> Result<CommandResult, CoreError> {
        if value > MAX_VALUE {
            return Err(CoreError::ValidationFailed {
                message: format!("value {value} for {address} is above {MAX_VALUE}"),
            });
        }

        if self.store.get(address).is_none() {
            return Err(CoreError::ParameterNotFound {
                address: address.to_owned(),
            });
        }

        match self.store.set_value(address, value) {
            Some(change) => self
                .sync
                .on_store_change(&change, &*self.transport)
                .map(CommandResult::Parameter),
            None => Ok(CommandResult::Parameter(SendOutcome::Unchanged)),
        }
    }

    fn select_device(&mut self, direction: Direction, name: &str) -> Result<CommandResult, CoreError> {
        let request = self.selector.select(&mut self.store, direction, name)?;
        let changed = request.is_some();
        if let Some(request) = request {
            if self.selection_tx.send(request).is_err() {
                warn!(%direction, name, "selection worker gone, request dropped");
            }
        }
        Ok(CommandResult::Selected(changed))
    }

    fn start_refresh(&mut self) -> Result<CommandResult, CoreError> {
        self.refresh.start(&mut self.store)?;

        let transport = Arc::clone(&self.transport);
        let timeout = self.config.refresh_timeout;
        let internal_tx = self.internal_tx.clone();
        tokio::spawn(async move {
            let result = run_refresh(&*transport, timeout).await;
            let _ = internal_tx.send(Internal::RefreshSettled(result));
        });

        Ok(CommandResult::RefreshStarted)
    }

    fn reload_devices(&self, response_tx: oneshot::Sender<Result<CommandResult, CoreError>>) {
        let transport = Arc::clone(&self.transport);
        let internal_tx = self.internal_tx.clone();
        tokio::spawn(async move {
            let result = transport.fetch_devices().await.map_err(CoreError::from);
            let _ = internal_tx.send(Internal::DevicesFetched {
                result,
                response_tx,
            });
        });
    }
}
