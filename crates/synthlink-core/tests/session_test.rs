#![allow(clippy::unwrap_used, clippy::float_cmp)]
// Session behaviour against an in-process fake controller.

use std::ops::Deref;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use pretty_assertions::assert_eq;
use synthlink_api::{
    ConnectionState, DeviceListing, Error, InboundEvent, MidiPort, ParameterValue, Transport,
};
use tokio::sync::{Notify, mpsc, watch};
use url::Url;

use synthlink_core::{
    CoreError, Direction, RefreshOutcome, RefreshState, SendOutcome, Session, SessionConfig,
};

// ── Fake controller ─────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
enum Call {
    FetchDevices,
    FetchParameters,
    RequestRefresh,
    SelectInput(String),
    SelectOutput(String),
}

struct FakeState {
    devices: Mutex<DeviceListing>,
    params: Mutex<Vec<ParameterValue>>,
    calls: Mutex<Vec<Call>>,
    sent: Mutex<Vec<ParameterValue>>,
    connected: AtomicBool,
    fail_devices: AtomicBool,
    failing_selects: AtomicU32,
    hold_refresh: AtomicBool,
    refresh_gate: Notify,
    inbound_tx: mpsc::UnboundedSender<InboundEvent>,
    inbound_rx: Mutex<Option<mpsc::UnboundedReceiver<InboundEvent>>>,
    state: watch::Sender<ConnectionState>,
}

/// Cheap handle shared between the test and the session.
#[derive(Clone)]
struct FakeController(Arc<FakeState>);

impl Deref for FakeController {
    type Target = FakeState;

    fn deref(&self) -> &FakeState {
        &self.0
    }
}

impl FakeController {
    fn new(inputs: &[&str], outputs: &[&str], params: &[(&str, u8)]) -> Self {
        let port = |name: &&str| MidiPort {
            name: (*name).to_owned(),
            kind: Some("INPUT".into()),
        };
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let (state, _) = watch::channel(ConnectionState::Disconnected);

        Self(Arc::new(FakeState {
            devices: Mutex::new(DeviceListing {
                inputs: inputs.iter().map(port).collect(),
                outputs: outputs.iter().map(port).collect(),
            }),
            params: Mutex::new(
                params
                    .iter()
                    .map(|(a, v)| ParameterValue::new(*a, *v))
                    .collect(),
            ),
            calls: Mutex::new(Vec::new()),
            sent: Mutex::new(Vec::new()),
            connected: AtomicBool::new(true),
            fail_devices: AtomicBool::new(false),
            failing_selects: AtomicU32::new(0),
            hold_refresh: AtomicBool::new(false),
            refresh_gate: Notify::new(),
            inbound_tx,
            inbound_rx: Mutex::new(Some(inbound_rx)),
            state,
        }))
    }
}

impl FakeState {
    fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    fn selection_calls(&self) -> Vec<Call> {
        self.calls()
            .into_iter()
            .filter(|c| matches!(c, Call::SelectInput(_) | Call::SelectOutput(_)))
            .collect()
    }

    fn count(&self, call: &Call) -> usize {
        self.calls().iter().filter(|c| *c == call).count()
    }

    fn sent(&self) -> Vec<ParameterValue> {
        self.sent.lock().unwrap().clone()
    }

    fn push(&self, event: InboundEvent) {
        self.inbound_tx.send(event).unwrap();
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }

    fn select_result(&self) -> Result<(), Error> {
        let failing = self.failing_selects.load(Ordering::SeqCst);
        if failing > 0 {
            self.failing_selects.store(failing - 1, Ordering::SeqCst);
            return Err(Error::Status {
                endpoint: "/api/input".into(),
                status: 500,
                body: String::new(),
            });
        }
        Ok(())
    }
}

impl Transport for FakeController {
    async fn fetch_devices(&self) -> Result<DeviceListing, Error> {
        self.record(Call::FetchDevices);
        if self.fail_devices.load(Ordering::SeqCst) {
            return Err(Error::Status {
                endpoint: "/api/devices".into(),
                status: 503,
                body: String::new(),
            });
        }
        Ok(self.devices.lock().unwrap().clone())
    }

    async fn fetch_parameters(&self) -> Result<Vec<ParameterValue>, Error> {
        self.record(Call::FetchParameters);
        Ok(self.params.lock().unwrap().clone())
    }

    async fn request_refresh(&self) -> Result<(), Error> {
        self.record(Call::RequestRefresh);
        if self.hold_refresh.load(Ordering::SeqCst) {
            self.refresh_gate.notified().await;
        }
        Ok(())
    }

    async fn select_input(&self, name: &str) -> Result<(), Error> {
        self.record(Call::SelectInput(name.to_owned()));
        self.select_result()
    }

    async fn select_output(&self, name: &str) -> Result<(), Error> {
        self.record(Call::SelectOutput(name.to_owned()));
        self.select_result()
    }

    async fn connect(&self) -> Result<(), Error> {
        self.state.send_replace(ConnectionState::Connected);
        Ok(())
    }

    fn take_inbound(&self) -> Option<mpsc::UnboundedReceiver<InboundEvent>> {
        self.inbound_rx.lock().unwrap().take()
    }

    fn send(&self, update: &ParameterValue) -> Result<(), Error> {
        if !self.connected.load(Ordering::SeqCst) {
            return Err(Error::NotConnected);
        }
        self.sent.lock().unwrap().push(update.clone());
        Ok(())
    }

    async fn close(&self) {
        self.state.send_replace(ConnectionState::Disconnected);
    }

    fn connection_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }
}

// ── Helpers ─────────────────────────────────────────────────────────

const ATTACK: &str = "synth/env/attack";
const LEVEL: &str = "synth/osc1/level";

fn config() -> SessionConfig {
    let mut config = SessionConfig::new(Url::parse("http://localhost:8080/").unwrap());
    config.refresh_timeout = Duration::from_secs(5);
    config
}

async fn started(fake: &FakeController) -> Session<FakeController> {
    let session = Session::new(fake.clone(), config());
    session.start().await.unwrap();
    session
}

fn default_fake() -> FakeController {
    FakeController::new(&["A", "A2"], &["B"], &[(ATTACK, 0), (LEVEL, 100)])
}

/// Poll until `check` holds, or fail after ~2s.
async fn eventually(mut check: impl FnMut() -> bool) {
    for _ in 0..200 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not met in time");
}

/// Give spawned tasks a chance to run.
async fn settle() {
    tokio::time::sleep(Duration::from_millis(50)).await;
}

// ── Startup & selection ─────────────────────────────────────────────

#[tokio::test]
async fn test_start_selects_first_devices_with_exactly_two_requests() {
    let fake = FakeController::new(&["A"], &["B"], &[(ATTACK, 0)]);
    let session = started(&fake).await;

    let selection = session.selection_snapshot();
    assert_eq!(selection.input.unwrap().name, "A");
    assert_eq!(selection.output.unwrap().name, "B");

    eventually(|| fake.selection_calls().len() == 2).await;
    settle().await;

    let mut calls = fake.selection_calls();
    calls.sort_by_key(|c| format!("{c:?}"));
    assert_eq!(
        calls,
        vec![Call::SelectInput("A".into()), Call::SelectOutput("B".into())]
    );
    session.shutdown().await;
}

#[tokio::test]
async fn test_start_with_empty_lists_requests_nothing() {
    let fake = FakeController::new(&[], &[], &[]);
    let session = started(&fake).await;

    settle().await;
    assert!(fake.selection_calls().is_empty());
    assert_eq!(session.selection_snapshot().input, None);
    assert_eq!(session.selection_snapshot().output, None);
}

#[tokio::test]
async fn test_start_without_default_selection_leaves_routing_alone() {
    let fake = default_fake();
    let mut config = config();
    config.apply_default_selection = false;
    let session = Session::new(fake.clone(), config);
    session.start().await.unwrap();
    settle().await;

    assert!(fake.selection_calls().is_empty());
    assert_eq!(session.selection_snapshot().input, None);
    assert_eq!(session.devices_snapshot().inputs.len(), 2);

    // A user selection is still a change and goes out on its own.
    assert!(session.select_input("A2").await.unwrap());
    session.shutdown().await;
    assert_eq!(fake.selection_calls(), vec![Call::SelectInput("A2".into())]);
}

#[tokio::test]
async fn test_start_loads_parameters_with_captions() {
    let fake = default_fake();
    let session = started(&fake).await;

    let params = session.parameters_snapshot();
    let captions: Vec<_> = params.iter().map(|p| p.caption.as_str()).collect();
    assert_eq!(captions, vec!["attack", "level"]);
    assert_eq!(session.parameter(LEVEL).unwrap().value, 100);
}

#[tokio::test]
async fn test_start_twice_is_rejected() {
    let fake = default_fake();
    let session = started(&fake).await;

    assert!(matches!(session.start().await, Err(CoreError::AlreadyStarted)));
}

#[tokio::test]
async fn test_start_failure_can_be_retried() {
    let fake = default_fake();
    fake.fail_devices.store(true, Ordering::SeqCst);
    let session = Session::new(fake.clone(), config());

    let err = session.start().await.unwrap_err();
    assert!(matches!(err, CoreError::Network { status: Some(503), .. }));
    assert!(!session.is_running());

    fake.fail_devices.store(false, Ordering::SeqCst);
    session.start().await.unwrap();
    assert!(session.is_running());
}

#[tokio::test]
async fn test_user_selection_issues_one_request() {
    let fake = default_fake();
    let session = started(&fake).await;
    eventually(|| fake.selection_calls().len() == 2).await;

    assert!(session.select_input("A2").await.unwrap());
    eventually(|| fake.count(&Call::SelectInput("A2".into())) == 1).await;

    // Re-selecting the current device is not a change.
    assert!(!session.select_input("A2").await.unwrap());
    settle().await;
    assert_eq!(fake.selection_calls().len(), 3);
}

#[tokio::test]
async fn test_selection_requests_keep_their_order() {
    let fake = default_fake();
    let session = started(&fake).await;

    // Issued before the default requests have gone out.
    assert!(session.select_input("A2").await.unwrap());
    session.shutdown().await;

    assert_eq!(
        fake.selection_calls(),
        vec![
            Call::SelectInput("A".into()),
            Call::SelectOutput("B".into()),
            Call::SelectInput("A2".into()),
        ]
    );
}

#[tokio::test]
async fn test_selecting_unknown_device_fails() {
    let fake = default_fake();
    let session = started(&fake).await;

    let err = session.select_output("A").await.unwrap_err();
    assert!(matches!(
        err,
        CoreError::DeviceNotFound {
            direction: Direction::Output,
            ..
        }
    ));
}

#[tokio::test]
async fn test_failed_selection_is_retried_once() {
    let fake = FakeController::new(&["A"], &[], &[]);
    fake.failing_selects.store(5, Ordering::SeqCst);
    let _session = started(&fake).await;

    eventually(|| fake.count(&Call::SelectInput("A".into())) == 2).await;
    settle().await;
    assert_eq!(fake.count(&Call::SelectInput("A".into())), 2);
}

#[tokio::test]
async fn test_reload_devices_clears_vanished_selection() {
    let fake = default_fake();
    let session = started(&fake).await;

    fake.devices.lock().unwrap().inputs = vec![MidiPort {
        name: "C".into(),
        kind: None,
    }];
    let selection = session.reload_devices().await.unwrap();

    assert_eq!(selection.input, None);
    assert_eq!(selection.output.unwrap().name, "B");
    assert_eq!(session.devices_snapshot().inputs[0].name, "C");
}

// ── Parameter sync ──────────────────────────────────────────────────

#[tokio::test]
async fn test_local_edit_sends_exactly_once() {
    let fake = default_fake();
    let session = started(&fake).await;

    let outcome = session.set_parameter(ATTACK, 12).await.unwrap();
    assert_eq!(outcome, SendOutcome::Sent);
    assert_eq!(fake.sent(), vec![ParameterValue::new(ATTACK, 12)]);

    // Same value again: nothing changes, nothing is sent.
    let outcome = session.set_parameter(ATTACK, 12).await.unwrap();
    assert_eq!(outcome, SendOutcome::Unchanged);
    assert_eq!(fake.sent().len(), 1);
    assert_eq!(session.parameter(ATTACK).unwrap().value, 12);
}

#[tokio::test]
async fn test_out_of_range_value_is_rejected() {
    let fake = default_fake();
    let session = started(&fake).await;

    let err = session.set_parameter(ATTACK, 128).await.unwrap_err();
    assert!(matches!(err, CoreError::ValidationFailed { .. }));
    assert!(fake.sent().is_empty());
}

#[tokio::test]
async fn test_unknown_parameter_is_rejected() {
    let fake = default_fake();
    let session = started(&fake).await;

    let err = session.set_parameter("synth/lfo/rate", 1).await.unwrap_err();
    assert!(matches!(err, CoreError::ParameterNotFound { .. }));
}

#[tokio::test]
async fn test_edit_while_disconnected_keeps_local_value() {
    let fake = default_fake();
    fake.connected.store(false, Ordering::SeqCst);
    let session = started(&fake).await;

    let err = session.set_parameter(ATTACK, 33).await.unwrap_err();
    assert!(matches!(err, CoreError::NotConnected));
    assert_eq!(session.parameter(ATTACK).unwrap().value, 33);
    assert!(fake.sent().is_empty());
}

#[tokio::test]
async fn test_echoes_update_store_without_sending() {
    let fake = default_fake();
    let session = started(&fake).await;
    let mut events = session.events();

    for value in [5, 9, 9, 127, 64] {
        fake.push(InboundEvent::ParamEcho {
            address: ATTACK.into(),
            value,
        });
    }
    fake.push(InboundEvent::ParamEcho {
        address: "synth/unknown".into(),
        value: 1,
    });

    eventually(|| session.parameter(ATTACK).is_some_and(|p| p.value == 64)).await;
    settle().await;

    assert!(fake.sent().is_empty());
    assert!(session.parameter("synth/unknown").is_none());
    assert!(matches!(
        events.recv().await.unwrap(),
        synthlink_core::SessionEvent::ParameterEchoed { value: 5, .. }
    ));
}

#[tokio::test]
async fn test_local_edit_after_echo_still_sends() {
    let fake = default_fake();
    let session = started(&fake).await;

    session.set_parameter(ATTACK, 5).await.unwrap();
    fake.push(InboundEvent::ParamEcho {
        address: ATTACK.into(),
        value: 7,
    });
    eventually(|| session.parameter(ATTACK).is_some_and(|p| p.value == 7)).await;

    assert_eq!(session.set_parameter(ATTACK, 5).await.unwrap(), SendOutcome::Sent);
    assert_eq!(
        fake.sent(),
        vec![ParameterValue::new(ATTACK, 5), ParameterValue::new(ATTACK, 5)]
    );
}

#[tokio::test]
async fn test_parameter_subscribers_see_edits_and_echoes() {
    let fake = default_fake();
    let session = started(&fake).await;
    let mut table = session.parameters();
    table.borrow_and_update();

    session.set_parameter(ATTACK, 12).await.unwrap();
    assert!(table.has_changed().unwrap());
    let snapshot = table.borrow_and_update().clone();
    assert_eq!(snapshot.iter().find(|p| p.address == ATTACK).unwrap().value, 12);

    fake.push(InboundEvent::ParamEcho {
        address: LEVEL.into(),
        value: 90,
    });
    tokio::time::timeout(Duration::from_secs(2), table.changed())
        .await
        .unwrap()
        .unwrap();
    let snapshot = table.borrow_and_update().clone();
    assert_eq!(snapshot.iter().find(|p| p.address == LEVEL).unwrap().value, 90);
    assert_eq!(snapshot.len(), 2);
}

// ── Refresh ─────────────────────────────────────────────────────────

#[tokio::test]
async fn test_refresh_progress_and_completion() {
    let fake = default_fake();
    fake.hold_refresh.store(true, Ordering::SeqCst);
    let session = started(&fake).await;
    let progress = session.progress();

    session.start_refresh().await.unwrap();
    assert!(*session.refresh_visible().borrow());
    assert_eq!(*progress.borrow(), 0.0);

    fake.push(InboundEvent::Progress { percent: 45.0 });
    eventually(|| *progress.borrow() == 0.45).await;
    fake.push(InboundEvent::Progress { percent: 30.0 });
    eventually(|| *progress.borrow() == 0.30).await;
    assert_eq!(
        *session.refresh_state().borrow(),
        RefreshState::InProgress { progress: 0.30 }
    );

    *fake.params.lock().unwrap() = vec![
        ParameterValue::new(ATTACK, 99),
        ParameterValue::new(LEVEL, 1),
        ParameterValue::new("synth/lfo/rate", 20),
    ];
    fake.refresh_gate.notify_one();

    eventually(|| session.last_refresh().is_some()).await;
    let report = session.last_refresh().unwrap();
    assert_eq!(report.outcome, RefreshOutcome::Completed { parameters: 3 });
    assert!(!*session.refresh_visible().borrow());
    assert_eq!(*session.refresh_state().borrow(), RefreshState::Idle);
    assert_eq!(session.parameter(ATTACK).unwrap().value, 99);
    assert_eq!(session.parameter("synth/lfo/rate").unwrap().caption, "rate");
}

#[tokio::test]
async fn test_second_refresh_is_busy() {
    let fake = default_fake();
    fake.hold_refresh.store(true, Ordering::SeqCst);
    let session = started(&fake).await;

    session.start_refresh().await.unwrap();
    let err = session.start_refresh().await.unwrap_err();
    assert!(matches!(err, CoreError::Busy));

    settle().await;
    assert_eq!(fake.count(&Call::RequestRefresh), 1);

    fake.refresh_gate.notify_one();
    eventually(|| session.last_refresh().is_some()).await;
}

#[tokio::test]
async fn test_refresh_timeout_returns_to_idle() {
    let fake = default_fake();
    fake.hold_refresh.store(true, Ordering::SeqCst);
    let mut config = config();
    config.refresh_timeout = Duration::from_millis(50);
    let session = Session::new(fake.clone(), config);
    session.start().await.unwrap();

    session.start_refresh().await.unwrap();
    eventually(|| session.last_refresh().is_some()).await;

    let report = session.last_refresh().unwrap();
    assert!(matches!(report.outcome, RefreshOutcome::TimedOut { .. }));
    assert!(!*session.refresh_visible().borrow());
    assert_eq!(*session.refresh_state().borrow(), RefreshState::Idle);

    // Idle again: a new refresh is accepted.
    fake.hold_refresh.store(false, Ordering::SeqCst);
    let report = session.refresh().await.unwrap();
    assert!(report.succeeded());
}

#[tokio::test]
async fn test_refresh_waits_for_report() {
    let fake = default_fake();
    let session = started(&fake).await;

    let report = session.refresh().await.unwrap();

    assert_eq!(report.outcome, RefreshOutcome::Completed { parameters: 2 });
    assert_eq!(fake.count(&Call::RequestRefresh), 1);
    assert!(report.finished_at >= report.started_at);
}

// ── Lifecycle ───────────────────────────────────────────────────────

#[tokio::test]
async fn test_commands_before_start_fail() {
    let fake = default_fake();
    let session = Session::new(fake.clone(), config());

    let err = session.set_parameter(ATTACK, 1).await.unwrap_err();
    assert!(matches!(err, CoreError::SessionClosed));
}

#[tokio::test]
async fn test_shutdown_closes_transport() {
    let fake = default_fake();
    let session = started(&fake).await;
    let state = session.connection_state();
    assert_eq!(*state.borrow(), ConnectionState::Connected);

    session.shutdown().await;

    assert_eq!(*state.borrow(), ConnectionState::Disconnected);
    assert!(matches!(
        session.start_refresh().await,
        Err(CoreError::SessionClosed)
    ));
}

#[tokio::test]
async fn test_oneshot_runs_and_shuts_down() {
    let fake = default_fake();

    let count = Session::oneshot(fake.clone(), config(), |session| async move {
        Ok(session.parameters_snapshot().len())
    })
    .await
    .unwrap();

    assert_eq!(count, 2);
    assert_eq!(
        *fake.connection_state().borrow(),
        ConnectionState::Disconnected
    );
}
