// ── Bulk parameter refresh ──
//
// `Idle -> InProgress -> Idle`. The controller re-reads every parameter
// from the hardware, streaming PROGRESS events while it works; the
// refresh request answers when it is done.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use synthlink_api::{ParameterValue, Transport};
use tokio::sync::watch;
use tracing::{info, warn};

use crate::error::CoreError;
use crate::store::ParameterStore;
use crate::sync::SyncController;

/// Refresh lifecycle. Only one refresh may be in flight.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum RefreshState {
    Idle,
    InProgress {
        /// Latest progress fraction, `0.0..=1.0`.
        progress: f32,
    },
}

impl RefreshState {
    pub fn is_in_progress(self) -> bool {
        matches!(self, Self::InProgress { .. })
    }
}

/// How a refresh ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RefreshOutcome {
    Completed { parameters: usize },
    TimedOut { timeout_secs: u64 },
    Failed { reason: String },
}

/// Summary of the last finished refresh.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RefreshReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    #[serde(flatten)]
    pub outcome: RefreshOutcome,
}

impl RefreshReport {
    pub fn succeeded(&self) -> bool {
        matches!(self.outcome, RefreshOutcome::Completed { .. })
    }

    pub fn elapsed(&self) -> chrono::Duration {
        self.finished_at - self.started_at
    }
}

pub struct RefreshCoordinator {
    state: watch::Sender<RefreshState>,
    last_report: watch::Sender<Option<RefreshReport>>,
    started_at: Option<DateTime<Utc>>,
}

impl RefreshCoordinator {
    pub fn new() -> Self {
        let (state, _) = watch::channel(RefreshState::Idle);
        let (last_report, _) = watch::channel(None);
        Self {
            state,
            last_report,
            started_at: None,
        }
    }

    pub fn state(&self) -> RefreshState {
        *self.state.borrow()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<RefreshState> {
        self.state.subscribe()
    }

    pub fn subscribe_reports(&self) -> watch::Receiver<Option<RefreshReport>> {
        self.last_report.subscribe()
    }

    /// Enter `InProgress`: progress 0, indicator visible.
    ///
    /// The caller issues the refresh request exactly once after this
    /// returns `Ok`.
    pub fn start(&mut self, store: &mut ParameterStore) -> Result<(), CoreError> {
        if self.state().is_in_progress() {
            return Err(CoreError::Busy);
        }

        store.set_progress(0.0);
        store.set_refresh_visible(true);
        self.started_at = Some(Utc::now());
        self.state.send_replace(RefreshState::InProgress { progress: 0.0 });
        info!("parameter refresh started");
        Ok(())
    }

    /// Display progress as received; out-of-order values are shown as-is.
    pub fn on_progress(&mut self, store: &mut ParameterStore, percent: f64) {
        store.set_progress(percent);
        let progress = store.progress();
        self.state.send_if_modified(|state| match state {
            RefreshState::InProgress { progress: p } => {
                *p = progress;
                true
            }
            RefreshState::Idle => false,
        });
    }

    /// Finish the refresh with the refetched table (or the failure).
    pub fn complete(
        &mut self,
        store: &mut ParameterStore,
        sync: &mut SyncController,
        result: Result<Vec<ParameterValue>, CoreError>,
    ) -> RefreshReport {
        let outcome = match result {
            Ok(params) => {
                store.set_parameters(params);
                sync.reset();
                let parameters = store.parameter_count();
                info!(parameters, "parameter refresh completed");
                RefreshOutcome::Completed { parameters }
            }
            Err(CoreError::RefreshTimedOut { timeout_secs }) => {
                warn!(timeout_secs, "parameter refresh timed out");
                RefreshOutcome::TimedOut { timeout_secs }
            }
            Err(e) => {
                warn!(error = %e, "parameter refresh failed");
                RefreshOutcome::Failed {
                    reason: e.to_string(),
                }
            }
        };

        store.set_refresh_visible(false);
        self.state.send_replace(RefreshState::Idle);

        let finished_at = Utc::now();
        let report = RefreshReport {
            started_at: self.started_at.take().unwrap_or(finished_at),
            finished_at,
            outcome,
        };
        self.last_report.send_replace(Some(report.clone()));
        report
    }
}

impl Default for RefreshCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

/// Request the refresh, then refetch the table, bounded by `timeout`.
pub(crate) async fn run_refresh<T: Transport>(
    transport: &T,
    timeout: Duration,
) -> Result<Vec<ParameterValue>, CoreError> {
    let work = async {
        transport.request_refresh().await?;
        transport.fetch_parameters().await
    };

    match tokio::time::timeout(timeout, work).await {
        Ok(result) => result.map_err(CoreError::from),
        Err(_) => Err(CoreError::RefreshTimedOut {
            timeout_secs: timeout.as_secs(),
        }),
    }
}
