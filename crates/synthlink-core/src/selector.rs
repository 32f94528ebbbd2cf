// ── MIDI device selection ──
//
// Startup: populate the lists, default to the first input and output,
// request those defaults explicitly, then attach. Only user-driven
// changes made after attaching produce selection requests.

use synthlink_api::Transport;
use tracing::{debug, info, warn};

use crate::error::CoreError;
use crate::model::{DeviceLists, Direction, SelectionState};
use crate::store::ParameterStore;

/// A selection request to issue against the controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectionRequest {
    pub direction: Direction,
    pub name: String,
}

#[derive(Debug, Default)]
pub struct DeviceSelector {
    attached: bool,
}

impl DeviceSelector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Populate the store and apply the default selection.
    ///
    /// Returns one request per default that was set (none for an empty
    /// list). Nothing is requested implicitly: the caller issues these
    /// before calling [`attach`](Self::attach).
    pub fn populate(&mut self, store: &mut ParameterStore, lists: DeviceLists) -> Vec<SelectionRequest> {
        let first_input = lists.inputs.first().cloned();
        let first_output = lists.outputs.first().cloned();
        self.load(store, lists);

        let mut requests = Vec::new();
        for default in [first_input, first_output].into_iter().flatten() {
            let direction = default.direction;
            let name = default.name.clone();
            if store.set_selected(direction, Some(default)) {
                requests.push(SelectionRequest { direction, name });
            }
        }
        requests
    }

    /// Store the lists without touching the selection.
    pub fn load(&mut self, store: &mut ParameterStore, lists: DeviceLists) {
        info!(
            inputs = lists.inputs.len(),
            outputs = lists.outputs.len(),
            "device lists loaded"
        );
        store.set_devices(lists);
    }

    /// Start treating selection changes as user-driven.
    pub fn attach(&mut self) {
        self.attached = true;
    }

    /// Select a device by name.
    ///
    /// Returns the request to issue, or `None` when the device is
    /// already selected.
    pub fn select(
        &mut self,
        store: &mut ParameterStore,
        direction: Direction,
        name: &str,
    ) -> Result<Option<SelectionRequest>, CoreError> {
        let device = store
            .devices()
            .find(direction, name)
            .cloned()
            .ok_or_else(|| CoreError::DeviceNotFound {
                direction,
                name: name.to_owned(),
            })?;

        if !store.set_selected(direction, Some(device)) {
            debug!(%direction, name, "device already selected");
            return Ok(None);
        }

        if !self.attached {
            return Ok(None);
        }

        Ok(Some(SelectionRequest {
            direction,
            name: name.to_owned(),
        }))
    }

    /// Replace the lists after a re-fetch. Selections whose device
    /// vanished are cleared; nothing is requested.
    pub fn reload(&mut self, store: &mut ParameterStore, lists: DeviceLists) -> SelectionState {
        for direction in store.set_devices(lists) {
            warn!(%direction, "selected device disappeared from the controller");
        }
        store.selection()
    }
}

/// Issue a selection request, retrying up to `retries` extra times.
pub async fn issue_selection<T: Transport>(
    transport: &T,
    request: &SelectionRequest,
    retries: u32,
) -> Result<(), CoreError> {
    let mut attempt = 0;
    loop {
        let result = match request.direction {
            Direction::Input => transport.select_input(&request.name).await,
            Direction::Output => transport.select_output(&request.name).await,
        };

        match result {
            Ok(()) => {
                info!(direction = %request.direction, name = %request.name, "device selected");
                return Ok(());
            }
            Err(e) if attempt < retries => {
                attempt += 1;
                warn!(
                    direction = %request.direction,
                    name = %request.name,
                    error = %e,
                    attempt,
                    "selection request failed, retrying"
                );
            }
            Err(e) => {
                warn!(
                    direction = %request.direction,
                    name = %request.name,
                    error = %e,
                    "selection request failed"
                );
                return Err(e.into());
            }
        }
    }
}
