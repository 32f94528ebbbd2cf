// ── Session state store ──
//
// Canonical in-memory parameter table, device lists, selection and
// refresh indicator state. Mutated only by the session actor; every
// mutation republishes the affected snapshot through a `watch` channel.
// Mutators never fail: callers validate addresses and devices first.

mod table;

use std::sync::Arc;

use synthlink_api::ParameterValue;
use tokio::sync::watch;
use tracing::debug;

use crate::model::{Device, DeviceLists, Direction, Parameter, ParameterChange, SelectionState};

use self::table::ParameterTable;

/// Single source of truth for the editor surface.
pub struct ParameterStore {
    parameters: ParameterTable,
    devices: watch::Sender<Arc<DeviceLists>>,
    selection: watch::Sender<SelectionState>,
    progress: watch::Sender<f32>,
    refresh_visible: watch::Sender<bool>,
}

/// Read-only handles onto a [`ParameterStore`].
#[derive(Clone)]
pub struct StoreReaders {
    pub parameters: watch::Receiver<Arc<Vec<Arc<Parameter>>>>,
    pub devices: watch::Receiver<Arc<DeviceLists>>,
    pub selection: watch::Receiver<SelectionState>,
    pub progress: watch::Receiver<f32>,
    pub refresh_visible: watch::Receiver<bool>,
}

impl ParameterStore {
    pub fn new() -> Self {
        let (devices, _) = watch::channel(Arc::new(DeviceLists::default()));
        let (selection, _) = watch::channel(SelectionState::default());
        let (progress, _) = watch::channel(0.0);
        let (refresh_visible, _) = watch::channel(false);

        Self {
            parameters: ParameterTable::new(),
            devices,
            selection,
            progress,
            refresh_visible,
        }
    }

    pub fn readers(&self) -> StoreReaders {
        StoreReaders {
            parameters: self.parameters.subscribe(),
            devices: self.devices.subscribe(),
            selection: self.selection.subscribe(),
            progress: self.progress.subscribe(),
            refresh_visible: self.refresh_visible.subscribe(),
        }
    }

    // ── Parameters ───────────────────────────────────────────────────

    /// Replace the parameter table, deriving captions and clamping values.
    pub fn set_parameters(&mut self, values: Vec<ParameterValue>) {
        self.parameters
            .replace(values.into_iter().map(|p| Parameter::new(p.address, p.value)));
        debug!(count = self.parameters.len(), "parameter table replaced");
    }

    /// Mutate a single parameter.
    ///
    /// Returns the change when the value actually moved; `None` when it
    /// already held `value` or the address is not in the table.
    pub fn set_value(&mut self, address: &str, value: u8) -> Option<ParameterChange> {
        let Some(old) = self.parameters.update_value(address, value) else {
            debug!(address, "value for unknown parameter ignored");
            return None;
        };

        (old != value).then(|| ParameterChange {
            address: address.to_owned(),
            old,
            new: value,
        })
    }

    pub fn get(&self, address: &str) -> Option<&Arc<Parameter>> {
        self.parameters.get(address)
    }

    pub fn parameter_count(&self) -> usize {
        self.parameters.len()
    }

    // ── Devices ──────────────────────────────────────────────────────

    /// Replace the device lists. A selection whose device vanished is
    /// cleared; returns the directions that were cleared.
    pub fn set_devices(&mut self, lists: DeviceLists) -> Vec<Direction> {
        let mut cleared = Vec::new();
        self.selection.send_if_modified(|selection| {
            for direction in [Direction::Input, Direction::Output] {
                let slot = selection.slot_mut(direction);
                if slot.as_ref().is_some_and(|d| !lists.contains(d)) {
                    debug!(%direction, "selected device vanished, clearing selection");
                    *slot = None;
                    cleared.push(direction);
                }
            }
            !cleared.is_empty()
        });

        self.devices.send_replace(Arc::new(lists));
        cleared
    }

    pub fn devices(&self) -> Arc<DeviceLists> {
        self.devices.borrow().clone()
    }

    // ── Selection ────────────────────────────────────────────────────

    pub fn set_selected_input(&mut self, device: Option<Device>) -> bool {
        self.set_selected(Direction::Input, device)
    }

    pub fn set_selected_output(&mut self, device: Option<Device>) -> bool {
        self.set_selected(Direction::Output, device)
    }

    /// Set one side of the selection. Returns `true` if it changed.
    ///
    /// The caller passes a device taken from the current list for
    /// `direction`.
    pub fn set_selected(&mut self, direction: Direction, device: Option<Device>) -> bool {
        self.selection.send_if_modified(|selection| {
            let slot = selection.slot_mut(direction);
            if *slot == device {
                false
            } else {
                *slot = device;
                true
            }
        })
    }

    pub fn selection(&self) -> SelectionState {
        self.selection.borrow().clone()
    }

    // ── Refresh indicator ────────────────────────────────────────────

    /// Store refresh progress as a fraction: `clamp(percent, 0, 100) / 100`.
    #[allow(clippy::cast_possible_truncation)]
    pub fn set_progress(&mut self, percent: f64) {
        let fraction = (percent.clamp(0.0, 100.0) / 100.0) as f32;
        self.progress.send_replace(fraction);
    }

    pub fn progress(&self) -> f32 {
        *self.progress.borrow()
    }

    pub fn set_refresh_visible(&mut self, visible: bool) {
        self.refresh_visible.send_if_modified(|v| {
            let changed = *v != visible;
            *v = visible;
            changed
        });
    }

    pub fn refresh_visible(&self) -> bool {
        *self.refresh_visible.borrow()
    }
}

impl Default for ParameterStore {
    fn default() -> Self {
        Self::new()
    }
}
