// ── MIDI device domain types ──

use serde::Serialize;
use synthlink_api::{DeviceListing, MidiPort};

pub use synthlink_api::PortDirection as Direction;

/// A MIDI port offered by the controller.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Device {
    pub name: String,
    /// Taken from the list the port arrived in, not the wire `type` label.
    pub direction: Direction,
}

impl Device {
    pub fn new(name: impl Into<String>, direction: Direction) -> Self {
        Self {
            name: name.into(),
            direction,
        }
    }

    fn from_port(port: MidiPort, direction: Direction) -> Self {
        if let Some(kind) = port.kind.as_deref() {
            if !kind.eq_ignore_ascii_case(&direction.to_string()) {
                tracing::trace!(
                    name = %port.name,
                    label = kind,
                    %direction,
                    "ignoring mismatched device type label"
                );
            }
        }
        Self::new(port.name, direction)
    }
}

/// Inputs and outputs in controller enumeration order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DeviceLists {
    pub inputs: Vec<Device>,
    pub outputs: Vec<Device>,
}

impl DeviceLists {
    pub fn list(&self, direction: Direction) -> &[Device] {
        match direction {
            Direction::Input => &self.inputs,
            Direction::Output => &self.outputs,
        }
    }

    /// Look up a device by exact name in the given direction.
    pub fn find(&self, direction: Direction, name: &str) -> Option<&Device> {
        self.list(direction).iter().find(|d| d.name == name)
    }

    pub fn contains(&self, device: &Device) -> bool {
        self.list(device.direction).contains(device)
    }
}

impl From<DeviceListing> for DeviceLists {
    fn from(listing: DeviceListing) -> Self {
        Self {
            inputs: listing
                .inputs
                .into_iter()
                .map(|p| Device::from_port(p, Direction::Input))
                .collect(),
            outputs: listing
                .outputs
                .into_iter()
                .map(|p| Device::from_port(p, Direction::Output))
                .collect(),
        }
    }
}

/// Currently selected input and output.
///
/// A selection always references a device in the last-fetched lists.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SelectionState {
    pub input: Option<Device>,
    pub output: Option<Device>,
}

impl SelectionState {
    pub fn get(&self, direction: Direction) -> Option<&Device> {
        match direction {
            Direction::Input => self.input.as_ref(),
            Direction::Output => self.output.as_ref(),
        }
    }

    pub(crate) fn slot_mut(&mut self, direction: Direction) -> &mut Option<Device> {
        match direction {
            Direction::Input => &mut self.input,
            Direction::Output => &mut self.output,
        }
    }
}
