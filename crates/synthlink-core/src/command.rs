// ── Command API ──
//
// All session mutations flow through a unified `Command` enum, processed
// in order by the session actor.

use crate::error::CoreError;
use crate::model::{Direction, SelectionState};
use crate::sync::SendOutcome;

/// A command envelope sent through the command channel.
/// Contains the command and a oneshot response channel.
pub(crate) struct CommandEnvelope {
    pub command: Command,
    pub response_tx: tokio::sync::oneshot::Sender<Result<CommandResult, CoreError>>,
}

/// All possible write operations against a session.
#[derive(Debug, Clone)]
pub enum Command {
    /// Local parameter edit, pushed to the controller.
    SetParameter { address: String, value: u8 },
    /// Select a MIDI device by name.
    SelectDevice { direction: Direction, name: String },
    /// Begin a bulk refresh from the hardware.
    StartRefresh,
    /// Re-fetch the device lists.
    ReloadDevices,
}

/// Result of a successfully executed command.
#[derive(Debug, Clone)]
pub enum CommandResult {
    Parameter(SendOutcome),
    /// `true` if the selection changed (and a request was issued).
    Selected(bool),
    RefreshStarted,
    Devices(SelectionState),
}
