//! Command dispatch: bridges CLI args -> session calls -> output formatting.

pub mod config_cmd;
pub mod devices;
pub mod params;
pub mod refresh;
pub mod watch;

use synthlink_core::LiveSession;

use crate::cli::{Command, GlobalOpts};
use crate::error::CliError;

/// Dispatch a controller-bound command to the appropriate handler.
pub async fn dispatch(cmd: Command, session: &LiveSession, global: &GlobalOpts) -> Result<(), CliError> {
    match cmd {
        Command::Devices => devices::list(session, global),
        Command::Select(args) => devices::select(session, args, global).await,
        Command::Params(args) => params::list(session, &args, global),
        Command::Get { address } => params::get(session, &address, global),
        Command::Set { address, value } => params::set(session, &address, value, global).await,
        Command::Refresh(args) => refresh::handle(session, &args, global).await,
        Command::Watch(args) => watch::handle(session, &args, global).await,
        // Config and Completions are handled before a session exists
        Command::Config(_) | Command::Completions(_) => Ok(()),
    }
}
