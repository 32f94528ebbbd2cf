//! Device command handlers.

use serde::Serialize;
use tabled::Tabled;

use synthlink_core::{Direction, LiveSession};

use crate::cli::{GlobalOpts, SelectArgs, SelectCommand};
use crate::error::CliError;
use crate::output;

// ── Table row ───────────────────────────────────────────────────────

#[derive(Tabled)]
struct DeviceRow {
    #[tabled(rename = "Direction")]
    direction: String,
    #[tabled(rename = "Name")]
    name: String,
}

/// The controller's own selection is not observable, so no marker.
#[derive(Serialize)]
struct DeviceEntry {
    name: String,
    direction: Direction,
}

impl DeviceEntry {
    fn row(&self) -> DeviceRow {
        DeviceRow {
            direction: self.direction.to_string(),
            name: self.name.clone(),
        }
    }
}

// ── Handlers ────────────────────────────────────────────────────────

pub fn list(session: &LiveSession, global: &GlobalOpts) -> Result<(), CliError> {
    let lists = session.devices_snapshot();

    let entries: Vec<DeviceEntry> = [Direction::Input, Direction::Output]
        .into_iter()
        .flat_map(|direction| {
            lists.list(direction).iter().map(move |device| DeviceEntry {
                name: device.name.clone(),
                direction,
            })
        })
        .collect();

    let out = output::render_list(
        &global.output,
        &entries,
        DeviceEntry::row,
        |e| format!("{}\t{}", e.direction, e.name),
    );
    output::print_output(&out, global.quiet);
    Ok(())
}

pub async fn select(session: &LiveSession, args: SelectArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let (direction, name) = match args.command {
        SelectCommand::Input { name } => (Direction::Input, name),
        SelectCommand::Output { name } => (Direction::Output, name),
    };

    // The session starts with no selection, so this is always a change.
    session.select_device(direction, &name).await?;
    if !global.quiet {
        eprintln!("Selected {direction} device {name}");
    }
    Ok(())
}
