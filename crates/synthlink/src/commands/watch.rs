//! Live event stream.

use std::future;

use chrono::{Local, SecondsFormat};
use owo_colors::OwoColorize;
use serde::Serialize;
use tokio::sync::broadcast::error::RecvError;

use synthlink_core::{ConnectionState, LiveSession, RefreshReport, SessionEvent};

use crate::cli::{GlobalOpts, OutputFormat, WatchArgs};
use crate::error::CliError;
use crate::output;

#[derive(Debug, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
enum WatchLine {
    Parameter { address: String, value: u8 },
    Progress { percent: f32 },
    RefreshFinished { report: RefreshReport },
    Connection { state: String },
    Lagged { skipped: u64 },
}

impl From<SessionEvent> for WatchLine {
    fn from(event: SessionEvent) -> Self {
        match event {
            SessionEvent::ParameterEchoed { address, value } => Self::Parameter { address, value },
            SessionEvent::Progress { fraction } => Self::Progress {
                percent: fraction * 100.0,
            },
            SessionEvent::RefreshFinished(report) => Self::RefreshFinished { report },
        }
    }
}

pub async fn handle(session: &LiveSession, args: &WatchArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let mut events = session.events();
    let mut connection = session.connection_state();
    let color = output::should_color(&global.color);

    let emit = |line: WatchLine| {
        output::print_output(&format_line(&global.output, &line, color), global.quiet);
    };
    emit(WatchLine::Connection {
        state: describe(*connection.borrow_and_update()),
    });

    let deadline = async {
        match args.duration {
            Some(duration) => tokio::time::sleep(duration).await,
            None => future::pending().await,
        }
    };
    tokio::pin!(deadline);

    loop {
        tokio::select! {
            () = &mut deadline => break,
            _ = tokio::signal::ctrl_c() => break,
            Ok(()) = connection.changed() => {
                let state = *connection.borrow_and_update();
                emit(WatchLine::Connection { state: describe(state) });
            }
            event = events.recv() => match event {
                Ok(event) => emit(event.into()),
                Err(RecvError::Lagged(skipped)) => emit(WatchLine::Lagged { skipped }),
                Err(RecvError::Closed) => break,
            },
        }
    }
    Ok(())
}

fn describe(state: ConnectionState) -> String {
    match state {
        ConnectionState::Disconnected => "disconnected".into(),
        ConnectionState::Connecting => "connecting".into(),
        ConnectionState::Connected => "connected".into(),
        ConnectionState::Reconnecting { attempt } => format!("reconnecting (attempt {attempt})"),
    }
}

/// Structured formats get one compact JSON object per line.
fn format_line(format: &OutputFormat, line: &WatchLine, color: bool) -> String {
    if !matches!(format, OutputFormat::Table | OutputFormat::Plain) {
        return output::render_json(line, true);
    }

    let (label, text) = match line {
        WatchLine::Parameter { address, value } => ("param", format!("{address} = {value}")),
        WatchLine::Progress { percent } => ("progress", format!("{percent:.0}%")),
        WatchLine::RefreshFinished { report } => (
            "refresh",
            format!(
                "{} in {}ms",
                if report.succeeded() { "completed" } else { "failed" },
                report.elapsed().num_milliseconds()
            ),
        ),
        WatchLine::Connection { state } => ("channel", state.clone()),
        WatchLine::Lagged { skipped } => ("lagged", format!("{skipped} events skipped")),
    };

    let time = Local::now().to_rfc3339_opts(SecondsFormat::Millis, false);
    if color {
        format!("{} {:>8} {text}", time.dimmed(), label.cyan())
    } else {
        format!("{time} {label:>8} {text}")
    }
}
