//! Bulk refresh with a progress bar.

use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;

use synthlink_core::{LiveSession, RefreshOutcome, RefreshReport};

use crate::cli::{GlobalOpts, RefreshArgs};
use crate::error::CliError;
use crate::output;

const BAR_TEMPLATE: &str = "{spinner:.cyan} {msg} [{bar:40.cyan/blue}] {pos:>3}%";

pub async fn handle(session: &LiveSession, args: &RefreshArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let bar = (!args.no_progress && !global.quiet).then(progress_bar);
    let mut progress = session.progress();

    let refresh = session.refresh();
    tokio::pin!(refresh);

    let report = loop {
        tokio::select! {
            result = &mut refresh => break result,
            Ok(()) = progress.changed() => {
                let fraction = *progress.borrow_and_update();
                if let Some(ref bar) = bar {
                    bar.set_position(percent(fraction));
                }
            }
        }
    };

    if let Some(bar) = bar {
        bar.finish_and_clear();
    }
    let report = report?;

    match report.outcome {
        RefreshOutcome::Completed { .. } => {
            let out = output::render_single(&global.output, &ReportView::from(&report), summary, |r| {
                r.parameters.to_string()
            });
            output::print_output(&out, global.quiet);
            Ok(())
        }
        RefreshOutcome::TimedOut { timeout_secs } => Err(CliError::Timeout {
            seconds: timeout_secs,
        }),
        RefreshOutcome::Failed { reason } => Err(CliError::ApiError {
            code: "refresh_failed".into(),
            message: reason,
        }),
    }
}

fn progress_bar() -> ProgressBar {
    let bar = ProgressBar::new(100);
    let style = ProgressStyle::with_template(BAR_TEMPLATE)
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("=> ");
    bar.set_style(style);
    bar.set_message("Refreshing");
    bar.enable_steady_tick(Duration::from_millis(120));
    bar
}

fn percent(fraction: f32) -> u64 {
    let scaled = (fraction.clamp(0.0, 1.0) * 100.0).round();
    #[allow(clippy::as_conversions, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    {
        scaled as u64
    }
}

// ── Summary ─────────────────────────────────────────────────────────

#[derive(Serialize)]
struct ReportView {
    parameters: usize,
    started_at: String,
    finished_at: String,
    elapsed_ms: i64,
}

impl From<&RefreshReport> for ReportView {
    fn from(report: &RefreshReport) -> Self {
        let parameters = match report.outcome {
            RefreshOutcome::Completed { parameters } => parameters,
            _ => 0,
        };
        Self {
            parameters,
            started_at: report.started_at.to_rfc3339(),
            finished_at: report.finished_at.to_rfc3339(),
            elapsed_ms: report.elapsed().num_milliseconds(),
        }
    }
}

fn summary(view: &ReportView) -> String {
    format!(
        "Refreshed {} parameters in {:.1}s",
        view.parameters,
        Duration::from_millis(view.elapsed_ms.unsigned_abs()).as_secs_f64()
    )
}
