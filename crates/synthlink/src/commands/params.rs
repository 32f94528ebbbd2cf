//! Parameter command handlers.

use std::sync::Arc;

use tabled::Tabled;

use synthlink_core::{LiveSession, Parameter, SendOutcome};

use crate::cli::{GlobalOpts, ParamsArgs};
use crate::error::CliError;
use crate::output;

#[derive(Tabled)]
struct ParameterRow {
    #[tabled(rename = "Address")]
    address: String,
    #[tabled(rename = "Caption")]
    caption: String,
    #[tabled(rename = "Value")]
    value: u8,
}

impl From<&Arc<Parameter>> for ParameterRow {
    fn from(p: &Arc<Parameter>) -> Self {
        Self {
            address: p.address.clone(),
            caption: p.caption.clone(),
            value: p.value,
        }
    }
}

fn detail(p: &Arc<Parameter>) -> String {
    [
        format!("Address: {}", p.address),
        format!("Caption: {}", p.caption),
        format!("Value:   {}", p.value),
    ]
    .join("\n")
}

// ── Handlers ────────────────────────────────────────────────────────

pub fn list(session: &LiveSession, args: &ParamsArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let snapshot = session.parameters_snapshot();
    let params: Vec<Arc<Parameter>> = snapshot
        .iter()
        .filter(|p| {
            args.prefix
                .as_deref()
                .is_none_or(|prefix| p.address.starts_with(prefix))
        })
        .cloned()
        .collect();

    let out = output::render_list(&global.output, &params, |p| ParameterRow::from(p), |p| {
        format!("{}\t{}", p.address, p.value)
    });
    output::print_output(&out, global.quiet);
    Ok(())
}

pub fn get(session: &LiveSession, address: &str, global: &GlobalOpts) -> Result<(), CliError> {
    let Some(param) = session.parameter(address) else {
        return Err(CliError::NotFound {
            resource_type: "parameter".into(),
            identifier: address.into(),
            list_command: "params".into(),
        });
    };

    let out = output::render_single(&global.output, &param, detail, |p| p.value.to_string());
    output::print_output(&out, global.quiet);
    Ok(())
}

pub async fn set(session: &LiveSession, address: &str, value: u8, global: &GlobalOpts) -> Result<(), CliError> {
    let previous = session.parameter(address).map(|p| p.value);
    let outcome = session.set_parameter(address, value).await?;

    if !global.quiet {
        match (outcome, previous) {
            (SendOutcome::Sent, Some(previous)) => eprintln!("{address}: {previous} -> {value}"),
            (SendOutcome::Sent, None) => eprintln!("{address}: {value}"),
            (SendOutcome::Unchanged, _) => eprintln!("{address} is already {value}"),
            (SendOutcome::Suppressed, _) => eprintln!("{address}: {value} (not sent)"),
        }
    }
    Ok(())
}
