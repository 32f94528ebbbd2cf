//! Config subcommand handlers.

use std::io::IsTerminal;

use dialoguer::{Confirm, Input};

use crate::cli::{ConfigArgs, ConfigCommand, GlobalOpts};
use crate::config::{self, Config, Profile};
use crate::error::CliError;
use crate::output;

/// Map a dialoguer / interactive I/O failure into CliError.
fn prompt_err(e: impl std::fmt::Display) -> CliError {
    CliError::Validation {
        field: "interactive".into(),
        reason: format!("prompt failed: {e}"),
    }
}

fn to_toml(cfg: &Config) -> String {
    toml::to_string_pretty(cfg).unwrap_or_else(|e| format!("# could not render config: {e}"))
}

pub fn handle(args: ConfigArgs, global: &GlobalOpts) -> Result<(), CliError> {
    match args.command {
        ConfigCommand::Path => {
            output::print_output(&config::config_path().display().to_string(), global.quiet);
            Ok(())
        }

        ConfigCommand::Show => {
            let cfg = config::load_config_or_default();
            let out = output::render_single(&global.output, &cfg, to_toml, |c| {
                c.profiles.keys().cloned().collect::<Vec<_>>().join("\n")
            });
            output::print_output(&out, global.quiet);
            Ok(())
        }

        ConfigCommand::Init => init(global),
    }
}

fn init(global: &GlobalOpts) -> Result<(), CliError> {
    let path = config::config_path();
    if !std::io::stdin().is_terminal() {
        return Err(CliError::Validation {
            field: "interactive".into(),
            reason: format!("config init needs a terminal; edit {} directly", path.display()),
        });
    }

    eprintln!("synthlink configuration");
    eprintln!("   Config path: {}\n", path.display());

    let mut cfg = config::load_config_or_default();

    let name: String = Input::new()
        .with_prompt("Profile name")
        .default(global.profile.clone().unwrap_or_else(|| "default".into()))
        .interact_text()
        .map_err(prompt_err)?;

    let controller: String = Input::new()
        .with_prompt("Controller URL")
        .default(
            global
                .controller
                .clone()
                .unwrap_or_else(|| "http://localhost:8080".into()),
        )
        .interact_text()
        .map_err(prompt_err)?;

    let mut profile = Profile::new(controller);
    profile.timeout = global.timeout;
    // Fail before writing anything.
    synthlink_config::profile_to_session_config(&profile, &cfg.defaults)?;

    let first = cfg.profiles.is_empty();
    cfg.profiles.insert(name.clone(), profile);

    let make_default = first
        || Confirm::new()
            .with_prompt(format!("Make '{name}' the default profile?"))
            .default(false)
            .interact()
            .map_err(prompt_err)?;
    if make_default {
        cfg.default_profile = Some(name.clone());
    }

    let written = config::save_config(&cfg)?;
    eprintln!("\nSaved profile '{name}' to {}", written.display());
    Ok(())
}
