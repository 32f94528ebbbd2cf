//! CLI configuration: thin wrapper around `synthlink_config`.
//!
//! Adds resolution that respects `GlobalOpts` flag overrides
//! (--controller, --profile, --timeout).

use synthlink_core::SessionConfig;

use crate::cli::GlobalOpts;
use crate::error::CliError;

pub use synthlink_config::{Config, Profile, config_path, load_config_or_default, save_config};

/// Resolve the active profile name from CLI flags and config.
pub fn active_profile_name(global: &GlobalOpts, config: &Config) -> String {
    global
        .profile
        .clone()
        .or_else(|| config.default_profile.clone())
        .unwrap_or_else(|| "default".into())
}

/// Build a `SessionConfig` from the config file, profile and CLI flags.
///
/// Flags win over profile values. With no matching profile, `--controller`
/// alone is enough.
pub fn resolve_session_config(global: &GlobalOpts, config: &Config) -> Result<SessionConfig, CliError> {
    let profile_name = active_profile_name(global, config);

    let mut profile = match (config.profiles.get(&profile_name), global.controller.as_deref()) {
        (Some(profile), _) => profile.clone(),
        (None, Some(controller)) => Profile::new(controller),
        (None, None) if global.profile.is_some() => {
            return Err(CliError::ProfileNotFound {
                name: profile_name,
                available: available_profiles(config),
            });
        }
        (None, None) => {
            return Err(CliError::NoConfig {
                path: config_path().display().to_string(),
            });
        }
    };

    if let Some(ref controller) = global.controller {
        profile.controller.clone_from(controller);
    }
    if global.timeout.is_some() {
        profile.timeout = global.timeout;
    }

    Ok(synthlink_config::profile_to_session_config(&profile, &config.defaults)?)
}

fn available_profiles(config: &Config) -> String {
    if config.profiles.is_empty() {
        "(none)".into()
    } else {
        config.profiles.keys().cloned().collect::<Vec<_>>().join(", ")
    }
}
