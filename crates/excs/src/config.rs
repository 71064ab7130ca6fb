//! CLI configuration: thin wrapper around `excs_config`.
//!
//! Adds resolution that respects `GlobalOpts` flag overrides
//! (--host, --port, --timeout).

use excs_core::StationConfig;

use crate::cli::GlobalOpts;
use crate::error::CliError;

pub use excs_config::{Config, Profile, config_path, load_config, load_config_or_default, save_config};

/// Resolve the active profile name from CLI flags and config.
pub fn active_profile_name(global: &GlobalOpts, config: &Config) -> String {
    global
        .profile
        .clone()
        .or_else(|| config.default_profile.clone())
        .unwrap_or_else(|| excs_config::DEFAULT_PROFILE.into())
}

/// Build a `StationConfig` from the config file, profile and CLI overrides.
///
/// Flags win over the profile. Without a profile, `--host` alone is
/// enough.
pub fn build_station_config(global: &GlobalOpts) -> Result<StationConfig, CliError> {
    let cfg = load_config()?;
    let profile_name = active_profile_name(global, &cfg);

    let profile = match (cfg.profiles.get(&profile_name), &global.host) {
        (Some(profile), _) => profile.clone(),
        (None, Some(host)) if global.profile.is_none() => Profile::new(host.clone()),
        (None, _) if global.profile.is_some() => {
            return Err(CliError::ProfileNotFound {
                name: profile_name,
                available: available_profiles(&cfg),
            });
        }
        (None, _) => {
            return Err(CliError::NoConfig {
                path: config_path().display().to_string(),
            });
        }
    };

    let profile = apply_overrides(profile, global);
    let station = excs_config::profile_to_station_config(&profile, &cfg.defaults)?;
    tracing::debug!(profile = %profile_name, host = %station.host, port = station.port, "resolved station config");
    Ok(station)
}

fn apply_overrides(mut profile: Profile, global: &GlobalOpts) -> Profile {
    if let Some(ref host) = global.host {
        profile.host.clone_from(host);
    }
    if let Some(port) = global.port {
        profile.port = port;
    }
    if let Some(timeout) = global.timeout {
        profile.response_timeout = Some(timeout);
    }
    profile
}

pub fn available_profiles(cfg: &Config) -> String {
    if cfg.profiles.is_empty() {
        return "(none)".into();
    }
    cfg.profiles.keys().cloned().collect::<Vec<_>>().join(", ")
}
