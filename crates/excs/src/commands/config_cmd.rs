//! Config command handlers.

use std::fmt::Write;

use crate::cli::{ConfigCommand, GlobalOpts, OutputFormat};
use crate::config::{self, Config, Profile};
use crate::error::CliError;
use crate::output;

fn format_config(cfg: &Config) -> String {
    let mut out = String::new();

    if let Some(ref default) = cfg.default_profile {
        let _ = writeln!(out, "default_profile = \"{default}\"");
    }
    let _ = writeln!(out);
    let _ = writeln!(out, "[defaults]");
    let _ = writeln!(out, "output = \"{}\"", cfg.defaults.output);
    let _ = writeln!(out, "timeout = {}", cfg.defaults.timeout);

    for (name, p) in &cfg.profiles {
        let _ = writeln!(out);
        let _ = writeln!(out, "[profiles.{name}]");
        let _ = writeln!(out, "host = \"{}\"", p.host);
        let _ = writeln!(out, "port = {}", p.port);
        let optional = [
            ("connection_timeout", p.connection_timeout),
            ("response_timeout", p.response_timeout),
            ("heartbeat_interval", p.heartbeat_interval),
            ("heartbeat_timeout", p.heartbeat_timeout),
            ("max_backoff", p.max_backoff),
            ("settle_ms", p.settle_ms),
        ];
        for (key, value) in optional {
            if let Some(value) = value {
                let _ = writeln!(out, "{key} = {value}");
            }
        }
    }

    out.trim_end().to_owned()
}

pub fn handle(cmd: ConfigCommand, global: &GlobalOpts) -> Result<(), CliError> {
    match cmd {
        ConfigCommand::Path => {
            output::print_output(&config::config_path().display().to_string(), global.quiet);
            Ok(())
        }

        ConfigCommand::Show => {
            let cfg = config::load_config_or_default();
            let out = output::render_single(global.output, &cfg, format_config, |_| "config".into())?;
            output::print_output(&out, global.quiet);
            Ok(())
        }

        ConfigCommand::Profiles => {
            let cfg = config::load_config()?;
            let active = config::active_profile_name(global, &cfg);
            let names: Vec<String> = cfg
                .profiles
                .keys()
                .map(|name| {
                    if *name == active && global.output == OutputFormat::Table {
                        format!("{name} *")
                    } else {
                        name.clone()
                    }
                })
                .collect();
            let out = match global.output {
                OutputFormat::Table | OutputFormat::Plain => names.join("\n"),
                _ => output::render_single(global.output, &names, |n| n.join("\n"), |n| n.join("\n"))?,
            };
            output::print_output(&out, global.quiet);
            Ok(())
        }

        ConfigCommand::Add { name, default } => {
            let Some(host) = global.host.clone() else {
                return Err(CliError::Validation {
                    field: "host".into(),
                    reason: "pass --host <address> for the new profile".into(),
                });
            };
            let mut cfg = config::load_config()?;
            let mut profile = Profile::new(host);
            if let Some(port) = global.port {
                profile.port = port;
            }
            profile.response_timeout = global.timeout;
            // Reject what the station config would refuse later.
            excs_config::profile_to_station_config(&profile, &cfg.defaults)?;

            let replaced = cfg.profiles.insert(name.clone(), profile).is_some();
            if default || cfg.default_profile.is_none() {
                cfg.default_profile = Some(name.clone());
            }
            config::save_config(&cfg)?;
            let verb = if replaced { "Updated" } else { "Added" };
            output::notice(&format!("{verb} profile '{name}'"), global.quiet);
            Ok(())
        }

        ConfigCommand::Use { name } => {
            let mut cfg = config::load_config()?;
            if !cfg.profiles.contains_key(&name) {
                return Err(CliError::ProfileNotFound {
                    available: config::available_profiles(&cfg),
                    name,
                });
            }
            cfg.default_profile = Some(name.clone());
            config::save_config(&cfg)?;
            output::notice(&format!("Default profile set to '{name}'"), global.quiet);
            Ok(())
        }
    }
}
