//! Config subcommand handlers.

use std::path::Path;

use flowtrace_config::{Config, Profile};
use flowtrace_core::{DestinationPolicy, OverlayKind};

use crate::cli::{ConfigArgs, ConfigCommand, GlobalOpts};
use crate::error::CliError;
use crate::output::{self, Presentation};

// ── Helpers ─────────────────────────────────────────────────────────

fn available_profiles(cfg: &Config) -> String {
    let mut names: Vec<&str> = cfg.profiles.keys().map(String::as_str).collect();
    if names.is_empty() {
        return "(none)".into();
    }
    names.sort_unstable();
    names.join(", ")
}

/// Absolute snapshot paths keep profiles usable from any directory.
fn absolute(path: &Path) -> Result<std::path::PathBuf, CliError> {
    if path.is_absolute() {
        Ok(path.to_path_buf())
    } else {
        Ok(std::env::current_dir()?.join(path))
    }
}

/// Apply `key = value` to a profile.
fn set_key(profile: &mut Profile, key: &str, value: &str) -> Result<(), CliError> {
    match key {
        "snapshot" => profile.snapshot = absolute(Path::new(value))?,
        "destination" => {
            profile.destination = value.parse::<DestinationPolicy>().map_err(|_| {
                CliError::validation("destination", "must be 'derive' or 'any-host'")
            })?;
        }
        "timeout" => {
            let secs: u64 = value
                .parse()
                .map_err(|_| CliError::validation("timeout", "must be a number (seconds)"))?;
            profile.timeout = Some(secs);
        }
        other => {
            let Some(driver) = other.strip_prefix("overlays.").filter(|d| !d.is_empty()) else {
                return Err(CliError::validation(
                    other,
                    format!(
                        "unknown config key '{other}'. Valid keys: snapshot, destination, \
                         timeout, overlays.<driver>"
                    ),
                ));
            };
            value.parse::<OverlayKind>().map_err(|_| {
                CliError::validation(other, "must be 'ofdpa', 'ofdpa-ovs' or 'generic'")
            })?;
            profile.overlays.insert(driver.to_owned(), value.to_owned());
        }
    }
    Ok(())
}

// ── Handler ─────────────────────────────────────────────────────────

pub fn handle(
    args: ConfigArgs,
    global: &GlobalOpts,
    mut cfg: Config,
    out: Presentation,
) -> Result<(), CliError> {
    match args.command {
        ConfigCommand::Init {
            snapshot,
            name,
            force,
        } => {
            if cfg.profiles.contains_key(&name) && !force {
                return Err(CliError::validation(
                    "name",
                    format!("profile '{name}' already exists (use --force to replace it)"),
                ));
            }
            let snapshot = absolute(&snapshot)?;
            if !snapshot.is_file() {
                eprintln!("warning: {} does not exist yet", snapshot.display());
            }
            cfg.profiles.insert(name.clone(), Profile::new(snapshot));
            if cfg.default_profile.is_none() || cfg.profiles.len() == 1 {
                cfg.default_profile = Some(name.clone());
            }
            flowtrace_config::save_config(&cfg)?;
            if !out.quiet {
                eprintln!(
                    "✓ Profile '{name}' written to {}",
                    flowtrace_config::config_path().display()
                );
            }
            Ok(())
        }

        ConfigCommand::Show => {
            let rendered = output::render_single(
                out.format,
                &cfg,
                |c| toml::to_string_pretty(c).unwrap_or_else(|e| format!("# {e}")),
                |c| c.active_profile_name(global.profile.as_deref()),
            )?;
            output::print_output(&rendered, out.quiet);
            Ok(())
        }

        ConfigCommand::Path => {
            output::print_output(
                &flowtrace_config::config_path().display().to_string(),
                out.quiet,
            );
            Ok(())
        }

        ConfigCommand::Set { key, value } => {
            let profile_name = cfg.active_profile_name(global.profile.as_deref());
            // Only `snapshot` may create the profile.
            if key != "snapshot" && !cfg.profiles.contains_key(&profile_name) {
                return Err(CliError::ProfileNotFound {
                    available: available_profiles(&cfg),
                    name: profile_name,
                });
            }
            let profile = cfg
                .profiles
                .entry(profile_name.clone())
                .or_insert_with(|| Profile::new(&value));
            set_key(profile, &key, &value)?;
            flowtrace_config::save_config(&cfg)?;
            if !out.quiet {
                eprintln!("✓ Set {key} on profile '{profile_name}'");
            }
            Ok(())
        }

        ConfigCommand::Profiles => {
            let default = cfg.default_profile.as_deref().unwrap_or("default");
            if cfg.profiles.is_empty() {
                eprintln!("No profiles configured. Run: flowtrace config init <SNAPSHOT>");
                return Ok(());
            }
            let mut names: Vec<&String> = cfg.profiles.keys().collect();
            names.sort();
            let listing: Vec<String> = names
                .into_iter()
                .map(|name| {
                    if name == default {
                        format!("{name} *")
                    } else {
                        name.clone()
                    }
                })
                .collect();
            output::print_output(&listing.join("\n"), out.quiet);
            Ok(())
        }

        ConfigCommand::Use { name } => {
            if !cfg.profiles.contains_key(&name) {
                return Err(CliError::ProfileNotFound {
                    available: available_profiles(&cfg),
                    name,
                });
            }
            cfg.default_profile = Some(name.clone());
            flowtrace_config::save_config(&cfg)?;
            if !out.quiet {
                eprintln!("✓ Default profile set to '{name}'");
            }
            Ok(())
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn set_key_updates_profile_fields() {
        let mut profile = Profile::new("/net.json");
        set_key(&mut profile, "destination", "any-host").unwrap();
        set_key(&mut profile, "timeout", "12").unwrap();
        set_key(&mut profile, "overlays.acme", "ofdpa-ovs").unwrap();
        assert_eq!(profile.destination, DestinationPolicy::AnyHost);
        assert_eq!(profile.timeout, Some(12));
        assert_eq!(profile.overlays["acme"], "ofdpa-ovs");
    }

    #[test]
    fn set_key_rejects_bad_values() {
        let mut profile = Profile::new("/net.json");
        assert!(set_key(&mut profile, "timeout", "soon").is_err());
        assert!(set_key(&mut profile, "overlays.acme", "tofino").is_err());
        assert!(set_key(&mut profile, "overlays.", "ofdpa").is_err());
        assert!(set_key(&mut profile, "colour", "red").is_err());
    }
}
