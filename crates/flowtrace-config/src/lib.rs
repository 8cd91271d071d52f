//! Shared configuration for flowtrace tools.
//!
//! Owns the TOML profile layout, figment-based loading (defaults, then the
//! config file, then `FLOWTRACE_*` environment variables), and translation
//! of a profile into the settings a trace run needs.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};

use flowtrace_core::{DestinationPolicy, OverlayRegistry};

// ── Errors ───────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for '{field}': {reason}")]
    Validation { field: String, reason: String },

    #[error("Profile '{name}' is not defined")]
    UnknownProfile { name: String },

    #[error("Failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("Failed to load config: {0}")]
    Figment(Box<figment::Error>),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

// ── TOML config structs ──────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Config {
    /// Profile used when `--profile` is not given.
    pub default_profile: Option<String>,

    #[serde(default)]
    pub defaults: Defaults,

    /// Named snapshot profiles.
    #[serde(default)]
    pub profiles: HashMap<String, Profile>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_profile: Some("default".into()),
            defaults: Defaults::default(),
            profiles: HashMap::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Defaults {
    #[serde(default = "default_output")]
    pub output: String,

    #[serde(default = "default_color")]
    pub color: String,

    /// Per-trace timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout: u64,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            output: default_output(),
            color: default_color(),
            timeout: default_timeout(),
        }
    }
}

fn default_output() -> String {
    "table".into()
}
fn default_color() -> String {
    "auto".into()
}
fn default_timeout() -> u64 {
    30
}

/// A network snapshot plus how to interpret it.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Profile {
    /// Snapshot file (`.json`, `.yaml`/`.yml` or `.toml`).
    pub snapshot: PathBuf,

    /// Where the required destination of a packet trace comes from.
    #[serde(default)]
    pub destination: DestinationPolicy,

    /// Driver id to overlay family (`ofdpa`, `ofdpa-ovs`, `generic`),
    /// applied on top of the built-in driver mappings.
    #[serde(default)]
    pub overlays: BTreeMap<String, String>,

    /// Override of `defaults.timeout`.
    pub timeout: Option<u64>,
}

impl Profile {
    pub fn new(snapshot: impl Into<PathBuf>) -> Self {
        Self {
            snapshot: snapshot.into(),
            destination: DestinationPolicy::default(),
            overlays: BTreeMap::new(),
            timeout: None,
        }
    }
}

/// Everything a trace run needs, resolved from a profile.
#[derive(Debug, Clone)]
pub struct TraceSettings {
    pub snapshot: PathBuf,
    pub overlays: OverlayRegistry,
    pub destination: DestinationPolicy,
    pub timeout: Duration,
}

// ── Config file path ─────────────────────────────────────────────────

/// Platform config file location (XDG on Linux).
pub fn config_path() -> PathBuf {
    ProjectDirs::from("com", "flowtrace", "flowtrace").map_or_else(
        || {
            let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
            p.push(".config");
            p.push("flowtrace");
            p.push("config.toml");
            p
        },
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

// ── Config loading ───────────────────────────────────────────────────

/// Load from the platform config file and the environment.
pub fn load_config() -> Result<Config, ConfigError> {
    load_config_from(&config_path())
}

/// Load from `path` and the environment. A missing file yields defaults.
pub fn load_config_from(path: &Path) -> Result<Config, ConfigError> {
    let config: Config = Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed("FLOWTRACE_").split("_"))
        .extract()?;
    Ok(config)
}

/// Write the config as pretty TOML, creating parent directories.
pub fn save_config(config: &Config) -> Result<(), ConfigError> {
    save_config_to(config, &config_path())
}

pub fn save_config_to(config: &Config, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let rendered = toml::to_string_pretty(config)?;
    std::fs::write(path, rendered)?;
    Ok(())
}

// ── Profile resolution ───────────────────────────────────────────────

impl Config {
    /// `requested`, else `default_profile`, else `"default"`.
    pub fn active_profile_name(&self, requested: Option<&str>) -> String {
        requested
            .map(str::to_owned)
            .or_else(|| self.default_profile.clone())
            .unwrap_or_else(|| "default".into())
    }

    pub fn profile(&self, name: &str) -> Result<&Profile, ConfigError> {
        self.profiles
            .get(name)
            .ok_or_else(|| ConfigError::UnknownProfile { name: name.into() })
    }
}

/// Translate a profile into trace settings.
///
/// Overlay names are validated here so a typo in the config file fails
/// before any snapshot is loaded.
pub fn profile_to_trace_settings(
    profile: &Profile,
    profile_name: &str,
    defaults: &Defaults,
) -> Result<TraceSettings, ConfigError> {
    let mut overlays = OverlayRegistry::with_builtin();
    for (driver, kind) in &profile.overlays {
        overlays
            .assign(driver, kind)
            .map_err(|e| ConfigError::Validation {
                field: format!("profiles.{profile_name}.overlays.{driver}"),
                reason: e.to_string(),
            })?;
    }

    let secs = profile.timeout.unwrap_or(defaults.timeout);
    if secs == 0 {
        return Err(ConfigError::Validation {
            field: format!("profiles.{profile_name}.timeout"),
            reason: "must be at least one second".into(),
        });
    }

    Ok(TraceSettings {
        snapshot: profile.snapshot.clone(),
        overlays,
        destination: profile.destination,
        timeout: Duration::from_secs(secs),
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn write(dir: &tempfile::TempDir, body: &str) -> PathBuf {
        let path = dir.path().join("config.toml");
        std::fs::write(&path, body).unwrap();
        path
    }

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_config_from(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.default_profile.as_deref(), Some("default"));
        assert_eq!(config.defaults.timeout, 30);
        assert!(config.profiles.is_empty());
    }

    #[test]
    fn parses_profiles() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            &dir,
            r#"
default_profile = "lab"

[defaults]
output = "json"

[profiles.lab]
snapshot = "/srv/lab.yaml"
destination = "any-host"
timeout = 5

[profiles.lab.overlays]
"acme-asic" = "ofdpa"
"#,
        );
        let config = load_config_from(&path).unwrap();
        assert_eq!(config.active_profile_name(None), "lab");
        assert_eq!(config.defaults.output, "json");
        assert_eq!(config.defaults.color, "auto");

        let lab = config.profile("lab").unwrap();
        assert_eq!(lab.destination, DestinationPolicy::AnyHost);
        assert_eq!(lab.overlays["acme-asic"], "ofdpa");

        let settings = profile_to_trace_settings(lab, "lab", &config.defaults).unwrap();
        assert_eq!(settings.timeout, Duration::from_secs(5));
        assert_eq!(settings.overlays.get("acme-asic").unwrap().name(), "ofdpa");
        assert_eq!(settings.overlays.get("ofdpa3").unwrap().name(), "ofdpa");
    }

    #[test]
    fn generic_overlay_removes_builtin_mapping() {
        let mut profile = Profile::new("net.json");
        profile.overlays.insert("ofdpa3".into(), "generic".into());
        let settings = profile_to_trace_settings(&profile, "p", &Defaults::default()).unwrap();
        assert!(settings.overlays.get("ofdpa3").is_none());
        assert_eq!(settings.timeout, Duration::from_secs(30));
    }

    #[test]
    fn rejects_unknown_overlay_kind() {
        let mut profile = Profile::new("net.json");
        profile.overlays.insert("x".into(), "tofino".into());
        let err = profile_to_trace_settings(&profile, "p", &Defaults::default()).unwrap_err();
        assert!(
            matches!(err, ConfigError::Validation { ref field, .. } if field == "profiles.p.overlays.x")
        );
    }

    #[test]
    fn rejects_zero_timeout() {
        let mut profile = Profile::new("net.json");
        profile.timeout = Some(0);
        assert!(profile_to_trace_settings(&profile, "p", &Defaults::default()).is_err());
    }

    #[test]
    fn unknown_profile_is_an_error() {
        let config = Config::default();
        assert_eq!(config.active_profile_name(Some("x")), "x");
        assert!(matches!(
            config.profile("x"),
            Err(ConfigError::UnknownProfile { .. })
        ));
    }

    #[test]
    fn save_then_load_keeps_profiles() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        let mut config = Config::default();
        config
            .profiles
            .insert("default".into(), Profile::new("/tmp/net.json"));
        save_config_to(&config, &path).unwrap();
        assert_eq!(load_config_from(&path).unwrap(), config);
    }
}
