//! Run context: resolves the active profile plus CLI overrides, loads the
//! snapshot, and runs traces off the async runtime under a timeout.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use flowtrace_config::{Config, Profile, TraceSettings};
use flowtrace_core::{CoreError, DestinationPolicy, NetworkSnapshot, OverlayRegistry, Tracer};

use crate::cli::GlobalOpts;
use crate::error::CliError;

/// Everything a snapshot-bound command needs.
#[derive(Debug, Clone)]
pub struct RunContext {
    pub snapshot: Arc<NetworkSnapshot>,
    pub overlays: Arc<OverlayRegistry>,
    pub destination: DestinationPolicy,
    pub timeout: Duration,
}

impl RunContext {
    /// Profile (flag > env > `default_profile`), then CLI overrides.
    pub fn build(global: &GlobalOpts, config: &Config) -> Result<Self, CliError> {
        let settings = resolve_settings(global, config)?;
        let snapshot = NetworkSnapshot::load(&settings.snapshot)?;
        debug!(
            snapshot = %settings.snapshot.display(),
            devices = snapshot.device_count(),
            timeout_secs = settings.timeout.as_secs(),
            "run context ready"
        );
        Ok(Self {
            snapshot: Arc::new(snapshot),
            overlays: Arc::new(settings.overlays),
            destination: settings.destination,
            timeout: settings.timeout,
        })
    }

    /// Run `job` on the blocking pool with a fresh tracer.
    ///
    /// When the timeout fires the job's cancellation token is tripped so
    /// the engine stops at its next branch step.
    pub async fn run<T, F>(&self, job: F) -> Result<T, CliError>
    where
        T: Send + 'static,
        F: FnOnce(Tracer<'_, NetworkSnapshot>, &CancellationToken) -> Result<T, CoreError>
            + Send
            + 'static,
    {
        let snapshot = Arc::clone(&self.snapshot);
        let overlays = Arc::clone(&self.overlays);
        let destination = self.destination;
        let cancel = CancellationToken::new();
        let token = cancel.clone();

        let handle = tokio::task::spawn_blocking(move || {
            let tracer = Tracer::new(snapshot.as_ref(), overlays.as_ref()).with_policy(destination);
            job(tracer, &token)
        });

        if let Ok(joined) = tokio::time::timeout(self.timeout, handle).await {
            let result = joined.map_err(|e| CliError::Internal {
                message: format!("trace task failed: {e}"),
            })?;
            Ok(result?)
        } else {
            warn!(timeout_secs = self.timeout.as_secs(), "trace timed out, cancelling");
            cancel.cancel();
            Err(CliError::Timeout {
                seconds: self.timeout.as_secs(),
            })
        }
    }
}

fn resolve_settings(global: &GlobalOpts, config: &Config) -> Result<TraceSettings, CliError> {
    let name = config.active_profile_name(global.profile.as_deref());

    let mut profile = match (config.profile(&name).ok(), &global.snapshot) {
        (Some(profile), Some(snapshot)) => Profile {
            snapshot: snapshot.clone(),
            ..profile.clone()
        },
        (Some(profile), None) => profile.clone(),
        (None, Some(snapshot)) => Profile::new(snapshot.clone()),
        (None, None) if global.profile.is_some() => {
            let mut available: Vec<&str> = config.profiles.keys().map(String::as_str).collect();
            available.sort_unstable();
            return Err(CliError::ProfileNotFound {
                name,
                available: if available.is_empty() {
                    "(none)".into()
                } else {
                    available.join(", ")
                },
            });
        }
        (None, None) => {
            return Err(CliError::NoSnapshot {
                path: flowtrace_config::config_path().display().to_string(),
            });
        }
    };
    if global.timeout.is_some() {
        profile.timeout = global.timeout;
    }

    let mut settings =
        flowtrace_config::profile_to_trace_settings(&profile, &name, &config.defaults)?;
    for entry in &global.overlays {
        let (driver, kind) = entry
            .split_once('=')
            .ok_or_else(|| CliError::validation("overlay", format!("'{entry}' is not DRIVER=KIND")))?;
        settings.overlays.assign(driver.trim(), kind.trim())?;
    }
    Ok(settings)
}
