//! CLI error types with miette diagnostics.
//!
//! Maps core and config errors into user-facing errors with actionable
//! help text and a process exit code per category.

use miette::Diagnostic;
use thiserror::Error;

use flowtrace_config::ConfigError;
use flowtrace_core::{CoreError, TraceError};

pub mod exit_code {
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const SNAPSHOT: i32 = 3;
    pub const NOT_FOUND: i32 = 4;
    pub const TRACE_FAILED: i32 = 5;
    pub const TIMEOUT: i32 = 8;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Snapshot ─────────────────────────────────────────────────────
    #[error("No snapshot to trace against")]
    #[diagnostic(
        code(flowtrace::no_snapshot),
        help(
            "Pass --snapshot <FILE>, or create a profile with: flowtrace config init <FILE>\n\
             Config expected at: {path}"
        )
    )]
    NoSnapshot { path: String },

    #[error("{message}")]
    #[diagnostic(
        code(flowtrace::snapshot),
        help("Snapshots are .json, .yaml/.yml or .toml files with devices, flows, groups, links and hosts.")
    )]
    Snapshot { message: String },

    // ── Lookups ──────────────────────────────────────────────────────
    #[error("{resource_type} '{identifier}' not found")]
    #[diagnostic(
        code(flowtrace::not_found),
        help("Run: flowtrace {list_command} to see available {resource_type}s")
    )]
    NotFound {
        resource_type: String,
        identifier: String,
        list_command: String,
    },

    // ── Tracing ──────────────────────────────────────────────────────
    #[error("{message}")]
    #[diagnostic(code(flowtrace::trace_contract))]
    TraceContract { message: String },

    #[error("{failed} of {total} traces failed")]
    #[diagnostic(code(flowtrace::trace_failed))]
    TraceFailed { failed: usize, total: usize },

    #[error("Trace timed out after {seconds}s")]
    #[diagnostic(
        code(flowtrace::timeout),
        help("Increase the limit with --timeout, or set `timeout` on the profile.")
    )]
    Timeout { seconds: u64 },

    // ── Validation ───────────────────────────────────────────────────
    #[error("Invalid value for {field}: {reason}")]
    #[diagnostic(code(flowtrace::validation))]
    Validation { field: String, reason: String },

    // ── Configuration ────────────────────────────────────────────────
    #[error("Profile '{name}' not found in configuration")]
    #[diagnostic(
        code(flowtrace::profile_not_found),
        help(
            "Available profiles: {available}\n\
             Create one with: flowtrace config init <SNAPSHOT> --name {name}"
        )
    )]
    ProfileNotFound { name: String, available: String },

    #[error(transparent)]
    #[diagnostic(code(flowtrace::config))]
    Config(Box<ConfigError>),

    // ── Output / IO ──────────────────────────────────────────────────
    #[error("Could not render {format} output: {reason}")]
    #[diagnostic(code(flowtrace::render))]
    Render { format: &'static str, reason: String },

    #[error("Internal error: {message}")]
    #[diagnostic(code(flowtrace::internal))]
    Internal { message: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl CliError {
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::NoSnapshot { .. } | Self::Snapshot { .. } => exit_code::SNAPSHOT,
            Self::NotFound { .. } | Self::ProfileNotFound { .. } => exit_code::NOT_FOUND,
            Self::TraceFailed { .. } => exit_code::TRACE_FAILED,
            Self::Timeout { .. } => exit_code::TIMEOUT,
            Self::Validation { .. } | Self::TraceContract { .. } => exit_code::USAGE,
            _ => exit_code::GENERAL,
        }
    }

    pub fn validation(field: &str, reason: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

// ── CoreError → CliError mapping ─────────────────────────────────────

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Parse {
                kind,
                input,
                reason,
            } => Self::Validation {
                field: kind.into(),
                reason: format!("'{input}': {reason}"),
            },

            e @ (CoreError::SnapshotLoad { .. }
            | CoreError::SnapshotFormat { .. }
            | CoreError::SnapshotInvalid { .. }) => Self::Snapshot {
                message: e.to_string(),
            },

            CoreError::HostNotFound { id } => Self::NotFound {
                resource_type: "host".into(),
                identifier: id.to_string(),
                list_command: "hosts".into(),
            },

            CoreError::Trace(e) => e.into(),

            CoreError::Io(e) => Self::Io(e),
        }
    }
}

impl From<TraceError> for CliError {
    fn from(err: TraceError) -> Self {
        match err {
            TraceError::Cancelled { .. } => Self::Internal {
                message: err.to_string(),
            },
            TraceError::InPortMismatch { .. } | TraceError::LogicalIngress { .. } => {
                Self::TraceContract {
                    message: err.to_string(),
                }
            }
        }
    }
}

// ── ConfigError → CliError mapping ───────────────────────────────────

impl From<ConfigError> for CliError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::Validation { field, reason } => Self::Validation { field, reason },
            ConfigError::UnknownProfile { name } => Self::ProfileNotFound {
                name,
                available: "(see: flowtrace config profiles)".into(),
            },
            other => Self::Config(Box::new(other)),
        }
    }
}
