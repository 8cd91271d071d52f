// ── Core error types ──
//
// Everything about the *simulated* network is allowed to be broken and is
// reported inside a `StaticPacketTrace`, never through these types. What
// lands here is input the engine cannot reason about at all: text that does
// not parse, snapshot files that fail validation, and callers that violate
// the trace contract.

use std::path::PathBuf;

use thiserror::Error;

use crate::model::{ConnectPoint, HostId, PortNumber};

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Parsing ──────────────────────────────────────────────────────
    #[error("Invalid {kind} '{input}': {reason}")]
    Parse {
        kind: &'static str,
        input: String,
        reason: String,
    },

    // ── Snapshot errors ──────────────────────────────────────────────
    #[error("Cannot read snapshot {path}: {reason}")]
    SnapshotLoad { path: PathBuf, reason: String },

    #[error("Unsupported snapshot format '{extension}' (expected json, yaml or toml)")]
    SnapshotFormat { extension: String },

    #[error("Snapshot validation failed: {message}")]
    SnapshotInvalid { message: String },

    // ── Lookup errors ────────────────────────────────────────────────
    #[error("Host not found: {id}")]
    HostNotFound { id: HostId },

    // ── Trace contract violations ────────────────────────────────────
    #[error(transparent)]
    Trace(#[from] TraceError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Hard failures of a single trace call.
///
/// These are programming-contract violations on the caller's side, or the
/// caller giving up. Network-state problems never surface here.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TraceError {
    #[error("Packet IN_PORT {packet_port} contradicts ingress {ingress}")]
    InPortMismatch {
        ingress: ConnectPoint,
        packet_port: PortNumber,
    },

    #[error("Ingress {ingress} is a logical port; only CONTROLLER may inject packets")]
    LogicalIngress { ingress: ConnectPoint },

    #[error("Trace cancelled after {branches} branch evaluations")]
    Cancelled { branches: usize },
}
