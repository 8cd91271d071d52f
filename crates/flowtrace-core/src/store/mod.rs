mod catalog;
pub mod snapshot;

pub use snapshot::{NetworkSnapshot, SnapshotDocument, SnapshotFormat};
