//! Local state directory for bringup.
//!
//! This crate owns everything the orchestrator persists on the operator's
//! machine: the `StateLayout` directory structure, one JSON-lines log per Run
//! (`RunLogStore`), the per-Target index of configuration snapshots kept on
//! devices (`SnapshotIndex`), and the lock file paths that keep a second Run
//! away from a Target that is already being configured.

pub mod layout;
pub mod runlog;
pub mod snapshots;

pub use layout::{default_state_dir, StateLayout, STATE_FORMAT_VERSION};
pub use runlog::{RunLogStore, RunLogSummary, RunLogWriter};
pub use snapshots::{SnapshotIndex, SnapshotRecord};

use std::path::Path;
use thiserror::Error;

/// Fsync a directory so a preceding `rename()` survives a crash.
pub(crate) fn fsync_dir(dir: &Path) -> Result<(), std::io::Error> {
    let f = std::fs::File::open(dir)?;
    f.sync_all()
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("run not found: {0}")]
    RunNotFound(String),
    #[error("snapshot not found: {0}")]
    SnapshotNotFound(String),
    #[error("integrity check failed for {path}: expected {expected}, got {actual}")]
    IntegrityFailure {
        path: String,
        expected: String,
        actual: String,
    },
    #[error("state format version mismatch: expected {expected}, found {found}")]
    VersionMismatch { expected: u32, found: u32 },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_error_display_not_found() {
        let e = StoreError::RunNotFound("10.0.0.1-20260101T000000Z".to_owned());
        assert!(e.to_string().contains("10.0.0.1-20260101T000000Z"));
        let e = StoreError::SnapshotNotFound("/root/b.tar.gz".to_owned());
        assert!(e.to_string().starts_with("snapshot not found"));
    }

    #[test]
    fn store_error_display_integrity_failure() {
        let e = StoreError::IntegrityFailure {
            path: "snapshots.json".to_owned(),
            expected: "exp".to_owned(),
            actual: "act".to_owned(),
        };
        let msg = e.to_string();
        assert!(msg.contains("exp"));
        assert!(msg.contains("act"));
    }
}
