use crate::layout::StateLayout;
use crate::{fsync_dir, StoreError};
use bringup_schema::{RunId, SnapshotId, TargetId};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use tempfile::NamedTempFile;
use tracing::debug;

/// A configuration snapshot that lives on a Target.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SnapshotRecord {
    /// Also the snapshot's path on the Target.
    pub id: SnapshotId,
    pub target: TargetId,
    pub created_at: String,
    /// Run that created it; `None` for manual backups.
    #[serde(default)]
    pub run_id: Option<RunId>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct IndexFile {
    snapshots: Vec<SnapshotRecord>,
    /// blake3 over the serialized `snapshots` array.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    checksum: Option<String>,
}

fn checksum(snapshots: &[SnapshotRecord]) -> Result<String, StoreError> {
    let json = serde_json::to_string(snapshots)?;
    Ok(blake3::hash(json.as_bytes()).to_hex().to_string())
}

/// Local index of the snapshots kept on each Target, so they can be listed,
/// restored by hand, and cleaned up after their Run is gone.
pub struct SnapshotIndex {
    layout: StateLayout,
}

impl SnapshotIndex {
    pub fn new(layout: StateLayout) -> Self {
        Self { layout }
    }

    fn read(&self) -> Result<Vec<SnapshotRecord>, StoreError> {
        let path = self.layout.snapshot_index();
        if !path.exists() {
            return Ok(Vec::new());
        }
        let index: IndexFile = serde_json::from_str(&fs::read_to_string(&path)?)?;
        if let Some(expected) = index.checksum {
            let actual = checksum(&index.snapshots)?;
            if actual != expected {
                return Err(StoreError::IntegrityFailure {
                    path: path.display().to_string(),
                    expected,
                    actual,
                });
            }
        }
        Ok(index.snapshots)
    }

    fn write(&self, snapshots: Vec<SnapshotRecord>) -> Result<(), StoreError> {
        let root = self.layout.root();
        fs::create_dir_all(root)?;
        let index = IndexFile {
            checksum: Some(checksum(&snapshots)?),
            snapshots,
        };
        let content = serde_json::to_string_pretty(&index)?;
        let mut tmp = NamedTempFile::new_in(root)?;
        tmp.write_all(content.as_bytes())?;
        tmp.as_file().sync_all()?;
        tmp.persist(self.layout.snapshot_index())
            .map_err(|e| StoreError::Io(e.error))?;
        fsync_dir(root)?;
        Ok(())
    }

    /// Add or replace (same id) a snapshot record.
    pub fn record(&self, record: SnapshotRecord) -> Result<(), StoreError> {
        let mut snapshots = self.read()?;
        snapshots.retain(|s| s.id != record.id);
        debug!("indexing snapshot {} for {}", record.id, record.target);
        snapshots.push(record);
        self.write(snapshots)
    }

    /// Snapshots, oldest first, optionally for one Target.
    pub fn list(&self, target: Option<&TargetId>) -> Result<Vec<SnapshotRecord>, StoreError> {
        let mut snapshots: Vec<_> = self
            .read()?
            .into_iter()
            .filter(|s| target.map_or(true, |t| &s.target == t))
            .collect();
        snapshots.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(snapshots)
    }

    pub fn get(&self, id: &str) -> Result<SnapshotRecord, StoreError> {
        self.read()?
            .into_iter()
            .find(|s| s.id == *id)
            .ok_or_else(|| StoreError::SnapshotNotFound(id.to_owned()))
    }

    pub fn latest(&self, target: &TargetId) -> Result<Option<SnapshotRecord>, StoreError> {
        Ok(self.list(Some(target))?.pop())
    }

    pub fn remove(&self, id: &str) -> Result<SnapshotRecord, StoreError> {
        let mut snapshots = self.read()?;
        let pos = snapshots
            .iter()
            .position(|s| s.id == *id)
            .ok_or_else(|| StoreError::SnapshotNotFound(id.to_owned()))?;
        let removed = snapshots.remove(pos);
        self.write(snapshots)?;
        Ok(removed)
    }
}
