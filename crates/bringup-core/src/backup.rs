use crate::context::OpContext;
use crate::CoreError;
use bringup_runtime::device;
use bringup_schema::{RunId, SnapshotId};
use bringup_store::{SnapshotIndex, SnapshotRecord, StoreError};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;

/// Where a snapshot taken at `at` is stored on the Target.
pub fn snapshot_path(backup_dir: &str, at: DateTime<Utc>) -> String {
    format!(
        "{}/bringup-backup-{}.tar.gz",
        backup_dir.trim_end_matches('/'),
        at.format("%Y%m%dT%H%M%S%.3fZ")
    )
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RestoreOutcome {
    Restored,
    /// The snapshot was gone; nothing was changed.
    Missing,
}

/// Takes, restores and removes configuration snapshots on the Target, and
/// keeps the local snapshot index in step when one is attached.
pub struct BackupManager<'s> {
    index: Option<&'s SnapshotIndex>,
}

impl<'s> BackupManager<'s> {
    pub fn new(index: Option<&'s SnapshotIndex>) -> Self {
        Self { index }
    }

    pub fn backup(&self, ctx: &OpContext<'_>, run_id: Option<&RunId>) -> Result<SnapshotId, CoreError> {
        let now = Utc::now();
        let path = snapshot_path(&ctx.config.run.backup_dir, now);
        ctx.must(&device::config_backup(&path), ctx.install_timeout())?;
        if !ctx.query(&device::file_exists(&path))?.success() {
            return Err(CoreError::Apply {
                operation: "backup".to_owned(),
                reason: format!("{path} was not created"),
            });
        }
        let id = SnapshotId::new(path);
        if let Some(index) = self.index {
            index.record(SnapshotRecord {
                id: id.clone(),
                target: ctx.target.id(),
                created_at: now.to_rfc3339(),
                run_id: run_id.cloned(),
            })?;
        }
        info!("configuration snapshot {id}");
        Ok(id)
    }

    /// Re-apply a snapshot with a plain network reload. Route reconciliation
    /// is deliberately not run here.
    pub fn restore(&self, ctx: &OpContext<'_>, id: &SnapshotId) -> Result<RestoreOutcome, CoreError> {
        if !ctx.query(&device::file_exists(id))?.success() {
            ctx.warn(format!("snapshot {id} not found on target, nothing restored"));
            return Ok(RestoreOutcome::Missing);
        }
        ctx.must(&device::config_restore(id), ctx.install_timeout())?;
        ctx.must(&device::network_reload(), ctx.install_timeout())?;
        info!("restored configuration from {id}");
        Ok(RestoreOutcome::Restored)
    }

    /// Delete the snapshot from the Target and forget it.
    pub fn cleanup(&self, ctx: &OpContext<'_>, id: &SnapshotId) -> Result<(), CoreError> {
        ctx.must(&device::remove_file(id), ctx.check_timeout())?;
        if let Some(index) = self.index {
            match index.remove(id) {
                Ok(_) | Err(StoreError::SnapshotNotFound(_)) => {}
                Err(e) => return Err(e.into()),
            }
        }
        info!("removed snapshot {id}");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bringup_runtime::MockExecutor;
    use bringup_schema::DeployConfig;
    use bringup_store::StateLayout;
    use chrono::TimeZone;

    #[test]
    fn snapshot_path_is_timestamped() {
        let at = Utc.with_ymd_and_hms(2026, 3, 1, 12, 30, 5).unwrap();
        assert_eq!(
            snapshot_path("/root/", at),
            "/root/bringup-backup-20260301T123005.000Z.tar.gz"
        );
    }

    #[test]
    fn backup_restore_cleanup_cycle() {
        let state = tempfile::tempdir().unwrap();
        let index = SnapshotIndex::new(StateLayout::new(state.path()));
        let config = DeployConfig::for_address("192.168.8.1");
        let target = config.to_target();
        let exec = MockExecutor::new();
        let ctx = OpContext::new(&target, &exec, &config);
        let manager = BackupManager::new(Some(&index));

        let id = manager.backup(&ctx, None).unwrap();
        assert_eq!(index.list(None).unwrap().len(), 1);

        exec.device().set_uci("network.wan.device", "wwan0");
        let reloads = exec.device().reload_count;
        assert_eq!(manager.restore(&ctx, &id).unwrap(), RestoreOutcome::Restored);
        {
            let dev = exec.device();
            assert_eq!(dev.uci_value("network.wan.device"), Some("eth0"));
            assert_eq!(dev.reload_count, reloads + 1);
            assert_eq!(dev.commands_matching("/etc/init.d/network reload"), 1);
            assert_eq!(dev.commands_matching("ip route"), 0);
        }

        manager.cleanup(&ctx, &id).unwrap();
        assert!(index.list(None).unwrap().is_empty());
        assert!(!exec.device().files.contains_key(id.as_str()));
    }

    #[test]
    fn missing_snapshot_is_a_warning() {
        let config = DeployConfig::for_address("192.168.8.1");
        let target = config.to_target();
        let exec = MockExecutor::new();
        let ctx = OpContext::new(&target, &exec, &config);

        let outcome = BackupManager::new(None)
            .restore(&ctx, &SnapshotId::new("/root/gone.tar.gz"))
            .unwrap();
        assert_eq!(outcome, RestoreOutcome::Missing);
        assert_eq!(ctx.take_warnings().len(), 1);
        assert_eq!(exec.device().commands_matching("sysupgrade"), 0);
    }
}
