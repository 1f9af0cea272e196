use crate::command::{ExecOutput, RemoteCommand};
use crate::{device, ExecError};
use bringup_schema::{ExecMode, Target};
use std::path::Path;
use std::time::Duration;

/// Run commands and copy files on a Target.
///
/// Implementations always return the captured output of a command that ran,
/// whatever its exit code; `Err` is reserved for failures to run it at all.
pub trait Executor: Send + Sync {
    fn name(&self) -> &str;

    fn execute(&self, cmd: &RemoteCommand, timeout: Duration) -> Result<ExecOutput, ExecError>;

    fn copy(&self, local: &Path, remote: &str, timeout: Duration) -> Result<(), ExecError>;

    /// Cheap round trip used to fail fast before any mutation.
    fn probe(&self, timeout: Duration) -> Result<(), ExecError> {
        let out = self.execute(&device::probe(), timeout)?;
        if out.success() && out.stdout_trimmed() == device::PROBE_TOKEN {
            Ok(())
        } else {
            Err(ExecError::Unreachable {
                address: self.name().to_owned(),
                reason: format!("probe returned {}", out.summary()),
            })
        }
    }
}

pub fn select_executor(target: &Target) -> Box<dyn Executor> {
    match target.mode {
        ExecMode::Local => Box::new(crate::local::LocalExecutor::for_target(target)),
        ExecMode::Remote => Box::new(crate::ssh::SshExecutor::new(target.clone())),
        ExecMode::Mock => Box::new(crate::mock::MockExecutor::new().with_elevation(target.elevation)),
    }
}
