use crate::CoreError;
use bringup_runtime::{ExecOutput, Executor, RemoteCommand};
use bringup_schema::{DeployConfig, Target};
use std::cell::RefCell;
use std::path::Path;
use std::time::Duration;
use tracing::warn;

/// Everything an Operation needs, passed explicitly instead of living in
/// process-wide state. Also collects the warnings raised while a Step runs.
pub struct OpContext<'a> {
    pub target: &'a Target,
    pub exec: &'a dyn Executor,
    pub config: &'a DeployConfig,
    warnings: RefCell<Vec<String>>,
}

impl<'a> OpContext<'a> {
    pub fn new(target: &'a Target, exec: &'a dyn Executor, config: &'a DeployConfig) -> Self {
        Self {
            target,
            exec,
            config,
            warnings: RefCell::new(Vec::new()),
        }
    }

    pub fn check_timeout(&self) -> Duration {
        self.config.check_timeout()
    }

    pub fn install_timeout(&self) -> Duration {
        self.config.install_timeout()
    }

    /// Run a command and return its output whatever the exit code.
    pub fn run(&self, cmd: &RemoteCommand, timeout: Duration) -> Result<ExecOutput, CoreError> {
        Ok(self.exec.execute(cmd, timeout)?)
    }

    /// Read-only probe with the check timeout.
    pub fn query(&self, cmd: &RemoteCommand) -> Result<ExecOutput, CoreError> {
        self.run(cmd, self.check_timeout())
    }

    /// Run a command that has to succeed.
    pub fn must(&self, cmd: &RemoteCommand, timeout: Duration) -> Result<ExecOutput, CoreError> {
        let out = self.run(cmd, timeout)?;
        if out.success() {
            Ok(out)
        } else {
            Err(CoreError::CommandFailed {
                command: cmd.to_string(),
                detail: out.summary(),
            })
        }
    }

    pub fn copy(&self, local: &Path, remote: &str) -> Result<(), CoreError> {
        Ok(self.exec.copy(local, remote, self.check_timeout())?)
    }

    /// Log a degraded path and keep it for the Step record.
    pub fn warn(&self, message: impl Into<String>) {
        let message = message.into();
        warn!("{message}");
        self.warnings.borrow_mut().push(message);
    }

    pub fn take_warnings(&self) -> Vec<String> {
        std::mem::take(&mut *self.warnings.borrow_mut())
    }
}
