use crate::command::{ExecOutput, RemoteCommand};
use crate::executor::Executor;
use crate::process::run_with_timeout;
use crate::ExecError;
use bringup_schema::{Credentials, Elevation, ExecMode, Target};
use std::path::Path;
use std::process::Command;
use std::time::Duration;
use tracing::debug;

/// Runs commands on this host, for when the orchestrator runs on the
/// appliance itself.
pub struct LocalExecutor {
    target: Target,
}

impl Default for LocalExecutor {
    fn default() -> Self {
        Self {
            target: Target {
                address: "localhost".to_owned(),
                username: std::env::var("USER").unwrap_or_else(|_| "root".to_owned()),
                credentials: Credentials::Ambient,
                mode: ExecMode::Local,
                elevation: Elevation::None,
                connect_timeout: Duration::from_secs(1),
            },
        }
    }
}

impl LocalExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn for_target(target: &Target) -> Self {
        Self {
            target: target.clone(),
        }
    }
}

impl Executor for LocalExecutor {
    fn name(&self) -> &'static str {
        "local"
    }

    fn execute(&self, cmd: &RemoteCommand, timeout: Duration) -> Result<ExecOutput, ExecError> {
        if cmd.is_empty() {
            return Err(ExecError::EmptyCommand);
        }
        let rendered = cmd.render(self.target.elevation);
        debug!("local exec: {cmd}");
        let mut proc = Command::new("sh");
        proc.arg("-c").arg(&rendered);
        run_with_timeout(
            proc,
            cmd.stdin_for(&self.target).as_deref(),
            timeout,
            &cmd.to_string(),
        )
    }

    fn copy(&self, local: &Path, remote: &str, _timeout: Duration) -> Result<(), ExecError> {
        let dest = Path::new(remote);
        if let Some(parent) = dest.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::copy(local, dest).map_err(|e| ExecError::Transfer {
            remote: remote.to_owned(),
            reason: e.to_string(),
        })?;
        debug!("local copy: {} -> {remote}", local.display());
        Ok(())
    }
}
