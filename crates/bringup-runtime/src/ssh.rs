use crate::command::{ExecOutput, RemoteCommand};
use crate::executor::Executor;
use crate::process::run_with_timeout;
use crate::ExecError;
use bringup_schema::{Credentials, Target};
use std::path::Path;
use std::process::Command;
use std::time::Duration;
use tracing::debug;

/// ssh reserves exit status 255 for its own errors.
const SSH_ERROR_EXIT: i32 = 255;
/// sshpass: 5 = wrong password, 6 = unknown host key.
const SSHPASS_AUTH_EXIT: i32 = 5;
const SSHPASS_HOSTKEY_EXIT: i32 = 6;

/// Runs commands through the system `ssh` client and copies files with `scp`.
/// Password logins go through `sshpass -e`, so the password travels in the
/// environment, never on a command line.
pub struct SshExecutor {
    target: Target,
}

impl SshExecutor {
    pub fn new(target: Target) -> Self {
        Self { target }
    }

    fn common_options(&self) -> Vec<String> {
        let mut opts = vec![
            "-o".to_owned(),
            format!("ConnectTimeout={}", self.target.connect_timeout.as_secs().max(1)),
            "-o".to_owned(),
            "StrictHostKeyChecking=accept-new".to_owned(),
            "-o".to_owned(),
            "LogLevel=ERROR".to_owned(),
        ];
        match &self.target.credentials {
            Credentials::KeyFile(key) => {
                opts.push("-o".to_owned());
                opts.push("BatchMode=yes".to_owned());
                opts.push("-i".to_owned());
                opts.push(key.to_string_lossy().into_owned());
            }
            Credentials::Ambient => {
                opts.push("-o".to_owned());
                opts.push("BatchMode=yes".to_owned());
            }
            Credentials::Password(_) => {
                opts.push("-o".to_owned());
                opts.push("PubkeyAuthentication=no".to_owned());
            }
        }
        opts
    }

    fn base_command(&self, program: &str) -> Command {
        match &self.target.credentials {
            Credentials::Password(pw) => {
                let mut cmd = Command::new("sshpass");
                cmd.env("SSHPASS", pw).arg("-e").arg(program);
                cmd
            }
            _ => Command::new(program),
        }
    }

    /// The full `ssh` invocation for a rendered remote command.
    pub fn ssh_command(&self, rendered: &str) -> Command {
        let mut cmd = self.base_command("ssh");
        cmd.args(self.common_options())
            .arg("-T")
            .arg(self.target.destination())
            .arg("--")
            .arg(rendered);
        cmd
    }

    /// The full `scp` invocation. `-O` selects the legacy protocol, since
    /// appliance ssh servers often ship without an sftp subsystem.
    pub fn scp_command(&self, local: &Path, remote: &str) -> Command {
        let mut cmd = self.base_command("scp");
        cmd.arg("-O")
            .args(self.common_options())
            .arg(local)
            .arg(format!("{}:{remote}", self.target.destination()));
        cmd
    }

    /// Map ssh/sshpass transport failures to connectivity errors. Anything
    /// else is the remote command's own exit status.
    pub fn classify(&self, out: &ExecOutput) -> Option<ExecError> {
        let uses_sshpass = matches!(self.target.credentials, Credentials::Password(_));
        let stderr = out.stderr.trim().to_owned();
        if uses_sshpass && out.exit_code == SSHPASS_AUTH_EXIT {
            return Some(ExecError::AuthFailed {
                destination: self.target.destination(),
                reason: "password rejected".to_owned(),
            });
        }
        if uses_sshpass && out.exit_code == SSHPASS_HOSTKEY_EXIT {
            return Some(ExecError::Unreachable {
                address: self.target.address.clone(),
                reason: "host key is unknown".to_owned(),
            });
        }
        if out.exit_code != SSH_ERROR_EXIT {
            return None;
        }
        if stderr.contains("Permission denied") || stderr.contains("Too many authentication") {
            Some(ExecError::AuthFailed {
                destination: self.target.destination(),
                reason: stderr,
            })
        } else {
            Some(ExecError::Unreachable {
                address: self.target.address.clone(),
                reason: if stderr.is_empty() {
                    "ssh exited with status 255".to_owned()
                } else {
                    stderr
                },
            })
        }
    }
}

impl Executor for SshExecutor {
    fn name(&self) -> &'static str {
        "ssh"
    }

    fn execute(&self, cmd: &RemoteCommand, timeout: Duration) -> Result<ExecOutput, ExecError> {
        if cmd.is_empty() {
            return Err(ExecError::EmptyCommand);
        }
        let rendered = cmd.render(self.target.elevation);
        debug!("ssh {}: {cmd}", self.target.address);
        let out = run_with_timeout(
            self.ssh_command(&rendered),
            cmd.stdin_for(&self.target).as_deref(),
            timeout + self.target.connect_timeout,
            &cmd.to_string(),
        )?;
        match self.classify(&out) {
            Some(err) => Err(err),
            None => Ok(out),
        }
    }

    fn copy(&self, local: &Path, remote: &str, timeout: Duration) -> Result<(), ExecError> {
        debug!("scp {} -> {}:{remote}", local.display(), self.target.address);
        let out = run_with_timeout(
            self.scp_command(local, remote),
            None,
            timeout + self.target.connect_timeout,
            &format!("scp {remote}"),
        )?;
        if let Some(err) = self.classify(&out) {
            return Err(err);
        }
        if out.success() {
            Ok(())
        } else {
            Err(ExecError::Transfer {
                remote: remote.to_owned(),
                reason: out.summary(),
            })
        }
    }
}
