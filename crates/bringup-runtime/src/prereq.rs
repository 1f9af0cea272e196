use bringup_schema::{Credentials, ExecMode, Target};
use std::fmt;
use std::process::Command;

/// A local tool the chosen executor needs, with install instructions.
#[derive(Debug)]
pub struct MissingPrereq {
    pub name: &'static str,
    pub purpose: &'static str,
    pub install_hint: &'static str,
}

impl fmt::Display for MissingPrereq {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "  - {}: {} (install: {})",
            self.name, self.purpose, self.install_hint
        )
    }
}

fn command_exists(name: &str) -> bool {
    Command::new("which")
        .arg(name)
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

/// Tools needed on this host to drive `target`. Empty means ready.
pub fn check_local_prereqs(target: &Target) -> Vec<MissingPrereq> {
    check_with(target, command_exists)
}

fn check_with(target: &Target, exists: impl Fn(&str) -> bool) -> Vec<MissingPrereq> {
    let mut missing = Vec::new();

    if target.mode == ExecMode::Mock {
        return missing;
    }
    if target.mode == ExecMode::Local {
        if !exists("sh") {
            missing.push(MissingPrereq {
                name: "sh",
                purpose: "running commands on this host",
                install_hint: "any POSIX shell",
            });
        }
        return missing;
    }

    if !exists("ssh") {
        missing.push(MissingPrereq {
            name: "ssh",
            purpose: "remote shell session to the appliance",
            install_hint: "apt install openssh-client | dnf install openssh-clients | zypper install openssh-clients",
        });
    }
    if !exists("scp") {
        missing.push(MissingPrereq {
            name: "scp",
            purpose: "pushing service descriptors",
            install_hint: "shipped with the OpenSSH client",
        });
    }
    if matches!(target.credentials, Credentials::Password(_)) && !exists("sshpass") {
        missing.push(MissingPrereq {
            name: "sshpass",
            purpose: "password logins without a TTY",
            install_hint: "apt install sshpass | dnf install sshpass | zypper install sshpass, or use target.key_file",
        });
    }

    missing
}

pub fn format_missing(missing: &[MissingPrereq]) -> String {
    use std::fmt::Write as _;
    let mut msg = String::from("missing prerequisites:\n");
    for m in missing {
        let _ = writeln!(msg, "{m}");
    }
    msg.push_str("\nbringup needs these tools to reach the appliance.");
    msg
}
