//! The device being configured, fixed for the duration of a Run.

use crate::types::TargetId;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Whether commands run on this host or over a secure shell session.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ExecMode {
    Local,
    #[default]
    Remote,
    /// Simulated appliance; nothing leaves this process.
    Mock,
}

/// How privileged commands are elevated on the Target.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Elevation {
    /// The account is already privileged (e.g. `root` on an appliance).
    #[default]
    None,
    /// Prefix with `sudo -S`; the account password is fed on stdin.
    Sudo,
}

#[derive(Clone, PartialEq, Eq)]
pub enum Credentials {
    Password(String),
    KeyFile(PathBuf),
    /// Local execution, or an ssh agent holds the key.
    Ambient,
}

impl Credentials {
    pub fn password(&self) -> Option<&str> {
        match self {
            Credentials::Password(p) => Some(p),
            _ => None,
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Credentials::Password(_) => f.write_str("Password(<redacted>)"),
            Credentials::KeyFile(p) => f.debug_tuple("KeyFile").field(p).finish(),
            Credentials::Ambient => f.write_str("Ambient"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub address: String,
    pub username: String,
    pub credentials: Credentials,
    pub mode: ExecMode,
    pub elevation: Elevation,
    pub connect_timeout: Duration,
}

impl Target {
    pub fn id(&self) -> TargetId {
        TargetId::from_address(&self.address)
    }

    /// `user@address` for ssh/scp destinations.
    pub fn destination(&self) -> String {
        format!("{}@{}", self.username, self.address)
    }

    #[must_use]
    pub fn with_address(mut self, address: &str) -> Self {
        address.clone_into(&mut self.address);
        self
    }
}
