//! Newtype wrappers for string identifiers, providing compile-time type safety.
//!
//! All newtypes serialize/deserialize as plain strings so run logs and the
//! snapshot index stay readable.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Deref;

macro_rules! string_newtype {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(s: impl Into<String>) -> Self {
                Self(s.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }

            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl Deref for $name {
            type Target = str;
            fn deref(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl PartialEq<str> for $name {
            fn eq(&self, other: &str) -> bool {
                self.0 == other
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_owned())
            }
        }
    };
}

string_newtype!(
    /// File-name safe identifier of a Target, derived from its address.
    TargetId
);

string_newtype!(
    /// Identifier of one Run: `<target>-<UTC start time>`.
    RunId
);

string_newtype!(
    /// Identifier of a configuration snapshot; also its path on the Target.
    SnapshotId
);

impl TargetId {
    /// Derive an identifier from a host address. Anything outside
    /// `[A-Za-z0-9._-]` becomes `_` so the id can be used in file names.
    pub fn from_address(address: &str) -> Self {
        let cleaned: String = address
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '.' || c == '-' || c == '_' {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        Self(cleaned)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn target_id_from_ipv4_is_unchanged() {
        assert_eq!(TargetId::from_address("192.168.8.1").as_str(), "192.168.8.1");
    }

    #[test]
    fn target_id_sanitizes_separators() {
        let id = TargetId::from_address("fe80::1%eth0");
        assert_eq!(id.as_str(), "fe80__1_eth0");
        assert!(!id.contains('/'));
    }

    #[test]
    fn snapshot_id_serde_roundtrip() {
        let id = SnapshotId::new("/root/bringup-backup-20260101T000000Z.tar.gz");
        let json = serde_json::to_string(&id).unwrap();
        let back: SnapshotId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }

    #[test]
    fn run_id_display() {
        let id = RunId::from("10.0.0.1-20260101T000000Z");
        assert_eq!(id.to_string(), "10.0.0.1-20260101T000000Z");
    }
}
