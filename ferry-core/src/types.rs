//! Domain types for Ferry.
//!
//! All path fields use `PathBuf`; never `&str` or `String` for filesystem paths.
//! Remote paths are `String` — they name files on another host and must not be
//! interpreted against the local filesystem.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Newtypes
// ---------------------------------------------------------------------------

/// A strongly-typed remote host name.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct HostName(pub String);

impl fmt::Display for HostName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for HostName {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for HostName {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

/// A strongly-typed remote login name.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct UserName(pub String);

impl fmt::Display for UserName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for UserName {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for UserName {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

// ---------------------------------------------------------------------------
// Destination
// ---------------------------------------------------------------------------

/// One remote target, identified by a (user, host) pair.
///
/// Each destination owns its own history and error store; the `Ord` impl keeps
/// per-destination iteration deterministic across runs.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Destination {
    pub user: UserName,
    pub host: HostName,
}

impl Destination {
    pub fn new(user: impl Into<UserName>, host: impl Into<HostName>) -> Self {
        Self {
            user: user.into(),
            host: host.into(),
        }
    }
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.user, self.host)
    }
}

impl FromStr for Destination {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once('@') {
            Some((user, host)) if !user.is_empty() && !host.is_empty() => {
                Ok(Self::new(user, host))
            }
            _ => Err(format!("invalid destination '{s}'; expected user@host")),
        }
    }
}

// ---------------------------------------------------------------------------
// Sync rule
// ---------------------------------------------------------------------------

/// One validated distribution rule: push files matching `pattern` from
/// `local_dir` (non-recursive) to `remote_dir` on `destination`.
///
/// Immutable once loaded; many rules may share a destination, in which case
/// their accepted files merge into one batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncRule {
    pub destination: Destination,
    pub remote_dir: String,
    pub pattern: String,
    pub local_dir: PathBuf,
}

// ---------------------------------------------------------------------------
// Run-wide policies
// ---------------------------------------------------------------------------

/// How a file's signature is computed for change detection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum SignatureMethod {
    /// SHA-256 over file content. Detects any byte-level change; O(file size).
    #[default]
    ContentHash,
    /// size + inode + mtime composite. O(1) metadata read, but a same-size
    /// replacement within mtime granularity reads as unchanged.
    Metadata,
}

impl fmt::Display for SignatureMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SignatureMethod::ContentHash => write!(f, "content-hash"),
            SignatureMethod::Metadata => write!(f, "metadata"),
        }
    }
}

/// How write-stability of a candidate file is detected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum StabilityMethod {
    /// Poll the file size; equal consecutive samples mean nobody is writing.
    #[default]
    SizeSampling,
    /// Check whether any process holds the file open for writing (`/proc`
    /// introspection). Falls back to size sampling where unavailable.
    OpenHandle,
}

impl fmt::Display for StabilityMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StabilityMethod::SizeSampling => write!(f, "size-sampling"),
            StabilityMethod::OpenHandle => write!(f, "open-handle"),
        }
    }
}

// ---------------------------------------------------------------------------
// Settings blocks
// ---------------------------------------------------------------------------

/// Stability-detector tuning, shared by every rule in a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StabilitySettings {
    pub method: StabilityMethod,
    pub poll_interval_ms: u64,
    pub max_wait_ms: u64,
    pub required_stable_samples: u32,
}

impl Default for StabilitySettings {
    fn default() -> Self {
        Self {
            method: StabilityMethod::default(),
            poll_interval_ms: 500,
            max_wait_ms: 10_000,
            required_stable_samples: 3,
        }
    }
}

impl StabilitySettings {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn max_wait(&self) -> Duration {
        Duration::from_millis(self.max_wait_ms)
    }
}

/// Rotation windows for history and error stores.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetentionSettings {
    /// A store whose oldest record is older than this is archived + truncated.
    pub max_log_age_days: u32,
    /// Archives older than this are deleted outright.
    pub max_archive_age_days: u32,
}

impl Default for RetentionSettings {
    fn default() -> Self {
        Self {
            max_log_age_days: 7,
            max_archive_age_days: 30,
        }
    }
}

/// Programs and options used to reach remote hosts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportSettings {
    pub ssh_program: String,
    pub sftp_program: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub identity_file: Option<PathBuf>,
}

impl Default for TransportSettings {
    fn default() -> Self {
        Self {
            ssh_program: "ssh".to_owned(),
            sftp_program: "sftp".to_owned(),
            port: None,
            identity_file: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn newtype_display() {
        assert_eq!(HostName::from("web-01").to_string(), "web-01");
        assert_eq!(UserName::from("deploy").to_string(), "deploy");
    }

    #[test]
    fn destination_display_and_parse_roundtrip() {
        let dest = Destination::new("deploy", "web-01");
        assert_eq!(dest.to_string(), "deploy@web-01");
        assert_eq!("deploy@web-01".parse::<Destination>().unwrap(), dest);
    }

    #[test]
    fn destination_parse_rejects_malformed_input() {
        assert!("no-at-sign".parse::<Destination>().is_err());
        assert!("@host".parse::<Destination>().is_err());
        assert!("user@".parse::<Destination>().is_err());
    }

    #[test]
    fn destination_ordering_is_deterministic() {
        let mut dests = vec![
            Destination::new("deploy", "web-02"),
            Destination::new("backup", "web-02"),
            Destination::new("deploy", "web-01"),
        ];
        dests.sort();
        assert_eq!(dests[0].to_string(), "backup@web-02");
        assert_eq!(dests[1].to_string(), "deploy@web-01");
        assert_eq!(dests[2].to_string(), "deploy@web-02");
    }

    #[test]
    fn policy_enums_deserialize_from_kebab_case() {
        let sig: SignatureMethod = serde_yaml::from_str("content-hash").expect("parse");
        assert_eq!(sig, SignatureMethod::ContentHash);
        let sig: SignatureMethod = serde_yaml::from_str("metadata").expect("parse");
        assert_eq!(sig, SignatureMethod::Metadata);
        let st: StabilityMethod = serde_yaml::from_str("open-handle").expect("parse");
        assert_eq!(st, StabilityMethod::OpenHandle);
    }

    #[test]
    fn settings_defaults() {
        let stability = StabilitySettings::default();
        assert_eq!(stability.poll_interval(), Duration::from_millis(500));
        assert_eq!(stability.max_wait(), Duration::from_millis(10_000));
        assert_eq!(stability.required_stable_samples, 3);

        let retention = RetentionSettings::default();
        assert_eq!(retention.max_log_age_days, 7);
        assert_eq!(retention.max_archive_age_days, 30);

        let transport = TransportSettings::default();
        assert_eq!(transport.ssh_program, "ssh");
        assert_eq!(transport.sftp_program, "sftp");
        assert!(transport.port.is_none());
    }
}
