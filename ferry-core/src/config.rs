//! YAML configuration loading with per-rule validation.
//!
//! # Config layout
//!
//! ```text
//! state_dir: /var/lib/ferry          # optional — defaults to ~/.ferry
//! default_user: deploy               # optional per-rule fallback
//! signature: content-hash            # or: metadata
//! stability:
//!   method: size-sampling            # or: open-handle
//!   poll_interval_ms: 500
//!   max_wait_ms: 10000
//!   required_stable_samples: 3
//! retention:
//!   max_log_age_days: 7
//!   max_archive_age_days: 30
//! transport:
//!   ssh_program: ssh
//!   sftp_program: sftp
//! rules:
//!   - host: web-01
//!     user: deploy
//!     remote_dir: /data/incoming
//!     pattern: "*.csv"
//!     local_dir: /srv/outbound
//! ```
//!
//! Rules deserialize leniently (every field optional) and are validated one
//! by one: a structurally malformed rule is skipped and reported as a
//! [`RuleError`] without aborting the others. The exception is credentials:
//! a rule with no `user` when no `default_user` is set means no destination
//! can be addressed at all, which is fatal before any transfer is attempted.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::ConfigError;
use crate::types::{
    Destination, RetentionSettings, SignatureMethod, StabilitySettings, SyncRule,
    TransportSettings,
};

// ---------------------------------------------------------------------------
// Validated config
// ---------------------------------------------------------------------------

/// A fully validated run configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub state_dir: PathBuf,
    pub signature: SignatureMethod,
    pub stability: StabilitySettings,
    pub retention: RetentionSettings,
    pub transport: TransportSettings,
    pub rules: Vec<SyncRule>,
}

/// A rule that failed validation and was skipped.
///
/// `destination` is set when the rule's (user, host) could still be resolved,
/// so the failure can be recorded in that destination's error store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleError {
    pub index: usize,
    pub message: String,
    pub destination: Option<Destination>,
}

// ---------------------------------------------------------------------------
// Raw (lenient) shapes
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct RawConfig {
    state_dir: Option<PathBuf>,
    default_user: Option<String>,
    #[serde(default)]
    signature: SignatureMethod,
    #[serde(default)]
    stability: StabilitySettings,
    #[serde(default)]
    retention: RetentionSettings,
    #[serde(default)]
    transport: TransportSettings,
    #[serde(default)]
    rules: Vec<RawRule>,
}

#[derive(Debug, Deserialize, Default)]
struct RawRule {
    host: Option<String>,
    user: Option<String>,
    remote_dir: Option<String>,
    pattern: Option<String>,
    local_dir: Option<PathBuf>,
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

/// `~/.ferry/ferry.yaml` — the default config location.
pub fn default_config_path() -> Result<PathBuf, ConfigError> {
    Ok(default_state_dir()?.join("ferry.yaml"))
}

/// `~/.ferry/` — the default state directory (stores live beneath it).
pub fn default_state_dir() -> Result<PathBuf, ConfigError> {
    dirs::home_dir()
        .map(|home| home.join(".ferry"))
        .ok_or(ConfigError::HomeNotFound)
}

/// Load and validate the config at `path`.
///
/// Returns the validated [`Config`] plus the list of rules that were skipped
/// with their reasons. Only structural problems with the file itself (missing
/// file, YAML errors, missing credentials) are hard errors.
pub fn load(path: &Path) -> Result<(Config, Vec<RuleError>), ConfigError> {
    let contents = match std::fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            return Err(ConfigError::NotFound {
                path: path.to_path_buf(),
            });
        }
        Err(err) => {
            return Err(ConfigError::Io {
                path: path.to_path_buf(),
                source: err,
            });
        }
    };
    let raw: RawConfig = serde_yaml::from_str(&contents).map_err(|e| ConfigError::Parse {
        path: path.to_path_buf(),
        source: e,
    })?;
    from_raw(raw)
}

fn from_raw(raw: RawConfig) -> Result<(Config, Vec<RuleError>), ConfigError> {
    let state_dir = match raw.state_dir {
        Some(dir) => dir,
        None => default_state_dir()?,
    };

    let mut rules = Vec::new();
    let mut errors = Vec::new();
    for (index, rule) in raw.rules.iter().enumerate() {
        match validate_rule(index, rule, raw.default_user.as_deref())? {
            Ok(rule) => rules.push(rule),
            Err(error) => errors.push(error),
        }
    }

    Ok((
        Config {
            state_dir,
            signature: raw.signature,
            stability: raw.stability,
            retention: raw.retention,
            transport: raw.transport,
            rules,
        },
        errors,
    ))
}

/// Validate one raw rule.
///
/// The outer `Result` is fatal (missing credentials); the inner `Result`
/// distinguishes a usable rule from a skippable one.
fn validate_rule(
    index: usize,
    raw: &RawRule,
    default_user: Option<&str>,
) -> Result<Result<SyncRule, RuleError>, ConfigError> {
    let user = match raw.user.as_deref().or(default_user) {
        Some(user) if !user.is_empty() => user.to_owned(),
        _ => return Err(ConfigError::MissingCredentials { index }),
    };

    let host = raw.host.as_deref().filter(|h| !h.is_empty());

    let mut problems = Vec::new();
    if host.is_none() {
        problems.push("missing host");
    }
    let remote_dir = raw.remote_dir.as_deref().unwrap_or("");
    if remote_dir.is_empty() {
        problems.push("missing remote_dir");
    }
    let pattern = raw.pattern.as_deref().unwrap_or("");
    if pattern.is_empty() {
        problems.push("missing pattern");
    } else if glob::Pattern::new(pattern).is_err() {
        problems.push("invalid pattern");
    }
    let local_dir = raw.local_dir.as_deref();
    if local_dir.is_none() {
        problems.push("missing local_dir");
    }

    match (host, local_dir) {
        (Some(host), Some(local_dir)) if problems.is_empty() => Ok(Ok(SyncRule {
            destination: Destination::new(user.as_str(), host),
            remote_dir: remote_dir.trim_end_matches('/').to_owned(),
            pattern: pattern.to_owned(),
            local_dir: local_dir.to_path_buf(),
        })),
        _ => Ok(Err(RuleError {
            index,
            message: problems.join(", "),
            destination: host.map(|h| Destination::new(user.as_str(), h)),
        })),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
