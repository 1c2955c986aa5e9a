//! Per-destination history and error stores.
//!
//! One append-only, pipe-delimited log per (user, host) pair:
//!
//! ```text
//! <state_dir>/history/<user>@<host>.log   successful transfers
//! <state_dir>/errors/<user>@<host>.log    rejections and failures
//! ```
//!
//! History record: `timestamp|local_dir|filename|signature|destination`.
//! Error record appends a sixth `message` field. Every field is
//! percent-escaped (`%`, `|`, CR, LF) before writing, so a delimiter inside a
//! filename or path cannot corrupt the log.
//!
//! Stores are created lazily on first write, never mutated in place, and read
//! by full scan before every decision. Only this module and the retention
//! manager touch them.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;

use ferry_core::Destination;

use crate::error::{io_err, SyncError};
use crate::signature::Signature;

pub const HISTORY_DIR: &str = "history";
pub const ERRORS_DIR: &str = "errors";

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

/// One successful transfer, as persisted in a destination's history store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HistoryRecord {
    pub timestamp: DateTime<Utc>,
    pub local_dir: PathBuf,
    pub filename: String,
    pub signature: Signature,
    pub destination: String,
}

/// One rejection or failure, as persisted in a destination's error store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorRecord {
    pub timestamp: DateTime<Utc>,
    pub local_dir: PathBuf,
    pub filename: String,
    pub signature: Option<Signature>,
    pub destination: String,
    pub message: String,
}

// ---------------------------------------------------------------------------
// Paths
// ---------------------------------------------------------------------------

/// `<state_dir>/history/<user>@<host>.log` — pure, no I/O.
pub fn history_path_at(state_dir: &Path, destination: &Destination) -> PathBuf {
    state_dir
        .join(HISTORY_DIR)
        .join(format!("{destination}.log"))
}

/// `<state_dir>/errors/<user>@<host>.log` — pure, no I/O.
pub fn error_path_at(state_dir: &Path, destination: &Destination) -> PathBuf {
    state_dir.join(ERRORS_DIR).join(format!("{destination}.log"))
}

// ---------------------------------------------------------------------------
// Field escaping
// ---------------------------------------------------------------------------

/// Escape `%`, the field delimiter, and line breaks so any path or message is
/// safe to persist in one record line.
fn escape_field(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '%' => out.push_str("%25"),
            '|' => out.push_str("%7C"),
            '\r' => out.push_str("%0D"),
            '\n' => out.push_str("%0A"),
            ch => out.push(ch),
        }
    }
    out
}

fn unescape_field(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(ch) = chars.next() {
        if ch != '%' {
            out.push(ch);
            continue;
        }
        let code: String = chars.clone().take(2).collect();
        match code.as_str() {
            "25" => out.push('%'),
            "7C" => out.push('|'),
            "0D" => out.push('\r'),
            "0A" => out.push('\n'),
            // Not one of ours — keep the literal percent (old records).
            _ => {
                out.push('%');
                continue;
            }
        }
        chars.next();
        chars.next();
    }
    out
}

// ---------------------------------------------------------------------------
// History store
// ---------------------------------------------------------------------------

/// Append-only log of successful transfers for one destination.
#[derive(Debug, Clone)]
pub struct HistoryStore {
    path: PathBuf,
    destination: Destination,
}

impl HistoryStore {
    /// Bind to the destination's store. No I/O — the file is created lazily
    /// on first commit.
    pub fn open(state_dir: &Path, destination: &Destination) -> Self {
        Self {
            path: history_path_at(state_dir, destination),
            destination: destination.clone(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Scan for a record matching local dir, filename, signature, and the
    /// full destination string. All four must match exactly: same-named
    /// files in other directories or pushed to other destinations are
    /// distinct. No match means "not synced".
    pub fn is_already_synced(
        &self,
        local_dir: &Path,
        filename: &str,
        signature: &Signature,
    ) -> Result<bool, SyncError> {
        let dest = self.destination.to_string();
        Ok(self.records()?.iter().any(|r| {
            r.local_dir == local_dir
                && r.filename == filename
                && r.signature == *signature
                && r.destination == dest
        }))
    }

    /// Append one record for a confirmed transfer. Called only after the
    /// destination's batch session reported success.
    pub fn commit(
        &self,
        local_dir: &Path,
        filename: &str,
        signature: &Signature,
    ) -> Result<(), SyncError> {
        let line = format!(
            "{}|{}|{}|{}|{}\n",
            Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
            escape_field(&local_dir.to_string_lossy()),
            escape_field(filename),
            escape_field(signature.as_str()),
            escape_field(&self.destination.to_string()),
        );
        append_line(&self.path, &line)
    }

    /// All parseable records, oldest first. Unparseable lines are skipped.
    pub fn records(&self) -> Result<Vec<HistoryRecord>, SyncError> {
        let contents = match std::fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(vec![]),
            Err(err) => return Err(io_err(&self.path, err)),
        };
        Ok(contents.lines().filter_map(parse_history_line).collect())
    }
}

fn parse_history_line(line: &str) -> Option<HistoryRecord> {
    let fields: Vec<&str> = line.split('|').collect();
    if fields.len() != 5 {
        return None;
    }
    let timestamp = DateTime::parse_from_rfc3339(fields[0])
        .ok()?
        .with_timezone(&Utc);
    Some(HistoryRecord {
        timestamp,
        local_dir: PathBuf::from(unescape_field(fields[1])),
        filename: unescape_field(fields[2]),
        signature: Signature::from_stored(unescape_field(fields[3])),
        destination: unescape_field(fields[4]),
    })
}

// ---------------------------------------------------------------------------
// Error store
// ---------------------------------------------------------------------------

/// Append-only log of rejections and failures for one destination.
#[derive(Debug, Clone)]
pub struct ErrorStore {
    path: PathBuf,
    destination: Destination,
}

impl ErrorStore {
    pub fn open(state_dir: &Path, destination: &Destination) -> Self {
        Self {
            path: error_path_at(state_dir, destination),
            destination: destination.clone(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one error record. `signature` is empty when rejection happened
    /// before a signature could be computed.
    pub fn append(
        &self,
        local_dir: &Path,
        filename: &str,
        signature: Option<&Signature>,
        message: &str,
    ) -> Result<(), SyncError> {
        let line = format!(
            "{}|{}|{}|{}|{}|{}\n",
            Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
            escape_field(&local_dir.to_string_lossy()),
            escape_field(filename),
            escape_field(signature.map(Signature::as_str).unwrap_or("")),
            escape_field(&self.destination.to_string()),
            escape_field(message),
        );
        append_line(&self.path, &line)
    }

    /// All parseable records, oldest first.
    pub fn records(&self) -> Result<Vec<ErrorRecord>, SyncError> {
        let contents = match std::fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(vec![]),
            Err(err) => return Err(io_err(&self.path, err)),
        };
        Ok(contents.lines().filter_map(parse_error_line).collect())
    }
}

fn parse_error_line(line: &str) -> Option<ErrorRecord> {
    let fields: Vec<&str> = line.split('|').collect();
    if fields.len() != 6 {
        return None;
    }
    let timestamp = DateTime::parse_from_rfc3339(fields[0])
        .ok()?
        .with_timezone(&Utc);
    let signature = match fields[3] {
        "" => None,
        raw => Some(Signature::from_stored(unescape_field(raw))),
    };
    Some(ErrorRecord {
        timestamp,
        local_dir: PathBuf::from(unescape_field(fields[1])),
        filename: unescape_field(fields[2]),
        signature,
        destination: unescape_field(fields[4]),
        message: unescape_field(fields[5]),
    })
}

fn append_line(path: &Path, line: &str) -> Result<(), SyncError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| io_err(parent, e))?;
    }
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| io_err(path, e))?;
    file.write_all(line.as_bytes()).map_err(|e| io_err(path, e))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
