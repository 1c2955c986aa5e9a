//! Rotation and retention for history and error stores.
//!
//! Runs once at the start of every invocation, before any sync decision.
//! A non-empty store whose oldest record is older than `max_log_age_days`
//! is gzip-archived next to itself as `<name>.log.<YYYYMMDDTHHMMSS>.gz`
//! (the timestamp is the rotation moment) and truncated in place, never
//! deleted, so appends continue uninterrupted. Archives older than
//! `max_archive_age_days`, judged by their filename timestamp, are removed.
//!
//! Rotation is housekeeping: every failure here degrades to a warning and
//! the run proceeds.

use std::fs;
use std::io::{self, Write};
use std::path::Path;

use chrono::{DateTime, Duration, NaiveDateTime, Utc};
use flate2::write::GzEncoder;
use flate2::Compression;

use ferry_core::RetentionSettings;

use crate::history::{ERRORS_DIR, HISTORY_DIR};

const ARCHIVE_STAMP: &str = "%Y%m%dT%H%M%S";

/// Rotate and prune every store under `state_dir`. Never fails the run.
pub fn rotate_all(state_dir: &Path, settings: &RetentionSettings, now: DateTime<Utc>) {
    for sub in [HISTORY_DIR, ERRORS_DIR] {
        let dir = state_dir.join(sub);
        if let Err(err) = rotate_dir(&dir, settings, now) {
            tracing::warn!("log rotation failed under {}: {err}", dir.display());
        }
    }
}

fn rotate_dir(dir: &Path, settings: &RetentionSettings, now: DateTime<Utc>) -> io::Result<()> {
    if !dir.exists() {
        return Ok(());
    }
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().into_owned();
        let path = entry.path();
        if name.ends_with(".log") {
            match rotate_store(&path, settings.max_log_age_days, now) {
                Ok(true) => tracing::info!("rotated {}", path.display()),
                Ok(false) => {}
                Err(err) => tracing::warn!("could not rotate {}: {err}", path.display()),
            }
        } else if name.ends_with(".gz") {
            match prune_archive(&path, &name, settings.max_archive_age_days, now) {
                Ok(true) => tracing::info!("expired archive {}", path.display()),
                Ok(false) => {}
                Err(err) => tracing::warn!("could not prune {}: {err}", path.display()),
            }
        }
    }
    Ok(())
}

/// Archive + truncate `path` if its oldest record is older than
/// `max_log_age_days`. Returns `true` if rotation occurred.
pub fn rotate_store(path: &Path, max_log_age_days: u32, now: DateTime<Utc>) -> io::Result<bool> {
    let contents = match fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(false),
        Err(err) => return Err(err),
    };
    let Some(first_line) = contents.lines().next() else {
        return Ok(false);
    };
    let Some(oldest) = record_timestamp(first_line) else {
        tracing::warn!(
            "first record of {} has no parseable timestamp; skipping rotation",
            path.display()
        );
        return Ok(false);
    };

    if now.signed_duration_since(oldest) <= Duration::days(i64::from(max_log_age_days)) {
        return Ok(false);
    }

    let archive = archive_path(path, now);
    let file = fs::File::create(&archive)?;
    let mut encoder = GzEncoder::new(file, Compression::default());
    encoder.write_all(contents.as_bytes())?;
    encoder.finish()?;

    // Truncate in place so the store keeps its path and stays appendable.
    fs::OpenOptions::new()
        .write(true)
        .truncate(true)
        .open(path)?;

    Ok(true)
}

/// Delete `path` if its filename timestamp is older than
/// `max_archive_age_days`. Returns `true` if deleted.
fn prune_archive(
    path: &Path,
    name: &str,
    max_archive_age_days: u32,
    now: DateTime<Utc>,
) -> io::Result<bool> {
    let Some(created) = archive_timestamp(name) else {
        return Ok(false);
    };
    if now.signed_duration_since(created) <= Duration::days(i64::from(max_archive_age_days)) {
        return Ok(false);
    }
    fs::remove_file(path)?;
    Ok(true)
}

/// `<store>.{now}.gz` next to the store.
fn archive_path(store: &Path, now: DateTime<Utc>) -> std::path::PathBuf {
    let name = store
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "store.log".to_owned());
    store.with_file_name(format!("{name}.{}.gz", now.format(ARCHIVE_STAMP)))
}

/// The timestamp embedded in an archive filename
/// (`<name>.log.<YYYYMMDDTHHMMSS>.gz`).
fn archive_timestamp(name: &str) -> Option<DateTime<Utc>> {
    let stem = name.strip_suffix(".gz")?;
    let (_, stamp) = stem.rsplit_once('.')?;
    NaiveDateTime::parse_from_str(stamp, ARCHIVE_STAMP)
        .ok()
        .map(|naive| naive.and_utc())
}

/// The leading timestamp field of a persisted record line.
fn record_timestamp(line: &str) -> Option<DateTime<Utc>> {
    let (first, _) = line.split_once('|')?;
    DateTime::parse_from_rfc3339(first)
        .ok()
        .map(|ts| ts.with_timezone(&Utc))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
