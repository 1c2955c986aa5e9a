//! File signatures for change detection.
//!
//! Two interchangeable policies, chosen once per run:
//! - [`SignatureMethod::ContentHash`] — hex SHA-256 over the file bytes.
//! - [`SignatureMethod::Metadata`] — `size-inode-mtime` composite. One
//!   metadata read, no content I/O, but a same-size replacement within the
//!   mtime's one-second granularity reads as unchanged.

use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::time::UNIX_EPOCH;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use ferry_core::SignatureMethod;

use crate::error::{io_err, SyncError};

const HASH_BUF_BYTES: usize = 64 * 1024;

/// An opaque, comparable file signature. Equal signatures mean "identical for
/// sync purposes" under the policy that produced them.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Signature(String);

impl Signature {
    /// Compute the signature of `path` under `method`.
    ///
    /// Deterministic: unchanged content (content-hash) or unchanged
    /// size/inode/mtime (metadata) always yields the same value.
    pub fn compute(path: &Path, method: SignatureMethod) -> Result<Signature, SyncError> {
        match method {
            SignatureMethod::ContentHash => content_hash(path),
            SignatureMethod::Metadata => metadata_composite(path),
        }
    }

    /// Wrap a signature value read back from a persisted record.
    pub fn from_stored(value: impl Into<String>) -> Signature {
        Signature(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Signature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

fn content_hash(path: &Path) -> Result<Signature, SyncError> {
    let mut file = File::open(path).map_err(|e| io_err(path, e))?;
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; HASH_BUF_BYTES];
    loop {
        let n = file.read(&mut buf).map_err(|e| io_err(path, e))?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(Signature(hex::encode(hasher.finalize())))
}

fn metadata_composite(path: &Path) -> Result<Signature, SyncError> {
    let meta = std::fs::metadata(path).map_err(|e| io_err(path, e))?;
    let mtime_secs = meta
        .modified()
        .map_err(|e| io_err(path, e))?
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    Ok(Signature(format!(
        "{}-{}-{}",
        meta.len(),
        inode(&meta),
        mtime_secs
    )))
}

#[cfg(unix)]
fn inode(meta: &std::fs::Metadata) -> u64 {
    use std::os::unix::fs::MetadataExt;
    meta.ino()
}

#[cfg(not(unix))]
fn inode(_meta: &std::fs::Metadata) -> u64 {
    0
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
