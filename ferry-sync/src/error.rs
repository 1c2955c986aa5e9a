//! Error types for ferry-sync.

use std::path::PathBuf;

use thiserror::Error;

/// All errors that can arise from sync engine operations.
///
/// Remote failures are deliberately absent: transport outcomes are contained
/// per destination by the batch orchestrator and surface as error records and
/// summary entries, never as propagated errors.
#[derive(Debug, Error)]
pub enum SyncError {
    /// An I/O error, with annotated path for context.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl SyncError {
    /// The underlying I/O error kind, where there is one.
    pub fn io_kind(&self) -> Option<std::io::ErrorKind> {
        match self {
            SyncError::Io { source, .. } => Some(source.kind()),
        }
    }
}

/// Convenience constructor for [`SyncError::Io`].
pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> SyncError {
    SyncError::Io {
        path: path.into(),
        source,
    }
}
