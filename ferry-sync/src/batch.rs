//! Batch transfer orchestration for one destination.
//!
//! Three steps, in order:
//! 1. Provision the deduplicated set of remote parent directories in one
//!    remote call. Failure aborts the whole batch — nothing transfers,
//!    nothing commits.
//! 2. Execute the accepted (local, remote) list as one transfer session.
//!    The session is all-or-nothing: a reported failure commits zero files,
//!    even if some puts physically landed before the session died. History
//!    errs toward re-transfer, never toward false "already synced".
//! 3. On session success, commit every file to the destination's history
//!    store.
//!
//! A failed destination is reported once and never affects other
//! destinations; its files stay eligible for the next run with no extra
//! state.

use std::collections::BTreeSet;
use std::path::Path;

use ferry_core::Destination;

use crate::error::SyncError;
use crate::history::{ErrorStore, HistoryStore};
use crate::planner::{DecisionOutcome, SyncDecision};
use crate::transport::{TransferItem, Transport};

/// What happened to one destination's batch.
#[derive(Debug, Default)]
pub struct BatchOutcome {
    /// Filenames committed to history (empty on failure or empty batch).
    pub committed: Vec<String>,
    /// The destination-level failure, if the batch did not go through.
    pub failure: Option<String>,
}

/// Provision directories, run the transfer session, commit on success.
///
/// Transport failures are contained here (recorded + returned in the
/// outcome); only local-state I/O failures propagate.
pub fn execute(
    destination: &Destination,
    decisions: &[SyncDecision],
    transport: &dyn Transport,
    state_dir: &Path,
) -> Result<BatchOutcome, SyncError> {
    let accepted: Vec<&SyncDecision> = decisions
        .iter()
        .filter(|d| d.outcome == DecisionOutcome::Accepted)
        .collect();
    if accepted.is_empty() {
        return Ok(BatchOutcome::default());
    }

    let errors = ErrorStore::open(state_dir, destination);

    // Step 1: one round trip for all distinct parent directories.
    let dirs: Vec<String> = accepted
        .iter()
        .map(|d| remote_parent(&d.remote_path))
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    if let Err(err) = transport.create_directories(destination, &dirs) {
        let message = format!("directory provisioning failed: {err}");
        tracing::warn!("{destination}: {message}");
        errors.append(Path::new(""), "", None, &message)?;
        return Ok(BatchOutcome {
            committed: vec![],
            failure: Some(message),
        });
    }

    // Step 2: one transfer session for the whole batch.
    let items: Vec<TransferItem> = accepted
        .iter()
        .map(|d| TransferItem {
            local: d.local_path.clone(),
            remote: d.remote_path.clone(),
        })
        .collect();
    if let Err(err) = transport.transfer(destination, &items) {
        let message = format!("batch transfer failed: {err}");
        tracing::warn!("{destination}: {message}");
        errors.append(Path::new(""), "", None, &message)?;
        return Ok(BatchOutcome {
            committed: vec![],
            failure: Some(message),
        });
    }

    // Step 3: the session succeeded — commit every file.
    let history = HistoryStore::open(state_dir, destination);
    let mut committed = Vec::with_capacity(accepted.len());
    for decision in accepted {
        let Some(signature) = &decision.signature else {
            continue;
        };
        let local_dir = decision
            .local_path
            .parent()
            .unwrap_or_else(|| Path::new(""));
        history.commit(local_dir, &decision.filename, signature)?;
        tracing::info!(
            "transferred {} -> {destination}:{}",
            decision.local_path.display(),
            decision.remote_path
        );
        committed.push(decision.filename.clone());
    }

    Ok(BatchOutcome {
        committed,
        failure: None,
    })
}

/// The remote parent directory of a remote path.
fn remote_parent(remote_path: &str) -> String {
    match remote_path.rsplit_once('/') {
        Some(("", _)) => "/".to_owned(),
        Some((parent, _)) => parent.to_owned(),
        None => ".".to_owned(),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
