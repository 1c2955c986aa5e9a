//! Sync planning: turn rules into per-destination batches of decisions.
//!
//! For each rule, candidate files are the non-recursive entries of
//! `local_dir` whose names match `pattern`, in sorted order. Each candidate
//! runs the gate pipeline:
//!
//! ```text
//! exists? → write-stable? → signature → already synced? → Accepted
//! ```
//!
//! A rejection short-circuits that file only, appends an error record with
//! the specific reason, and planning continues. Rules sharing a destination
//! merge into one batch. Given the same files and history, the plan is
//! reproducible run to run.

use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use ferry_core::{Destination, SignatureMethod, SyncRule};

use crate::error::{io_err, SyncError};
use crate::history::{ErrorStore, HistoryStore};
use crate::signature::Signature;
use crate::stability::{Probe, StabilityDetector};

// ---------------------------------------------------------------------------
// Decisions
// ---------------------------------------------------------------------------

/// Why a candidate file was excluded from its batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RejectReason {
    /// The file vanished between enumeration and processing.
    NotFound,
    /// The file never held still within the stability detector's `max_wait`.
    WriteTimeout,
    /// The file's signature (or metadata needed for gating) could not be read.
    Signature { message: String },
    /// The rule itself was unusable (bad pattern, unreadable directory).
    InvalidRule { message: String },
}

impl std::fmt::Display for RejectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RejectReason::NotFound => write!(f, "file not found"),
            RejectReason::WriteTimeout => write!(f, "write-stability timeout"),
            RejectReason::Signature { message } => {
                write!(f, "signature computation failed: {message}")
            }
            RejectReason::InvalidRule { message } => write!(f, "invalid rule: {message}"),
        }
    }
}

/// The outcome of the gate pipeline for one candidate file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecisionOutcome {
    /// New or changed — goes into the destination's batch.
    Accepted,
    /// A matching history record exists; transferring again would be a no-op.
    SkippedUnchanged,
    /// Excluded, with the reason recorded in the destination's error store.
    Rejected(RejectReason),
}

/// One candidate file's fate for one destination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncDecision {
    pub filename: String,
    pub local_path: PathBuf,
    pub remote_path: String,
    /// Absent when rejection happened before a signature could be computed.
    pub signature: Option<Signature>,
    pub outcome: DecisionOutcome,
}

/// All decisions for one run, grouped and ordered by destination.
#[derive(Debug, Default)]
pub struct SyncPlan {
    pub batches: BTreeMap<Destination, Vec<SyncDecision>>,
    /// Rule-level failures (unreadable directory, unusable pattern), one
    /// message each; the affected rule contributed no decisions.
    pub rule_errors: Vec<String>,
}

// ---------------------------------------------------------------------------
// Planning
// ---------------------------------------------------------------------------

/// Build the run's plan. Per-file problems become rejections; rule-level
/// problems land in `rule_errors`; only local-state I/O failures (error store
/// unwritable) propagate.
pub fn plan(
    rules: &[SyncRule],
    detector: &StabilityDetector,
    method: SignatureMethod,
    state_dir: &Path,
) -> Result<SyncPlan, SyncError> {
    let mut plan = SyncPlan::default();

    for rule in rules {
        let errors = ErrorStore::open(state_dir, &rule.destination);

        let pattern = match glob::Pattern::new(&rule.pattern) {
            Ok(pattern) => pattern,
            Err(err) => {
                let reason = RejectReason::InvalidRule {
                    message: format!("pattern '{}': {err}", rule.pattern),
                };
                record_rule_failure(&mut plan, &errors, rule, &reason)?;
                continue;
            }
        };

        let names = match list_matching(&rule.local_dir, &pattern) {
            Ok(names) => names,
            Err(err) => {
                let reason = RejectReason::InvalidRule {
                    message: format!("local dir {}: {err}", rule.local_dir.display()),
                };
                record_rule_failure(&mut plan, &errors, rule, &reason)?;
                continue;
            }
        };

        let decisions = plan.batches.entry(rule.destination.clone()).or_default();
        for filename in names {
            let decision = decide(rule, &filename, detector, method, state_dir)?;
            if let DecisionOutcome::Rejected(reason) = &decision.outcome {
                tracing::warn!(
                    "rejected {} for {}: {reason}",
                    decision.local_path.display(),
                    rule.destination
                );
                errors.append(
                    &rule.local_dir,
                    &filename,
                    decision.signature.as_ref(),
                    &reason.to_string(),
                )?;
            }
            decisions.push(decision);
        }
    }

    Ok(plan)
}

/// Run one candidate through the gate pipeline.
fn decide(
    rule: &SyncRule,
    filename: &str,
    detector: &StabilityDetector,
    method: SignatureMethod,
    state_dir: &Path,
) -> Result<SyncDecision, SyncError> {
    let local_path = rule.local_dir.join(filename);
    let remote_path = join_remote(&rule.remote_dir, filename);

    let rejected = |signature: Option<Signature>, reason: RejectReason| SyncDecision {
        filename: filename.to_owned(),
        local_path: local_path.clone(),
        remote_path: remote_path.clone(),
        signature,
        outcome: DecisionOutcome::Rejected(reason),
    };

    if !local_path.is_file() {
        return Ok(rejected(None, RejectReason::NotFound));
    }

    match detector.await_stable(&local_path) {
        Ok(Probe::Stable { .. }) => {}
        Ok(Probe::TimedOut { .. }) => {
            return Ok(rejected(None, RejectReason::WriteTimeout));
        }
        Err(err) => return Ok(rejected(None, precondition_reason(err))),
    }

    let signature = match Signature::compute(&local_path, method) {
        Ok(signature) => signature,
        Err(err) => return Ok(rejected(None, precondition_reason(err))),
    };

    let history = HistoryStore::open(state_dir, &rule.destination);
    let outcome = if history.is_already_synced(&rule.local_dir, filename, &signature)? {
        DecisionOutcome::SkippedUnchanged
    } else {
        DecisionOutcome::Accepted
    };

    Ok(SyncDecision {
        filename: filename.to_owned(),
        local_path,
        remote_path,
        signature: Some(signature),
        outcome,
    })
}

fn precondition_reason(err: SyncError) -> RejectReason {
    if err.io_kind() == Some(ErrorKind::NotFound) {
        RejectReason::NotFound
    } else {
        RejectReason::Signature {
            message: err.to_string(),
        }
    }
}

fn record_rule_failure(
    plan: &mut SyncPlan,
    errors: &ErrorStore,
    rule: &SyncRule,
    reason: &RejectReason,
) -> Result<(), SyncError> {
    tracing::warn!("skipping rule for {}: {reason}", rule.destination);
    errors.append(&rule.local_dir, "", None, &reason.to_string())?;
    plan.rule_errors
        .push(format!("{}: {reason}", rule.destination));
    Ok(())
}

/// Non-recursive listing of `dir` entries whose names match `pattern`,
/// sorted for reproducible plans.
fn list_matching(dir: &Path, pattern: &glob::Pattern) -> Result<Vec<String>, SyncError> {
    let entries = std::fs::read_dir(dir).map_err(|e| io_err(dir, e))?;
    let mut names = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| io_err(dir, e))?;
        // Keep symlinks: the existence gate decides whether they resolve.
        let is_dir = entry.file_type().map(|t| t.is_dir()).unwrap_or(false);
        if is_dir {
            continue;
        }
        let name = entry.file_name().to_string_lossy().into_owned();
        if pattern.matches(&name) {
            names.push(name);
        }
    }
    names.sort();
    Ok(names)
}

/// `<remote_dir>/<filename>` with exactly one separator.
pub(crate) fn join_remote(remote_dir: &str, filename: &str) -> String {
    format!("{}/{}", remote_dir.trim_end_matches('/'), filename)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use ferry_core::StabilityMethod;
    use tempfile::TempDir;

    use super::*;

    fn fast_detector() -> StabilityDetector {
        StabilityDetector::new(
            StabilityMethod::SizeSampling,
            Duration::from_millis(5),
            Duration::from_millis(200),
            2,
        )
    }

    fn rule(local_dir: &Path, host: &str) -> SyncRule {
        SyncRule {
            destination: Destination::new("deploy", host),
            remote_dir: "/data/incoming".to_owned(),
            pattern: "*.csv".to_owned(),
            local_dir: local_dir.to_path_buf(),
        }
    }

    #[test]
    fn matching_stable_new_file_is_accepted() {
        let local = TempDir::new().expect("local");
        let state = TempDir::new().expect("state");
        std::fs::write(local.path().join("a.csv"), b"1,2\n").expect("write");
        std::fs::write(local.path().join("notes.txt"), b"skip me").expect("write");

        let rules = vec![rule(local.path(), "web-01")];
        let plan = plan(
            &rules,
            &fast_detector(),
            SignatureMethod::ContentHash,
            state.path(),
        )
        .expect("plan");

        assert_eq!(plan.batches.len(), 1);
        let decisions = &plan.batches[&rules[0].destination];
        assert_eq!(decisions.len(), 1, "txt file must not match *.csv");
        assert_eq!(decisions[0].filename, "a.csv");
        assert_eq!(decisions[0].remote_path, "/data/incoming/a.csv");
        assert_eq!(decisions[0].outcome, DecisionOutcome::Accepted);
        assert!(decisions[0].signature.is_some());
    }

    #[test]
    fn already_synced_file_is_skipped() {
        let local = TempDir::new().expect("local");
        let state = TempDir::new().expect("state");
        let path = local.path().join("a.csv");
        std::fs::write(&path, b"1,2\n").expect("write");

        let rules = vec![rule(local.path(), "web-01")];
        let sig = Signature::compute(&path, SignatureMethod::ContentHash).expect("sig");
        HistoryStore::open(state.path(), &rules[0].destination)
            .commit(local.path(), "a.csv", &sig)
            .expect("commit");

        let plan = plan(
            &rules,
            &fast_detector(),
            SignatureMethod::ContentHash,
            state.path(),
        )
        .expect("plan");
        let decisions = &plan.batches[&rules[0].destination];
        assert_eq!(decisions[0].outcome, DecisionOutcome::SkippedUnchanged);
    }

    #[test]
    fn same_name_in_other_dir_or_destination_is_still_planned() {
        let dir_a = TempDir::new().expect("dirA");
        let dir_b = TempDir::new().expect("dirB");
        let state = TempDir::new().expect("state");
        std::fs::write(dir_a.path().join("x.csv"), b"same").expect("write");
        std::fs::write(dir_b.path().join("x.csv"), b"same").expect("write");

        // dirA's copy is committed for web-01.
        let rule_a = rule(dir_a.path(), "web-01");
        let sig = Signature::compute(&dir_a.path().join("x.csv"), SignatureMethod::ContentHash)
            .expect("sig");
        HistoryStore::open(state.path(), &rule_a.destination)
            .commit(dir_a.path(), "x.csv", &sig)
            .expect("commit");

        // Same content from dirB, and to a second host, must both be accepted.
        let rules = vec![
            rule_a,
            rule(dir_b.path(), "web-01"),
            rule(dir_a.path(), "web-02"),
        ];
        let plan = plan(
            &rules,
            &fast_detector(),
            SignatureMethod::ContentHash,
            state.path(),
        )
        .expect("plan");

        let web01 = &plan.batches[&Destination::new("deploy", "web-01")];
        assert_eq!(web01[0].outcome, DecisionOutcome::SkippedUnchanged);
        assert_eq!(web01[1].outcome, DecisionOutcome::Accepted, "dirB copy");
        let web02 = &plan.batches[&Destination::new("deploy", "web-02")];
        assert_eq!(web02[0].outcome, DecisionOutcome::Accepted, "second host");
    }

    #[test]
    fn rejection_writes_an_error_record_and_planning_continues() {
        let local = TempDir::new().expect("local");
        let state = TempDir::new().expect("state");
        // A directory named like a candidate is enumerated out (not a file),
        // so force a rejection through a dangling symlink instead.
        std::fs::write(local.path().join("ok.csv"), b"fine").expect("write");
        #[cfg(unix)]
        std::os::unix::fs::symlink(
            local.path().join("gone-target"),
            local.path().join("dangling.csv"),
        )
        .expect("symlink");

        let rules = vec![rule(local.path(), "web-01")];
        let plan = plan(
            &rules,
            &fast_detector(),
            SignatureMethod::ContentHash,
            state.path(),
        )
        .expect("plan");

        let decisions = &plan.batches[&rules[0].destination];
        assert!(decisions
            .iter()
            .any(|d| d.outcome == DecisionOutcome::Accepted && d.filename == "ok.csv"));

        #[cfg(unix)]
        {
            assert!(decisions.iter().any(|d| {
                d.filename == "dangling.csv"
                    && d.outcome == DecisionOutcome::Rejected(RejectReason::NotFound)
            }));
            let errors = ErrorStore::open(state.path(), &rules[0].destination)
                .records()
                .expect("records");
            assert_eq!(errors.len(), 1);
            assert_eq!(errors[0].filename, "dangling.csv");
            assert_eq!(errors[0].message, "file not found");
        }
    }

    #[test]
    fn unreadable_local_dir_fails_the_rule_only() {
        let local = TempDir::new().expect("local");
        let state = TempDir::new().expect("state");
        std::fs::write(local.path().join("a.csv"), b"data").expect("write");

        let missing = local.path().join("does-not-exist");
        let rules = vec![rule(&missing, "web-01"), rule(local.path(), "web-02")];
        let plan = plan(
            &rules,
            &fast_detector(),
            SignatureMethod::ContentHash,
            state.path(),
        )
        .expect("plan");

        assert_eq!(plan.rule_errors.len(), 1);
        assert!(plan.rule_errors[0].contains("deploy@web-01"));
        // The broken rule recorded one error in its destination's store.
        let errors = ErrorStore::open(state.path(), &Destination::new("deploy", "web-01"))
            .records()
            .expect("records");
        assert_eq!(errors.len(), 1);
        // The healthy rule still planned.
        let web02 = &plan.batches[&Destination::new("deploy", "web-02")];
        assert_eq!(web02[0].outcome, DecisionOutcome::Accepted);
    }

    #[test]
    fn rules_sharing_a_destination_merge_into_one_batch() {
        let dir_a = TempDir::new().expect("dirA");
        let dir_b = TempDir::new().expect("dirB");
        let state = TempDir::new().expect("state");
        std::fs::write(dir_a.path().join("a.csv"), b"a").expect("write");
        std::fs::write(dir_b.path().join("b.csv"), b"b").expect("write");

        let mut second = rule(dir_b.path(), "web-01");
        second.remote_dir = "/data/other".to_owned();
        let rules = vec![rule(dir_a.path(), "web-01"), second];

        let plan = plan(
            &rules,
            &fast_detector(),
            SignatureMethod::ContentHash,
            state.path(),
        )
        .expect("plan");

        assert_eq!(plan.batches.len(), 1, "one batch per destination");
        let decisions = &plan.batches[&Destination::new("deploy", "web-01")];
        assert_eq!(decisions.len(), 2);
        assert_eq!(decisions[0].remote_path, "/data/incoming/a.csv");
        assert_eq!(decisions[1].remote_path, "/data/other/b.csv");
    }

    #[test]
    fn join_remote_normalizes_separators() {
        assert_eq!(join_remote("/data", "a.csv"), "/data/a.csv");
        assert_eq!(join_remote("/data/", "a.csv"), "/data/a.csv");
        assert_eq!(join_remote("", "a.csv"), "/a.csv");
    }
}
