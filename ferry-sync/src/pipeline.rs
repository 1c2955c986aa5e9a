//! The canonical run entrypoint shared by every `ferry` invocation.
//!
//! One invocation is run-to-completion and single-threaded: rotate stores,
//! plan, then execute each destination's batch sequentially in sorted order.
//! Destination outcomes are isolated: a failed batch is reported in the
//! summary and the next destination still runs. No durable state is written
//! until a batch session has succeeded, so interruption anywhere needs no
//! rollback.

use chrono::Utc;
use serde::Serialize;

use ferry_core::{Config, RuleError};

use crate::batch;
use crate::error::SyncError;
use crate::history::ErrorStore;
use crate::planner::{self, DecisionOutcome, SyncPlan};
use crate::retention;
use crate::stability::StabilityDetector;
use crate::transport::Transport;

// ---------------------------------------------------------------------------
// Options and summary
// ---------------------------------------------------------------------------

/// Per-invocation switches.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Plan and report, but provision, transfer, and commit nothing.
    pub dry_run: bool,
}

/// A file excluded from its batch, with the actionable reason.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RejectedFile {
    pub filename: String,
    pub reason: String,
}

/// One destination's outcome for the run.
#[derive(Debug, Clone, Serialize)]
pub struct DestinationReport {
    pub destination: String,
    /// Committed to history this run.
    pub transferred: Vec<String>,
    /// Dry-run only: accepted files that would have been transferred.
    pub would_transfer: Vec<String>,
    /// Unchanged since the last successful transfer (expected no-ops).
    pub skipped: Vec<String>,
    pub rejected: Vec<RejectedFile>,
    /// Destination-level failure (provisioning or transfer session).
    pub failure: Option<String>,
}

/// The whole run's outcome, one report per destination.
#[derive(Debug, Clone, Serialize, Default)]
pub struct RunSummary {
    pub destinations: Vec<DestinationReport>,
    /// Rules that contributed nothing: config validation skips plus
    /// planning-time rule failures.
    pub rule_errors: Vec<String>,
}

impl RunSummary {
    pub fn total_transferred(&self) -> usize {
        self.destinations.iter().map(|d| d.transferred.len()).sum()
    }
}

// ---------------------------------------------------------------------------
// Run
// ---------------------------------------------------------------------------

/// Execute one full invocation against `config`.
///
/// `rule_errors` are the rules the config loader skipped; they are recorded
/// in their destination's error store (when one is addressable) and surfaced
/// in the summary.
pub fn run(
    config: &Config,
    rule_errors: &[RuleError],
    transport: &dyn Transport,
    options: &RunOptions,
) -> Result<RunSummary, SyncError> {
    // Housekeeping first, against persisted logs only. Never fatal.
    retention::rotate_all(&config.state_dir, &config.retention, Utc::now());

    let mut summary = RunSummary::default();
    for error in rule_errors {
        let message = format!("rule {}: {}", error.index, error.message);
        tracing::warn!("skipping invalid {message}");
        if let Some(destination) = &error.destination {
            ErrorStore::open(&config.state_dir, destination).append(
                std::path::Path::new(""),
                "",
                None,
                &message,
            )?;
        }
        summary.rule_errors.push(message);
    }

    let detector = StabilityDetector::from_settings(&config.stability);
    let plan = planner::plan(&config.rules, &detector, config.signature, &config.state_dir)?;
    summary.rule_errors.extend(plan.rule_errors.iter().cloned());

    execute_plan(config, &plan, transport, options, &mut summary)?;
    Ok(summary)
}

fn execute_plan(
    config: &Config,
    plan: &SyncPlan,
    transport: &dyn Transport,
    options: &RunOptions,
    summary: &mut RunSummary,
) -> Result<(), SyncError> {
    for (destination, decisions) in &plan.batches {
        let mut report = DestinationReport {
            destination: destination.to_string(),
            transferred: vec![],
            would_transfer: vec![],
            skipped: vec![],
            rejected: vec![],
            failure: None,
        };

        for decision in decisions {
            match &decision.outcome {
                DecisionOutcome::Accepted => {}
                DecisionOutcome::SkippedUnchanged => {
                    report.skipped.push(decision.filename.clone());
                }
                DecisionOutcome::Rejected(reason) => report.rejected.push(RejectedFile {
                    filename: decision.filename.clone(),
                    reason: reason.to_string(),
                }),
            }
        }

        if options.dry_run {
            report.would_transfer = decisions
                .iter()
                .filter(|d| d.outcome == DecisionOutcome::Accepted)
                .map(|d| d.filename.clone())
                .collect();
        } else {
            let outcome = batch::execute(destination, decisions, transport, &config.state_dir)?;
            report.transferred = outcome.committed;
            report.failure = outcome.failure;
        }

        summary.destinations.push(report);
    }
    Ok(())
}
