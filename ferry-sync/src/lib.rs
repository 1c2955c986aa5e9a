//! # ferry-sync
//!
//! The sync decision engine: write-stability gating, signature-based change
//! detection, per-destination batching, and the durable history/error stores
//! (with rotation) that make repeated runs idempotent.
//!
//! Call [`pipeline::run`] for a complete invocation, or compose the parts —
//! [`StabilityDetector`], [`Signature`], [`planner::plan`],
//! [`batch::execute`] — directly.

pub mod batch;
pub mod error;
pub mod history;
pub mod pipeline;
pub mod planner;
pub mod retention;
pub mod signature;
pub mod stability;
pub mod transport;

pub use error::SyncError;
pub use history::{ErrorRecord, ErrorStore, HistoryRecord, HistoryStore};
pub use pipeline::{DestinationReport, RejectedFile, RunOptions, RunSummary};
pub use planner::{DecisionOutcome, RejectReason, SyncDecision, SyncPlan};
pub use signature::Signature;
pub use stability::{Probe, StabilityDetector};
pub use transport::{SftpTransport, TransferItem, Transport, TransportError};
