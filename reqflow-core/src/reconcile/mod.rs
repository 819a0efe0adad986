//! Reconciliation engine
//!
//! Merges one meeting's extracted items into a project's canonical
//! requirement set: the planner partitions incoming items into
//! added/skipped/conflicting, the resolution session collects one decision
//! per conflict, and the applier commits a fully-resolved plan against the
//! store.

mod applier;
mod planner;
mod session;

pub use applier::{apply, reorder};
pub use planner::{Planner, PlannerConfig};
pub use session::ResolutionSession;

use crate::ai::AiError;
use thiserror::Error;

/// Errors raised by the reconciliation engine
#[derive(Error, Debug)]
pub enum ReconcileError {
    /// The semantic service is down entirely; planning can be retried
    #[error("semantic service unavailable: {0}")]
    External(#[from] AiError),

    /// Commit attempted while conflicts still lack a resolution
    #[error("{unresolved} conflict(s) have no resolution - commit is blocked")]
    IncompleteResolution { unresolved: usize },

    /// The canonical store changed between planning and commit; the plan
    /// must be rebuilt rather than applied against stale references
    #[error("canonical store changed since planning: {0}")]
    StaleCanonical(String),

    /// Malformed or illegal decision
    #[error("invalid decision: {0}")]
    Validation(String),
}
