pub mod ai;
pub mod db;
pub mod models;
pub mod project;
pub mod reconcile;
pub mod storage;

// Re-export commonly used types
pub use ai::{AiClient, AiError, AiMode, SemanticService};
pub use models::{
    ApplyCounts,
    ApplyPlan,
    Conflict,
    ConflictClassification,
    ConflictLabel,
    HistoryAction,
    HistoryEntry,
    IncomingItem,
    ItemDecision,
    MatchVerdict,
    ProjectStore,
    RequirementItem,
    ResolutionDecision,
    Section,
    Similarity,
    SkippedItem,
    SourceRef,
    MANUAL_REVIEW_NOTE,
    MAX_HISTORY_ENTRIES,
};
pub use project::{determine_store_path, session_path_for};
pub use reconcile::{
    apply, reorder, Planner, PlannerConfig, ReconcileError, ResolutionSession,
};
pub use storage::{Storage, StorageError};
