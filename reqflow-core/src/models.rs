use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Maximum number of history entries kept per item; oldest entries are
/// dropped once the trail exceeds this.
pub const MAX_HISTORY_ENTRIES: usize = 20;

/// The fixed, ordered set of requirement sections.
///
/// Every canonical and incoming item belongs to exactly one section, and
/// matching never crosses section boundaries.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum Section {
    Problems,
    UserGoals,
    FunctionalRequirements,
    DataNeeds,
    Constraints,
    NonGoals,
    RisksAssumptions,
    OpenQuestions,
    ActionItems,
}

impl Section {
    /// All sections in their canonical display order
    pub fn all() -> &'static [Section] {
        &[
            Section::Problems,
            Section::UserGoals,
            Section::FunctionalRequirements,
            Section::DataNeeds,
            Section::Constraints,
            Section::NonGoals,
            Section::RisksAssumptions,
            Section::OpenQuestions,
            Section::ActionItems,
        ]
    }

    /// Parse a section from its snake_case name
    pub fn from_str(s: &str) -> Option<Section> {
        match s {
            "problems" => Some(Section::Problems),
            "user_goals" => Some(Section::UserGoals),
            "functional_requirements" => Some(Section::FunctionalRequirements),
            "data_needs" => Some(Section::DataNeeds),
            "constraints" => Some(Section::Constraints),
            "non_goals" => Some(Section::NonGoals),
            "risks_assumptions" => Some(Section::RisksAssumptions),
            "open_questions" => Some(Section::OpenQuestions),
            "action_items" => Some(Section::ActionItems),
            _ => None,
        }
    }

    /// Human-readable section title
    pub fn title(&self) -> &'static str {
        match self {
            Section::Problems => "Problems",
            Section::UserGoals => "User Goals",
            Section::FunctionalRequirements => "Functional Requirements",
            Section::DataNeeds => "Data Needs",
            Section::Constraints => "Constraints",
            Section::NonGoals => "Non-Goals",
            Section::RisksAssumptions => "Risks & Assumptions",
            Section::OpenQuestions => "Open Questions",
            Section::ActionItems => "Action Items",
        }
    }
}

impl fmt::Display for Section {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Section::Problems => write!(f, "problems"),
            Section::UserGoals => write!(f, "user_goals"),
            Section::FunctionalRequirements => write!(f, "functional_requirements"),
            Section::DataNeeds => write!(f, "data_needs"),
            Section::Constraints => write!(f, "constraints"),
            Section::NonGoals => write!(f, "non_goals"),
            Section::RisksAssumptions => write!(f, "risks_assumptions"),
            Section::OpenQuestions => write!(f, "open_questions"),
            Section::ActionItems => write!(f, "action_items"),
        }
    }
}

/// Provenance link from a requirement item back to a meeting
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SourceRef {
    pub meeting_id: Uuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quote: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speaker: Option<String>,
}

/// What happened to an item's content in a supersession
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum HistoryAction {
    Replaced,
    Merged,
}

impl fmt::Display for HistoryAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HistoryAction::Replaced => write!(f, "replaced"),
            HistoryAction::Merged => write!(f, "merged"),
        }
    }
}

/// One entry of an item's bounded edit-history trail
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HistoryEntry {
    pub timestamp: DateTime<Utc>,
    pub action: HistoryAction,
    pub previous_content: String,
}

/// A canonical requirement item owned by the project store
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RequirementItem {
    pub id: Uuid,
    pub section: Section,
    pub content: String,
    /// Dense per-section ordering, starting at 1
    pub order: u32,
    #[serde(default)]
    pub source_refs: Vec<SourceRef>,
    /// Number of prior supersessions (replace/merge); never bumped on insert
    #[serde(default)]
    pub history_count: u32,
    #[serde(default)]
    pub history: Vec<HistoryEntry>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl RequirementItem {
    /// Creates a new item with a fresh UUID and no history
    pub fn new(section: Section, content: String, order: u32) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            section,
            content,
            order,
            source_refs: Vec::new(),
            history_count: 0,
            history: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Overwrites the content as a supersession: records the previous content
    /// in the bounded history trail and increments `history_count`.
    pub fn supersede(&mut self, new_content: String, action: HistoryAction) {
        self.history.push(HistoryEntry {
            timestamp: Utc::now(),
            action,
            previous_content: std::mem::replace(&mut self.content, new_content),
        });
        if self.history.len() > MAX_HISTORY_ENTRIES {
            let excess = self.history.len() - MAX_HISTORY_ENTRIES;
            self.history.drain(0..excess);
        }
        self.history_count += 1;
        self.updated_at = Utc::now();
    }
}

/// An item extracted from one meeting; immutable input to reconciliation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct IncomingItem {
    pub id: Uuid,
    pub section: Section,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_quote: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speaker: Option<String>,
}

impl IncomingItem {
    pub fn new(section: Section, content: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            section,
            content,
            source_quote: None,
            speaker: None,
        }
    }

    /// Provenance ref carried onto the canonical item this one lands in
    pub fn source_ref(&self, meeting_id: Uuid) -> SourceRef {
        SourceRef {
            meeting_id,
            quote: self.source_quote.clone(),
            speaker: self.speaker.clone(),
        }
    }
}

/// How similar an incoming item is to its best canonical match.
///
/// Exact and semantic duplicates are kept distinct on purpose: they carry
/// different confidence and different user-facing messaging.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Similarity {
    ExactDuplicate,
    SemanticDuplicate,
    Overlapping,
}

impl fmt::Display for Similarity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Similarity::ExactDuplicate => write!(f, "exact_duplicate"),
            Similarity::SemanticDuplicate => write!(f, "semantic_duplicate"),
            Similarity::Overlapping => write!(f, "overlapping"),
        }
    }
}

/// Matcher result for one incoming item.
///
/// A matched item exists exactly when there is a similarity verdict, so the
/// pairing is a single enum rather than an optional field plus a flag.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MatchVerdict {
    NoMatch,
    Matched {
        item: RequirementItem,
        similarity: Similarity,
    },
}

/// Conflict label produced by the classifier
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ConflictLabel {
    /// The incoming item adds detail without contradicting the existing one
    Refinement,
    /// The incoming item is incompatible with the existing one
    Contradiction,
}

impl ConflictLabel {
    /// The recommended resolution for this label. Owned by the core so the
    /// presentation layer never re-derives it.
    pub fn recommended_decision(&self) -> ResolutionDecision {
        match self {
            ConflictLabel::Refinement => ResolutionDecision::ConflictReplaced,
            ConflictLabel::Contradiction => ResolutionDecision::ConflictKeepExisting,
        }
    }
}

impl fmt::Display for ConflictLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConflictLabel::Refinement => write!(f, "refinement"),
            ConflictLabel::Contradiction => write!(f, "contradiction"),
        }
    }
}

/// Classifier output for one overlapping pair
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConflictClassification {
    pub label: ConflictLabel,
    pub rationale: String,
    pub recommended_decision: ResolutionDecision,
}

impl ConflictClassification {
    pub fn new(label: ConflictLabel, rationale: String) -> Self {
        Self {
            label,
            rationale,
            recommended_decision: label.recommended_decision(),
        }
    }
}

/// Display marker for conflicts the classifier could not label
pub const MANUAL_REVIEW_NOTE: &str = "unable to classify - review manually";

/// One conflicting incoming item awaiting a user decision
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Conflict {
    pub item: IncomingItem,
    /// None when the matcher itself failed for this item; there is then no
    /// existing item to replace or merge into.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub matched: Option<RequirementItem>,
    /// None when the classifier failed for this item; the conflict then
    /// requires manual review.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub classification: Option<ConflictClassification>,
}

impl Conflict {
    pub fn needs_manual_review(&self) -> bool {
        self.classification.is_none()
    }
}

/// An incoming item skipped as a duplicate of an existing one
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SkippedItem {
    pub item: IncomingItem,
    pub matched: RequirementItem,
    /// Which duplicate kind triggered the skip
    pub similarity: Similarity,
    /// Human-readable reason shown in the review UI
    pub reason: String,
}

/// The partitioned result of reconciling one meeting against the canonical
/// set. Every incoming item lands in exactly one bucket, in input order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ApplyPlan {
    pub meeting_id: Uuid,
    pub added: Vec<IncomingItem>,
    pub skipped: Vec<SkippedItem>,
    pub conflicts: Vec<Conflict>,
}

impl ApplyPlan {
    pub fn new(meeting_id: Uuid) -> Self {
        Self {
            meeting_id,
            added: Vec::new(),
            skipped: Vec::new(),
            conflicts: Vec::new(),
        }
    }

    /// Total number of incoming items across all buckets
    pub fn total_items(&self) -> usize {
        self.added.len() + self.skipped.len() + self.conflicts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.total_items() == 0
    }

    /// True if the plan covers the given incoming item id
    pub fn contains(&self, item_id: Uuid) -> bool {
        self.added.iter().any(|i| i.id == item_id)
            || self.skipped.iter().any(|s| s.item.id == item_id)
            || self.conflicts.iter().any(|c| c.item.id == item_id)
    }

    pub fn conflict(&self, item_id: Uuid) -> Option<&Conflict> {
        self.conflicts.iter().find(|c| c.item.id == item_id)
    }
}

/// The final disposition of one incoming item
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionDecision {
    /// New item, inserted as-is
    Added,
    /// Dropped: exact duplicate of an existing item
    SkippedDuplicate,
    /// Dropped: semantically equivalent to an existing item
    SkippedSemantic,
    /// Conflict resolved by keeping the existing item unchanged
    ConflictKeepExisting,
    /// Conflict resolved by overwriting the existing item's content
    ConflictReplaced,
    /// Conflict resolved by keeping both items
    ConflictKeptBoth,
    /// Conflict resolved by overwriting with user-edited merge text
    ConflictMerged { merged_text: String },
}

impl ResolutionDecision {
    /// True for the decisions a user may assign to a conflict
    pub fn is_conflict_resolution(&self) -> bool {
        matches!(
            self,
            ResolutionDecision::ConflictKeepExisting
                | ResolutionDecision::ConflictReplaced
                | ResolutionDecision::ConflictKeptBoth
                | ResolutionDecision::ConflictMerged { .. }
        )
    }
}

impl fmt::Display for ResolutionDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResolutionDecision::Added => write!(f, "added"),
            ResolutionDecision::SkippedDuplicate => write!(f, "skipped_duplicate"),
            ResolutionDecision::SkippedSemantic => write!(f, "skipped_semantic"),
            ResolutionDecision::ConflictKeepExisting => write!(f, "conflict_keep_existing"),
            ResolutionDecision::ConflictReplaced => write!(f, "conflict_replaced"),
            ResolutionDecision::ConflictKeptBoth => write!(f, "conflict_kept_both"),
            ResolutionDecision::ConflictMerged { .. } => write!(f, "conflict_merged"),
        }
    }
}

/// One entry of the full decision list handed to the applier
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ItemDecision {
    pub item_id: Uuid,
    pub decision: ResolutionDecision,
}

/// Aggregate result of one apply, returned for UI confirmation
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ApplyCounts {
    pub added: usize,
    pub skipped: usize,
    pub kept_existing: usize,
    pub replaced: usize,
    pub kept_both: usize,
    pub merged: usize,
}

impl ApplyCounts {
    /// Total decisions applied
    pub fn total(&self) -> usize {
        self.added + self.skipped + self.kept_existing + self.replaced + self.kept_both
            + self.merged
    }
}

/// The canonical, deduplicated requirement set for one project
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProjectStore {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub items: Vec<RequirementItem>,
}

impl Default for ProjectStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ProjectStore {
    pub fn new() -> Self {
        Self {
            name: String::new(),
            description: String::new(),
            items: Vec::new(),
        }
    }

    /// Items in a section, sorted by their `order`
    pub fn items_in_section(&self, section: Section) -> Vec<&RequirementItem> {
        let mut items: Vec<&RequirementItem> = self
            .items
            .iter()
            .filter(|i| i.section == section)
            .collect();
        items.sort_by_key(|i| i.order);
        items
    }

    /// The next free order slot at the end of a section
    pub fn next_order(&self, section: Section) -> u32 {
        self.items
            .iter()
            .filter(|i| i.section == section)
            .map(|i| i.order)
            .max()
            .map_or(1, |max| max + 1)
    }

    pub fn find_item(&self, id: Uuid) -> Option<&RequirementItem> {
        self.items.iter().find(|i| i.id == id)
    }

    pub fn find_item_mut(&mut self, id: Uuid) -> Option<&mut RequirementItem> {
        self.items.iter_mut().find(|i| i.id == id)
    }

    /// Inserts an item at the end of its section's order
    pub fn push_item(&mut self, mut item: RequirementItem) -> Uuid {
        item.order = self.next_order(item.section);
        let id = item.id;
        self.items.push(item);
        id
    }

    /// Direct user edit: overwrites content without touching the history
    /// counter (supersessions go through `RequirementItem::supersede`)
    pub fn edit_content(&mut self, id: Uuid, content: String) -> bool {
        match self.find_item_mut(id) {
            Some(item) => {
                item.content = content;
                item.updated_at = Utc::now();
                true
            }
            None => false,
        }
    }

    /// Direct user delete. Remaining items in the section are re-numbered
    /// densely so `order` stays gap-free.
    pub fn delete_item(&mut self, id: Uuid) -> bool {
        let section = match self.find_item(id) {
            Some(item) => item.section,
            None => return false,
        };
        self.items.retain(|i| i.id != id);
        let mut ids: Vec<Uuid> = self
            .items_in_section(section)
            .iter()
            .map(|i| i.id)
            .collect();
        for (idx, item_id) in ids.drain(..).enumerate() {
            if let Some(item) = self.find_item_mut(item_id) {
                item.order = idx as u32 + 1;
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_section_roundtrip() {
        for section in Section::all() {
            let s = section.to_string();
            assert_eq!(Section::from_str(&s), Some(*section));
        }
        assert_eq!(Section::from_str("not_a_section"), None);
    }

    #[test]
    fn test_section_serde_snake_case() {
        let yaml = serde_yaml::to_string(&Section::UserGoals).unwrap();
        assert_eq!(yaml.trim(), "user_goals");
    }

    #[test]
    fn test_supersede_tracks_history() {
        let mut item = RequirementItem::new(Section::Problems, "old".to_string(), 1);
        item.supersede("new".to_string(), HistoryAction::Replaced);
        assert_eq!(item.content, "new");
        assert_eq!(item.history_count, 1);
        assert_eq!(item.history.len(), 1);
        assert_eq!(item.history[0].previous_content, "old");
        assert_eq!(item.history[0].action, HistoryAction::Replaced);
    }

    #[test]
    fn test_supersede_bounds_history() {
        let mut item = RequirementItem::new(Section::Problems, "v0".to_string(), 1);
        for n in 1..=(MAX_HISTORY_ENTRIES + 5) {
            item.supersede(format!("v{}", n), HistoryAction::Merged);
        }
        assert_eq!(item.history.len(), MAX_HISTORY_ENTRIES);
        assert_eq!(item.history_count, (MAX_HISTORY_ENTRIES + 5) as u32);
        // Oldest entries dropped, newest retained
        assert_eq!(
            item.history.last().unwrap().previous_content,
            format!("v{}", MAX_HISTORY_ENTRIES + 4)
        );
    }

    #[test]
    fn test_recommended_decision_mapping() {
        assert_eq!(
            ConflictLabel::Refinement.recommended_decision(),
            ResolutionDecision::ConflictReplaced
        );
        assert_eq!(
            ConflictLabel::Contradiction.recommended_decision(),
            ResolutionDecision::ConflictKeepExisting
        );
    }

    #[test]
    fn test_decision_conflict_classification() {
        assert!(ResolutionDecision::ConflictKeepExisting.is_conflict_resolution());
        assert!(ResolutionDecision::ConflictMerged {
            merged_text: "x".to_string()
        }
        .is_conflict_resolution());
        assert!(!ResolutionDecision::Added.is_conflict_resolution());
        assert!(!ResolutionDecision::SkippedSemantic.is_conflict_resolution());
    }

    #[test]
    fn test_next_order_starts_at_one() {
        let store = ProjectStore::new();
        assert_eq!(store.next_order(Section::Constraints), 1);
    }

    #[test]
    fn test_push_item_appends_order() {
        let mut store = ProjectStore::new();
        store.push_item(RequirementItem::new(
            Section::Problems,
            "a".to_string(),
            0,
        ));
        let id = store.push_item(RequirementItem::new(
            Section::Problems,
            "b".to_string(),
            0,
        ));
        assert_eq!(store.find_item(id).unwrap().order, 2);
        // Other sections are unaffected
        assert_eq!(store.next_order(Section::DataNeeds), 1);
    }

    #[test]
    fn test_delete_item_renumbers_densely() {
        let mut store = ProjectStore::new();
        let a = store.push_item(RequirementItem::new(Section::Problems, "a".into(), 0));
        let b = store.push_item(RequirementItem::new(Section::Problems, "b".into(), 0));
        let c = store.push_item(RequirementItem::new(Section::Problems, "c".into(), 0));
        assert!(store.delete_item(b));
        assert_eq!(store.find_item(a).unwrap().order, 1);
        assert_eq!(store.find_item(c).unwrap().order, 2);
        assert!(!store.delete_item(b));
    }

    #[test]
    fn test_plan_partition_helpers() {
        let meeting = Uuid::new_v4();
        let mut plan = ApplyPlan::new(meeting);
        assert!(plan.is_empty());
        let item = IncomingItem::new(Section::Problems, "x".to_string());
        let item_id = item.id;
        plan.added.push(item);
        assert_eq!(plan.total_items(), 1);
        assert!(plan.contains(item_id));
        assert!(!plan.contains(Uuid::new_v4()));
    }

    #[test]
    fn test_store_yaml_roundtrip() {
        let mut store = ProjectStore::new();
        store.name = "demo".to_string();
        store.push_item(RequirementItem::new(
            Section::ActionItems,
            "follow up with ops".to_string(),
            0,
        ));
        let yaml = serde_yaml::to_string(&store).unwrap();
        let parsed: ProjectStore = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(parsed, store);
    }
}
