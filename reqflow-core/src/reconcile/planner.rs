//! Reconciliation Planner
//!
//! Consumes one meeting's item list plus the current canonical set, invokes
//! the semantic service per item, and produces an `ApplyPlan` partitioned
//! into added / skipped / conflicting items.
//!
//! Items are independent of each other, so matching and classification fan
//! out across a small pool of worker threads, bounded to respect the
//! external service's rate limits. Results are reassembled in input order,
//! so identical inputs and identical service responses always yield an
//! identical plan.

use crate::ai::{AiError, SemanticService};
use crate::models::{
    ApplyPlan, Conflict, IncomingItem, MatchVerdict, RequirementItem, Section, Similarity,
    SkippedItem,
};
use crate::reconcile::ReconcileError;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc;
use std::thread;
use uuid::Uuid;

/// Configuration for the planner
#[derive(Debug, Clone)]
pub struct PlannerConfig {
    /// Maximum concurrent semantic-service calls
    pub max_concurrency: usize,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self { max_concurrency: 4 }
    }
}

/// Where one incoming item landed
enum PlanEntry {
    Added(IncomingItem),
    Skipped(SkippedItem),
    Conflicting(Conflict),
}

/// Reconciliation planner over a semantic service
pub struct Planner<'a> {
    service: &'a dyn SemanticService,
    config: PlannerConfig,
}

impl<'a> Planner<'a> {
    pub fn new(service: &'a dyn SemanticService) -> Self {
        Self {
            service,
            config: PlannerConfig::default(),
        }
    }

    pub fn with_config(service: &'a dyn SemanticService, config: PlannerConfig) -> Self {
        Self { service, config }
    }

    /// Build the apply plan for one meeting.
    ///
    /// The canonical set is only read, never mutated; cancelling before
    /// commit therefore has no side effects. A full service outage aborts
    /// with a retryable error; a failure on a single item degrades that item
    /// to a manual-review conflict instead.
    pub fn plan(
        &self,
        meeting_id: Uuid,
        items: &[IncomingItem],
        canonical: &[RequirementItem],
    ) -> Result<ApplyPlan, ReconcileError> {
        let mut plan = ApplyPlan::new(meeting_id);
        if items.is_empty() {
            return Ok(plan);
        }

        // Matching is section-scoped: an incoming item is only ever compared
        // against canonical items of its own section.
        let mut scopes: HashMap<Section, Vec<RequirementItem>> = HashMap::new();
        for item in canonical {
            scopes.entry(item.section).or_default().push(item.clone());
        }
        let empty_scope: Vec<RequirementItem> = Vec::new();

        let workers = self.config.max_concurrency.max(1).min(items.len());
        let service = self.service;
        let next_index = AtomicUsize::new(0);
        let (result_tx, result_rx) = mpsc::channel::<(usize, Result<PlanEntry, AiError>)>();

        let mut entries: Vec<Option<Result<PlanEntry, AiError>>> =
            (0..items.len()).map(|_| None).collect();

        thread::scope(|scope| {
            for _ in 0..workers {
                let tx = result_tx.clone();
                let next_index = &next_index;
                let scopes = &scopes;
                let empty_scope = &empty_scope;
                scope.spawn(move || loop {
                    let idx = next_index.fetch_add(1, Ordering::SeqCst);
                    if idx >= items.len() {
                        break;
                    }
                    let item = &items[idx];
                    let scope_items = scopes.get(&item.section).unwrap_or(empty_scope);
                    let entry = plan_item(service, item, scope_items);
                    if tx.send((idx, entry)).is_err() {
                        break;
                    }
                });
            }
            drop(result_tx);
            for (idx, entry) in result_rx {
                entries[idx] = Some(entry);
            }
        });

        for entry in entries {
            let entry = entry.ok_or_else(|| {
                ReconcileError::External(AiError::CliExecFailed(
                    "planner worker exited before finishing its items".to_string(),
                ))
            })?;
            match entry? {
                PlanEntry::Added(item) => plan.added.push(item),
                PlanEntry::Skipped(skipped) => plan.skipped.push(skipped),
                PlanEntry::Conflicting(conflict) => plan.conflicts.push(conflict),
            }
        }

        Ok(plan)
    }
}

/// Plan a single incoming item.
///
/// Returns `Err` only for outage-class failures, which abort the whole plan;
/// any other service error degrades the item to a manual-review conflict.
fn plan_item(
    service: &dyn SemanticService,
    item: &IncomingItem,
    scope: &[RequirementItem],
) -> Result<PlanEntry, AiError> {
    let verdict = match service.match_item(item, scope) {
        Ok(verdict) => verdict,
        Err(e) if e.is_outage() => return Err(e),
        Err(_) => {
            return Ok(PlanEntry::Conflicting(Conflict {
                item: item.clone(),
                matched: None,
                classification: None,
            }))
        }
    };

    let (existing, similarity) = match verdict {
        MatchVerdict::NoMatch => return Ok(PlanEntry::Added(item.clone())),
        MatchVerdict::Matched { item, similarity } => (item, similarity),
    };

    match similarity {
        Similarity::ExactDuplicate => Ok(PlanEntry::Skipped(SkippedItem {
            item: item.clone(),
            matched: existing,
            similarity,
            reason: "Exact duplicate of an existing item".to_string(),
        })),
        Similarity::SemanticDuplicate => Ok(PlanEntry::Skipped(SkippedItem {
            item: item.clone(),
            matched: existing,
            similarity,
            reason: "Semantic duplicate of an existing item (same meaning, different wording)"
                .to_string(),
        })),
        Similarity::Overlapping => {
            let classification =
                match service.classify_conflict(&item.content, &existing.content) {
                    Ok(classification) => Some(classification),
                    Err(e) if e.is_outage() => return Err(e),
                    Err(_) => None,
                };
            Ok(PlanEntry::Conflicting(Conflict {
                item: item.clone(),
                matched: Some(existing),
                classification,
            }))
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::models::{ConflictClassification, ConflictLabel};
    use std::collections::HashSet;

    /// Scripted stand-in for the AI service, keyed by item content
    #[derive(Default)]
    pub(crate) struct ScriptedService {
        /// incoming content -> (canonical item id, similarity)
        pub matches: HashMap<String, (Uuid, Similarity)>,
        /// new content -> conflict label
        pub labels: HashMap<String, ConflictLabel>,
        /// incoming contents whose match call fails (non-outage)
        pub fail_match: HashSet<String>,
        /// incoming contents whose match call times out
        pub time_out_match: HashSet<String>,
        /// new contents whose classify call fails (non-outage)
        pub fail_classify: HashSet<String>,
        /// simulate a full service outage
        pub outage: bool,
    }

    impl SemanticService for ScriptedService {
        fn match_item(
            &self,
            item: &IncomingItem,
            section_scope: &[RequirementItem],
        ) -> Result<MatchVerdict, AiError> {
            if self.outage {
                return Err(AiError::NotAvailable);
            }
            if self.fail_match.contains(&item.content) {
                return Err(AiError::CliExecFailed("scripted failure".to_string()));
            }
            if self.time_out_match.contains(&item.content) {
                return Err(AiError::Timeout(120));
            }
            match self.matches.get(&item.content) {
                Some((id, similarity)) => {
                    let existing = section_scope
                        .iter()
                        .find(|c| c.id == *id)
                        .ok_or(AiError::MatchOutOfScope(*id))?;
                    Ok(MatchVerdict::Matched {
                        item: existing.clone(),
                        similarity: *similarity,
                    })
                }
                None => Ok(MatchVerdict::NoMatch),
            }
        }

        fn classify_conflict(
            &self,
            new_content: &str,
            _existing_content: &str,
        ) -> Result<ConflictClassification, AiError> {
            if self.outage {
                return Err(AiError::NotAvailable);
            }
            if self.fail_classify.contains(new_content) {
                return Err(AiError::CliExecFailed("scripted failure".to_string()));
            }
            let label = self
                .labels
                .get(new_content)
                .copied()
                .unwrap_or(ConflictLabel::Refinement);
            Ok(ConflictClassification::new(
                label,
                "scripted rationale".to_string(),
            ))
        }

        fn suggest_merge(
            &self,
            existing_content: &str,
            new_content: &str,
        ) -> Result<String, AiError> {
            if self.outage {
                return Err(AiError::NotAvailable);
            }
            Ok(format!("{} + {}", existing_content, new_content))
        }
    }

    pub(crate) fn canonical_item(section: Section, content: &str, order: u32) -> RequirementItem {
        RequirementItem::new(section, content.to_string(), order)
    }

    fn sequential(service: &dyn SemanticService) -> Planner<'_> {
        Planner::with_config(service, PlannerConfig { max_concurrency: 1 })
    }

    #[test]
    fn test_plan_partitions_every_item_once() {
        let existing_dup = canonical_item(Section::Problems, "Exports time out", 1);
        let existing_overlap = canonical_item(Section::Constraints, "Must support SSO", 1);
        let canonical = vec![existing_dup.clone(), existing_overlap.clone()];

        let fresh = IncomingItem::new(Section::UserGoals, "One-click exports".to_string());
        let dup = IncomingItem::new(Section::Problems, "Exports time out".to_string());
        let overlap =
            IncomingItem::new(Section::Constraints, "Must support SSO via SAML".to_string());
        let items = vec![fresh.clone(), dup.clone(), overlap.clone()];

        let mut service = ScriptedService::default();
        service.matches.insert(
            dup.content.clone(),
            (existing_dup.id, Similarity::ExactDuplicate),
        );
        service.matches.insert(
            overlap.content.clone(),
            (existing_overlap.id, Similarity::Overlapping),
        );
        service
            .labels
            .insert(overlap.content.clone(), ConflictLabel::Refinement);

        let plan = sequential(&service)
            .plan(Uuid::new_v4(), &items, &canonical)
            .unwrap();

        // Total and disjoint partition
        assert_eq!(plan.total_items(), items.len());
        for item in &items {
            let buckets = [
                plan.added.iter().any(|i| i.id == item.id),
                plan.skipped.iter().any(|s| s.item.id == item.id),
                plan.conflicts.iter().any(|c| c.item.id == item.id),
            ];
            assert_eq!(buckets.iter().filter(|b| **b).count(), 1);
        }

        assert_eq!(plan.added[0].id, fresh.id);
        assert_eq!(plan.skipped[0].matched.id, existing_dup.id);
        let conflict = &plan.conflicts[0];
        assert_eq!(conflict.matched.as_ref().unwrap().id, existing_overlap.id);
        assert_eq!(
            conflict.classification.as_ref().unwrap().label,
            ConflictLabel::Refinement
        );
    }

    #[test]
    fn test_matching_is_section_scoped() {
        // Identical content in a different section must not match
        let existing = canonical_item(Section::Problems, "Latency is too high", 1);
        let item =
            IncomingItem::new(Section::RisksAssumptions, "Latency is too high".to_string());
        let mut service = ScriptedService::default();
        service.matches.insert(
            item.content.clone(),
            (existing.id, Similarity::ExactDuplicate),
        );

        let plan = sequential(&service)
            .plan(Uuid::new_v4(), std::slice::from_ref(&item), &[existing])
            .unwrap();
        // The matcher is never given out-of-section items; the scripted match
        // cannot resolve and the scripted service errors, degrading the item
        // to a manual-review conflict.
        assert_eq!(plan.conflicts.len(), 1);
        assert!(plan.conflicts[0].matched.is_none());
    }

    #[test]
    fn test_skip_reasons_name_duplicate_kind() {
        let exact = canonical_item(Section::DataNeeds, "Daily active users", 1);
        let semantic = canonical_item(Section::DataNeeds, "Retention curves", 2);
        let canonical = vec![exact.clone(), semantic.clone()];

        let a = IncomingItem::new(Section::DataNeeds, "Daily active users".to_string());
        let b = IncomingItem::new(Section::DataNeeds, "Curves of user retention".to_string());

        let mut service = ScriptedService::default();
        service
            .matches
            .insert(a.content.clone(), (exact.id, Similarity::ExactDuplicate));
        service.matches.insert(
            b.content.clone(),
            (semantic.id, Similarity::SemanticDuplicate),
        );

        let plan = sequential(&service)
            .plan(Uuid::new_v4(), &[a, b], &canonical)
            .unwrap();
        assert_eq!(plan.skipped.len(), 2);
        assert!(plan.skipped[0].reason.contains("Exact duplicate"));
        assert!(plan.skipped[1].reason.contains("Semantic duplicate"));
        assert_eq!(plan.skipped[0].similarity, Similarity::ExactDuplicate);
        assert_eq!(plan.skipped[1].similarity, Similarity::SemanticDuplicate);
    }

    #[test]
    fn test_classifier_failure_degrades_single_item() {
        let existing = canonical_item(Section::Constraints, "Runs on postgres", 1);
        let overlap = IncomingItem::new(Section::Constraints, "Runs on postgres 16".to_string());
        let fresh = IncomingItem::new(Section::Constraints, "Budget capped at 50k".to_string());

        let mut service = ScriptedService::default();
        service.matches.insert(
            overlap.content.clone(),
            (existing.id, Similarity::Overlapping),
        );
        service.fail_classify.insert(overlap.content.clone());

        let plan = sequential(&service)
            .plan(
                Uuid::new_v4(),
                &[overlap.clone(), fresh.clone()],
                std::slice::from_ref(&existing),
            )
            .unwrap();

        // The failing item becomes a manual-review conflict; the rest of the
        // plan is unaffected.
        assert_eq!(plan.conflicts.len(), 1);
        assert!(plan.conflicts[0].needs_manual_review());
        assert_eq!(
            plan.conflicts[0].matched.as_ref().unwrap().id,
            existing.id
        );
        assert_eq!(plan.added.len(), 1);
        assert_eq!(plan.added[0].id, fresh.id);
    }

    #[test]
    fn test_matcher_failure_degrades_single_item() {
        let item = IncomingItem::new(Section::OpenQuestions, "Who owns billing?".to_string());
        let mut service = ScriptedService::default();
        service.fail_match.insert(item.content.clone());

        let plan = sequential(&service)
            .plan(Uuid::new_v4(), std::slice::from_ref(&item), &[])
            .unwrap();
        assert_eq!(plan.conflicts.len(), 1);
        assert!(plan.conflicts[0].matched.is_none());
        assert!(plan.conflicts[0].needs_manual_review());
    }

    #[test]
    fn test_match_timeout_degrades_single_item() {
        let slow = IncomingItem::new(Section::Problems, "Imports hang overnight".to_string());
        let fresh = IncomingItem::new(Section::Problems, "Exports drop rows".to_string());
        let mut service = ScriptedService::default();
        service.time_out_match.insert(slow.content.clone());

        let plan = sequential(&service)
            .plan(Uuid::new_v4(), &[slow.clone(), fresh.clone()], &[])
            .unwrap();

        // The timed-out item lands in manual review; the rest of the plan
        // proceeds normally.
        assert_eq!(plan.conflicts.len(), 1);
        assert_eq!(plan.conflicts[0].item.id, slow.id);
        assert!(plan.conflicts[0].matched.is_none());
        assert!(plan.conflicts[0].needs_manual_review());
        assert_eq!(plan.added.len(), 1);
        assert_eq!(plan.added[0].id, fresh.id);
    }

    #[test]
    fn test_full_outage_aborts_planning() {
        let item = IncomingItem::new(Section::Problems, "anything".to_string());
        let service = ScriptedService {
            outage: true,
            ..Default::default()
        };
        let err = sequential(&service)
            .plan(Uuid::new_v4(), std::slice::from_ref(&item), &[])
            .unwrap_err();
        assert!(matches!(err, ReconcileError::External(_)));
    }

    #[test]
    fn test_plan_preserves_input_order_under_concurrency() {
        let items: Vec<IncomingItem> = (0..32)
            .map(|n| IncomingItem::new(Section::ActionItems, format!("task {:02}", n)))
            .collect();
        let service = ScriptedService::default();
        let planner =
            Planner::with_config(&service, PlannerConfig { max_concurrency: 8 });
        let plan = planner.plan(Uuid::new_v4(), &items, &[]).unwrap();
        assert_eq!(plan.added.len(), items.len());
        for (got, want) in plan.added.iter().zip(items.iter()) {
            assert_eq!(got.id, want.id);
        }
    }

    #[test]
    fn test_plan_is_deterministic() {
        let existing = canonical_item(Section::Problems, "Search is slow", 1);
        let items = vec![
            IncomingItem::new(Section::Problems, "Search is slow on mobile".to_string()),
            IncomingItem::new(Section::Problems, "Crashes on logout".to_string()),
        ];
        let mut service = ScriptedService::default();
        service.matches.insert(
            items[0].content.clone(),
            (existing.id, Similarity::Overlapping),
        );

        let planner = sequential(&service);
        let meeting = Uuid::new_v4();
        let first = planner
            .plan(meeting, &items, std::slice::from_ref(&existing))
            .unwrap();
        let second = planner
            .plan(meeting, &items, std::slice::from_ref(&existing))
            .unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_empty_meeting_yields_empty_plan() {
        let service = ScriptedService::default();
        let plan = sequential(&service).plan(Uuid::new_v4(), &[], &[]).unwrap();
        assert!(plan.is_empty());
    }
}
