//! Plan Applier
//!
//! Commits a fully-resolved apply plan against the canonical store. The
//! applier validates the entire decision set before touching the store, so a
//! failed apply never leaves a partial mutation behind. Serializing applies
//! per project is the storage layer's job; the applier itself never assumes
//! it is the only writer.

use crate::models::{
    ApplyCounts, ApplyPlan, HistoryAction, IncomingItem, ItemDecision, ProjectStore,
    RequirementItem, ResolutionDecision,
};
use crate::reconcile::ReconcileError;
use std::collections::HashMap;
use uuid::Uuid;

/// Apply a resolved plan to the store.
///
/// All validation (completeness, decision legality, staleness of matched
/// item references) happens before the first mutation; on any error the
/// store is untouched.
pub fn apply(
    plan: &ApplyPlan,
    decisions: &[ItemDecision],
    store: &mut ProjectStore,
) -> Result<ApplyCounts, ReconcileError> {
    let by_id: HashMap<Uuid, &ResolutionDecision> = decisions
        .iter()
        .map(|d| (d.item_id, &d.decision))
        .collect();

    for decision in decisions {
        if !plan.contains(decision.item_id) {
            return Err(ReconcileError::Validation(format!(
                "decision for item {} which is not in the plan",
                decision.item_id
            )));
        }
    }

    // Every conflict needs a legal conflict resolution before anything runs
    let unresolved = plan
        .conflicts
        .iter()
        .filter(|c| !by_id.contains_key(&c.item.id))
        .count();
    if unresolved > 0 {
        return Err(ReconcileError::IncompleteResolution { unresolved });
    }

    for conflict in &plan.conflicts {
        let decision = by_id[&conflict.item.id];
        if !decision.is_conflict_resolution() {
            return Err(ReconcileError::Validation(format!(
                "conflict {} carries non-conflict decision '{}'",
                conflict.item.id, decision
            )));
        }
        if let ResolutionDecision::ConflictMerged { merged_text } = decision {
            if merged_text.trim().is_empty() {
                return Err(ReconcileError::Validation(format!(
                    "conflict {} has a merge decision with empty text",
                    conflict.item.id
                )));
            }
        }
        match &conflict.matched {
            Some(matched) => check_fresh(store, matched)?,
            None => {
                if matches!(
                    decision,
                    ResolutionDecision::ConflictReplaced
                        | ResolutionDecision::ConflictMerged { .. }
                ) {
                    return Err(ReconcileError::Validation(format!(
                        "conflict {} has no matched item to replace or merge into",
                        conflict.item.id
                    )));
                }
            }
        }
    }
    for skipped in &plan.skipped {
        check_fresh(store, &skipped.matched)?;
    }

    // Validation passed; mutate
    let mut counts = ApplyCounts::default();

    for item in &plan.added {
        insert_incoming(store, item, plan.meeting_id);
        counts.added += 1;
    }

    counts.skipped = plan.skipped.len();

    for conflict in &plan.conflicts {
        match by_id[&conflict.item.id] {
            ResolutionDecision::ConflictKeepExisting => {
                // Incoming item is discarded, matched item untouched
                counts.kept_existing += 1;
            }
            ResolutionDecision::ConflictReplaced => {
                supersede_matched(
                    store,
                    conflict,
                    conflict.item.content.clone(),
                    HistoryAction::Replaced,
                    plan.meeting_id,
                );
                counts.replaced += 1;
            }
            ResolutionDecision::ConflictKeptBoth => {
                insert_incoming(store, &conflict.item, plan.meeting_id);
                counts.kept_both += 1;
            }
            ResolutionDecision::ConflictMerged { merged_text } => {
                supersede_matched(
                    store,
                    conflict,
                    merged_text.clone(),
                    HistoryAction::Merged,
                    plan.meeting_id,
                );
                counts.merged += 1;
            }
            // Excluded by the validation pass above
            other => {
                return Err(ReconcileError::Validation(format!(
                    "conflict {} carries non-conflict decision '{}'",
                    conflict.item.id, other
                )))
            }
        }
    }

    Ok(counts)
}

/// Refuse to apply against a matched item that moved under us
fn check_fresh(store: &ProjectStore, matched: &RequirementItem) -> Result<(), ReconcileError> {
    match store.find_item(matched.id) {
        Some(current) if current.content == matched.content => Ok(()),
        Some(_) => Err(ReconcileError::StaleCanonical(format!(
            "item {} was edited since planning",
            matched.id
        ))),
        None => Err(ReconcileError::StaleCanonical(format!(
            "item {} no longer exists",
            matched.id
        ))),
    }
}

/// Insert an incoming item at the end of its section's order
fn insert_incoming(store: &mut ProjectStore, item: &IncomingItem, meeting_id: Uuid) -> Uuid {
    let mut new_item = RequirementItem::new(item.section, item.content.clone(), 0);
    new_item.source_refs.push(item.source_ref(meeting_id));
    store.push_item(new_item)
}

/// Overwrite the matched item's content as a supersession. Order is left
/// unchanged; the incoming item's provenance is carried onto the survivor.
fn supersede_matched(
    store: &mut ProjectStore,
    conflict: &crate::models::Conflict,
    new_content: String,
    action: HistoryAction,
    meeting_id: Uuid,
) {
    // Matched presence was validated before mutation started
    let matched_id = conflict.matched.as_ref().map(|m| m.id);
    if let Some(item) = matched_id.and_then(|id| store.find_item_mut(id)) {
        item.supersede(new_content, action);
        item.source_refs.push(conflict.item.source_ref(meeting_id));
    }
}

/// Rewrite a section's ordering from a complete permutation of its item ids.
///
/// Fails with no mutation unless `id_order` is exactly the section's current
/// membership: same ids, no omissions, no duplicates, nothing smuggled in
/// from other sections. On success `order` is rewritten densely from 1.
pub fn reorder(
    store: &mut ProjectStore,
    section: crate::models::Section,
    id_order: &[Uuid],
) -> Result<(), ReconcileError> {
    let current: Vec<Uuid> = store
        .items_in_section(section)
        .iter()
        .map(|i| i.id)
        .collect();

    if id_order.len() != current.len() {
        return Err(ReconcileError::Validation(format!(
            "reorder for {} has {} ids but the section has {} items",
            section,
            id_order.len(),
            current.len()
        )));
    }

    let mut seen = std::collections::HashSet::new();
    for id in id_order {
        if !seen.insert(*id) {
            return Err(ReconcileError::Validation(format!(
                "duplicate id {} in reorder",
                id
            )));
        }
        if !current.contains(id) {
            return Err(ReconcileError::Validation(format!(
                "id {} is not in section {}",
                id, section
            )));
        }
    }

    for (idx, id) in id_order.iter().enumerate() {
        if let Some(item) = store.find_item_mut(*id) {
            item.order = idx as u32 + 1;
        }
    }
    Ok(())
}
