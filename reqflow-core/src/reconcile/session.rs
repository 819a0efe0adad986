//! Resolution Session
//!
//! The user's in-progress set of per-conflict decisions for one apply plan.
//! Held as a plain serializable value rather than screen-local state, so it
//! can be unit-tested, saved to disk while the user steps away, and resumed.

use crate::models::{ApplyPlan, Conflict, ItemDecision, ResolutionDecision, Similarity};
use crate::reconcile::ReconcileError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Decision state for one apply plan's conflicts.
///
/// Only conflicts need explicit decisions; added and skipped items resolve
/// implicitly. Commit is legal only once `is_complete()` holds.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ResolutionSession {
    plan: ApplyPlan,
    decisions: HashMap<Uuid, ResolutionDecision>,
}

impl ResolutionSession {
    pub fn new(plan: ApplyPlan) -> Self {
        Self {
            plan,
            decisions: HashMap::new(),
        }
    }

    pub fn plan(&self) -> &ApplyPlan {
        &self.plan
    }

    /// Record the user's decision for one conflicting item.
    ///
    /// Rejects decisions for non-conflict items, non-conflict decision kinds,
    /// merge decisions without text, and replace/merge decisions on conflicts
    /// that have no matched item to overwrite. On rejection the conflict's
    /// previous state is untouched.
    pub fn set_decision(
        &mut self,
        item_id: Uuid,
        decision: ResolutionDecision,
    ) -> Result<(), ReconcileError> {
        let conflict = self.plan.conflict(item_id).ok_or_else(|| {
            ReconcileError::Validation(format!(
                "item {} is not a conflict in this plan",
                item_id
            ))
        })?;

        if !decision.is_conflict_resolution() {
            return Err(ReconcileError::Validation(format!(
                "decision '{}' cannot resolve a conflict",
                decision
            )));
        }

        if let ResolutionDecision::ConflictMerged { merged_text } = &decision {
            if merged_text.trim().is_empty() {
                return Err(ReconcileError::Validation(
                    "merge decision requires non-empty merge text".to_string(),
                ));
            }
        }

        if conflict.matched.is_none()
            && matches!(
                decision,
                ResolutionDecision::ConflictReplaced | ResolutionDecision::ConflictMerged { .. }
            )
        {
            return Err(ReconcileError::Validation(
                "conflict has no matched item to replace or merge into".to_string(),
            ));
        }

        self.decisions.insert(item_id, decision);
        Ok(())
    }

    /// Remove a previously made decision; the conflict becomes unresolved
    pub fn clear_decision(&mut self, item_id: Uuid) -> bool {
        self.decisions.remove(&item_id).is_some()
    }

    pub fn decision_for(&self, item_id: Uuid) -> Option<&ResolutionDecision> {
        self.decisions.get(&item_id)
    }

    /// Accept the AI recommendation for every still-unresolved conflict that
    /// has one. Decisions the user already made are never overwritten, and
    /// unclassified conflicts stay unresolved. Returns how many decisions
    /// were filled in.
    pub fn bulk_accept_recommended(&mut self) -> usize {
        let mut filled = 0;
        for conflict in &self.plan.conflicts {
            if self.decisions.contains_key(&conflict.item.id) {
                continue;
            }
            if let Some(classification) = &conflict.classification {
                self.decisions
                    .insert(conflict.item.id, classification.recommended_decision.clone());
                filled += 1;
            }
        }
        filled
    }

    /// Conflicts that still need a decision, in plan order
    pub fn unresolved(&self) -> Vec<&Conflict> {
        self.plan
            .conflicts
            .iter()
            .filter(|c| !self.decisions.contains_key(&c.item.id))
            .collect()
    }

    /// True once every conflict has a decision; the non-conflict buckets are
    /// always implicitly complete
    pub fn is_complete(&self) -> bool {
        self.plan
            .conflicts
            .iter()
            .all(|c| self.decisions.contains_key(&c.item.id))
    }

    /// The full decision list covering every plan item, for the applier.
    /// Fails while any conflict is unresolved.
    pub fn to_decision_list(&self) -> Result<Vec<ItemDecision>, ReconcileError> {
        let unresolved = self.unresolved().len();
        if unresolved > 0 {
            return Err(ReconcileError::IncompleteResolution { unresolved });
        }

        let mut list = Vec::with_capacity(self.plan.total_items());
        for item in &self.plan.added {
            list.push(ItemDecision {
                item_id: item.id,
                decision: ResolutionDecision::Added,
            });
        }
        for skipped in &self.plan.skipped {
            let decision = match skipped.similarity {
                Similarity::ExactDuplicate => ResolutionDecision::SkippedDuplicate,
                Similarity::SemanticDuplicate | Similarity::Overlapping => {
                    ResolutionDecision::SkippedSemantic
                }
            };
            list.push(ItemDecision {
                item_id: skipped.item.id,
                decision,
            });
        }
        for conflict in &self.plan.conflicts {
            // Unwrap is safe: completeness was checked above
            let decision = self.decisions[&conflict.item.id].clone();
            list.push(ItemDecision {
                item_id: conflict.item.id,
                decision,
            });
        }
        Ok(list)
    }
}
