use anyhow::Result;
use colored::Colorize;
use inquire::{Confirm, Select};

use reqflow_core::{Conflict, ResolutionDecision, SemanticService};

/// The choices offered for one conflict
const CHOICE_RECOMMENDED: &str = "Accept recommendation";
const CHOICE_KEEP: &str = "Keep existing item";
const CHOICE_REPLACE: &str = "Replace with incoming item";
const CHOICE_BOTH: &str = "Keep both items";
const CHOICE_MERGE: &str = "Merge (edit suggested text)";
const CHOICE_SKIP: &str = "Decide later";

/// Print a conflict pair the way the review screen shows it
pub fn print_conflict(conflict: &Conflict, index: usize, total: usize) {
    println!();
    println!(
        "{}",
        format!("Conflict {}/{}", index + 1, total).bold().underline()
    );
    match &conflict.matched {
        Some(matched) => {
            println!("  {} {}", "existing:".cyan(), matched.content);
            println!("  {} {}", "incoming:".yellow(), conflict.item.content);
        }
        None => {
            println!("  {} {}", "incoming:".yellow(), conflict.item.content);
            println!("  {}", "matcher failed - no existing item identified".red());
        }
    }
    match &conflict.classification {
        Some(classification) => {
            println!(
                "  {} {} - {}",
                "ai:".green(),
                classification.label,
                classification.rationale
            );
        }
        None => println!("  {} {}", "ai:".red(), reqflow_core::MANUAL_REVIEW_NOTE),
    }
}

/// Prompt for one conflict's resolution.
///
/// Returns None when the user defers the decision. Merge decisions fetch a
/// suggestion from the AI and let the user edit it before accepting.
pub fn prompt_conflict_decision(
    conflict: &Conflict,
    service: &dyn SemanticService,
) -> Result<Option<ResolutionDecision>> {
    let mut options = Vec::new();
    if conflict.classification.is_some() {
        options.push(CHOICE_RECOMMENDED);
    }
    options.push(CHOICE_KEEP);
    if conflict.matched.is_some() {
        options.push(CHOICE_REPLACE);
    }
    options.push(CHOICE_BOTH);
    if conflict.matched.is_some() {
        options.push(CHOICE_MERGE);
    }
    options.push(CHOICE_SKIP);

    let choice = Select::new("Resolution:", options).prompt()?;

    let decision = match choice {
        CHOICE_RECOMMENDED => conflict
            .classification
            .as_ref()
            .map(|c| c.recommended_decision.clone()),
        CHOICE_KEEP => Some(ResolutionDecision::ConflictKeepExisting),
        CHOICE_REPLACE => Some(ResolutionDecision::ConflictReplaced),
        CHOICE_BOTH => Some(ResolutionDecision::ConflictKeptBoth),
        CHOICE_MERGE => prompt_merge_text(conflict, service)?,
        _ => None,
    };
    Ok(decision)
}

/// Fetch a merge suggestion and let the user edit it
fn prompt_merge_text(
    conflict: &Conflict,
    service: &dyn SemanticService,
) -> Result<Option<ResolutionDecision>> {
    let existing = match &conflict.matched {
        Some(matched) => matched.content.as_str(),
        None => return Ok(None),
    };

    let suggestion = match service.suggest_merge(existing, &conflict.item.content) {
        Ok(text) => text,
        Err(e) => {
            println!("{} {}", "merge suggestion unavailable:".red(), e);
            String::new()
        }
    };

    // Use the Editor type for multiline input, seeded with the suggestion
    let merged_text = inquire::Editor::new("Merged text:")
        .with_predefined_text(&suggestion)
        .prompt()?;

    if merged_text.trim().is_empty() {
        println!("{}", "Empty merge text - conflict left unresolved".yellow());
        return Ok(None);
    }

    Ok(Some(ResolutionDecision::ConflictMerged { merged_text }))
}

/// Yes/no confirmation with a default of no
pub fn confirm(message: &str) -> Result<bool> {
    Ok(Confirm::new(message).with_default(false).prompt()?)
}
