//! Prompt Templates for AI Operations
//!
//! This module builds structured prompts for semantic matching, conflict
//! classification and merge suggestion, with section context from the
//! canonical store.

use crate::models::{IncomingItem, RequirementItem};

/// Longest canonical content shown in a section summary, in characters
const SUMMARY_CONTENT_CHARS: usize = 200;

/// Shorten content for the section summary, cutting on a char boundary
fn truncate_content(content: &str) -> String {
    match content.char_indices().nth(SUMMARY_CONTENT_CHARS) {
        Some((cut, _)) => format!("{}...", &content[..cut]),
        None => content.to_string(),
    }
}

/// Build a summary of the section's canonical items for comparison
fn build_section_summary(scope: &[RequirementItem]) -> String {
    let summaries: Vec<String> = scope
        .iter()
        .map(|item| format!("- {}: {}", item.id, truncate_content(&item.content)))
        .collect();

    format!(
        "## Existing Items in Section (for comparison)\n{}",
        summaries.join("\n")
    )
}

/// Build prompt for matching an incoming item against its section
pub fn build_match_prompt(item: &IncomingItem, scope: &[RequirementItem]) -> String {
    let section_summary = build_section_summary(scope);
    let quote_context = match &item.source_quote {
        Some(quote) => format!("\nSource quote from the meeting: \"{}\"", quote),
        None => String::new(),
    };

    format!(
        r#"You are comparing a newly extracted requirement item against the existing items of the same section.

## New Item ({})
{}{}

{}

Decide whether the new item duplicates or overlaps one existing item:
- "exact_duplicate": identical statement of the same requirement
- "semantic_duplicate": same requirement in different words
- "overlapping": covers the same subject but says something different
- "none": no existing item covers this subject

Pick at most one existing item - the closest. Respond with JSON only:

```json
{{
  "matched_id": "<uuid of the matched item, or null>",
  "similarity": "none|exact_duplicate|semantic_duplicate|overlapping"
}}
```"#,
        item.section, item.content, quote_context, section_summary
    )
}

/// Build prompt for classifying an overlapping pair
pub fn build_classify_prompt(new_content: &str, existing_content: &str) -> String {
    format!(
        r#"Two requirement items overlap but are not duplicates.

## Existing Item
{}

## New Item
{}

Classify the relationship:
- "refinement": the new item adds detail or precision without contradicting the existing one
- "contradiction": the new item is incompatible with the existing one

Respond with JSON only:

```json
{{
  "label": "refinement|contradiction",
  "rationale": "<one or two sentences explaining the classification>"
}}
```"#,
        existing_content, new_content
    )
}

/// Build prompt for suggesting merge text for a conflict pair
pub fn build_merge_prompt(existing_content: &str, new_content: &str) -> String {
    format!(
        r#"Merge these two requirement statements into one that preserves the intent of both.

## Existing Item
{}

## New Item
{}

Write a single requirement statement. Keep it concise; do not enumerate both versions. Respond with JSON only:

```json
{{
  "merged_text": "<the merged requirement statement>"
}}
```"#,
        existing_content, new_content
    )
}
