//! Response Parsing Module
//!
//! Parses JSON responses from AI into structured data types.

use crate::ai::client::AiError;
use crate::models::{
    ConflictClassification, ConflictLabel, MatchVerdict, RequirementItem, Similarity,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Response from the match action
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchResponse {
    pub matched_id: Option<Uuid>,
    pub similarity: String,
}

impl MatchResponse {
    /// Validate the raw response against the section scope it was asked
    /// about, producing a well-formed verdict.
    pub fn into_verdict(self, section_scope: &[RequirementItem]) -> Result<MatchVerdict, AiError> {
        let similarity = match self.similarity.as_str() {
            "none" => return Ok(MatchVerdict::NoMatch),
            "exact_duplicate" => Similarity::ExactDuplicate,
            "semantic_duplicate" => Similarity::SemanticDuplicate,
            "overlapping" => Similarity::Overlapping,
            other => {
                return Err(AiError::InvalidResponse(format!(
                    "Unknown similarity: {}",
                    other
                )))
            }
        };

        let matched_id = self.matched_id.ok_or_else(|| {
            AiError::InvalidResponse(format!(
                "Similarity {} without a matched_id",
                similarity
            ))
        })?;

        // Items never match across sections
        let item = section_scope
            .iter()
            .find(|item| item.id == matched_id)
            .ok_or(AiError::MatchOutOfScope(matched_id))?;

        Ok(MatchVerdict::Matched {
            item: item.clone(),
            similarity,
        })
    }
}

/// Response from the classify action
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifyResponse {
    pub label: String,
    pub rationale: String,
}

impl ClassifyResponse {
    pub fn into_classification(self) -> Result<ConflictClassification, AiError> {
        let label = match self.label.as_str() {
            "refinement" => ConflictLabel::Refinement,
            "contradiction" => ConflictLabel::Contradiction,
            other => {
                return Err(AiError::InvalidResponse(format!(
                    "Unknown conflict label: {}",
                    other
                )))
            }
        };
        Ok(ConflictClassification::new(label, self.rationale))
    }
}

/// Response from the merge suggestion action
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MergeResponse {
    pub merged_text: String,
}

/// Extract JSON from a response that may contain markdown code blocks
fn extract_json(response: &str) -> &str {
    // Look for JSON in markdown code block
    if let Some(start) = response.find("```json") {
        let json_start = start + 7; // Skip "```json"
        if let Some(end) = response[json_start..].find("```") {
            return response[json_start..json_start + end].trim();
        }
    }

    // Look for generic code block
    if let Some(start) = response.find("```") {
        let code_start = start + 3;
        // Skip language identifier if present
        let json_start = if let Some(newline) = response[code_start..].find('\n') {
            code_start + newline + 1
        } else {
            code_start
        };
        if let Some(end) = response[json_start..].find("```") {
            return response[json_start..json_start + end].trim();
        }
    }

    // Try to find JSON object directly
    if let Some(start) = response.find('{') {
        if let Some(end) = response.rfind('}') {
            if end > start {
                return &response[start..=end];
            }
        }
    }

    response.trim()
}

/// Parse match response from AI
pub fn parse_match_response(response: &str) -> Result<MatchResponse, AiError> {
    let json_str = extract_json(response);
    serde_json::from_str(json_str).map_err(|e| {
        AiError::InvalidResponse(format!(
            "Failed to parse match response: {}. JSON: {}",
            e,
            &json_str[..json_str.len().min(200)]
        ))
    })
}

/// Parse classify response from AI
pub fn parse_classify_response(response: &str) -> Result<ClassifyResponse, AiError> {
    let json_str = extract_json(response);
    serde_json::from_str(json_str).map_err(|e| {
        AiError::InvalidResponse(format!(
            "Failed to parse classify response: {}. JSON: {}",
            e,
            &json_str[..json_str.len().min(200)]
        ))
    })
}

/// Parse merge suggestion response from AI
pub fn parse_merge_response(response: &str) -> Result<MergeResponse, AiError> {
    let json_str = extract_json(response);
    serde_json::from_str(json_str).map_err(|e| {
        AiError::InvalidResponse(format!(
            "Failed to parse merge response: {}. JSON: {}",
            e,
            &json_str[..json_str.len().min(200)]
        ))
    })
}
