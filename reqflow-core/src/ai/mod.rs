//! AI Integration Module for reqflow
//!
//! This module provides the semantic matching, conflict classification and
//! merge-suggestion capabilities behind the reconciliation engine, using
//! Claude Code CLI integration.

pub mod client;
pub mod prompts;
pub mod responses;

pub use client::{AiClient, AiError, AiMode, SemanticService};
pub use responses::{ClassifyResponse, MatchResponse, MergeResponse};
