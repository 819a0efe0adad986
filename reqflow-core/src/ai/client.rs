//! AI Client Module
//!
//! Handles communication with Claude via CLI or direct API, and defines the
//! `SemanticService` seam the reconciliation planner consumes.

use crate::ai::prompts;
use crate::ai::responses;
use crate::models::{ConflictClassification, IncomingItem, MatchVerdict, RequirementItem};
use std::io::Read;
use std::path::PathBuf;
use std::process::{Child, Command, ExitStatus, Output, Stdio};
use std::time::{Duration, Instant};
use thiserror::Error;
use uuid::Uuid;

/// Upper bound on one CLI round trip. A hung subprocess is killed and the
/// call reported as `AiError::Timeout`, which the planner treats as a
/// single-item failure rather than an outage.
const CLI_TIMEOUT: Duration = Duration::from_secs(120);

/// Errors that can occur during AI operations
#[derive(Error, Debug)]
pub enum AiError {
    #[error("Claude CLI not found at {0}")]
    CliNotFound(PathBuf),

    #[error("Claude CLI execution failed: {0}")]
    CliExecFailed(String),

    #[error("API key missing")]
    ApiKeyMissing,

    #[error("API request failed: {0}")]
    ApiRequestFailed(String),

    #[error("Invalid response from AI: {0}")]
    InvalidResponse(String),

    #[error("Rate limited - please wait before retrying")]
    RateLimited,

    #[error("Claude CLI timed out after {0} seconds")]
    Timeout(u64),

    #[error("Matched item {0} is outside the section scope")]
    MatchOutOfScope(Uuid),

    #[error("AI integration not available")]
    NotAvailable,
}

impl AiError {
    /// True when the whole service is down (as opposed to one request
    /// failing); planning aborts instead of degrading per-item.
    pub fn is_outage(&self) -> bool {
        matches!(self, AiError::NotAvailable | AiError::ApiKeyMissing)
    }
}

/// The external semantic capability the reconciliation engine depends on.
///
/// Implementations must be usable from the planner's worker threads, hence
/// the `Send + Sync` bound.
pub trait SemanticService: Send + Sync {
    /// Find the best match for one incoming item among the canonical items
    /// of the same section. `section_scope` is already restricted to that
    /// section; implementations must never return an item outside it.
    fn match_item(
        &self,
        item: &IncomingItem,
        section_scope: &[RequirementItem],
    ) -> Result<MatchVerdict, AiError>;

    /// Label an overlapping pair as refinement or contradiction
    fn classify_conflict(
        &self,
        new_content: &str,
        existing_content: &str,
    ) -> Result<ConflictClassification, AiError>;

    /// Suggest merge text for a conflict pair; advisory only, the user edits
    /// it before commit
    fn suggest_merge(&self, existing_content: &str, new_content: &str) -> Result<String, AiError>;
}

/// AI operation mode
#[derive(Debug, Clone)]
pub enum AiMode {
    /// Use Claude CLI with --print flag
    ClaudeCli { path: PathBuf },
    /// Direct API integration (future)
    DirectApi { api_key: String },
    /// AI features disabled
    Disabled,
}

impl Default for AiMode {
    fn default() -> Self {
        AiMode::Disabled
    }
}

/// AI Client for interacting with Claude
#[derive(Debug, Clone)]
pub struct AiClient {
    mode: AiMode,
}

impl Default for AiClient {
    fn default() -> Self {
        Self::new()
    }
}

impl AiClient {
    /// Create a new AI client with auto-detected mode
    pub fn new() -> Self {
        let mode = Self::detect_mode();
        Self { mode }
    }

    /// Create a client with a specific mode
    pub fn with_mode(mode: AiMode) -> Self {
        Self { mode }
    }

    /// Detect the best available AI mode
    fn detect_mode() -> AiMode {
        // Try to find claude CLI
        if let Some(path) = Self::find_claude_cli() {
            return AiMode::ClaudeCli { path };
        }

        // Could check for API key in environment
        if let Ok(api_key) = std::env::var("ANTHROPIC_API_KEY") {
            if !api_key.is_empty() {
                return AiMode::DirectApi { api_key };
            }
        }

        AiMode::Disabled
    }

    /// Find the claude CLI executable
    fn find_claude_cli() -> Option<PathBuf> {
        // Common locations to check
        let candidates = [
            // In PATH
            "claude",
            // npm global install locations
            "/usr/local/bin/claude",
            "/usr/bin/claude",
        ];

        // First check if 'claude' is in PATH
        if let Ok(output) = Command::new("which").arg("claude").output() {
            if output.status.success() {
                let path_str = String::from_utf8_lossy(&output.stdout);
                let path = PathBuf::from(path_str.trim());
                if path.exists() {
                    return Some(path);
                }
            }
        }

        // Check common locations
        for candidate in candidates {
            let path = PathBuf::from(candidate);
            if path.exists() {
                return Some(path);
            }
        }

        // Check home directory npm global
        if let Ok(home) = std::env::var("HOME") {
            let npm_global = PathBuf::from(home).join(".npm-global/bin/claude");
            if npm_global.exists() {
                return Some(npm_global);
            }
        }

        None
    }

    /// Check if AI features are available
    pub fn is_available(&self) -> bool {
        match &self.mode {
            AiMode::ClaudeCli { path } => path.exists(),
            AiMode::DirectApi { api_key } => !api_key.is_empty(),
            AiMode::Disabled => false,
        }
    }

    /// Get the current mode
    pub fn mode(&self) -> &AiMode {
        &self.mode
    }

    /// Get a description of the current mode
    pub fn mode_description(&self) -> String {
        match &self.mode {
            AiMode::ClaudeCli { path } => format!("Claude CLI ({})", path.display()),
            AiMode::DirectApi { .. } => "Direct API".to_string(),
            AiMode::Disabled => "Disabled".to_string(),
        }
    }

    /// Send a request to the AI
    fn send_request(&self, prompt: &str) -> Result<String, AiError> {
        match &self.mode {
            AiMode::ClaudeCli { path } => self.send_cli_request(path, prompt),
            AiMode::DirectApi { api_key: _ } => {
                // Future: implement direct API
                Err(AiError::NotAvailable)
            }
            AiMode::Disabled => Err(AiError::NotAvailable),
        }
    }

    /// Send request via Claude CLI
    fn send_cli_request(&self, cli_path: &PathBuf, prompt: &str) -> Result<String, AiError> {
        // Use --print flag for non-interactive output
        // Use -p flag to pass the prompt
        let mut command = Command::new(cli_path);
        command.arg("--print").arg("-p").arg(prompt);
        let output = run_with_deadline(&mut command, CLI_TIMEOUT)?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(AiError::CliExecFailed(format!(
                "Exit code: {:?}, stderr: {}",
                output.status.code(),
                stderr
            )));
        }

        let response = String::from_utf8_lossy(&output.stdout).to_string();

        if response.is_empty() {
            return Err(AiError::InvalidResponse("Empty response from CLI".to_string()));
        }

        Ok(response)
    }
}

/// Run a command but kill it once the deadline passes.
///
/// Pipes are drained on their own threads so a chatty child never blocks on
/// a full pipe while we poll for exit.
fn run_with_deadline(command: &mut Command, timeout: Duration) -> Result<Output, AiError> {
    let mut child = command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| AiError::CliExecFailed(e.to_string()))?;

    let stdout_pipe = child.stdout.take();
    let stderr_pipe = child.stderr.take();
    let stdout_reader = std::thread::spawn(move || drain_pipe(stdout_pipe));
    let stderr_reader = std::thread::spawn(move || drain_pipe(stderr_pipe));

    let status = match wait_with_deadline(&mut child, timeout)? {
        Some(status) => status,
        None => {
            let _ = child.kill();
            let _ = child.wait();
            return Err(AiError::Timeout(timeout.as_secs()));
        }
    };

    Ok(Output {
        status,
        stdout: stdout_reader.join().unwrap_or_default(),
        stderr: stderr_reader.join().unwrap_or_default(),
    })
}

fn drain_pipe(pipe: Option<impl Read>) -> Vec<u8> {
    let mut buf = Vec::new();
    if let Some(mut pipe) = pipe {
        let _ = pipe.read_to_end(&mut buf);
    }
    buf
}

fn wait_with_deadline(child: &mut Child, timeout: Duration) -> Result<Option<ExitStatus>, AiError> {
    let deadline = Instant::now() + timeout;
    loop {
        match child.try_wait() {
            Ok(Some(status)) => return Ok(Some(status)),
            Ok(None) if Instant::now() >= deadline => return Ok(None),
            Ok(None) => std::thread::sleep(Duration::from_millis(25)),
            Err(e) => {
                let _ = child.kill();
                return Err(AiError::CliExecFailed(e.to_string()));
            }
        }
    }
}

impl SemanticService for AiClient {
    fn match_item(
        &self,
        item: &IncomingItem,
        section_scope: &[RequirementItem],
    ) -> Result<MatchVerdict, AiError> {
        if section_scope.is_empty() {
            return Ok(MatchVerdict::NoMatch);
        }

        // Exact content equality never needs an AI roundtrip
        let needle = item.content.trim();
        if let Some(existing) = section_scope.iter().find(|c| c.content.trim() == needle) {
            return Ok(MatchVerdict::Matched {
                item: existing.clone(),
                similarity: crate::models::Similarity::ExactDuplicate,
            });
        }

        let prompt = prompts::build_match_prompt(item, section_scope);
        let response = self.send_request(&prompt)?;
        responses::parse_match_response(&response)?.into_verdict(section_scope)
    }

    fn classify_conflict(
        &self,
        new_content: &str,
        existing_content: &str,
    ) -> Result<ConflictClassification, AiError> {
        let prompt = prompts::build_classify_prompt(new_content, existing_content);
        let response = self.send_request(&prompt)?;
        responses::parse_classify_response(&response)?.into_classification()
    }

    fn suggest_merge(&self, existing_content: &str, new_content: &str) -> Result<String, AiError> {
        let prompt = prompts::build_merge_prompt(existing_content, new_content);
        let response = self.send_request(&prompt)?;
        let merged = responses::parse_merge_response(&response)?.merged_text;
        if merged.trim().is_empty() {
            return Err(AiError::InvalidResponse(
                "Empty merge suggestion".to_string(),
            ));
        }
        Ok(merged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Section, Similarity};

    #[test]
    fn test_mode_detection() {
        let client = AiClient::new();
        // Just ensure it doesn't panic
        let _ = client.is_available();
        let _ = client.mode_description();
    }

    #[test]
    fn test_disabled_mode() {
        let client = AiClient::with_mode(AiMode::Disabled);
        assert!(!client.is_available());
        assert_eq!(client.mode_description(), "Disabled");
    }

    #[test]
    fn test_disabled_mode_reports_outage() {
        let client = AiClient::with_mode(AiMode::Disabled);
        let item = IncomingItem::new(Section::Problems, "new problem".to_string());
        let scope = vec![RequirementItem::new(
            Section::Problems,
            "old problem".to_string(),
            1,
        )];
        let err = client.match_item(&item, &scope).unwrap_err();
        assert!(err.is_outage());
    }

    #[test]
    fn test_exact_duplicate_short_circuits() {
        // Matches by literal content without any AI mode available
        let client = AiClient::with_mode(AiMode::Disabled);
        let existing = RequirementItem::new(
            Section::Constraints,
            "Must run on-prem".to_string(),
            1,
        );
        let item = IncomingItem::new(Section::Constraints, "Must run on-prem  ".to_string());
        let verdict = client.match_item(&item, &[existing.clone()]).unwrap();
        match verdict {
            MatchVerdict::Matched { item, similarity } => {
                assert_eq!(item.id, existing.id);
                assert_eq!(similarity, Similarity::ExactDuplicate);
            }
            MatchVerdict::NoMatch => panic!("expected exact duplicate"),
        }
    }

    #[test]
    fn test_deadline_kills_hung_subprocess() {
        let start = Instant::now();
        let err =
            run_with_deadline(Command::new("sleep").arg("30"), Duration::from_millis(200))
                .unwrap_err();
        assert!(matches!(err, AiError::Timeout(_)));
        // A timeout is a single-request failure, not a service outage
        assert!(!err.is_outage());
        assert!(start.elapsed() < Duration::from_secs(10));
    }

    #[test]
    fn test_deadline_passes_through_fast_command() {
        let output =
            run_with_deadline(Command::new("echo").arg("hello"), Duration::from_secs(30))
                .unwrap();
        assert!(output.status.success());
        assert_eq!(String::from_utf8_lossy(&output.stdout).trim(), "hello");
    }

    #[test]
    fn test_empty_scope_is_no_match() {
        let client = AiClient::with_mode(AiMode::Disabled);
        let item = IncomingItem::new(Section::DataNeeds, "usage metrics".to_string());
        assert_eq!(client.match_item(&item, &[]).unwrap(), MatchVerdict::NoMatch);
    }
}
