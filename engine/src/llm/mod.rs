//! Provider Abstraction Layer
//!
//! This module provides a common interface for the text/code generation
//! backends Forge can route to: OpenAI-compatible chat endpoints (OpenAI,
//! Mistral, Groq, Perplexity, v0), Gemini, Hugging Face inference, a local
//! Ollama server, and the offline baseline. The `ProviderAdapter` trait is the
//! contract every backend implements; the router in `router.rs` is the only
//! caller and owns all retry logic.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use crate::secrets::scrub_secrets;

pub mod baseline;
pub mod gemini;
pub mod huggingface;
pub mod ollama;
pub mod openai_compat;
pub mod registry;
pub mod router;

/// Result type for provider operations
pub type Result<T> = std::result::Result<T, ProviderError>;

/// Errors a provider call can end with
///
/// These never leave the router: it either retries, moves to the next
/// candidate, or answers with the baseline.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProviderError {
    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Rate limited: {0}")]
    RateLimited(String),

    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    #[error("Provider unavailable: {0}")]
    Unavailable(String),
}

impl ProviderError {
    /// Transient errors are retried against the same provider
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ProviderError::Timeout(_) | ProviderError::RateLimited(_) | ProviderError::Unavailable(_)
        )
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ProviderError::Timeout(_) => "timeout",
            ProviderError::Auth(_) => "auth",
            ProviderError::RateLimited(_) => "rate_limited",
            ProviderError::MalformedResponse(_) => "malformed_response",
            ProviderError::Unavailable(_) => "unavailable",
        }
    }
}

/// What a provider can generate
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Capability {
    Text,
    Code,
    Vision,
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Capability::Text => write!(f, "text"),
            Capability::Code => write!(f, "code"),
            Capability::Vision => write!(f, "vision"),
        }
    }
}

/// A single generation request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderRequest {
    /// Full instruction sent to the provider
    pub prompt: String,

    /// Capability the answering provider must have
    pub capability: Capability,

    /// Optional system instruction for chat-style providers
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,

    /// Target language hint (e.g. "python", "jsx")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,

    /// Run-relative file the answer is meant for
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_target: Option<String>,

    /// The user's original task, used by the baseline to fill templates
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,

    /// Providers that win ties between equal priorities, in this order
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub preferred: Vec<String>,

    /// Per-call timeout overriding the router default
    #[serde(skip)]
    pub timeout: Option<Duration>,
}

impl ProviderRequest {
    pub fn new(prompt: impl Into<String>, capability: Capability) -> Self {
        Self {
            prompt: prompt.into(),
            capability,
            system: None,
            language: None,
            file_target: None,
            subject: None,
            preferred: Vec::new(),
            timeout: None,
        }
    }

    pub fn text(prompt: impl Into<String>) -> Self {
        Self::new(prompt, Capability::Text)
    }

    pub fn code(prompt: impl Into<String>) -> Self {
        Self::new(prompt, Capability::Code)
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = Some(language.into());
        self
    }

    pub fn with_file_target(mut self, target: impl Into<String>) -> Self {
        self.file_target = Some(target.into());
        self
    }

    pub fn with_subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = Some(subject.into());
        self
    }

    pub fn prefer(mut self, provider: impl Into<String>) -> Self {
        self.preferred.push(provider.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// A generation result, always attributed to the provider that produced it
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProviderResponse {
    /// Generated text or code
    pub content: String,

    /// Provider that produced the content
    pub provider: String,

    /// Model reported for the call
    pub model: String,

    /// Wall-clock latency of the successful call
    pub latency_ms: u64,

    pub success: bool,

    /// True when the offline baseline produced the content
    pub fallback: bool,
}

impl ProviderResponse {
    pub fn new(
        provider: impl Into<String>,
        model: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            content: content.into(),
            provider: provider.into(),
            model: model.into(),
            latency_ms: 0,
            success: true,
            fallback: false,
        }
    }
}

/// Contract every generation backend implements
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    /// Provider name used for attribution (e.g. "openai", "baseline")
    fn name(&self) -> &str;

    /// Model the provider is configured with
    fn model(&self) -> &str;

    /// Perform one generation call
    ///
    /// Implementations make a single outbound call and map failures onto
    /// `ProviderError`; they never retry.
    async fn invoke(&self, request: &ProviderRequest) -> Result<ProviderResponse>;
}

/// Map a non-success HTTP status onto the provider error taxonomy
///
/// 401/403 are authentication failures, 429 is rate limiting, 408/504 are
/// timeouts, other 4xx mean the provider rejected the request shape, and
/// everything else is treated as the provider being unavailable.
pub(crate) fn error_for_status(provider: &str, status: u16, body: &str) -> ProviderError {
    let detail = format!("{} returned {}: {}", provider, status, truncate(body, 300));
    let detail = scrub_secrets(&detail);
    match status {
        401 | 403 => ProviderError::Auth(detail),
        429 => ProviderError::RateLimited(detail),
        408 | 504 => ProviderError::Timeout(detail),
        400..=499 => ProviderError::MalformedResponse(detail),
        _ => ProviderError::Unavailable(detail),
    }
}

/// Map a transport-level reqwest failure onto the provider error taxonomy
pub(crate) fn error_for_transport(provider: &str, err: &reqwest::Error) -> ProviderError {
    let detail = scrub_secrets(&format!("{}: {}", provider, err));
    if err.is_timeout() {
        ProviderError::Timeout(detail)
    } else if err.is_decode() {
        ProviderError::MalformedResponse(detail)
    } else {
        ProviderError::Unavailable(detail)
    }
}

/// Read the body of a response, turning error statuses into `ProviderError`
pub(crate) async fn json_body(
    provider: &str,
    response: reqwest::Response,
) -> Result<serde_json::Value> {
    let status = response.status();
    if !status.is_success() {
        let text = response.text().await.unwrap_or_default();
        return Err(error_for_status(provider, status.as_u16(), &text));
    }

    response
        .json::<serde_json::Value>()
        .await
        .map_err(|e| ProviderError::MalformedResponse(format!("{}: {}", provider, e)))
}

pub(crate) fn http_client(timeout: Duration) -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .unwrap_or_else(|_| reqwest::Client::new())
}

fn truncate(text: &str, max: usize) -> &str {
    if text.len() <= max {
        return text;
    }
    let mut end = max;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}

/// Parse a generated `{ "relative/path": "file contents", ... }` object.
///
/// Handles the shapes providers actually return:
/// 1. Raw JSON
/// 2. Fenced JSON (with or without trailing prose)
/// 3. JSON embedded in prose, found by scanning for the first balanced object
///
/// Returns `None` when no object with at least one string entry is found.
/// Non-string values are skipped.
pub fn parse_file_map(content: &str) -> Option<BTreeMap<String, String>> {
    let trimmed = content.trim();

    if let Some(map) = try_parse_file_map(trimmed) {
        return Some(map);
    }

    if let Some(inner) = extract_fenced_block(trimmed) {
        if let Some(map) = try_parse_file_map(inner.trim()) {
            return Some(map);
        }
    }

    if let Some(pos) = trimmed.find('{') {
        if let Some(json_str) = extract_balanced_json(&trimmed[pos..]) {
            if let Some(map) = try_parse_file_map(json_str) {
                return Some(map);
            }
        }
    }

    None
}

fn try_parse_file_map(s: &str) -> Option<BTreeMap<String, String>> {
    let json: serde_json::Value = serde_json::from_str(s).ok()?;
    let object = json.as_object()?;
    // Some providers nest the map under a "files" key
    let object = match object.get("files").and_then(|f| f.as_object()) {
        Some(files) => files,
        None => object,
    };

    let map: BTreeMap<String, String> = object
        .iter()
        .filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string())))
        .collect();

    if map.is_empty() {
        None
    } else {
        Some(map)
    }
}

/// Extract the body of the first markdown code fence in the text.
///
/// Works even when there is trailing prose after the closing fence.
pub fn extract_fenced_block(content: &str) -> Option<&str> {
    let fence_start = content.find("```")?;
    let after_opening = &content[fence_start + 3..];

    // Skip the language tag line (e.g. "json\n")
    let body_start_rel = after_opening.find('\n')? + 1;
    let body_start = fence_start + 3 + body_start_rel;

    let closing = content[body_start..].find("```")?;
    let body_end = body_start + closing;

    if body_start >= body_end {
        return None;
    }

    Some(&content[body_start..body_end])
}

/// Extract a balanced JSON object starting at position 0 of `s`.
///
/// Counts `{` / `}` depth, respecting string literals, to find the
/// matching close brace.
fn extract_balanced_json(s: &str) -> Option<&str> {
    if !s.starts_with('{') {
        return None;
    }
    let mut depth = 0i32;
    let mut in_string = false;
    let mut escape_next = false;

    for (i, ch) in s.char_indices() {
        if escape_next {
            escape_next = false;
            continue;
        }
        match ch {
            '\\' if in_string => escape_next = true,
            '"' => in_string = !in_string,
            '{' if !in_string => depth += 1,
            '}' if !in_string => {
                depth -= 1;
                if depth == 0 {
                    return Some(&s[..=i]);
                }
            }
            _ => {}
        }
    }
    None
}
