//! Single-shot dispatch
//!
//! Classifies a prompt, picks the tool that would best serve it, and answers
//! it with one routed provider call instead of a full pipeline run.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::llm::router::{ProviderRouter, RoutingOutcome, RoutingPolicy};
use crate::llm::{ProviderRequest, ProviderResponse};

/// Rough category of what a prompt asks for
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskKind {
    BuildFullstack,
    FrontendOnly,
    BackendOnly,
    CodeSnippet,
    Requirements,
    Predict,
    OtherText,
}

impl TaskKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskKind::BuildFullstack => "BUILD_FULLSTACK",
            TaskKind::FrontendOnly => "FRONTEND_ONLY",
            TaskKind::BackendOnly => "BACKEND_ONLY",
            TaskKind::CodeSnippet => "CODE_SNIPPET",
            TaskKind::Requirements => "REQUIREMENTS",
            TaskKind::Predict => "PREDICT",
            TaskKind::OtherText => "OTHER_TEXT",
        }
    }

    /// Kinds whose answer is code rather than prose
    pub fn wants_code(&self) -> bool {
        matches!(
            self,
            TaskKind::BuildFullstack
                | TaskKind::FrontendOnly
                | TaskKind::BackendOnly
                | TaskKind::CodeSnippet
        )
    }
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// Keyword table, checked in order; the first kind with a hit wins
const KEYWORDS: &[(TaskKind, &[&str])] = &[
    (
        TaskKind::BuildFullstack,
        &["fullstack", "frontend and backend", "end-to-end", "full stack"],
    ),
    (
        TaskKind::FrontendOnly,
        &["frontend only", "ui only", "react", "tailwind", "html", "css"],
    ),
    (
        TaskKind::BackendOnly,
        &["backend only", "api only", "fastapi", "flask", "node", "express"],
    ),
    (
        TaskKind::CodeSnippet,
        &["code snippet", "snippet", "example class", "function only", "method only"],
    ),
    (
        TaskKind::Requirements,
        &["requirements", "spec", "acceptance criteria", "design doc"],
    ),
    (
        TaskKind::Predict,
        &["predict", "classify", "inference", "train", "dataset"],
    ),
];

pub fn classify_prompt(prompt: &str) -> TaskKind {
    let text = prompt.to_lowercase();
    KEYWORDS
        .iter()
        .find(|(_, words)| words.iter().any(|w| text.contains(w)))
        .map(|(kind, _)| *kind)
        .unwrap_or(TaskKind::OtherText)
}

pub const TOOL_V0: &str = "v0";
pub const TOOL_STITCH: &str = "stitch";
pub const TOOL_LOVABLE: &str = "lovable";
pub const TOOL_LOCAL_CODEGEN: &str = "local_codegen";

/// UI work goes to v0 when it is usable; everything else is generated locally
pub fn pick_tool(kind: TaskKind, free_only: bool, v0_available: bool) -> &'static str {
    match kind {
        TaskKind::BuildFullstack | TaskKind::FrontendOnly => {
            if v0_available {
                TOOL_V0
            } else if free_only {
                TOOL_STITCH
            } else {
                TOOL_LOVABLE
            }
        }
        _ => TOOL_LOCAL_CODEGEN,
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchResult {
    pub selected_tool: String,
    pub kind: TaskKind,
    pub result: ProviderResponse,
    pub outcome: RoutingOutcome,
}

/// Classify, pick a tool and answer the prompt with a single routed call
pub async fn dispatch(router: &ProviderRouter, prompt: &str, free_only: bool) -> DispatchResult {
    let kind = classify_prompt(prompt);

    let policy = if free_only {
        RoutingPolicy::free_only()
    } else {
        RoutingPolicy::default()
    };

    let v0_available = router
        .registry()
        .get(TOOL_V0)
        .map(|spec| spec.is_available() && policy.allows(spec))
        .unwrap_or(false);
    let selected_tool = pick_tool(kind, free_only, v0_available);

    let mut request = if kind.wants_code() {
        ProviderRequest::code(prompt)
    } else {
        ProviderRequest::text(prompt)
    };
    if selected_tool == TOOL_V0 {
        request = request.prefer(TOOL_V0);
    }

    tracing::info!(kind = %kind, tool = selected_tool, free_only, "Dispatching prompt");
    let (result, outcome) = router.route(&request, &policy).await;

    DispatchResult {
        selected_tool: selected_tool.to_string(),
        kind,
        result,
        outcome,
    }
}
