//! Offline baseline provider
//!
//! The last resort of every routing decision. It makes no network calls and
//! produces deterministic templated content from the request alone, so the
//! same request always yields the same response. `generate` is infallible by
//! type; the `ProviderAdapter` impl only wraps it in `Ok`.

use super::{Capability, ProviderAdapter, ProviderRequest, ProviderResponse};
use async_trait::async_trait;

pub const BASELINE_NAME: &str = "baseline";
pub const BASELINE_MODEL: &str = "templated";

/// Marker prefixed to free-form baseline answers
pub const BASELINE_MARKER: &str = "[baseline]";

#[derive(Debug, Clone, Default)]
pub struct BaselineProvider;

impl BaselineProvider {
    pub fn new() -> Self {
        Self
    }

    /// Produce a response for any request
    pub fn generate(&self, request: &ProviderRequest) -> ProviderResponse {
        let subject = request
            .subject
            .as_deref()
            .unwrap_or(&request.prompt)
            .trim();

        let content = match request.file_target.as_deref() {
            Some(target) if target.ends_with("requirements.md") => requirements_doc(subject),
            Some(target) if target.ends_with("design.md") => design_doc(subject),
            Some(target) if target.ends_with("README.md") => readme_doc(subject),
            _ => match request.capability {
                Capability::Code => code_comment(request.language.as_deref(), subject),
                Capability::Text | Capability::Vision => {
                    format!("{} You asked: {}", BASELINE_MARKER, subject)
                }
            },
        };

        let mut response = ProviderResponse::new(BASELINE_NAME, BASELINE_MODEL, content);
        response.fallback = true;
        response
    }
}

#[async_trait]
impl ProviderAdapter for BaselineProvider {
    fn name(&self) -> &str {
        BASELINE_NAME
    }

    fn model(&self) -> &str {
        BASELINE_MODEL
    }

    async fn invoke(&self, request: &ProviderRequest) -> super::Result<ProviderResponse> {
        Ok(self.generate(request))
    }
}

fn title_for(subject: &str) -> String {
    let title: String = subject.chars().take(64).collect();
    if title.is_empty() {
        "Project".to_string()
    } else {
        title
    }
}

fn code_comment(language: Option<&str>, subject: &str) -> String {
    let prefix = match language.unwrap_or("") {
        "python" | "py" | "yaml" | "toml" | "shell" => "#",
        "html" | "xml" => "<!--",
        _ => "//",
    };
    let suffix = if prefix == "<!--" { " -->" } else { "" };
    format!(
        "{} {} You asked: {}{}\n",
        prefix, BASELINE_MARKER, subject, suffix
    )
}

fn requirements_doc(subject: &str) -> String {
    format!(
        "# Requirements: {title}\n\
         \n\
         > {marker} Generated offline from the task description.\n\
         \n\
         ## Description\n\
         \n\
         {subject}\n\
         \n\
         ## Modules\n\
         \n\
         - Auth\n\
         - Core\n\
         \n\
         ## Stack\n\
         \n\
         - Frontend: React, TailwindCSS\n\
         - Backend: FastAPI, SQLite\n\
         \n\
         ## Features\n\
         \n\
         - CRUD for the main entities\n\
         - Search\n\
         - User roles\n\
         \n\
         ## Deployment\n\
         \n\
         Docker + GitHub Actions\n",
        title = title_for(subject),
        marker = BASELINE_MARKER,
        subject = subject,
    )
}

fn design_doc(subject: &str) -> String {
    format!(
        "# Design: {title}\n\
         \n\
         > {marker} Generated offline from the task description.\n\
         \n\
         ## Architecture\n\
         \n\
         ```mermaid\n\
         flowchart LR\n\
         \x20 UI[React frontend] -->|HTTP/JSON| API[FastAPI backend]\n\
         \x20 API --> DB[(SQLite)]\n\
         ```\n\
         \n\
         ## Components\n\
         \n\
         - `frontend/`: Vite + React + Tailwind single page app\n\
         - `backend/`: FastAPI app exposing `/health` and CRUD routes\n\
         - `tests/`: pytest smoke tests\n\
         \n\
         ## API\n\
         \n\
         | Method | Path | Purpose |\n\
         |---|---|---|\n\
         | GET | /health | Liveness check |\n",
        title = title_for(subject),
        marker = BASELINE_MARKER,
    )
}

fn readme_doc(subject: &str) -> String {
    format!(
        "# {title}\n\
         \n\
         {subject}\n\
         \n\
         ## Setup\n\
         \n\
         ```bash\n\
         python -m venv .venv && source .venv/bin/activate\n\
         pip install -r backend/requirements.txt\n\
         ```\n\
         \n\
         ## Run\n\
         \n\
         ```bash\n\
         uvicorn backend.main:app --host 0.0.0.0 --port 8000\n\
         cd frontend && npm install && npm run dev\n\
         ```\n\
         \n\
         ## Test\n\
         \n\
         ```bash\n\
         pytest -q\n\
         ```\n\
         \n\
         ## Deploy\n\
         \n\
         ```bash\n\
         docker compose up --build\n\
         ```\n",
        title = title_for(subject),
        subject = subject,
    )
}
