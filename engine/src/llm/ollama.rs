//! Ollama Provider
//!
//! Talks to a local Ollama server (typically http://localhost:11434) through
//! the non-streaming `/api/generate` endpoint. No credential is needed; the
//! provider is considered available when `OLLAMA_BASE_URL` is set.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::{
    error_for_status, http_client, ProviderAdapter, ProviderError, ProviderRequest,
    ProviderResponse, Result,
};

#[derive(Debug, Clone)]
pub struct OllamaProvider {
    /// Base URL for the Ollama API
    base_url: String,

    /// Model name (e.g. "codellama")
    model: String,

    client: reqwest::Client,
}

#[derive(Debug, Serialize)]
struct OllamaRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<&'a str>,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct OllamaResponse {
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    response: String,
}

impl OllamaProvider {
    pub fn new(base_url: impl Into<String>, model: impl Into<String>, timeout: Duration) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
            client: http_client(timeout),
        }
    }
}

#[async_trait]
impl ProviderAdapter for OllamaProvider {
    fn name(&self) -> &str {
        "ollama"
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn invoke(&self, request: &ProviderRequest) -> Result<ProviderResponse> {
        let body = OllamaRequest {
            model: &self.model,
            prompt: &request.prompt,
            system: request.system.as_deref(),
            stream: false,
        };

        tracing::debug!(
            model = %self.model,
            prompt_chars = request.prompt.len(),
            "Ollama request"
        );

        let url = format!("{}/api/generate", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ProviderError::Timeout(format!("ollama: {}", e))
                } else if e.is_connect() {
                    ProviderError::Unavailable(format!(
                        "Cannot connect to Ollama at {}. Is Ollama running?",
                        self.base_url
                    ))
                } else {
                    ProviderError::Unavailable(format!("ollama: {}", e))
                }
            })?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let text = response.text().await.unwrap_or_default();
            return Err(error_for_status("ollama", status, &text));
        }

        let parsed: OllamaResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::MalformedResponse(format!("ollama: {}", e)))?;

        if parsed.response.trim().is_empty() {
            return Err(ProviderError::MalformedResponse(
                "ollama: empty response".to_string(),
            ));
        }

        let model = parsed.model.unwrap_or_else(|| self.model.clone());
        Ok(ProviderResponse::new("ollama", model, parsed.response))
    }
}
