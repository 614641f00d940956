//! OpenAI-compatible chat completions adapter
//!
//! OpenAI, Mistral, Groq, Perplexity and v0 all expose the same
//! `POST {base_url}/chat/completions` shape, so one adapter serves them,
//! parameterized by name, base URL and model.

use super::{
    error_for_transport, http_client, json_body, ProviderAdapter, ProviderError, ProviderRequest,
    ProviderResponse,
};
use crate::secrets::SecretString;
use async_trait::async_trait;
use serde_json::json;
use std::time::Duration;

pub struct OpenAiCompatProvider {
    name: String,
    base_url: String,
    model: String,
    api_key: SecretString,
    client: reqwest::Client,
}

impl OpenAiCompatProvider {
    pub fn new(
        name: impl Into<String>,
        base_url: impl Into<String>,
        model: impl Into<String>,
        api_key: SecretString,
        timeout: Duration,
    ) -> Self {
        Self {
            name: name.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
            api_key,
            client: http_client(timeout),
        }
    }
}

#[async_trait]
impl ProviderAdapter for OpenAiCompatProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn invoke(&self, request: &ProviderRequest) -> super::Result<ProviderResponse> {
        let url = format!("{}/chat/completions", self.base_url);

        let mut messages = Vec::new();
        if let Some(system) = &request.system {
            messages.push(json!({ "role": "system", "content": system }));
        }
        messages.push(json!({ "role": "user", "content": request.prompt }));

        let payload = json!({
            "model": self.model,
            "messages": messages,
            "temperature": 0.2,
        });

        let response = self
            .client
            .post(&url)
            .header(
                "Authorization",
                format!("Bearer {}", self.api_key.unsecure()),
            )
            .header("Content-Type", "application/json")
            .json(&payload)
            .send()
            .await
            .map_err(|e| error_for_transport(&self.name, &e))?;

        let data = json_body(&self.name, response).await?;

        let content = data
            .get("choices")
            .and_then(|c| c.as_array())
            .and_then(|c| c.first())
            .and_then(|choice| choice.get("message"))
            .and_then(|message| message.get("content"))
            .and_then(|content| content.as_str())
            .ok_or_else(|| {
                ProviderError::MalformedResponse(format!("{}: no message content", self.name))
            })?;

        if content.trim().is_empty() {
            return Err(ProviderError::MalformedResponse(format!(
                "{}: empty content",
                self.name
            )));
        }

        let model = data
            .get("model")
            .and_then(|m| m.as_str())
            .unwrap_or(&self.model);

        Ok(ProviderResponse::new(&self.name, model, content))
    }
}
