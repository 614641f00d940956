//! Hugging Face Inference API adapter
//!
//! Calls `POST {base_url}/{model}` with a text-generation payload. The API
//! answers either with a list of `{ "generated_text": ... }` objects or a
//! single object, depending on the model's pipeline.

use super::{
    error_for_transport, http_client, json_body, ProviderAdapter, ProviderError, ProviderRequest,
    ProviderResponse,
};
use crate::secrets::SecretString;
use async_trait::async_trait;
use serde_json::json;
use std::time::Duration;

pub struct HuggingFaceProvider {
    base_url: String,
    model: String,
    api_key: SecretString,
    client: reqwest::Client,
}

impl HuggingFaceProvider {
    pub fn new(
        base_url: impl Into<String>,
        model: impl Into<String>,
        api_key: SecretString,
        timeout: Duration,
    ) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
            api_key,
            client: http_client(timeout),
        }
    }

    fn generated_text(data: &serde_json::Value) -> Option<&str> {
        let item = match data.as_array() {
            Some(items) => items.first()?,
            None => data,
        };
        item.get("generated_text").and_then(|t| t.as_str())
    }
}

#[async_trait]
impl ProviderAdapter for HuggingFaceProvider {
    fn name(&self) -> &str {
        "hf"
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn invoke(&self, request: &ProviderRequest) -> super::Result<ProviderResponse> {
        let url = format!("{}/{}", self.base_url, self.model);

        let inputs = match &request.system {
            Some(system) => format!("{}\n\n{}", system, request.prompt),
            None => request.prompt.clone(),
        };

        let payload = json!({
            "inputs": inputs,
            "parameters": {
                "max_new_tokens": 1024,
                "temperature": 0.3,
                "return_full_text": false,
            },
        });

        let response = self
            .client
            .post(&url)
            .header(
                "Authorization",
                format!("Bearer {}", self.api_key.unsecure()),
            )
            .json(&payload)
            .send()
            .await
            .map_err(|e| error_for_transport("hf", &e))?;

        let data = json_body("hf", response).await?;

        let text = Self::generated_text(&data)
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| {
                ProviderError::MalformedResponse("hf: no generated_text in response".to_string())
            })?;

        Ok(ProviderResponse::new("hf", &self.model, text))
    }
}
