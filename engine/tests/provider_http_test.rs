//! HTTP adapter tests against mock servers
//!
//! None of these need network access or real credentials.

use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use wiremock::{
    matchers::{header, method, path, query_param},
    Mock, MockServer, ResponseTemplate,
};

use forge_engine::config::Config;
use forge_engine::llm::gemini::GeminiProvider;
use forge_engine::llm::huggingface::HuggingFaceProvider;
use forge_engine::llm::ollama::OllamaProvider;
use forge_engine::llm::openai_compat::OpenAiCompatProvider;
use forge_engine::llm::registry::ProviderRegistry;
use forge_engine::llm::router::{ProviderRouter, RetrySettings, RoutingPolicy};
use forge_engine::llm::{ProviderAdapter, ProviderError, ProviderRequest};
use forge_engine::secrets::{CredentialStore, SecretString};

const TIMEOUT: Duration = Duration::from_secs(5);

fn chat_completion(content: &str) -> serde_json::Value {
    json!({
        "id": "chatcmpl-1",
        "model": "llama-3.1-8b-instant",
        "choices": [{
            "index": 0,
            "message": { "role": "assistant", "content": content },
            "finish_reason": "stop"
        }]
    })
}

#[tokio::test]
async fn test_openai_compat_success() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(header("Authorization", "Bearer gsk-test"))
        .respond_with(ResponseTemplate::new(200).set_body_json(chat_completion("Hello there")))
        .mount(&server)
        .await;

    let provider = OpenAiCompatProvider::new(
        "groq",
        server.uri(),
        "llama-3.1-8b-instant",
        SecretString::new("gsk-test"),
        TIMEOUT,
    );

    let response = provider
        .invoke(&ProviderRequest::text("hi").with_system("be brief"))
        .await
        .unwrap();
    assert_eq!(response.provider, "groq");
    assert_eq!(response.content, "Hello there");
    assert!(!response.fallback);
}

#[tokio::test]
async fn test_openai_compat_unauthorized_is_auth_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(401).set_body_string("invalid api key"))
        .mount(&server)
        .await;

    let provider = OpenAiCompatProvider::new(
        "openai",
        server.uri(),
        "gpt-4o-mini",
        SecretString::new("sk-wrong"),
        TIMEOUT,
    );

    let err = provider
        .invoke(&ProviderRequest::text("hi"))
        .await
        .unwrap_err();
    assert!(matches!(err, ProviderError::Auth(_)));
    assert!(!err.is_transient());
}

#[tokio::test]
async fn test_openai_compat_server_error_is_unavailable() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let provider = OpenAiCompatProvider::new(
        "mistral",
        server.uri(),
        "mistral-small-latest",
        SecretString::new("key"),
        TIMEOUT,
    );

    let err = provider
        .invoke(&ProviderRequest::text("hi"))
        .await
        .unwrap_err();
    assert!(matches!(err, ProviderError::Unavailable(_)));
    assert!(err.is_transient());
}

#[tokio::test]
async fn test_openai_compat_missing_choices_is_malformed() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "choices": [] })))
        .mount(&server)
        .await;

    let provider = OpenAiCompatProvider::new(
        "perplexity",
        server.uri(),
        "sonar",
        SecretString::new("key"),
        TIMEOUT,
    );

    let err = provider
        .invoke(&ProviderRequest::text("hi"))
        .await
        .unwrap_err();
    assert!(matches!(err, ProviderError::MalformedResponse(_)));
}

#[tokio::test]
async fn test_gemini_joins_candidate_parts() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/models/gemini-1.5-flash:generateContent"))
        .and(query_param("key", "g-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "candidates": [{
                "content": { "parts": [{ "text": "# Title\n" }, { "text": "Body" }] }
            }]
        })))
        .mount(&server)
        .await;

    let provider = GeminiProvider::new(
        server.uri(),
        "gemini-1.5-flash",
        SecretString::new("g-key"),
        TIMEOUT,
    );

    let response = provider
        .invoke(&ProviderRequest::text("docs"))
        .await
        .unwrap();
    assert_eq!(response.provider, "gemini");
    assert_eq!(response.content, "# Title\nBody");
}

#[tokio::test]
async fn test_huggingface_list_response() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/bigcode/starcoder2-15b"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!([{ "generated_text": "def add(a, b):\n    return a + b" }])),
        )
        .mount(&server)
        .await;

    let provider = HuggingFaceProvider::new(
        server.uri(),
        "bigcode/starcoder2-15b",
        SecretString::new("hf_test"),
        TIMEOUT,
    );

    let response = provider
        .invoke(&ProviderRequest::code("add two numbers"))
        .await
        .unwrap();
    assert_eq!(response.provider, "hf");
    assert!(response.content.contains("return a + b"));
}

#[tokio::test]
async fn test_ollama_generate() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/generate"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "model": "codellama",
            "response": "print('hi')",
            "done": true
        })))
        .mount(&server)
        .await;

    let provider = OllamaProvider::new(server.uri(), "codellama", TIMEOUT);
    let response = provider
        .invoke(&ProviderRequest::code("say hi"))
        .await
        .unwrap();

    assert_eq!(response.provider, "ollama");
    assert_eq!(response.content, "print('hi')");
}

#[tokio::test]
async fn test_ollama_connection_refused_is_unavailable() {
    // Nothing listens on port 9 in the test environment
    let provider = OllamaProvider::new("http://127.0.0.1:9", "codellama", TIMEOUT);

    let err = provider
        .invoke(&ProviderRequest::text("hi"))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ProviderError::Unavailable(_) | ProviderError::Timeout(_)
    ));
}

#[tokio::test]
async fn test_rate_limit_retried_through_router() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(429).set_body_string("slow down"))
        .up_to_n_times(1)
        .with_priority(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(chat_completion("second time")))
        .mount(&server)
        .await;

    let mut config = Config::default();
    config.providers.groq.base_url = server.uri();
    let credentials = CredentialStore::from_pairs([(config.providers.groq.api_key_env.clone(), "gsk-test")]);
    let registry = ProviderRegistry::from_config(&config.providers, &credentials, TIMEOUT);

    let router = ProviderRouter::with_settings(
        Arc::new(registry),
        RetrySettings {
            max_attempts_per_provider: 2,
            backoff_base: Duration::from_millis(1),
            backoff_max: Duration::from_millis(5),
            request_timeout: TIMEOUT,
        },
    );

    let (response, outcome) = router
        .route(&ProviderRequest::text("hi"), &RoutingPolicy::default())
        .await;

    assert_eq!(response.provider, "groq");
    assert_eq!(response.content, "second time");
    assert_eq!(outcome.attempts_for("groq"), 2);
    assert_eq!(outcome.attempts[0].error_kind.as_deref(), Some("rate_limited"));
    assert!(!outcome.used_baseline());
}
