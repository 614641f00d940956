//! Integration tests for the provider router
//!
//! Failover, retry and policy behavior against scripted adapters.

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use forge_engine::llm::registry::{ProviderRegistry, ProviderSpec};
use forge_engine::llm::router::{ProviderRouter, RetrySettings, RoutingPolicy};
use forge_engine::llm::{
    Capability, ProviderAdapter, ProviderError, ProviderRequest, ProviderResponse,
};

enum Step {
    Fail(ProviderError),
    Hang,
}

/// Plays its script one call at a time, then answers "ok"
struct ScriptedProvider {
    name: String,
    script: Vec<Step>,
    calls: AtomicUsize,
}

impl ScriptedProvider {
    fn new(name: &str, script: Vec<Step>) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            script,
            calls: AtomicUsize::new(0),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ProviderAdapter for ScriptedProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn model(&self) -> &str {
        "scripted"
    }

    async fn invoke(&self, _request: &ProviderRequest) -> forge_engine::llm::Result<ProviderResponse> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        match self.script.get(call) {
            Some(Step::Fail(err)) => Err(err.clone()),
            Some(Step::Hang) => {
                tokio::time::sleep(Duration::from_secs(30)).await;
                Ok(ProviderResponse::new(&self.name, "scripted", "too late"))
            }
            None => Ok(ProviderResponse::new(&self.name, "scripted", "ok")),
        }
    }
}

fn settings() -> RetrySettings {
    RetrySettings {
        max_attempts_per_provider: 2,
        backoff_base: Duration::from_millis(1),
        backoff_max: Duration::from_millis(5),
        request_timeout: Duration::from_millis(100),
    }
}

fn router(providers: Vec<(ProviderSpec, Arc<ScriptedProvider>)>) -> ProviderRouter {
    let mut registry = ProviderRegistry::new();
    for (spec, adapter) in providers {
        let adapter: Arc<dyn ProviderAdapter> = adapter;
        registry.register(spec, adapter);
    }
    ProviderRouter::with_settings(Arc::new(registry), settings())
}

#[tokio::test]
async fn test_auth_failure_falls_through_to_baseline() {
    let openai = ScriptedProvider::new(
        "openai",
        vec![Step::Fail(ProviderError::Auth("invalid key".into()))],
    );
    let router = router(vec![(ProviderSpec::new("openai", 70).paid(true), openai.clone())]);

    let (response, outcome) = router
        .route(&ProviderRequest::text("hello"), &RoutingPolicy::default())
        .await;

    assert_eq!(openai.calls(), 1, "auth errors are not retried");
    assert_eq!(outcome.attempts_for("openai"), 1);
    assert_eq!(outcome.attempts_for("baseline"), 1);
    assert_eq!(outcome.total_attempts(), 2);
    assert_eq!(outcome.attempts[0].error_kind.as_deref(), Some("auth"));
    assert!(outcome.used_baseline());
    assert_eq!(response.provider, "baseline");
    assert!(response.fallback);
}

#[tokio::test]
async fn test_timeout_then_success_stays_on_provider() {
    let groq = ScriptedProvider::new("groq", vec![Step::Hang]);
    let router = router(vec![(ProviderSpec::new("groq", 50), groq.clone())]);

    let (response, outcome) = router
        .route(&ProviderRequest::code("fn main"), &RoutingPolicy::default())
        .await;

    assert_eq!(groq.calls(), 2);
    assert_eq!(outcome.total_attempts(), 2);
    assert_eq!(outcome.attempts[0].error_kind.as_deref(), Some("timeout"));
    assert!(outcome.attempts[1].success);
    assert!(!outcome.used_baseline());
    assert_eq!(response.provider, "groq");
    assert_eq!(response.content, "ok");
}

#[tokio::test]
async fn test_request_timeout_overrides_settings() {
    let slow = ScriptedProvider::new("mistral", vec![Step::Hang, Step::Hang]);
    let router = router(vec![(ProviderSpec::new("mistral", 60), slow.clone())]);

    let request = ProviderRequest::text("hi").with_timeout(Duration::from_millis(20));
    let started = std::time::Instant::now();
    let (response, outcome) = router.route(&request, &RoutingPolicy::default()).await;

    assert!(started.elapsed() < Duration::from_secs(5));
    assert_eq!(outcome.attempts_for("mistral"), 2);
    assert_eq!(response.provider, "baseline");
}

#[tokio::test]
async fn test_failover_follows_priority() {
    let high = ScriptedProvider::new(
        "openai",
        vec![
            Step::Fail(ProviderError::Unavailable("502".into())),
            Step::Fail(ProviderError::Unavailable("502".into())),
        ],
    );
    let low = ScriptedProvider::new("groq", vec![]);
    let router = router(vec![
        (ProviderSpec::new("groq", 50), low.clone()),
        (ProviderSpec::new("openai", 70), high.clone()),
    ]);

    let (response, outcome) = router
        .route(&ProviderRequest::text("hi"), &RoutingPolicy::default())
        .await;

    assert_eq!(high.calls(), 2);
    assert_eq!(low.calls(), 1);
    assert_eq!(response.provider, "groq");
    assert_eq!(
        outcome
            .attempts
            .iter()
            .map(|a| a.provider.as_str())
            .collect::<Vec<_>>(),
        vec!["openai", "openai", "groq"]
    );
}

#[tokio::test]
async fn test_free_only_never_calls_paid_provider() {
    let paid = ScriptedProvider::new("openai", vec![]);
    let free = ScriptedProvider::new("hf", vec![]);
    let router = router(vec![
        (ProviderSpec::new("openai", 70).paid(true), paid.clone()),
        (ProviderSpec::new("hf", 20), free.clone()),
    ]);

    let (response, _) = router
        .route(&ProviderRequest::text("hi"), &RoutingPolicy::free_only())
        .await;

    assert_eq!(paid.calls(), 0);
    assert_eq!(response.provider, "hf");
}

#[tokio::test]
async fn test_unavailable_and_incapable_providers_are_skipped() {
    let missing_key = ScriptedProvider::new("gemini", vec![]);
    let text_only = ScriptedProvider::new("perplexity", vec![]);
    let router = router(vec![
        (ProviderSpec::new("gemini", 60).available(false), missing_key.clone()),
        (
            ProviderSpec::new("perplexity", 40).with_capabilities(vec![Capability::Text]),
            text_only.clone(),
        ),
    ]);

    let (response, outcome) = router
        .route(&ProviderRequest::code("fn main"), &RoutingPolicy::default())
        .await;

    assert_eq!(missing_key.calls(), 0);
    assert_eq!(text_only.calls(), 0);
    assert_eq!(outcome.total_attempts(), 1);
    assert_eq!(response.provider, "baseline");
}

#[tokio::test]
async fn test_provider_filter_limits_candidates() {
    let openai = ScriptedProvider::new("openai", vec![]);
    let groq = ScriptedProvider::new("groq", vec![]);
    let router = router(vec![
        (ProviderSpec::new("openai", 70), openai.clone()),
        (ProviderSpec::new("groq", 50), groq.clone()),
    ]);

    let policy = RoutingPolicy::default().with_filter(vec!["groq".to_string()]);
    let (response, _) = router.route(&ProviderRequest::text("hi"), &policy).await;

    assert_eq!(openai.calls(), 0);
    assert_eq!(response.provider, "groq");
}

#[tokio::test]
async fn test_preference_does_not_outrank_priority() {
    let openai = ScriptedProvider::new("openai", vec![]);
    let gemini = ScriptedProvider::new("gemini", vec![]);
    let router = router(vec![
        (ProviderSpec::new("openai", 70), openai.clone()),
        (ProviderSpec::new("gemini", 40), gemini.clone()),
    ]);

    let request = ProviderRequest::text("requirements").prefer("gemini");
    let (response, outcome) = router.route(&request, &RoutingPolicy::default()).await;

    assert_eq!(response.provider, "openai");
    assert_eq!(outcome.total_attempts(), 1);
    assert_eq!(gemini.calls(), 0);
}

#[tokio::test]
async fn test_preference_picks_between_equal_priorities() {
    let mistral = ScriptedProvider::new("mistral", vec![]);
    let gemini = ScriptedProvider::new("gemini", vec![]);
    let router = router(vec![
        (ProviderSpec::new("mistral", 40), mistral.clone()),
        (ProviderSpec::new("gemini", 40), gemini.clone()),
    ]);

    let (response, _) = router
        .route(
            &ProviderRequest::text("docs").prefer("gemini"),
            &RoutingPolicy::default(),
        )
        .await;
    assert_eq!(response.provider, "gemini");

    // Without a preference, declaration order breaks the tie
    let (response, _) = router
        .route(&ProviderRequest::text("docs"), &RoutingPolicy::default())
        .await;
    assert_eq!(response.provider, "mistral");
    assert_eq!(mistral.calls(), 1);
    assert_eq!(gemini.calls(), 1);
}
