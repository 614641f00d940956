//! Provider Router
//!
//! Chooses which provider answers a request and absorbs every provider
//! failure. Candidates are the available providers that support the requested
//! capability and pass the routing policy, ranked by descending priority with
//! declaration order as the tie-break. Each candidate gets a bounded number of
//! attempts; transient errors are retried with exponential backoff and
//! non-transient ones move on to the next candidate immediately. When every
//! candidate is exhausted the baseline answers, so `route` always returns a
//! response.

use super::registry::{ProviderRegistry, ProviderSpec, RegisteredProvider};
use super::{ProviderError, ProviderRequest, ProviderResponse};
use crate::config::RouterConfig;
use crate::secrets::scrub_secrets;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Per-request routing constraints
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct RoutingPolicy {
    /// Exclude providers that need paid credentials
    #[serde(default)]
    pub free_only: bool,

    /// Restrict routing to these provider names (the baseline is always kept)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub providers_filter: Option<Vec<String>>,
}

impl RoutingPolicy {
    pub fn free_only() -> Self {
        Self {
            free_only: true,
            providers_filter: None,
        }
    }

    pub fn with_filter(mut self, names: Vec<String>) -> Self {
        self.providers_filter = if names.is_empty() { None } else { Some(names) };
        self
    }

    /// Whether a spec may be routed to under this policy
    pub fn allows(&self, spec: &ProviderSpec) -> bool {
        if spec.is_baseline() {
            return true;
        }
        if self.free_only && spec.paid {
            return false;
        }
        match &self.providers_filter {
            Some(names) => names.iter().any(|n| n == &spec.name),
            None => true,
        }
    }
}

/// One adapter call made while routing a request
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RoutingAttempt {
    pub provider: String,

    /// 1-based attempt number against this provider
    pub attempt: u32,

    pub success: bool,

    /// Error category (`timeout`, `auth`, ...) when the attempt failed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<String>,

    /// Scrubbed error message when the attempt failed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    pub latency_ms: u64,
}

impl RoutingAttempt {
    fn succeeded(provider: &str, attempt: u32, latency_ms: u64) -> Self {
        Self {
            provider: provider.to_string(),
            attempt,
            success: true,
            error_kind: None,
            error: None,
            latency_ms,
        }
    }

    fn failed(provider: &str, attempt: u32, err: &ProviderError, latency_ms: u64) -> Self {
        Self {
            provider: provider.to_string(),
            attempt,
            success: false,
            error_kind: Some(err.kind().to_string()),
            error: Some(scrub_secrets(&err.to_string())),
            latency_ms,
        }
    }
}

/// Every attempt made for one request, ending in exactly one success
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RoutingOutcome {
    pub attempts: Vec<RoutingAttempt>,
}

impl RoutingOutcome {
    /// Number of attempts made against a provider
    pub fn attempts_for(&self, provider: &str) -> usize {
        self.attempts
            .iter()
            .filter(|a| a.provider == provider)
            .count()
    }

    /// The successful attempt
    pub fn final_attempt(&self) -> Option<&RoutingAttempt> {
        self.attempts.last().filter(|a| a.success)
    }

    pub fn used_baseline(&self) -> bool {
        self.final_attempt()
            .map(|a| a.provider == super::baseline::BASELINE_NAME)
            .unwrap_or(false)
    }

    pub fn total_attempts(&self) -> u32 {
        self.attempts.len() as u32
    }
}

/// Retry and timeout settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetrySettings {
    pub max_attempts_per_provider: u32,
    pub backoff_base: Duration,
    pub backoff_max: Duration,
    pub request_timeout: Duration,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self::from(&RouterConfig::default())
    }
}

impl From<&RouterConfig> for RetrySettings {
    fn from(config: &RouterConfig) -> Self {
        Self {
            max_attempts_per_provider: config.max_attempts_per_provider.max(1),
            backoff_base: Duration::from_millis(config.backoff_base_ms),
            backoff_max: Duration::from_millis(config.backoff_max_ms),
            request_timeout: Duration::from_secs(config.request_timeout_secs),
        }
    }
}

impl RetrySettings {
    /// Delay before the retry that follows failed attempt `attempt` (1-based)
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let factor = 1u32
            .checked_shl(attempt.saturating_sub(1))
            .unwrap_or(u32::MAX);
        self.backoff_base
            .saturating_mul(factor)
            .min(self.backoff_max)
    }
}

pub struct ProviderRouter {
    registry: Arc<ProviderRegistry>,
    settings: RetrySettings,
}

impl ProviderRouter {
    pub fn new(registry: Arc<ProviderRegistry>, config: &RouterConfig) -> Self {
        Self::with_settings(registry, RetrySettings::from(config))
    }

    pub fn with_settings(registry: Arc<ProviderRegistry>, settings: RetrySettings) -> Self {
        Self { registry, settings }
    }

    pub fn registry(&self) -> &ProviderRegistry {
        &self.registry
    }

    pub fn settings(&self) -> &RetrySettings {
        &self.settings
    }

    /// Ranked external candidates for a request (the baseline is not included)
    ///
    /// Descending priority decides the order. Among equal priorities, providers
    /// named in `request.preferred` come first in the order given, then the
    /// rest in declaration order (`sort_by_key` is stable).
    pub fn candidates(
        &self,
        request: &ProviderRequest,
        policy: &RoutingPolicy,
    ) -> Vec<&RegisteredProvider> {
        let mut candidates: Vec<&RegisteredProvider> = self
            .registry
            .providers()
            .iter()
            .filter(|p| {
                p.spec.is_available()
                    && p.spec.supports(request.capability)
                    && policy.allows(&p.spec)
            })
            .collect();

        candidates.sort_by_key(|c| {
            let preference = request
                .preferred
                .iter()
                .position(|name| name == &c.spec.name)
                .unwrap_or(usize::MAX);
            (std::cmp::Reverse(c.spec.priority), preference)
        });

        candidates
    }

    /// Route a request to a provider
    ///
    /// Never fails: when every candidate is exhausted the baseline answers and
    /// the outcome ends with its attempt.
    pub async fn route(
        &self,
        request: &ProviderRequest,
        policy: &RoutingPolicy,
    ) -> (ProviderResponse, RoutingOutcome) {
        let mut outcome = RoutingOutcome::default();
        let timeout = request.timeout.unwrap_or(self.settings.request_timeout);
        let max_attempts = self.settings.max_attempts_per_provider.max(1);

        for candidate in self.candidates(request, policy) {
            let name = candidate.spec.name.as_str();

            for attempt in 1..=max_attempts {
                tracing::debug!(
                    provider = name,
                    attempt,
                    capability = %request.capability,
                    timeout_ms = timeout.as_millis() as u64,
                    "Attempting provider"
                );

                let started = Instant::now();
                let result =
                    match tokio::time::timeout(timeout, candidate.adapter.invoke(request)).await {
                        Ok(result) => result,
                        Err(_) => Err(ProviderError::Timeout(format!(
                            "{} did not answer within {}ms",
                            name,
                            timeout.as_millis()
                        ))),
                    };
                let latency_ms = started.elapsed().as_millis() as u64;

                match result {
                    Ok(mut response) => {
                        // Attribution always names the registered provider
                        response.provider = name.to_string();
                        response.latency_ms = latency_ms;
                        response.success = true;
                        response.fallback = false;

                        outcome
                            .attempts
                            .push(RoutingAttempt::succeeded(name, attempt, latency_ms));
                        tracing::info!(
                            provider = name,
                            model = %response.model,
                            attempt,
                            latency_ms,
                            "Provider succeeded"
                        );
                        return (response, outcome);
                    }
                    Err(err) => {
                        let record = RoutingAttempt::failed(name, attempt, &err, latency_ms);
                        tracing::warn!(
                            provider = name,
                            attempt,
                            kind = err.kind(),
                            error = record.error.as_deref().unwrap_or_default(),
                            "Provider attempt failed"
                        );
                        outcome.attempts.push(record);

                        if !err.is_transient() {
                            break;
                        }
                        if attempt < max_attempts {
                            tokio::time::sleep(self.settings.backoff_for(attempt)).await;
                        }
                    }
                }
            }
        }

        let started = Instant::now();
        let mut response = self.registry.baseline().generate(request);
        response.latency_ms = started.elapsed().as_millis() as u64;
        outcome.attempts.push(RoutingAttempt::succeeded(
            &response.provider,
            1,
            response.latency_ms,
        ));

        tracing::info!(
            failed_attempts = outcome.attempts.len() - 1,
            "Answered by baseline"
        );

        (response, outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{Capability, ProviderAdapter};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Fails with the scripted errors in order, then succeeds
    struct ScriptedProvider {
        name: String,
        failures: Vec<ProviderError>,
        calls: AtomicUsize,
    }

    impl ScriptedProvider {
        fn new(name: &str, failures: Vec<ProviderError>) -> Arc<Self> {
            Arc::new(Self {
                name: name.to_string(),
                failures,
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl ProviderAdapter for ScriptedProvider {
        fn name(&self) -> &str {
            &self.name
        }

        fn model(&self) -> &str {
            "mock"
        }

        async fn invoke(&self, _request: &ProviderRequest) -> crate::llm::Result<ProviderResponse> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            match self.failures.get(call) {
                Some(err) => Err(err.clone()),
                None => Ok(ProviderResponse::new(&self.name, "mock", "ok")),
            }
        }
    }

    fn fast_settings() -> RetrySettings {
        RetrySettings {
            max_attempts_per_provider: 2,
            backoff_base: Duration::from_millis(1),
            backoff_max: Duration::from_millis(2),
            request_timeout: Duration::from_secs(5),
        }
    }

    fn router_with(providers: Vec<(ProviderSpec, Arc<ScriptedProvider>)>) -> ProviderRouter {
        let mut registry = ProviderRegistry::new();
        for (spec, adapter) in providers {
            let adapter: Arc<dyn ProviderAdapter> = adapter;
            registry.register(spec, adapter);
        }
        ProviderRouter::with_settings(Arc::new(registry), fast_settings())
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let settings = RetrySettings {
            max_attempts_per_provider: 5,
            backoff_base: Duration::from_millis(500),
            backoff_max: Duration::from_millis(4000),
            request_timeout: Duration::from_secs(1),
        };
        assert_eq!(settings.backoff_for(1), Duration::from_millis(500));
        assert_eq!(settings.backoff_for(2), Duration::from_millis(1000));
        assert_eq!(settings.backoff_for(3), Duration::from_millis(2000));
        assert_eq!(settings.backoff_for(5), Duration::from_millis(4000));
        assert_eq!(settings.backoff_for(64), Duration::from_millis(4000));
    }

    #[test]
    fn test_policy_free_only_excludes_paid() {
        let policy = RoutingPolicy::free_only();
        assert!(!policy.allows(&ProviderSpec::new("openai", 70).paid(true)));
        assert!(policy.allows(&ProviderSpec::new("groq", 50)));
        assert!(policy.allows(&ProviderSpec::baseline()));
    }

    #[test]
    fn test_policy_filter_keeps_baseline() {
        let policy = RoutingPolicy::default().with_filter(vec!["groq".to_string()]);
        assert!(policy.allows(&ProviderSpec::new("groq", 50)));
        assert!(!policy.allows(&ProviderSpec::new("openai", 70)));
        assert!(policy.allows(&ProviderSpec::baseline()));
    }

    #[test]
    fn test_candidates_sorted_with_stable_ties() {
        let router = router_with(vec![
            (ProviderSpec::new("a", 10), ScriptedProvider::new("a", vec![])),
            (ProviderSpec::new("b", 50), ScriptedProvider::new("b", vec![])),
            (ProviderSpec::new("c", 10), ScriptedProvider::new("c", vec![])),
            (
                ProviderSpec::new("d", 90).available(false),
                ScriptedProvider::new("d", vec![]),
            ),
        ]);
        let names: Vec<&str> = router
            .candidates(&ProviderRequest::text("x"), &RoutingPolicy::default())
            .iter()
            .map(|c| c.spec.name.as_str())
            .collect();
        assert_eq!(names, vec!["b", "a", "c"]);
    }

    #[test]
    fn test_candidates_filter_by_capability() {
        let router = router_with(vec![
            (
                ProviderSpec::new("vision", 10)
                    .with_capabilities(vec![Capability::Text, Capability::Vision]),
                ScriptedProvider::new("vision", vec![]),
            ),
            (
                ProviderSpec::new("coder", 5),
                ScriptedProvider::new("coder", vec![]),
            ),
        ]);
        let names: Vec<&str> = router
            .candidates(&ProviderRequest::code("x"), &RoutingPolicy::default())
            .iter()
            .map(|c| c.spec.name.as_str())
            .collect();
        assert_eq!(names, vec!["coder"]);
    }

    #[test]
    fn test_preferred_never_outranks_priority() {
        let router = router_with(vec![
            (ProviderSpec::new("high", 90), ScriptedProvider::new("high", vec![])),
            (ProviderSpec::new("low", 10), ScriptedProvider::new("low", vec![])),
        ]);
        let request = ProviderRequest::text("x").prefer("low").prefer("missing");
        let names: Vec<&str> = router
            .candidates(&request, &RoutingPolicy::default())
            .iter()
            .map(|c| c.spec.name.as_str())
            .collect();
        assert_eq!(names, vec!["high", "low"]);
    }

    #[test]
    fn test_preferred_breaks_priority_ties() {
        let router = router_with(vec![
            (ProviderSpec::new("first", 50), ScriptedProvider::new("first", vec![])),
            (ProviderSpec::new("second", 50), ScriptedProvider::new("second", vec![])),
            (ProviderSpec::new("third", 50), ScriptedProvider::new("third", vec![])),
        ]);
        let request = ProviderRequest::text("x").prefer("third");
        let names: Vec<&str> = router
            .candidates(&request, &RoutingPolicy::default())
            .iter()
            .map(|c| c.spec.name.as_str())
            .collect();
        assert_eq!(names, vec!["third", "first", "second"]);
    }

    #[tokio::test]
    async fn test_route_without_providers_uses_baseline() {
        let router = router_with(vec![]);
        let (response, outcome) = router
            .route(&ProviderRequest::text("hi"), &RoutingPolicy::default())
            .await;
        assert_eq!(response.provider, "baseline");
        assert!(response.fallback);
        assert_eq!(outcome.attempts.len(), 1);
        assert!(outcome.used_baseline());
    }

    #[tokio::test]
    async fn test_rate_limit_retries_then_moves_on() {
        let limited = ScriptedProvider::new(
            "limited",
            vec![
                ProviderError::RateLimited("429".into()),
                ProviderError::RateLimited("429".into()),
            ],
        );
        let router = router_with(vec![
            (ProviderSpec::new("limited", 20), limited.clone()),
            (ProviderSpec::new("next", 10), ScriptedProvider::new("next", vec![])),
        ]);

        let (response, outcome) = router
            .route(&ProviderRequest::text("hi"), &RoutingPolicy::default())
            .await;

        assert_eq!(response.provider, "next");
        assert_eq!(outcome.attempts_for("limited"), 2);
        assert_eq!(outcome.attempts_for("next"), 1);
        assert_eq!(limited.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_malformed_response_not_retried() {
        let router = router_with(vec![(
            ProviderSpec::new("broken", 20),
            ScriptedProvider::new(
                "broken",
                vec![ProviderError::MalformedResponse("garbage".into())],
            ),
        )]);

        let (response, outcome) = router
            .route(&ProviderRequest::text("hi"), &RoutingPolicy::default())
            .await;

        assert_eq!(response.provider, "baseline");
        assert_eq!(outcome.attempts_for("broken"), 1);
        assert_eq!(
            outcome.attempts[0].error_kind.as_deref(),
            Some("malformed_response")
        );
    }

    #[tokio::test]
    async fn test_attribution_uses_registered_name() {
        // Adapter reports a different name than the spec it is registered under
        let router = router_with(vec![(
            ProviderSpec::new("mistral", 20),
            ScriptedProvider::new("something-else", vec![]),
        )]);
        let (response, _) = router
            .route(&ProviderRequest::text("hi"), &RoutingPolicy::default())
            .await;
        assert_eq!(response.provider, "mistral");
        assert!(!response.fallback);
    }
}
