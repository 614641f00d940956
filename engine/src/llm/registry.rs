//! Provider registry
//!
//! Built once at startup from the `[providers]` config tables and the
//! credential store, then shared read-only behind an `Arc`. Every enabled
//! provider is registered, including ones whose credential is missing; those
//! stay listed but report unavailable and are never routed to. The baseline
//! is always registered last and always available.

use super::baseline::{BaselineProvider, BASELINE_NAME};
use super::gemini::GeminiProvider;
use super::huggingface::HuggingFaceProvider;
use super::ollama::OllamaProvider;
use super::openai_compat::OpenAiCompatProvider;
use super::{Capability, ProviderAdapter};
use crate::config::{ProviderConfig, ProvidersConfig};
use crate::secrets::{CredentialStore, SecretString};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

/// Wire family of a provider
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    OpenAiCompat,
    Gemini,
    HuggingFace,
    Ollama,
    Baseline,
}

impl ProviderKind {
    pub fn for_name(name: &str) -> Self {
        match name {
            "gemini" => ProviderKind::Gemini,
            "hf" => ProviderKind::HuggingFace,
            "ollama" => ProviderKind::Ollama,
            BASELINE_NAME => ProviderKind::Baseline,
            _ => ProviderKind::OpenAiCompat,
        }
    }
}

/// Static description of one provider
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ProviderSpec {
    pub name: String,
    pub kind: ProviderKind,
    pub capabilities: Vec<Capability>,
    /// Higher is tried first
    pub priority: i32,
    /// Excluded when routing with `free_only`
    pub paid: bool,
    pub model: String,
    /// Credential (or endpoint, for Ollama) was present at startup
    available: bool,
}

impl ProviderSpec {
    pub fn new(name: impl Into<String>, priority: i32) -> Self {
        let name = name.into();
        Self {
            kind: ProviderKind::for_name(&name),
            name,
            capabilities: vec![Capability::Text, Capability::Code],
            priority,
            paid: false,
            model: String::new(),
            available: true,
        }
    }

    /// The designated offline fallback
    pub fn baseline() -> Self {
        Self {
            name: BASELINE_NAME.to_string(),
            kind: ProviderKind::Baseline,
            capabilities: vec![Capability::Text, Capability::Code, Capability::Vision],
            priority: i32::MIN,
            paid: false,
            model: super::baseline::BASELINE_MODEL.to_string(),
            available: true,
        }
    }

    pub fn paid(mut self, paid: bool) -> Self {
        self.paid = paid;
        self
    }

    pub fn with_capabilities(mut self, capabilities: Vec<Capability>) -> Self {
        self.capabilities = capabilities;
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn available(mut self, available: bool) -> Self {
        self.available = available;
        self
    }

    pub fn is_baseline(&self) -> bool {
        self.kind == ProviderKind::Baseline
    }

    /// The baseline reports available regardless of how it was built
    pub fn is_available(&self) -> bool {
        self.is_baseline() || self.available
    }

    pub fn supports(&self, capability: Capability) -> bool {
        self.capabilities.contains(&capability)
    }
}

/// A spec paired with the adapter that serves it
#[derive(Clone)]
pub struct RegisteredProvider {
    pub spec: ProviderSpec,
    pub adapter: Arc<dyn ProviderAdapter>,
}

impl std::fmt::Debug for RegisteredProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegisteredProvider")
            .field("spec", &self.spec)
            .finish()
    }
}

pub struct ProviderRegistry {
    /// External providers in declaration order
    providers: Vec<RegisteredProvider>,
    baseline_spec: ProviderSpec,
    baseline: BaselineProvider,
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ProviderRegistry {
    /// A registry holding only the baseline
    pub fn new() -> Self {
        Self {
            providers: Vec::new(),
            baseline_spec: ProviderSpec::baseline(),
            baseline: BaselineProvider::new(),
        }
    }

    /// Build the registry from config and the credentials found at startup
    pub fn from_config(
        providers: &ProvidersConfig,
        credentials: &CredentialStore,
        request_timeout: Duration,
    ) -> Self {
        let mut registry = Self::new();

        for (name, provider) in providers.entries() {
            if !provider.enabled {
                tracing::debug!(provider = name, "Provider disabled in config");
                continue;
            }

            let credential = credentials.get(&provider.api_key_env).cloned();
            let available = credential.is_some();
            let adapter = build_adapter(name, provider, credential, request_timeout);

            let spec = ProviderSpec::new(name, provider.priority())
                .paid(provider.paid())
                .with_capabilities(capabilities_for(name))
                .with_model(&provider.model)
                .available(available);

            tracing::debug!(
                provider = name,
                priority = spec.priority,
                paid = spec.paid,
                available,
                "Registered provider"
            );

            registry.register(spec, adapter);
        }

        registry
    }

    /// Register an external provider; declaration order is registration order
    ///
    /// A spec claiming the baseline kind is ignored, so the registry always
    /// holds exactly one baseline.
    pub fn register(&mut self, spec: ProviderSpec, adapter: Arc<dyn ProviderAdapter>) {
        if spec.is_baseline() {
            tracing::warn!(provider = %spec.name, "Ignoring second baseline registration");
            return;
        }
        self.providers.push(RegisteredProvider { spec, adapter });
    }

    /// External providers in declaration order
    pub fn providers(&self) -> &[RegisteredProvider] {
        &self.providers
    }

    pub fn baseline(&self) -> &BaselineProvider {
        &self.baseline
    }

    pub fn baseline_spec(&self) -> &ProviderSpec {
        &self.baseline_spec
    }

    /// Every spec, baseline last
    pub fn specs(&self) -> Vec<&ProviderSpec> {
        self.providers
            .iter()
            .map(|p| &p.spec)
            .chain(std::iter::once(&self.baseline_spec))
            .collect()
    }

    pub fn get(&self, name: &str) -> Option<&ProviderSpec> {
        if name == BASELINE_NAME {
            return Some(&self.baseline_spec);
        }
        self.providers
            .iter()
            .find(|p| p.spec.name == name)
            .map(|p| &p.spec)
    }

    pub fn is_available(&self, name: &str) -> bool {
        self.get(name).map(|s| s.is_available()).unwrap_or(false)
    }
}

fn capabilities_for(name: &str) -> Vec<Capability> {
    match name {
        "openai" | "gemini" => vec![Capability::Text, Capability::Code, Capability::Vision],
        _ => vec![Capability::Text, Capability::Code],
    }
}

fn build_adapter(
    name: &str,
    provider: &ProviderConfig,
    credential: Option<SecretString>,
    timeout: Duration,
) -> Arc<dyn ProviderAdapter> {
    // An unavailable provider is never invoked; an empty key keeps the types simple
    let key = credential.clone().unwrap_or_else(|| SecretString::new(""));

    match ProviderKind::for_name(name) {
        ProviderKind::Gemini => Arc::new(GeminiProvider::new(
            &provider.base_url,
            &provider.model,
            key,
            timeout,
        )),
        ProviderKind::HuggingFace => Arc::new(HuggingFaceProvider::new(
            &provider.base_url,
            &provider.model,
            key,
            timeout,
        )),
        ProviderKind::Ollama => {
            // OLLAMA_BASE_URL doubles as the availability signal and the endpoint
            let base_url = credential
                .map(|url| url.unsecure().to_string())
                .unwrap_or_else(|| provider.base_url.clone());
            Arc::new(OllamaProvider::new(base_url, &provider.model, timeout))
        }
        ProviderKind::OpenAiCompat | ProviderKind::Baseline => {
            Arc::new(OpenAiCompatProvider::new(
                name,
                &provider.base_url,
                &provider.model,
                key,
                timeout,
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    fn processed_config() -> Config {
        let mut config = Config::default();
        config.validate_and_process().unwrap();
        config
    }

    #[test]
    fn test_no_credentials_only_baseline_available() {
        let config = processed_config();
        let registry = ProviderRegistry::from_config(
            &config.providers,
            &CredentialStore::empty(),
            Duration::from_secs(5),
        );

        let available: Vec<&str> = registry
            .specs()
            .into_iter()
            .filter(|s| s.is_available())
            .map(|s| s.name.as_str())
            .collect();
        assert_eq!(available, vec!["baseline"]);
    }

    #[test]
    fn test_credential_makes_provider_available() {
        let config = processed_config();
        let credentials = CredentialStore::from_pairs([("GROQ_API_KEY", "gsk_test")]);
        let registry =
            ProviderRegistry::from_config(&config.providers, &credentials, Duration::from_secs(5));

        assert!(registry.is_available("groq"));
        assert!(!registry.is_available("openai"));
        assert_eq!(registry.get("groq").map(|s| s.paid), Some(false));
    }

    #[test]
    fn test_specs_keep_declaration_order_with_baseline_last() {
        let config = processed_config();
        let registry = ProviderRegistry::from_config(
            &config.providers,
            &CredentialStore::empty(),
            Duration::from_secs(5),
        );
        let names: Vec<&str> = registry.specs().iter().map(|s| s.name.as_str()).collect();
        let mut expected: Vec<&str> = ProvidersConfig::NAMES.to_vec();
        expected.push("baseline");
        assert_eq!(names, expected);
    }

    #[test]
    fn test_disabled_provider_not_registered() {
        let mut config = processed_config();
        config.providers.mistral.enabled = false;
        let registry = ProviderRegistry::from_config(
            &config.providers,
            &CredentialStore::empty(),
            Duration::from_secs(5),
        );
        assert!(registry.get("mistral").is_none());
    }

    #[test]
    fn test_second_baseline_is_ignored() {
        let mut registry = ProviderRegistry::new();
        registry.register(
            ProviderSpec::baseline(),
            Arc::new(BaselineProvider::new()),
        );
        assert!(registry.providers().is_empty());
        assert_eq!(registry.specs().len(), 1);
    }

    #[test]
    fn test_baseline_always_available() {
        let spec = ProviderSpec::baseline().available(false);
        assert!(spec.is_available());
    }
}
