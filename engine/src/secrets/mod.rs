//! Provider credentials
//!
//! Credentials are read once from environment variables when the engine
//! starts. A missing variable never raises: it only leaves that provider
//! unavailable for routing. Values are wrapped in `SecretString` so they can
//! not leak through `Debug` or `Display`, and provider error text is passed
//! through `scrub_secrets` before it is logged or recorded.

use crate::config::ProvidersConfig;
use regex::Regex;
use std::collections::HashMap;
use std::fmt;
use std::sync::OnceLock;

/// A wrapper for sensitive string data that prevents accidental logging.
///
/// `Debug` and `Display` always print `[REDACTED]`. Use `unsecure()` to
/// read the value when building a request.
#[derive(Clone, PartialEq, Eq)]
pub struct SecretString(String);

impl SecretString {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Access the raw underlying string
    pub fn unsecure(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for SecretString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SecretString([REDACTED])")
    }
}

impl fmt::Display for SecretString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[REDACTED]")
    }
}

/// Credentials keyed by environment variable name
#[derive(Debug, Clone, Default)]
pub struct CredentialStore {
    values: HashMap<String, SecretString>,
}

impl CredentialStore {
    /// A store with no credentials; every external provider is unavailable
    pub fn empty() -> Self {
        Self::default()
    }

    /// Read the credential variable of every configured provider
    pub fn from_env(providers: &ProvidersConfig) -> Self {
        Self::from_lookup(providers, |var| std::env::var(var).ok())
    }

    /// Resolve each provider's credential through `lookup`
    ///
    /// When a provider's own variable is unset, its aliases are tried in
    /// order; the value is stored under the configured name either way.
    pub fn from_lookup<F>(providers: &ProvidersConfig, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut values = HashMap::new();
        for (name, provider) in providers.entries() {
            let var = provider.api_key_env.as_str();
            let found = std::iter::once(var)
                .chain(aliases_of(var).iter().copied())
                .find_map(|candidate| {
                    lookup(candidate)
                        .filter(|value| !value.trim().is_empty())
                        .map(|value| (candidate, value))
                });

            match found {
                Some((source, value)) => {
                    tracing::debug!(provider = name, var = source, "Credential found");
                    values.insert(var.to_string(), SecretString::new(value));
                }
                None => {
                    tracing::debug!(
                        provider = name,
                        var,
                        "Credential not set, provider disabled"
                    );
                }
            }
        }
        Self { values }
    }

    /// Build a store from explicit pairs
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            values: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), SecretString::new(v)))
                .collect(),
        }
    }

    pub fn get(&self, var: &str) -> Option<&SecretString> {
        self.values.get(var)
    }

    pub fn has(&self, var: &str) -> bool {
        self.values.contains_key(var)
    }
}

/// Alternate variable names accepted for a credential
const CREDENTIAL_ALIASES: &[(&str, &[&str])] = &[("V0_API_KEY", &["V0_DEV_API_KEY"])];

fn aliases_of(var: &str) -> &'static [&'static str] {
    CREDENTIAL_ALIASES
        .iter()
        .find(|(primary, _)| *primary == var)
        .map(|(_, aliases)| *aliases)
        .unwrap_or(&[])
}

static SECRET_PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();

/// Patterns for key-shaped substrings
///
/// - OpenAI style keys: sk-...
/// - Google API keys: AIza...
/// - Hugging Face tokens: hf_...
/// - Groq keys: gsk_...
/// - Bearer tokens
/// - `key=` query parameters (Gemini puts the key in the URL)
fn secret_patterns() -> &'static Vec<Regex> {
    SECRET_PATTERNS.get_or_init(|| {
        [
            r"sk-[a-zA-Z0-9\-_]{16,}",
            r"AIza[0-9A-Za-z\-_]{20,}",
            r"hf_[a-zA-Z0-9]{16,}",
            r"gsk_[a-zA-Z0-9]{16,}",
            r"Bearer\s+[^\s]{16,}",
            r"key=[^&\s]+",
        ]
        .iter()
        .filter_map(|p| Regex::new(p).ok())
        .collect()
    })
}

/// Replace anything that looks like a credential with `[REDACTED]`
pub fn scrub_secrets(text: &str) -> String {
    let mut scrubbed = text.to_string();
    for pattern in secret_patterns() {
        scrubbed = pattern.replace_all(&scrubbed, "[REDACTED]").into_owned();
    }
    scrubbed
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_secret_string_redacts() {
        let secret = SecretString::new("sk-very-secret");
        assert_eq!(format!("{}", secret), "[REDACTED]");
        assert_eq!(format!("{:?}", secret), "SecretString([REDACTED])");
        assert_eq!(secret.unsecure(), "sk-very-secret");
    }

    #[test]
    fn test_from_pairs_lookup() {
        let store = CredentialStore::from_pairs([("OPENAI_API_KEY", "sk-test")]);
        assert!(store.has("OPENAI_API_KEY"));
        assert!(!store.has("GROQ_API_KEY"));
        assert_eq!(
            store.get("OPENAI_API_KEY").map(|s| s.unsecure()),
            Some("sk-test")
        );
    }

    #[test]
    fn test_v0_dev_key_is_accepted() {
        let providers = ProvidersConfig::default();
        let store = CredentialStore::from_lookup(&providers, |var| {
            (var == "V0_DEV_API_KEY").then(|| "v0-dev-key".to_string())
        });

        assert_eq!(
            store.get("V0_API_KEY").map(|s| s.unsecure()),
            Some("v0-dev-key")
        );
        assert!(!store.has("V0_DEV_API_KEY"));
        assert!(!store.has("OPENAI_API_KEY"));
    }

    #[test]
    fn test_primary_variable_wins_over_alias() {
        let providers = ProvidersConfig::default();
        let store = CredentialStore::from_lookup(&providers, |var| match var {
            "V0_API_KEY" => Some("primary".to_string()),
            "V0_DEV_API_KEY" => Some("dev".to_string()),
            "GROQ_API_KEY" => Some("   ".to_string()),
            _ => None,
        });

        assert_eq!(store.get("V0_API_KEY").map(|s| s.unsecure()), Some("primary"));
        assert!(!store.has("GROQ_API_KEY"), "blank values do not count");
    }

    #[test]
    fn test_empty_store_has_nothing() {
        let store = CredentialStore::empty();
        for (_, provider) in ProvidersConfig::default().entries() {
            assert!(!store.has(&provider.api_key_env));
        }
    }

    #[test]
    fn test_scrub_openai_key() {
        let text = "invalid key sk-proj-abcdefghijklmnopqrstuv supplied";
        let scrubbed = scrub_secrets(text);
        assert!(!scrubbed.contains("abcdefghijklmnop"));
        assert!(scrubbed.contains("[REDACTED]"));
    }

    #[test]
    fn test_scrub_query_key() {
        let scrubbed = scrub_secrets("GET /v1/models?key=AIzaSyA123&alt=json failed");
        assert!(!scrubbed.contains("AIzaSyA123"));
        assert!(scrubbed.contains("alt=json"));
    }

    #[test]
    fn test_scrub_leaves_plain_text() {
        assert_eq!(scrub_secrets("rate limited"), "rate limited");
    }
}
