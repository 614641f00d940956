//! Configuration management
//!
//! This module handles loading, validation, and management of the Forge configuration.
//! Configuration is stored in TOML format at ~/.forge/config.toml.
//!
//! # Configuration Sections
//!
//! - **core**: Log level, data directory, runs directory
//! - **router**: Retry budget, backoff and per-call timeout for provider calls
//! - **jobs**: Background job concurrency
//! - **pipeline**: Delegated test/lint diagnostics
//! - **providers**: One table per external provider (endpoint, model, priority,
//!   credential variable, paid flag)
//!
//! Credentials never live in this file. Each provider names the environment
//! variable holding its key; whether that variable is set decides whether the
//! provider takes part in routing.
//!
//! # Examples
//!
//! ```no_run
//! use forge_engine::config::Config;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Config::load_or_create()?;
//! println!("Runs directory: {:?}", config.core.runs_dir);
//! println!("Attempts per provider: {}", config.router.max_attempts_per_provider);
//! # Ok(())
//! # }
//! ```

use sdk::errors::EngineError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Core engine settings
    #[serde(default)]
    pub core: CoreConfig,

    /// Provider routing settings
    #[serde(default)]
    pub router: RouterConfig,

    /// Job engine settings
    #[serde(default)]
    pub jobs: JobsConfig,

    /// Pipeline settings
    #[serde(default)]
    pub pipeline: PipelineConfig,

    /// External provider settings
    #[serde(default)]
    pub providers: ProvidersConfig,
}

/// Core engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoreConfig {
    /// Log level (error, warn, info, debug, trace)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Data directory path for the history database (supports ~ expansion)
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Directory under which every run gets its own subdirectory (supports ~ expansion)
    #[serde(default = "default_runs_dir")]
    pub runs_dir: PathBuf,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            data_dir: default_data_dir(),
            runs_dir: default_runs_dir(),
        }
    }
}

/// Provider routing configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouterConfig {
    /// Attempts per candidate provider before moving to the next one
    #[serde(default = "default_max_attempts")]
    pub max_attempts_per_provider: u32,

    /// First backoff delay after a transient failure (milliseconds)
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,

    /// Upper bound for a single backoff delay (milliseconds)
    #[serde(default = "default_backoff_max_ms")]
    pub backoff_max_ms: u64,

    /// Timeout applied to every provider call (seconds)
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            max_attempts_per_provider: default_max_attempts(),
            backoff_base_ms: default_backoff_base_ms(),
            backoff_max_ms: default_backoff_max_ms(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

/// Job engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobsConfig {
    /// Jobs allowed in `running` at once; the rest wait in `queued`
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,
}

impl Default for JobsConfig {
    fn default() -> Self {
        Self {
            max_concurrent: default_max_concurrent(),
        }
    }
}

/// Pipeline configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Run pytest and flake8 against the generated project in the test stage
    #[serde(default)]
    pub run_diagnostics: bool,

    /// Timeout for each diagnostics command (seconds)
    #[serde(default = "default_diagnostics_timeout_secs")]
    pub diagnostics_timeout_secs: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            run_diagnostics: false,
            diagnostics_timeout_secs: default_diagnostics_timeout_secs(),
        }
    }
}

/// Settings for one external provider
///
/// Empty strings and missing priorities are filled from the built-in defaults
/// for that provider during validation, so a table may override a single key.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct ProviderConfig {
    /// Whether the provider may be used at all
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Base URL for the provider API
    #[serde(default)]
    pub base_url: String,

    /// Model name
    #[serde(default)]
    pub model: String,

    /// Environment variable holding the credential
    #[serde(default)]
    pub api_key_env: String,

    /// Routing priority; higher is tried first
    #[serde(default)]
    pub priority: Option<i32>,

    /// Whether calls cost money (excluded under `free_only`)
    #[serde(default)]
    pub paid: Option<bool>,
}

impl ProviderConfig {
    pub fn priority(&self) -> i32 {
        self.priority.unwrap_or(0)
    }

    pub fn paid(&self) -> bool {
        self.paid.unwrap_or(false)
    }

    fn fill_defaults(&mut self, defaults: ProviderConfig) {
        if self.base_url.is_empty() {
            self.base_url = defaults.base_url;
        }
        if self.model.is_empty() {
            self.model = defaults.model;
        }
        if self.api_key_env.is_empty() {
            self.api_key_env = defaults.api_key_env;
        }
        if self.priority.is_none() {
            self.priority = defaults.priority;
        }
        if self.paid.is_none() {
            self.paid = defaults.paid;
        }
    }
}

/// External provider tables, in declaration order
///
/// Declaration order is the routing tie-break for equal priorities.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvidersConfig {
    #[serde(default = "default_openai")]
    pub openai: ProviderConfig,

    #[serde(default = "default_mistral")]
    pub mistral: ProviderConfig,

    #[serde(default = "default_groq")]
    pub groq: ProviderConfig,

    #[serde(default = "default_gemini")]
    pub gemini: ProviderConfig,

    #[serde(default = "default_perplexity")]
    pub perplexity: ProviderConfig,

    #[serde(default = "default_hf")]
    pub hf: ProviderConfig,

    #[serde(default = "default_ollama")]
    pub ollama: ProviderConfig,

    #[serde(default = "default_v0")]
    pub v0: ProviderConfig,
}

impl Default for ProvidersConfig {
    fn default() -> Self {
        Self {
            openai: default_openai(),
            mistral: default_mistral(),
            groq: default_groq(),
            gemini: default_gemini(),
            perplexity: default_perplexity(),
            hf: default_hf(),
            ollama: default_ollama(),
            v0: default_v0(),
        }
    }
}

impl ProvidersConfig {
    /// Provider names in declaration order
    pub const NAMES: [&'static str; 8] = [
        "openai",
        "mistral",
        "groq",
        "gemini",
        "perplexity",
        "hf",
        "ollama",
        "v0",
    ];

    /// All provider tables paired with their names, in declaration order
    pub fn entries(&self) -> [(&'static str, &ProviderConfig); 8] {
        [
            ("openai", &self.openai),
            ("mistral", &self.mistral),
            ("groq", &self.groq),
            ("gemini", &self.gemini),
            ("perplexity", &self.perplexity),
            ("hf", &self.hf),
            ("ollama", &self.ollama),
            ("v0", &self.v0),
        ]
    }

    fn entries_mut(&mut self) -> [(&'static str, &mut ProviderConfig); 8] {
        [
            ("openai", &mut self.openai),
            ("mistral", &mut self.mistral),
            ("groq", &mut self.groq),
            ("gemini", &mut self.gemini),
            ("perplexity", &mut self.perplexity),
            ("hf", &mut self.hf),
            ("ollama", &mut self.ollama),
            ("v0", &mut self.v0),
        ]
    }
}

// Default value functions
fn default_log_level() -> String {
    "info".to_string()
}

fn default_true() -> bool {
    true
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("~/.forge")
}

fn default_runs_dir() -> PathBuf {
    PathBuf::from("runs")
}

fn default_max_attempts() -> u32 {
    2
}

fn default_backoff_base_ms() -> u64 {
    500
}

fn default_backoff_max_ms() -> u64 {
    4000
}

fn default_request_timeout_secs() -> u64 {
    60
}

fn default_max_concurrent() -> usize {
    4
}

fn default_diagnostics_timeout_secs() -> u64 {
    240
}

fn provider(
    base_url: &str,
    model: &str,
    api_key_env: &str,
    priority: i32,
    paid: bool,
) -> ProviderConfig {
    ProviderConfig {
        enabled: true,
        base_url: base_url.to_string(),
        model: model.to_string(),
        api_key_env: api_key_env.to_string(),
        priority: Some(priority),
        paid: Some(paid),
    }
}

fn default_openai() -> ProviderConfig {
    provider(
        "https://api.openai.com/v1",
        "gpt-4o-mini",
        "OPENAI_API_KEY",
        70,
        true,
    )
}

fn default_mistral() -> ProviderConfig {
    provider(
        "https://api.mistral.ai/v1",
        "mistral-small-latest",
        "MISTRAL_API_KEY",
        60,
        true,
    )
}

fn default_groq() -> ProviderConfig {
    provider(
        "https://api.groq.com/openai/v1",
        "llama-3.1-8b-instant",
        "GROQ_API_KEY",
        50,
        false,
    )
}

fn default_gemini() -> ProviderConfig {
    provider(
        "https://generativelanguage.googleapis.com/v1",
        "gemini-1.5-flash",
        "GEMINI_API_KEY",
        40,
        false,
    )
}

fn default_perplexity() -> ProviderConfig {
    provider(
        "https://api.perplexity.ai",
        "sonar-small-chat",
        "PERPLEXITY_API_KEY",
        30,
        true,
    )
}

fn default_hf() -> ProviderConfig {
    provider(
        "https://api-inference.huggingface.co/models",
        "Qwen/Qwen2.5-7B-Instruct",
        "HF_API_KEY",
        20,
        false,
    )
}

fn default_ollama() -> ProviderConfig {
    provider(
        "http://localhost:11434",
        "codellama",
        "OLLAMA_BASE_URL",
        15,
        false,
    )
}

fn default_v0() -> ProviderConfig {
    provider("https://api.v0.dev/v1", "v0-1.0-md", "V0_API_KEY", 10, true)
}

fn defaults_for(name: &str) -> ProviderConfig {
    match name {
        "openai" => default_openai(),
        "mistral" => default_mistral(),
        "groq" => default_groq(),
        "gemini" => default_gemini(),
        "perplexity" => default_perplexity(),
        "hf" => default_hf(),
        "ollama" => default_ollama(),
        _ => default_v0(),
    }
}

impl Config {
    /// Load configuration from the default location (~/.forge/config.toml)
    ///
    /// If the configuration file doesn't exist, creates a default configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Configuration file cannot be read
    /// - TOML parsing fails
    /// - Validation fails
    pub fn load_or_create() -> Result<Self, EngineError> {
        let config_path = Self::default_config_path()?;

        if config_path.exists() {
            Self::load_from_path(&config_path)
        } else {
            Self::create_default(&config_path)
        }
    }

    /// Load configuration from a specific path
    pub fn load_from_path(path: &Path) -> Result<Self, EngineError> {
        let contents = fs::read_to_string(path)
            .map_err(|e| EngineError::Config(format!("Failed to read config file: {}", e)))?;

        Self::from_toml_str(&contents)
    }

    /// Parse and validate configuration from TOML text
    pub fn from_toml_str(contents: &str) -> Result<Self, EngineError> {
        let mut config: Config = toml::from_str(contents)
            .map_err(|e| EngineError::Config(format!("Failed to parse config: {}", e)))?;

        config.validate_and_process()?;

        Ok(config)
    }

    /// Create default configuration and save to path
    fn create_default(path: &Path) -> Result<Self, EngineError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                EngineError::Config(format!("Failed to create config directory: {}", e))
            })?;
        }

        let config = Self::default();

        let toml_string = toml::to_string_pretty(&config)
            .map_err(|e| EngineError::Config(format!("Failed to serialize config: {}", e)))?;

        fs::write(path, toml_string)
            .map_err(|e| EngineError::Config(format!("Failed to write config file: {}", e)))?;

        let mut config = config;
        config.validate_and_process()?;
        Ok(config)
    }

    /// Get the default configuration file path (~/.forge/config.toml)
    fn default_config_path() -> Result<PathBuf, EngineError> {
        let home = dirs::home_dir()
            .ok_or_else(|| EngineError::Config("Could not determine home directory".to_string()))?;

        Ok(home.join(".forge").join("config.toml"))
    }

    /// Validate and process configuration
    ///
    /// This method:
    /// - Validates log level and numeric bounds
    /// - Fills provider tables from built-in defaults
    /// - Expands ~ in paths
    ///
    /// Directories are not created here: the runs directory is created per run
    /// so that an unwritable location fails the job rather than startup.
    pub fn validate_and_process(&mut self) -> Result<(), EngineError> {
        let valid_log_levels = ["error", "warn", "info", "debug", "trace"];
        if !valid_log_levels.contains(&self.core.log_level.as_str()) {
            return Err(EngineError::Config(format!(
                "Invalid log level '{}'. Must be one of: {}",
                self.core.log_level,
                valid_log_levels.join(", ")
            )));
        }

        if self.router.max_attempts_per_provider == 0 {
            return Err(EngineError::Config(
                "max_attempts_per_provider must be at least 1".to_string(),
            ));
        }
        if self.router.backoff_base_ms > self.router.backoff_max_ms {
            return Err(EngineError::Config(
                "backoff_base_ms must not exceed backoff_max_ms".to_string(),
            ));
        }
        if self.router.request_timeout_secs == 0 {
            return Err(EngineError::Config(
                "request_timeout_secs must be at least 1".to_string(),
            ));
        }
        if self.jobs.max_concurrent == 0 {
            return Err(EngineError::Config(
                "jobs.max_concurrent must be at least 1".to_string(),
            ));
        }

        for (name, provider) in self.providers.entries_mut() {
            provider.fill_defaults(defaults_for(name));
        }

        self.core.data_dir = expand_path(&self.core.data_dir)?;
        self.core.runs_dir = expand_path(&self.core.runs_dir)?;

        Ok(())
    }
}

/// Expand ~ in path to user's home directory
fn expand_path(path: &Path) -> Result<PathBuf, EngineError> {
    let path_str = path
        .to_str()
        .ok_or_else(|| EngineError::Config("Invalid UTF-8 in path".to_string()))?;

    if let Some(rest) = path_str.strip_prefix("~/") {
        let home = dirs::home_dir()
            .ok_or_else(|| EngineError::Config("Could not determine home directory".to_string()))?;

        Ok(home.join(rest))
    } else if path_str == "~" {
        dirs::home_dir()
            .ok_or_else(|| EngineError::Config("Could not determine home directory".to_string()))
    } else {
        Ok(path.to_path_buf())
    }
}
