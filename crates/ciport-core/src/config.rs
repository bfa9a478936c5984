//! Configuration management for ciport
//!
//! Settings live in `.ciport/config.toml` under the working directory. Every
//! section is optional; missing values fall back to defaults, and command-line
//! flags override whatever the file says.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::{CiportError, Result};

/// Directory (relative to the working directory) holding ciport state
pub const CONFIG_DIR: &str = ".ciport";

/// Repository-level ciport configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CiportConfig {
    /// Repair loop settings
    #[serde(default)]
    pub run: RunSettings,

    /// LLM provider and model selection
    #[serde(default)]
    pub models: ModelConfig,

    /// External validator invocation
    #[serde(default)]
    pub validator: ValidatorSettings,

    /// Documentation fetch and cache settings
    #[serde(default)]
    pub docs: DocsSettings,

    /// Source and target CI dialect names used in prompts
    #[serde(default)]
    pub dialects: DialectSettings,

    /// Where run artifacts are written
    #[serde(default)]
    pub output: OutputSettings,
}

/// Repair loop settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSettings {
    /// Maximum number of generate cycles. 0 means the run exhausts immediately.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: usize,

    /// Judge semantic equivalence after a candidate passes validation
    #[serde(default)]
    pub quality_gate: bool,

    /// Retry when the quality gate rejects a valid candidate (implies `quality_gate`)
    #[serde(default)]
    pub thorough: bool,
}

/// LLM provider
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    #[default]
    Anthropic,
    OpenRouter,
}

impl Provider {
    /// Conventional API key environment variable for the provider
    pub fn default_api_key_env(&self) -> &'static str {
        match self {
            Provider::Anthropic => "ANTHROPIC_API_KEY",
            Provider::OpenRouter => "OPENROUTER_API_KEY",
        }
    }
}

impl std::fmt::Display for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Provider::Anthropic => write!(f, "anthropic"),
            Provider::OpenRouter => write!(f, "openrouter"),
        }
    }
}

impl std::str::FromStr for Provider {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "anthropic" => Ok(Provider::Anthropic),
            "openrouter" => Ok(Provider::OpenRouter),
            _ => Err(format!(
                "Invalid provider: {}. Use anthropic or openrouter.",
                s
            )),
        }
    }
}

/// Model configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    #[serde(default)]
    pub provider: Provider,

    /// Model name: `opus`/`sonnet`/`haiku` for Anthropic, a model id for OpenRouter
    #[serde(default = "default_model")]
    pub default: String,

    /// Environment variable containing the API key (provider default if unset)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key_env: Option<String>,

    /// Maximum tokens per completion
    #[serde(default = "default_max_tokens")]
    pub max_tokens: usize,
}

impl ModelConfig {
    pub fn api_key_env(&self) -> &str {
        self.api_key_env
            .as_deref()
            .unwrap_or_else(|| self.provider.default_api_key_env())
    }
}

/// External validator invocation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidatorSettings {
    /// Validator binary
    #[serde(default = "default_validator_command")]
    pub command: String,

    /// Extra arguments placed before the artifact path
    #[serde(default = "default_validator_args")]
    pub args: Vec<String>,
}

/// Documentation fetch and cache settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocsSettings {
    /// Concurrent fetch+summarize operations per failed attempt
    #[serde(default = "default_fetch_concurrency")]
    pub fetch_concurrency: usize,

    /// Fetched page text is truncated to this many characters
    #[serde(default = "default_doc_max_chars")]
    pub max_chars: usize,

    /// HTTP timeout for documentation fetches
    #[serde(default = "default_fetch_timeout_secs")]
    pub timeout_secs: u64,

    /// Persisted cache of summaries, reused across runs
    #[serde(default = "default_cache_file")]
    pub cache_file: PathBuf,
}

impl DocsSettings {
    /// Fan-out limit, never below one
    pub fn concurrency(&self) -> usize {
        self.fetch_concurrency.max(1)
    }
}

/// Dialect names used in prompts
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DialectSettings {
    #[serde(default = "default_source_dialect")]
    pub source: String,

    #[serde(default = "default_target_dialect")]
    pub target: String,
}

/// Run artifact output
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputSettings {
    #[serde(default = "default_output_dir")]
    pub dir: PathBuf,
}

// Default value providers
fn default_max_attempts() -> usize {
    3
}

fn default_model() -> String {
    "sonnet".to_string()
}

fn default_max_tokens() -> usize {
    16000
}

fn default_validator_command() -> String {
    "actionlint".to_string()
}

fn default_validator_args() -> Vec<String> {
    // Empty -shellcheck disables shellcheck integration for run scripts
    vec!["-no-color".to_string(), "-shellcheck=".to_string()]
}

fn default_fetch_concurrency() -> usize {
    4
}

fn default_doc_max_chars() -> usize {
    20_000
}

fn default_fetch_timeout_secs() -> u64 {
    10
}

fn default_cache_file() -> PathBuf {
    PathBuf::from(CONFIG_DIR).join("doc_cache.json")
}

fn default_source_dialect() -> String {
    "GitLab CI".to_string()
}

fn default_target_dialect() -> String {
    "GitHub Actions".to_string()
}

fn default_output_dir() -> PathBuf {
    PathBuf::from(CONFIG_DIR).join("runs")
}

impl CiportConfig {
    /// Load configuration from `.ciport/config.toml` or use defaults
    pub fn load_or_default(root: &Path) -> Result<Self> {
        let config_path = root.join(CONFIG_DIR).join("config.toml");

        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            Self::from_toml(&content)
        } else {
            Ok(Self::default())
        }
    }

    /// Parse configuration from TOML text
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content)
            .map_err(|e| CiportError::Config(format!("Failed to parse config file: {}", e)))
    }

    /// Write default configuration to `.ciport/config.toml`
    pub fn write_default(root: &Path) -> Result<PathBuf> {
        let config_dir = root.join(CONFIG_DIR);
        std::fs::create_dir_all(&config_dir)?;

        let config_path = config_dir.join("config.toml");
        let content = toml::to_string_pretty(&Self::default())
            .map_err(|e| CiportError::Config(format!("Failed to serialize config: {}", e)))?;
        std::fs::write(&config_path, content)?;
        Ok(config_path)
    }
}

impl Default for RunSettings {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            quality_gate: false,
            thorough: false,
        }
    }
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            provider: Provider::default(),
            default: default_model(),
            api_key_env: None,
            max_tokens: default_max_tokens(),
        }
    }
}

impl Default for ValidatorSettings {
    fn default() -> Self {
        Self {
            command: default_validator_command(),
            args: default_validator_args(),
        }
    }
}

impl Default for DocsSettings {
    fn default() -> Self {
        Self {
            fetch_concurrency: default_fetch_concurrency(),
            max_chars: default_doc_max_chars(),
            timeout_secs: default_fetch_timeout_secs(),
            cache_file: default_cache_file(),
        }
    }
}

impl Default for DialectSettings {
    fn default() -> Self {
        Self {
            source: default_source_dialect(),
            target: default_target_dialect(),
        }
    }
}

impl Default for OutputSettings {
    fn default() -> Self {
        Self {
            dir: default_output_dir(),
        }
    }
}
