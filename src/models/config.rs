//! Configuration models for ideaforge.
//!
//! Every tunable of a run lives here. A config file is optional; missing
//! sections and fields fall back to the defaults below.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Top-level configuration for ideaforge.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Generative backend (OpenAI-compatible chat completions)
    #[serde(default)]
    pub backend: BackendConfig,

    /// Refinement loop settings
    #[serde(default)]
    pub generation: GenerationConfig,

    /// Where accepted ideas are published
    #[serde(default)]
    pub sink: SinkConfig,
}

/// Backend API configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    /// API key (can also be set via the env var named by `api_key_env`)
    #[serde(default)]
    pub api_key: Option<String>,

    /// Environment variable name for API key
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    /// Base URL for the API
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Model ID
    #[serde(default = "default_model")]
    pub model: String,

    /// Request timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    /// Maximum transport-level retries per request
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(default = "default_temperature")]
    pub temperature: f64,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

fn default_api_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}

fn default_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_model() -> String {
    "gpt-4o".to_string()
}

fn default_timeout() -> u64 {
    180
}

fn default_max_retries() -> u32 {
    3
}

fn default_temperature() -> f64 {
    0.7
}

fn default_max_tokens() -> u32 {
    4096
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            api_key_env: default_api_key_env(),
            base_url: default_base_url(),
            model: default_model(),
            timeout_secs: default_timeout(),
            max_retries: default_max_retries(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
        }
    }
}

/// Refinement loop configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationConfig {
    /// The "how might we" question ideas are generated for
    #[serde(default = "default_question")]
    pub question: String,

    /// Number of ideas requested in the initial generation
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Outer-iteration budget of the refinement loop
    #[serde(default = "default_max_attempts")]
    pub max_attempts: usize,

    /// Base delay after a parse failure, doubled per consecutive failure (0 disables)
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,

    /// Upper bound on the parse-failure backoff
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
}

fn default_question() -> String {
    "How might we use digital tools to help people build trust and express emotions in romantic relationships?".to_string()
}

fn default_batch_size() -> usize {
    11
}

fn default_max_attempts() -> usize {
    5
}

fn default_retry_backoff_ms() -> u64 {
    500
}

fn default_max_backoff_ms() -> u64 {
    8_000
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            question: default_question(),
            batch_size: default_batch_size(),
            max_attempts: default_max_attempts(),
            retry_backoff_ms: default_retry_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
        }
    }
}

/// Kind of publishing sink.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SinkKind {
    /// Do not publish
    #[default]
    None,
    /// Append JSON lines to a local file
    Jsonl,
    /// Append blocks to a Notion page
    Notion,
}

/// Publishing sink configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SinkConfig {
    #[serde(default)]
    pub kind: SinkKind,

    /// Output file (jsonl sink)
    #[serde(default)]
    pub path: Option<PathBuf>,

    /// Notion page ID (falls back to `page_id_env`)
    #[serde(default)]
    pub page_id: Option<String>,

    #[serde(default = "default_notion_page_id_env")]
    pub page_id_env: String,

    /// Environment variable holding the Notion integration token
    #[serde(default = "default_notion_token_env")]
    pub token_env: String,
}

fn default_notion_page_id_env() -> String {
    "NOTION_PAGE_ID".to_string()
}

fn default_notion_token_env() -> String {
    "NOTION_TOKEN".to_string()
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            kind: SinkKind::None,
            path: None,
            page_id: None,
            page_id_env: default_notion_page_id_env(),
            token_env: default_notion_token_env(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::FileRead {
            path: path.to_owned(),
            source: e,
        })?;

        Self::from_toml(&content).map_err(|e| match e {
            ConfigError::Parse { source, .. } => ConfigError::Parse {
                path: path.to_owned(),
                source,
            },
            other => other,
        })
    }

    /// Load from the file if it exists, otherwise use defaults.
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        if path.exists() {
            Self::from_file(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Parse and validate configuration from TOML text.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content).map_err(|e| ConfigError::Parse {
            path: PathBuf::from("<inline>"),
            source: e,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Check values that would make the loop meaningless.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.generation.batch_size == 0 {
            return Err(ConfigError::Invalid(
                "generation.batch_size must be at least 1".to_string(),
            ));
        }
        if self.generation.max_attempts == 0 {
            return Err(ConfigError::Invalid(
                "generation.max_attempts must be at least 1".to_string(),
            ));
        }
        if self.generation.question.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "generation.question must not be empty".to_string(),
            ));
        }
        if self.sink.kind == SinkKind::Jsonl && self.sink.path.is_none() {
            return Err(ConfigError::Invalid(
                "sink.path is required for the jsonl sink".to_string(),
            ));
        }
        Ok(())
    }

    /// Resolve the backend API key from config or environment.
    pub fn resolve_api_key(&self) -> Result<String, ConfigError> {
        if let Some(key) = &self.backend.api_key {
            return Ok(expand_env_vars(key));
        }

        std::env::var(&self.backend.api_key_env).map_err(|_| ConfigError::MissingSecret {
            what: "backend API key".to_string(),
            env_var: self.backend.api_key_env.clone(),
        })
    }

    /// Resolve the Notion token and page ID for the notion sink.
    pub fn resolve_notion(&self) -> Result<(String, String), ConfigError> {
        let token = std::env::var(&self.sink.token_env).map_err(|_| ConfigError::MissingSecret {
            what: "Notion token".to_string(),
            env_var: self.sink.token_env.clone(),
        })?;

        let page_id = match &self.sink.page_id {
            Some(id) => expand_env_vars(id),
            None => std::env::var(&self.sink.page_id_env).map_err(|_| {
                ConfigError::MissingSecret {
                    what: "Notion page ID".to_string(),
                    env_var: self.sink.page_id_env.clone(),
                }
            })?,
        };

        Ok((token, page_id))
    }
}

/// Expand environment variables in a string.
///
/// Supports ${VAR_NAME} syntax.
/// If the variable is not set, the placeholder is left unchanged.
pub fn expand_env_vars(s: &str) -> String {
    let re = match regex::Regex::new(r"\$\{([^}]+)\}") {
        Ok(re) => re,
        Err(_) => return s.to_string(),
    };

    re.replace_all(s, |cap: &regex::Captures<'_>| {
        std::env::var(&cap[1]).unwrap_or_else(|_| cap[0].to_string())
    })
    .into_owned()
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    FileRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("Missing {what}: set {env_var} env var or the value in config")]
    MissingSecret { what: String, env_var: String },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}
