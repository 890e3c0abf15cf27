use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

const DEFAULT_CONFIG_FILE: &str = ".todo-assistant/config.toml";
const CONFIG_PATH_ENV: &str = "TODO_ASSISTANT_CONFIG";
const DEFAULT_API_KEY_ENV: &str = "OPENAI_API_KEY";
const DB_FILE_NAME: &str = "todos.db";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssistantConfig {
    pub data_dir: PathBuf,
    pub log_level: String,
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub agent: AgentConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelProvider {
    #[default]
    OpenAi,
    Ollama,
    Custom,
}

impl ModelProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OpenAi => "open_ai",
            Self::Ollama => "ollama",
            Self::Custom => "custom",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "openai" | "open_ai" => Some(Self::OpenAi),
            "ollama" => Some(Self::Ollama),
            "custom" => Some(Self::Custom),
            _ => None,
        }
    }

    pub fn default_endpoint(&self) -> Option<&'static str> {
        match self {
            Self::OpenAi => Some("https://api.openai.com/v1"),
            Self::Ollama => Some("http://127.0.0.1:11434/v1"),
            Self::Custom => None,
        }
    }

    pub fn default_api_key_env(&self) -> Option<&'static str> {
        match self {
            Self::OpenAi => Some(DEFAULT_API_KEY_ENV),
            Self::Ollama | Self::Custom => None,
        }
    }
}

/// Missing `endpoint`/`api_key_env` stay `None` and fall back to the provider's
/// defaults at use time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    #[serde(default)]
    pub provider: ModelProvider,
    #[serde(default = "default_model_id")]
    pub model_id: String,
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub api_key_env: Option<String>,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
    /// Ask the backend for a JSON object response (`response_format`).
    #[serde(default = "default_true")]
    pub json_mode: bool,
}

fn default_model_id() -> String {
    "gpt-4o".to_string()
}

fn default_timeout_ms() -> u64 {
    60_000
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_backoff_ms() -> u64 {
    500
}

fn default_max_backoff_ms() -> u64 {
    8_000
}

fn default_true() -> bool {
    true
}

impl Default for ModelConfig {
    fn default() -> Self {
        let provider = ModelProvider::OpenAi;
        Self {
            endpoint: provider.default_endpoint().map(str::to_string),
            api_key_env: provider.default_api_key_env().map(str::to_string),
            provider,
            model_id: default_model_id(),
            timeout_ms: default_timeout_ms(),
            max_attempts: default_max_attempts(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            json_mode: default_true(),
        }
    }
}

impl ModelConfig {
    pub fn base_url(&self) -> Option<String> {
        self.endpoint
            .as_deref()
            .or(self.provider.default_endpoint())
            .map(|url| url.trim_end_matches('/').to_string())
    }

    /// Reads the API key from the process environment.
    pub fn resolve_api_key(&self) -> Result<Option<String>, ConfigError> {
        self.resolve_api_key_with(|name| env::var(name).ok())
    }

    pub fn resolve_api_key_with(
        &self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Option<String>, ConfigError> {
        let Some(var) = self
            .api_key_env
            .as_deref()
            .or(self.provider.default_api_key_env())
        else {
            return Ok(None);
        };
        match lookup(var) {
            Some(key) if !key.trim().is_empty() => Ok(Some(key.trim().to_string())),
            _ => Err(ConfigError::MissingApiKey {
                env: var.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    pub max_steps_per_turn: u32,
    /// Corrective re-prompts allowed per turn after a protocol mistake.
    pub max_corrections: u32,
    pub store_attempts: u32,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_steps_per_turn: 12,
            max_corrections: 1,
            store_attempts: 2,
        }
    }
}

impl Default for AssistantConfig {
    fn default() -> Self {
        let data_dir = dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("todo-assistant");

        Self {
            data_dir,
            log_level: "warn".to_string(),
            model: ModelConfig::default(),
            agent: AgentConfig::default(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config at {path}: {source}")]
    ReadFailed {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to write config at {path}: {source}")]
    WriteFailed {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse config at {path}: {source}")]
    ParseFailed {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("failed to serialize default config: {0}")]
    SerializeFailed(#[from] toml::ser::Error),
    #[error("config has invalid value: {0}")]
    ValidationFailed(String),
    #[error("missing API key: set the {env} environment variable")]
    MissingApiKey { env: String },
}

impl AssistantConfig {
    pub fn resolve_path() -> PathBuf {
        if let Ok(path) = env::var(CONFIG_PATH_ENV) {
            return PathBuf::from(path);
        }

        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(DEFAULT_CONFIG_FILE)
    }

    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join(DB_FILE_NAME)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::ReadFailed {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&raw).map_err(|source| ConfigError::ParseFailed {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let raw = toml::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|source| ConfigError::WriteFailed {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        fs::write(path, raw).map_err(|source| ConfigError::WriteFailed {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(())
    }

    pub fn load_or_create() -> Result<(Self, PathBuf, bool), ConfigError> {
        let path = Self::resolve_path();
        let (cfg, created) = Self::load_or_create_at(&path)?;
        Ok((cfg, path, created))
    }

    pub fn load_or_create_at(path: &Path) -> Result<(Self, bool), ConfigError> {
        if path.exists() {
            return Ok((Self::load(path)?, false));
        }

        let cfg = Self::default();
        cfg.save(path)?;
        Ok((cfg, true))
    }

    pub fn validate_and_prepare(&self) -> Result<(), ConfigError> {
        if self.log_level.trim().is_empty() {
            return Err(ConfigError::ValidationFailed(
                "log_level cannot be empty".to_string(),
            ));
        }
        if self.model.model_id.trim().is_empty() {
            return Err(ConfigError::ValidationFailed(
                "model.model_id cannot be empty".to_string(),
            ));
        }
        if let Some(endpoint) = &self.model.endpoint {
            if endpoint.trim().is_empty() {
                return Err(ConfigError::ValidationFailed(
                    "model.endpoint cannot be empty if set".to_string(),
                ));
            }
        }
        if self.model.base_url().is_none() {
            return Err(ConfigError::ValidationFailed(format!(
                "model.endpoint is required for provider {}",
                self.model.provider.as_str()
            )));
        }
        if self.model.max_attempts == 0 {
            return Err(ConfigError::ValidationFailed(
                "model.max_attempts must be at least 1".to_string(),
            ));
        }
        if self.agent.max_steps_per_turn == 0 {
            return Err(ConfigError::ValidationFailed(
                "agent.max_steps_per_turn must be at least 1".to_string(),
            ));
        }
        fs::create_dir_all(&self.data_dir).map_err(|source| ConfigError::WriteFailed {
            path: self.data_dir.clone(),
            source,
        })?;
        Ok(())
    }
}
