pub mod config;
pub mod logging;

pub const APP_NAME: &str = "todo-assistant";

pub use config::{AgentConfig, AssistantConfig, ConfigError, ModelConfig, ModelProvider};
