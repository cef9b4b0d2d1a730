pub mod parser;
pub mod prompts;
pub mod providers;

use crate::config::LlmConfig;
use async_trait::async_trait;

#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("LLM connection error: {0}")]
    ConnectionError(String),
    #[error("LLM response error: {0}")]
    ResponseError(String),
    #[error("LLM configuration error: {0}")]
    ConfigError(String),
}

/// A text-in, text-out model call. Parsing of the reply happens elsewhere.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String, LlmError>;
}

pub struct LlmManager {
    model: Box<dyn LanguageModel>,
    name: String,
}

impl LlmManager {
    pub fn new(config: &LlmConfig) -> Result<Self, LlmError> {
        let model: Box<dyn LanguageModel> = match config.backend.as_str() {
            "gemini" => Box::new(providers::gemini::GeminiProvider::new(config)?),
            "remote" => Box::new(providers::remote::RemoteLlmProvider::new(config)?),
            "ollama" => Box::new(providers::ollama::OllamaProvider::new(config)?),
            _ => {
                return Err(LlmError::ConfigError(format!(
                    "Unsupported LLM backend: {}",
                    config.backend
                )))
            }
        };

        Ok(Self {
            model,
            name: format!("{}/{}", config.backend, config.model),
        })
    }

    pub fn from_model(model: Box<dyn LanguageModel>, name: impl Into<String>) -> Self {
        Self {
            model,
            name: name.into(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub async fn complete(&self, prompt: &str) -> Result<String, LlmError> {
        self.model.complete(prompt).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;

    #[test]
    fn unknown_backend_is_a_config_error() {
        let mut config = AppConfig::default().llm;
        config.backend = "local".to_string();

        match LlmManager::new(&config) {
            Err(LlmError::ConfigError(msg)) => assert!(msg.contains("local")),
            _ => panic!("expected a configuration error"),
        }
    }

    #[test]
    fn gemini_without_key_is_rejected() {
        let config = AppConfig::default().llm;
        assert!(matches!(LlmManager::new(&config), Err(LlmError::ConfigError(_))));
    }
}
