pub mod openai;

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::ChatConfig;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ChatRequest {
    pub messages: Vec<ChatMessage>,
    pub model: String,
    pub temperature: f32,
}

/// One piece of assistant text as it arrives.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamChunk {
    pub delta: String,
}

/// Hosted chat-completion backends. Both speak the OpenAI wire protocol and
/// differ only in their default endpoint.
#[derive(Debug, Clone)]
pub enum Provider {
    Groq(openai::OpenAiConfig),
    OpenAi(openai::OpenAiConfig),
}

impl Provider {
    pub fn groq(api_key: String) -> Self {
        Provider::Groq(openai::OpenAiConfig {
            api_key,
            base_url: "https://api.groq.com/openai/v1".to_string(),
            timeout: openai::DEFAULT_TIMEOUT,
        })
    }

    pub fn openai(api_key: String) -> Self {
        Provider::OpenAi(openai::OpenAiConfig {
            api_key,
            base_url: "https://api.openai.com/v1".to_string(),
            timeout: openai::DEFAULT_TIMEOUT,
        })
    }

    /// Resolve the provider named in config. The API key is read from the
    /// environment variable the config names.
    pub fn from_config(config: &ChatConfig) -> Result<Self, LlmError> {
        let api_key = config
            .api_key()
            .ok_or_else(|| LlmError::MissingApiKey(config.api_key_env.clone()))?;
        let mut provider = match config.provider.as_str() {
            "groq" => Provider::groq(api_key),
            "openai" => Provider::openai(api_key),
            other => return Err(LlmError::UnknownProvider(other.to_string())),
        };
        if let Some(base_url) = &config.base_url {
            provider.config_mut().base_url = base_url.trim_end_matches('/').to_string();
        }
        provider.config_mut().timeout = Duration::from_secs(config.request_timeout_secs);
        Ok(provider)
    }

    fn config_mut(&mut self) -> &mut openai::OpenAiConfig {
        match self {
            Provider::Groq(config) | Provider::OpenAi(config) => config,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Provider::Groq(_) => "groq",
            Provider::OpenAi(_) => "openai",
        }
    }

    pub async fn chat_stream(
        &self,
        request: &ChatRequest,
        on_chunk: impl Fn(StreamChunk) + Send,
    ) -> Result<String, LlmError> {
        match self {
            Provider::Groq(config) | Provider::OpenAi(config) => {
                openai::chat_stream(config, request, on_chunk).await
            }
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },
    #[error("API key not configured (set {0})")]
    MissingApiKey(String),
    #[error("Unknown chat provider: {0}")]
    UnknownProvider(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roles_serialize_lowercase() {
        let json = serde_json::to_string(&ChatMessage::assistant("hi")).unwrap();
        assert_eq!(json, r#"{"role":"assistant","content":"hi"}"#);
    }

    #[test]
    fn missing_key_names_the_variable() {
        let config = ChatConfig {
            api_key_env: "MEDACE_TEST_KEY_UNSET_2".to_string(),
            ..ChatConfig::default()
        };
        let err = Provider::from_config(&config).unwrap_err();
        assert!(err.to_string().contains("MEDACE_TEST_KEY_UNSET_2"));
    }

    #[test]
    fn configured_timeout_and_base_url_reach_provider() {
        std::env::set_var("MEDACE_TEST_KEY_SET_3", "secret");
        let config = ChatConfig {
            api_key_env: "MEDACE_TEST_KEY_SET_3".to_string(),
            base_url: Some("http://localhost:9999/v1/".to_string()),
            request_timeout_secs: 7,
            ..ChatConfig::default()
        };
        match Provider::from_config(&config).unwrap() {
            Provider::Groq(openai) => {
                assert_eq!(openai.api_key, "secret");
                assert_eq!(openai.base_url, "http://localhost:9999/v1");
                assert_eq!(openai.timeout, Duration::from_secs(7));
            }
            other => panic!("unexpected provider {}", other.name()),
        }
    }

    #[test]
    fn groq_uses_openai_compatible_endpoint() {
        match Provider::groq("k".into()) {
            Provider::Groq(config) => {
                assert_eq!(config.base_url, "https://api.groq.com/openai/v1")
            }
            other => panic!("unexpected provider {}", other.name()),
        }
    }
}
