//! Async client for a generative-model endpoint
//!
//! The model is treated as unreliable and optional: callers bound every call
//! with a deadline and decide themselves what a failure means. Two wire
//! formats are supported, Ollama's native API and OpenAI-compatible chat
//! completions.

use crate::core::config::ModelConfig;
use crate::core::error::{ConfigError, ModelError};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// API format type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApiFormat {
    Ollama,
    OpenAI,
}

impl FromStr for ApiFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ollama" => Ok(ApiFormat::Ollama),
            "openai" => Ok(ApiFormat::OpenAI),
            other => Err(format!("unknown API format: {}", other)),
        }
    }
}

/// Liveness check and prompt completion
#[async_trait]
pub trait ModelClient: Send + Sync {
    async fn heartbeat(&self) -> Result<(), ModelError>;

    async fn generate(&self, prompt: &str) -> Result<String, ModelError>;
}

/// HTTP model client
pub struct LlmClient {
    client: Client,
    api_url: String,
    api_key: Option<String>,
    model: String,
    api_format: ApiFormat,
}

impl LlmClient {
    pub fn new(config: &ModelConfig) -> Self {
        Self {
            client: Client::new(),
            api_url: config.api_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            api_format: config.api_format,
        }
    }

    /// Create a client from environment variables
    ///
    /// Optional: LLM_API_URL or OLLAMA_HOST (defaults to a local Ollama)
    /// Optional: LLM_MODEL (defaults to llama3.2:1b)
    /// Optional: LLM_API_FORMAT, LLM_API_KEY
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self::new(&ModelConfig::from_env()?))
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.api_url, path)
    }

    fn authorized(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => request.bearer_auth(key),
            None => request,
        }
    }

    async fn generate_ollama(&self, prompt: &str) -> Result<String, ModelError> {
        let request = OllamaRequest {
            model: &self.model,
            prompt,
            stream: false,
        };

        let response = self
            .authorized(self.client.post(self.endpoint("/api/generate")))
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(ModelError::Status(error_text));
        }

        let completion: OllamaResponse = response.json().await?;
        if completion.response.is_empty() {
            return Err(ModelError::EmptyResponse);
        }
        Ok(completion.response)
    }

    async fn generate_openai(&self, prompt: &str) -> Result<String, ModelError> {
        let request = OpenAIRequest {
            model: &self.model,
            messages: vec![Message {
                role: "user",
                content: prompt,
            }],
        };

        let response = self
            .authorized(self.client.post(self.endpoint("/v1/chat/completions")))
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(ModelError::Status(error_text));
        }

        let completion: OpenAIResponse = response.json().await?;
        completion
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .filter(|content| !content.is_empty())
            .ok_or(ModelError::EmptyResponse)
    }
}

#[async_trait]
impl ModelClient for LlmClient {
    async fn heartbeat(&self) -> Result<(), ModelError> {
        let request = match self.api_format {
            ApiFormat::Ollama => self.client.head(self.endpoint("/")),
            ApiFormat::OpenAI => self.client.get(self.endpoint("/v1/models")),
        };
        let response = self.authorized(request).send().await?;
        if !response.status().is_success() {
            return Err(ModelError::Status(response.status().to_string()));
        }
        Ok(())
    }

    async fn generate(&self, prompt: &str) -> Result<String, ModelError> {
        match self.api_format {
            ApiFormat::Ollama => self.generate_ollama(prompt).await,
            ApiFormat::OpenAI => self.generate_openai(prompt).await,
        }
    }
}

// Ollama native format
#[derive(Serialize)]
struct OllamaRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
}

#[derive(Deserialize)]
struct OllamaResponse {
    #[serde(default)]
    response: String,
}

// OpenAI-compatible format
#[derive(Serialize)]
struct OpenAIRequest<'a> {
    model: &'a str,
    messages: Vec<Message<'a>>,
}

#[derive(Serialize)]
struct Message<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct OpenAIResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    content: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_creation() {
        let config = ModelConfig {
            api_url: "http://ollama:11434/".into(),
            model: "test-model".into(),
            ..ModelConfig::default()
        };
        let client = LlmClient::new(&config);
        assert_eq!(client.api_url, "http://ollama:11434");
        assert_eq!(client.model(), "test-model");
        assert_eq!(
            client.endpoint("/api/generate"),
            "http://ollama:11434/api/generate"
        );
        assert_eq!(client.api_format, ApiFormat::Ollama);
    }

    #[test]
    fn test_api_format_from_str() {
        assert_eq!("ollama".parse::<ApiFormat>(), Ok(ApiFormat::Ollama));
        assert_eq!(" OpenAI ".parse::<ApiFormat>(), Ok(ApiFormat::OpenAI));
        assert!("anthropic".parse::<ApiFormat>().is_err());
    }

    #[test]
    fn test_ollama_request_is_not_streaming() {
        let request = OllamaRequest {
            model: "llama3.2:1b",
            prompt: "hi",
            stream: false,
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["stream"], false);
        assert_eq!(json["model"], "llama3.2:1b");
    }

    #[test]
    fn test_openai_response_deserialization() {
        let body = r#"{"choices": [{"message": {"role": "assistant", "content": "{\"success\": true}"}}]}"#;
        let response: OpenAIResponse = serde_json::from_str(body).unwrap();
        assert_eq!(response.choices[0].message.content, "{\"success\": true}");
    }
}
