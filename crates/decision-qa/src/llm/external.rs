//! Chat-completions client for OpenAI and OpenAI-compatible gateways.

use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};

use super::{ApiProvider, GenerationConfig, LLMConfig, LLMProvider, ProviderInfo};

const OPENAI_ENDPOINT: &str = "https://api.openai.com/v1/chat/completions";

pub struct ExternalProvider {
    provider: ApiProvider,
    api_key: String,
    model: String,
    client: Client,
}

impl ExternalProvider {
    pub fn new(provider: ApiProvider, api_key: String, model: String, config: &LLMConfig) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;

        tracing::info!(provider = ?provider, model = %model, "Creating ExternalProvider");

        Ok(Self {
            provider,
            api_key,
            model,
            client,
        })
    }

    fn endpoint(&self) -> &str {
        match &self.provider {
            ApiProvider::OpenAI => OPENAI_ENDPOINT,
            ApiProvider::Custom { endpoint } => endpoint,
        }
    }

    fn request_body(&self, prompt: &str, config: &GenerationConfig) -> Value {
        json!({
            "model": self.model,
            "messages": [{"role": "user", "content": prompt}],
            "max_tokens": config.max_tokens,
            "temperature": config.temperature,
            "top_p": config.top_p,
            "stream": false
        })
    }
}

/// Content of the first choice in a chat-completions body.
fn first_choice(body: &str) -> Result<String> {
    let parsed: ChatResponse =
        serde_json::from_str(body).map_err(|e| anyhow!("Malformed completion body: {}", e))?;
    parsed
        .choices
        .into_iter()
        .next()
        .map(|c| c.message.content)
        .ok_or_else(|| anyhow!("No choices returned from API"))
}

#[async_trait]
impl LLMProvider for ExternalProvider {
    async fn generate(&self, prompt: &str, config: &GenerationConfig) -> Result<String> {
        let endpoint = self.endpoint();
        tracing::debug!(
            endpoint = %endpoint,
            model = %self.model,
            max_tokens = config.max_tokens,
            prompt_len = prompt.len(),
            "Sending completion request"
        );

        let response = self
            .client
            .post(endpoint)
            .bearer_auth(&self.api_key)
            .json(&self.request_body(prompt, config))
            .send()
            .await
            .map_err(|e| {
                tracing::error!(endpoint = %endpoint, error = %e, timeout = e.is_timeout(), "Request failed");
                anyhow!("Request to {} failed: {}", endpoint, e)
            })?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            tracing::error!(endpoint = %endpoint, status = %status, "API returned error");
            return Err(anyhow!("API error ({}): {}", status, body));
        }

        let content = first_choice(&body)?;
        tracing::debug!("API response received, {} chars", content.len());
        Ok(content)
    }

    fn info(&self) -> ProviderInfo {
        let name = match &self.provider {
            ApiProvider::OpenAI => "OpenAI",
            ApiProvider::Custom { .. } => "Custom",
        };
        ProviderInfo {
            name: name.to_string(),
            model: self.model.clone(),
        }
    }

    async fn is_ready(&self) -> bool {
        !self.api_key.is_empty()
    }
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct ChatMessage {
    content: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider(p: ApiProvider, key: &str) -> ExternalProvider {
        ExternalProvider::new(p, key.into(), "m".into(), &LLMConfig::default()).unwrap()
    }

    #[test]
    fn test_endpoint_per_provider() {
        let p = provider(
            ApiProvider::Custom {
                endpoint: "http://llm.internal/v1/chat/completions".into(),
            },
            "key",
        );
        assert_eq!(p.endpoint(), "http://llm.internal/v1/chat/completions");
        assert_eq!(p.info().name, "Custom");

        let p = provider(ApiProvider::OpenAI, "key");
        assert_eq!(p.endpoint(), OPENAI_ENDPOINT);
        assert_eq!(p.info().name, "OpenAI");
    }

    #[test]
    fn test_request_body_carries_generation_settings() {
        let p = provider(ApiProvider::OpenAI, "key");
        let config = GenerationConfig {
            max_tokens: 64,
            temperature: 0.0,
            top_p: 1.0,
        };
        let body = p.request_body("classify this", &config);
        assert_eq!(body["model"], "m");
        assert_eq!(body["max_tokens"], 64);
        assert_eq!(body["messages"][0]["content"], "classify this");
        assert_eq!(body["stream"], false);
    }

    #[test]
    fn test_first_choice() {
        let body = r#"{"choices":[{"message":{"role":"assistant","content":"hi"}}]}"#;
        assert_eq!(first_choice(body).unwrap(), "hi");
        assert!(first_choice(r#"{"choices":[]}"#).is_err());
        assert!(first_choice("<html>bad gateway</html>").is_err());
    }

    #[tokio::test]
    async fn test_ready_requires_key() {
        assert!(!provider(ApiProvider::OpenAI, "").is_ready().await);
        assert!(provider(ApiProvider::OpenAI, "key").is_ready().await);
    }
}
