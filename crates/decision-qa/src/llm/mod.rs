//! LLM Module - narrow "complete" capability used by the classifier, the
//! compiler fallback, the evaluator, the ranker and the clarifier.
//!
//! Callers treat latency and malformed output as expected outcomes: every
//! consumer has a deterministic path to fall back on.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub mod external;
pub mod json;

pub use external::ExternalProvider;

/// LLM operation mode
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum LLMMode {
    /// External API provider
    External {
        provider: ApiProvider,
        api_key: String,
        model: String,
    },
    /// LLM disabled, rule-only mode
    Disabled,
}

/// External API providers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ApiProvider {
    OpenAI,
    /// Any OpenAI-compatible chat-completions endpoint.
    Custom { endpoint: String },
}

/// LLM configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LLMConfig {
    pub mode: LLMMode,
    pub max_tokens: usize,
    pub temperature: f32,
    pub top_p: f32,
    pub connect_timeout_secs: u64,
    pub request_timeout_secs: u64,
}

impl Default for LLMConfig {
    fn default() -> Self {
        Self {
            mode: LLMMode::Disabled,
            max_tokens: 1024,
            temperature: 0.0,
            top_p: 1.0,
            connect_timeout_secs: 10,
            request_timeout_secs: 30,
        }
    }
}

/// Per-call generation settings
#[derive(Debug, Clone)]
pub struct GenerationConfig {
    pub max_tokens: usize,
    pub temperature: f32,
    pub top_p: f32,
}

impl From<&LLMConfig> for GenerationConfig {
    fn from(config: &LLMConfig) -> Self {
        Self {
            max_tokens: config.max_tokens,
            temperature: config.temperature,
            top_p: config.top_p,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderInfo {
    pub name: String,
    pub model: String,
}

/// Core trait for LLM providers
#[async_trait]
pub trait LLMProvider: Send + Sync {
    /// Generate a completion
    async fn generate(&self, prompt: &str, config: &GenerationConfig) -> Result<String>;

    /// Get provider info
    fn info(&self) -> ProviderInfo;

    /// Check if provider is ready
    async fn is_ready(&self) -> bool;
}

/// Holds the configured provider, or nothing when the model is disabled.
#[derive(Clone)]
pub struct LLMManager {
    config: LLMConfig,
    provider: Option<Arc<dyn LLMProvider>>,
}

impl LLMManager {
    /// Create new LLM manager from configuration. A disabled mode yields a
    /// manager whose every call fails fast.
    pub fn new(config: LLMConfig) -> Result<Self> {
        let provider: Option<Arc<dyn LLMProvider>> = match &config.mode {
            LLMMode::External {
                provider,
                api_key,
                model,
            } => Some(Arc::new(ExternalProvider::new(
                provider.clone(),
                api_key.clone(),
                model.clone(),
                &config,
            )?)),
            LLMMode::Disabled => None,
        };
        if let Some(p) = &provider {
            let info = p.info();
            tracing::info!(provider = %info.name, model = %info.model, "LLM provider configured");
        }
        Ok(Self { config, provider })
    }

    pub fn disabled() -> Self {
        Self {
            config: LLMConfig::default(),
            provider: None,
        }
    }

    pub fn with_provider(provider: Arc<dyn LLMProvider>) -> Self {
        Self {
            config: LLMConfig::default(),
            provider: Some(provider),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.provider.is_some()
    }

    /// Generate with custom max_tokens
    pub async fn generate_custom(&self, prompt: &str, max_tokens: usize) -> Result<String> {
        match &self.provider {
            Some(provider) => {
                let mut config = GenerationConfig::from(&self.config);
                config.max_tokens = max_tokens;
                provider.generate(prompt, &config).await
            }
            None => Err(anyhow!("LLM is disabled or not initialized")),
        }
    }

    pub async fn is_ready(&self) -> bool {
        match &self.provider {
            Some(provider) => provider.is_ready().await,
            None => false,
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Scripted providers for unit tests.

    use super::*;
    use parking_lot::Mutex;

    /// Returns queued responses in order, then errors.
    pub struct ScriptedProvider {
        responses: Mutex<Vec<Result<String, String>>>,
        pub prompts: Mutex<Vec<String>>,
    }

    impl ScriptedProvider {
        pub fn new(responses: Vec<Result<String, String>>) -> Arc<Self> {
            let mut responses = responses;
            responses.reverse();
            Arc::new(Self {
                responses: Mutex::new(responses),
                prompts: Mutex::new(Vec::new()),
            })
        }

        pub fn ok(response: &str) -> Arc<Self> {
            Self::new(vec![Ok(response.to_string())])
        }
    }

    #[async_trait]
    impl LLMProvider for ScriptedProvider {
        async fn generate(&self, prompt: &str, _config: &GenerationConfig) -> Result<String> {
            self.prompts.lock().push(prompt.to_string());
            match self.responses.lock().pop() {
                Some(Ok(text)) => Ok(text),
                Some(Err(e)) => Err(anyhow!(e)),
                None => Err(anyhow!("no scripted response left")),
            }
        }

        fn info(&self) -> ProviderInfo {
            ProviderInfo {
                name: "scripted".to_string(),
                model: "test".to_string(),
            }
        }

        async fn is_ready(&self) -> bool {
            true
        }
    }

    pub fn manager(provider: Arc<ScriptedProvider>) -> LLMManager {
        LLMManager::with_provider(provider)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_disabled_manager_fails_fast() {
        let manager = LLMManager::new(LLMConfig::default()).unwrap();
        assert!(!manager.is_enabled());
        assert!(manager.generate_custom("hi", 10).await.is_err());
        assert!(!manager.is_ready().await);
    }

    #[tokio::test]
    async fn test_scripted_provider_in_order() {
        let provider = testing::ScriptedProvider::new(vec![Ok("a".into()), Ok("b".into())]);
        let manager = testing::manager(provider.clone());
        assert_eq!(manager.generate_custom("p1", 5).await.unwrap(), "a");
        assert_eq!(manager.generate_custom("p2", 5).await.unwrap(), "b");
        assert!(manager.generate_custom("p3", 5).await.is_err());
        assert_eq!(provider.prompts.lock().len(), 3);
    }
}
