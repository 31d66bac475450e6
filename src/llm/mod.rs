//! LLM integration.
//!
//! Supports:
//! - **OpenAI**: hosted chat completions API
//! - **Ollama**: local server speaking the OpenAI-compatible protocol
//!
//! Every provider built by [`create_provider`] is wrapped in a
//! [`RetryProvider`] so transient failures are absorbed at this boundary.

pub mod openai;
pub mod provider;
pub mod retry;

pub use openai::OpenAiProvider;
pub use provider::*;
pub use retry::{RetryPolicy, RetryProvider};

use std::sync::Arc;

use crate::error::LlmError;

const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
const OLLAMA_BASE_URL: &str = "http://localhost:11434/v1";

/// Supported LLM backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LlmBackend {
    OpenAi,
    Ollama,
}

impl LlmBackend {
    fn default_base_url(self) -> &'static str {
        match self {
            Self::OpenAi => OPENAI_BASE_URL,
            Self::Ollama => OLLAMA_BASE_URL,
        }
    }

    fn provider_name(self) -> &'static str {
        match self {
            Self::OpenAi => "openai",
            Self::Ollama => "ollama",
        }
    }
}

impl std::str::FromStr for LlmBackend {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "openai" => Ok(Self::OpenAi),
            "ollama" => Ok(Self::Ollama),
            other => Err(format!("Unknown LLM backend: {other}")),
        }
    }
}

/// Configuration for creating an LLM provider.
#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub backend: LlmBackend,
    pub api_key: secrecy::SecretString,
    pub model: String,
    /// Overrides the backend's default endpoint.
    pub base_url: Option<String>,
    pub max_retries: u32,
}

/// Create an LLM provider from configuration.
pub fn create_provider(config: &LlmConfig) -> Result<Arc<dyn LlmProvider>, LlmError> {
    let base_url = config
        .base_url
        .clone()
        .unwrap_or_else(|| config.backend.default_base_url().to_string());

    let provider = OpenAiProvider::new(
        &base_url,
        config.api_key.clone(),
        &config.model,
        config.backend.provider_name(),
    )?;

    tracing::info!(
        "Using {} (model: {}, endpoint: {})",
        config.backend.provider_name(),
        config.model,
        base_url
    );

    Ok(Arc::new(RetryProvider::new(
        Arc::new(provider),
        RetryPolicy::default().with_max_retries(config.max_retries),
    )))
}

/// Extract a JSON object from LLM output (handles markdown wrapping).
pub fn extract_json_object(text: &str) -> String {
    let trimmed = text.trim();

    if trimmed.starts_with('{') {
        return trimmed.to_string();
    }

    if let Some(start) = trimmed.find("```json") {
        let after = &trimmed[start + 7..];
        if let Some(end) = after.find("```") {
            return after[..end].trim().to_string();
        }
    }

    if let Some(start) = trimmed.find("```") {
        let after = &trimmed[start + 3..];
        if let Some(end) = after.find("```") {
            let inner = after[..end].trim();
            if inner.starts_with('{') {
                return inner.to_string();
            }
        }
    }

    if let (Some(start), Some(end)) = (trimmed.find('{'), trimmed.rfind('}'))
        && end > start
    {
        return trimmed[start..=end].to_string();
    }

    trimmed.to_string()
}
