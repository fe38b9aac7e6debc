// src/provider/mod.rs — Content-generation provider layer

pub mod google;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::infra::config::GeminiConfig;
use crate::infra::errors::EchoError;

/// Core trait that content-generation backends implement.
///
/// The engine treats this as an opaque prompt-in, text-out capability.
#[async_trait]
pub trait ModelProvider: Send + Sync {
    fn id(&self) -> &str;

    async fn chat(&self, request: ChatRequest) -> Result<ChatResponse, EchoError>;
}

/// A single-turn request: one user prompt plus sampling settings.
#[derive(Debug, Clone, Default)]
pub struct ChatRequest {
    pub model: String,
    pub prompt: String,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
}

#[derive(Debug, Clone)]
pub struct ChatResponse {
    pub content: String,
    pub usage: TokenUsage,
    pub stop_reason: StopReason,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

impl TokenUsage {
    pub fn total(&self) -> u32 {
        self.input_tokens + self.output_tokens
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub enum StopReason {
    EndTurn,
    MaxTokens,
    Safety,
    #[default]
    Unknown,
}

/// Per-call generation options.
#[derive(Debug, Clone)]
pub struct GenerationOptions {
    pub model: String,
    pub temperature: f32,
    pub max_output_tokens: u32,
}

impl Default for GenerationOptions {
    fn default() -> Self {
        Self::from(&GeminiConfig::default())
    }
}

impl From<&GeminiConfig> for GenerationOptions {
    fn from(config: &GeminiConfig) -> Self {
        Self {
            model: config.model.clone(),
            temperature: config.temperature,
            max_output_tokens: config.max_output_tokens,
        }
    }
}

/// Single-prompt convenience over `chat`: prompt in, text out.
pub async fn generate(
    provider: &Arc<dyn ModelProvider>,
    prompt: impl Into<String>,
    options: &GenerationOptions,
) -> Result<String, EchoError> {
    let response = provider
        .chat(ChatRequest {
            model: options.model.clone(),
            prompt: prompt.into(),
            max_tokens: Some(options.max_output_tokens),
            temperature: Some(options.temperature),
        })
        .await?;

    if matches!(response.stop_reason, StopReason::MaxTokens) {
        tracing::warn!("{} response hit the output token limit", provider.id());
    }

    tracing::debug!(
        "{} generated {} chars ({} tokens)",
        provider.id(),
        response.content.len(),
        response.usage.total()
    );
    Ok(response.content)
}
