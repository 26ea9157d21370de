pub mod error;
pub mod generate;

pub use error::{GeminiError, GeminiResult};
pub use generate::GenerateClient;

use async_trait::async_trait;
use quote_core::{InsightProvider, QuoteError};
use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_MODEL: &str = "gemini-1.5-flash";

/// Configuration for the generative-text service
#[derive(Debug, Clone)]
pub struct GeminiConfig {
    pub base_url: String,
    pub model: String,
    pub api_key: String,
    pub timeout: Duration,
}

#[derive(Clone)]
pub struct GeminiClient {
    pub generate: GenerateClient,
}

impl GeminiClient {
    pub fn new(config: GeminiConfig) -> Self {
        if config.api_key.is_empty() {
            tracing::warn!("GEMINI_API_KEY is not set; insights will fall back to placeholders");
        }
        Self {
            generate: GenerateClient::new(config.base_url, config.model, config.api_key, config.timeout),
        }
    }
}

#[async_trait]
impl InsightProvider for GeminiClient {
    async fn generate(&self, prompt: &str) -> Result<String, QuoteError> {
        Ok(self.generate.generate_content(prompt).await?)
    }
}
