use thiserror::Error;

#[derive(Error, Debug)]
pub enum GeminiError {
    #[error("HTTP request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),

    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Empty response: {0}")]
    EmptyResponse(String),

    #[error("API key not configured")]
    MissingApiKey,

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type GeminiResult<T> = Result<T, GeminiError>;

impl From<GeminiError> for quote_core::QuoteError {
    fn from(e: GeminiError) -> Self {
        quote_core::QuoteError::ProviderError(e.to_string())
    }
}
