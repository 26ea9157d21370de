use thiserror::Error;

#[derive(Error, Debug)]
pub enum QuoteError {
    #[error("Provider error: {0}")]
    ProviderError(String),

    #[error("Invalid data: {0}")]
    InvalidData(String),

    #[error("Rate limited: {0}")]
    RateLimited(String),

    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Unknown instrument kind: {0}")]
    UnknownKind(String),
}
