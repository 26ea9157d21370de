use async_trait::async_trait;
use std::collections::HashMap;
use crate::{ProviderQuote, ProviderStatistics, QuoteError, QuoteRecord};

/// Market-data source used by the quote fetcher
#[async_trait]
pub trait QuoteProvider: Send + Sync {
    /// Primary quote for a single symbol
    async fn quote(&self, symbol: &str) -> Result<ProviderQuote, QuoteError>;

    /// Supplementary statistics (beta, P/E, par value). Callers treat this as best-effort.
    async fn statistics(&self, symbol: &str) -> Result<ProviderStatistics, QuoteError>;
}

/// Generative-text source used by the insight generator
#[async_trait]
pub trait InsightProvider: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String, QuoteError>;
}

/// Produces commentary for a batch of records, keyed by symbol
#[async_trait]
pub trait InsightAnalyzer: Send + Sync {
    async fn batch_analyze(&self, records: &[QuoteRecord]) -> Result<HashMap<String, String>, QuoteError>;
}

/// Persistent store of the latest snapshot per symbol
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Insert the record, or overwrite the existing one with the same symbol.
    async fn upsert(&self, record: &QuoteRecord) -> Result<(), QuoteError>;

    /// All records, most recently updated first.
    async fn list_recent(&self) -> Result<Vec<QuoteRecord>, QuoteError>;

    /// Exact match on symbol.
    async fn find(&self, symbol: &str) -> Result<Option<QuoteRecord>, QuoteError>;
}
