//! Insight generator: short commentary per record, in small concurrent batches.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::future::join_all;
use quote_core::{InsightAnalyzer, InsightProvider, QuoteError, QuoteRecord};

pub const INSIGHTS_UNAVAILABLE: &str = "AI insights temporarily unavailable";
pub const ANALYSIS_UNAVAILABLE: &str = "Analysis unavailable";

pub const DEFAULT_BATCH_SIZE: usize = 3;
pub const DEFAULT_BATCH_DELAY: Duration = Duration::from_millis(2000);

#[derive(Clone)]
pub struct InsightGenerator {
    provider: Arc<dyn InsightProvider>,
    batch_size: usize,
    batch_delay: Duration,
}

impl InsightGenerator {
    pub fn new(provider: Arc<dyn InsightProvider>) -> Self {
        Self {
            provider,
            batch_size: DEFAULT_BATCH_SIZE,
            batch_delay: DEFAULT_BATCH_DELAY,
        }
    }

    pub fn with_batch_delay(mut self, batch_delay: Duration) -> Self {
        self.batch_delay = batch_delay;
        self
    }

    /// Commentary for a single record. Never fails: provider errors yield a fixed placeholder.
    pub async fn generate_insight(&self, record: &QuoteRecord) -> String {
        generate_insight(self.provider.as_ref(), record).await
    }

    /// Commentary for every record, keyed by symbol. Requests run concurrently
    /// within a batch; batches run one after another with a pause between them.
    pub async fn batch_analyze(&self, records: &[QuoteRecord]) -> HashMap<String, String> {
        let mut insights = HashMap::with_capacity(records.len());
        let batch_count = records.len().div_ceil(self.batch_size);

        for (i, batch) in records.chunks(self.batch_size).enumerate() {
            let handles: Vec<_> = batch
                .iter()
                .map(|record| {
                    let provider = Arc::clone(&self.provider);
                    let record = record.clone();
                    tokio::spawn(async move { generate_insight(provider.as_ref(), &record).await })
                })
                .collect();

            let results = join_all(handles).await;

            // Insert in input order so a repeated symbol keeps its later result
            for (record, result) in batch.iter().zip(results) {
                let insight = match result {
                    Ok(text) => text,
                    Err(e) => {
                        tracing::error!("Error analyzing {}: {}", record.symbol, e);
                        ANALYSIS_UNAVAILABLE.to_string()
                    }
                };
                insights.insert(record.symbol.clone(), insight);
            }

            if i + 1 < batch_count && !self.batch_delay.is_zero() {
                tokio::time::sleep(self.batch_delay).await;
            }
        }

        insights
    }
}

#[async_trait]
impl InsightAnalyzer for InsightGenerator {
    async fn batch_analyze(&self, records: &[QuoteRecord]) -> Result<HashMap<String, String>, QuoteError> {
        Ok(InsightGenerator::batch_analyze(self, records).await)
    }
}

async fn generate_insight(provider: &dyn InsightProvider, record: &QuoteRecord) -> String {
    match provider.generate(&build_prompt(record)).await {
        Ok(text) => text,
        Err(e) => {
            tracing::error!("Insight generation failed for {}: {}", record.symbol, e);
            INSIGHTS_UNAVAILABLE.to_string()
        }
    }
}

/// Bounded prompt describing one record
pub fn build_prompt(record: &QuoteRecord) -> String {
    format!(
        "Analyze this stock data and provide a brief insight (max 100 words):\n\
         \n\
         Stock: {} ({})\n\
         Current Price: ${:.2}\n\
         Change: {:.2}%\n\
         Volume: {}\n\
         P/E Ratio: {:.2}\n\
         Market Cap: {}\n\
         \n\
         Provide a concise analysis focusing on:\n\
         1. Current performance\n\
         2. Key metrics interpretation\n\
         3. Brief outlook (neutral tone)",
        record.symbol,
        record.name,
        record.close,
        record.percent_change,
        record.volume,
        record.pe_ratio,
        record.market_cap,
    )
}
