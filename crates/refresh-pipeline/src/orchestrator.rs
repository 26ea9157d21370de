use std::sync::{Arc, RwLock};

use chrono::Utc;
use quote_core::{InsightAnalyzer, InstrumentKind, QuoteError, RecordStore};
use tokio::sync::Mutex;

use crate::fetcher::QuoteFetcher;

/// Where a refresh cycle currently is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CycleState {
    #[default]
    Idle,
    Fetching,
    Enriching,
    Persisting,
}

/// Result of one trigger
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    Completed { persisted: usize },
    Failed { persisted: usize, error: String },
    /// Another cycle was still running
    Skipped,
}

/// Runs fetch, enrich and persist as one cycle. At most one cycle runs at a time.
pub struct RefreshOrchestrator {
    fetcher: QuoteFetcher,
    analyzer: Arc<dyn InsightAnalyzer>,
    store: Arc<dyn RecordStore>,
    symbols: RwLock<Vec<String>>,
    running: Mutex<()>,
    state: RwLock<CycleState>,
}

impl RefreshOrchestrator {
    pub fn new(
        fetcher: QuoteFetcher,
        analyzer: Arc<dyn InsightAnalyzer>,
        store: Arc<dyn RecordStore>,
    ) -> Self {
        let symbols = fetcher.kind().default_symbols();
        Self {
            fetcher,
            analyzer,
            store,
            symbols: RwLock::new(symbols),
            running: Mutex::new(()),
            state: RwLock::new(CycleState::Idle),
        }
    }

    /// Replace the tracked symbol list
    pub fn with_symbols(self, symbols: Vec<String>) -> Self {
        let normalized = symbols
            .into_iter()
            .map(|s| s.trim().to_uppercase())
            .filter(|s| !s.is_empty())
            .collect();
        if let Ok(mut guard) = self.symbols.write() {
            *guard = normalized;
        }
        self
    }

    pub fn kind(&self) -> InstrumentKind {
        self.fetcher.kind()
    }

    pub fn fetcher(&self) -> &QuoteFetcher {
        &self.fetcher
    }

    pub fn symbols(&self) -> Vec<String> {
        self.symbols.read().map(|s| s.clone()).unwrap_or_default()
    }

    /// Track another symbol. Returns false when it was already tracked.
    pub fn add_symbol(&self, symbol: &str) -> bool {
        let symbol = symbol.trim().to_uppercase();
        if symbol.is_empty() {
            return false;
        }

        let Ok(mut symbols) = self.symbols.write() else {
            return false;
        };
        if symbols.contains(&symbol) {
            return false;
        }

        tracing::info!("Added {} to tracked symbols", symbol);
        symbols.push(symbol);
        true
    }

    pub fn state(&self) -> CycleState {
        self.state.read().map(|s| *s).unwrap_or_default()
    }

    fn set_state(&self, state: CycleState) {
        if let Ok(mut guard) = self.state.write() {
            *guard = state;
        }
    }

    /// Run one refresh cycle. Errors are logged and reported in the outcome.
    pub async fn run_cycle(&self) -> CycleOutcome {
        let Ok(_guard) = self.running.try_lock() else {
            tracing::warn!("Previous {} refresh still running, skipping trigger", self.kind());
            return CycleOutcome::Skipped;
        };

        let started = std::time::Instant::now();
        tracing::info!("Starting {} data update", self.kind());

        let mut persisted = 0;
        let result = self.execute(&mut persisted).await;
        self.set_state(CycleState::Idle);

        match result {
            Ok(()) => {
                tracing::info!(
                    "Updated {} {} records in {:.1}s",
                    persisted,
                    self.kind(),
                    started.elapsed().as_secs_f64()
                );
                CycleOutcome::Completed { persisted }
            }
            Err(e) => {
                tracing::error!("Error in {} data update: {}", self.kind(), e);
                CycleOutcome::Failed {
                    persisted,
                    error: e.to_string(),
                }
            }
        }
    }

    async fn execute(&self, persisted: &mut usize) -> Result<(), QuoteError> {
        let symbols = self.symbols();

        self.set_state(CycleState::Fetching);
        let records = self.fetcher.fetch(&symbols).await;

        self.set_state(CycleState::Enriching);
        let insights = self.analyzer.batch_analyze(&records).await?;

        self.set_state(CycleState::Persisting);
        let now = Utc::now();
        for mut record in records {
            record.ai_insights = insights.get(&record.symbol).cloned().unwrap_or_default();
            record.last_updated = Some(now);
            self.store.upsert(&record).await?;
            *persisted += 1;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::insights::InsightGenerator;
    use crate::store::QuoteStore;
    use async_trait::async_trait;
    use quote_core::{
        InsightProvider, ProviderQuote, ProviderStatistics, QuoteProvider, QuoteRecord,
    };
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct StaticQuotes;

    #[async_trait]
    impl QuoteProvider for StaticQuotes {
        async fn quote(&self, symbol: &str) -> Result<ProviderQuote, QuoteError> {
            if symbol == "BADSYM" {
                return Err(QuoteError::ProviderError("not found".to_string()));
            }
            Ok(ProviderQuote {
                symbol: Some(symbol.to_string()),
                long_name: Some(format!("{} Inc.", symbol)),
                regular_market_price: Some(100.0),
                regular_market_change_percent: Some(0.01),
                ..Default::default()
            })
        }

        async fn statistics(&self, _symbol: &str) -> Result<ProviderStatistics, QuoteError> {
            Ok(ProviderStatistics::default())
        }
    }

    struct EchoInsights;

    #[async_trait]
    impl InsightProvider for EchoInsights {
        async fn generate(&self, _prompt: &str) -> Result<String, QuoteError> {
            Ok("steady".to_string())
        }
    }

    struct BrokenAnalyzer;

    #[async_trait]
    impl InsightAnalyzer for BrokenAnalyzer {
        async fn batch_analyze(
            &self,
            _records: &[QuoteRecord],
        ) -> Result<HashMap<String, String>, QuoteError> {
            Err(QuoteError::ProviderError("generator offline".to_string()))
        }
    }

    /// Slow analyzer that counts how often it was entered
    #[derive(Default)]
    struct SlowAnalyzer {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl InsightAnalyzer for SlowAnalyzer {
        async fn batch_analyze(
            &self,
            records: &[QuoteRecord],
        ) -> Result<HashMap<String, String>, QuoteError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(records.iter().map(|r| (r.symbol.clone(), "slow".to_string())).collect())
        }
    }

    /// Accepts a fixed number of writes, then fails
    struct FlakyStore {
        inner: QuoteStore,
        remaining: AtomicUsize,
    }

    #[async_trait]
    impl RecordStore for FlakyStore {
        async fn upsert(&self, record: &QuoteRecord) -> Result<(), QuoteError> {
            let left = self.remaining.load(Ordering::SeqCst);
            if left == 0 {
                return Err(QuoteError::DatabaseError("disk full".to_string()));
            }
            self.remaining.store(left - 1, Ordering::SeqCst);
            self.inner.upsert(record).await
        }

        async fn list_recent(&self) -> Result<Vec<QuoteRecord>, QuoteError> {
            self.inner.list_recent().await
        }

        async fn find(&self, symbol: &str) -> Result<Option<QuoteRecord>, QuoteError> {
            self.inner.find(symbol).await
        }
    }

    /// Plain map store; avoids sqlx pool timeouts under paused time
    #[derive(Default)]
    struct MapStore {
        records: std::sync::Mutex<HashMap<String, QuoteRecord>>,
    }

    #[async_trait]
    impl RecordStore for MapStore {
        async fn upsert(&self, record: &QuoteRecord) -> Result<(), QuoteError> {
            self.records.lock().unwrap().insert(record.symbol.clone(), record.clone());
            Ok(())
        }

        async fn list_recent(&self) -> Result<Vec<QuoteRecord>, QuoteError> {
            Ok(self.records.lock().unwrap().values().cloned().collect())
        }

        async fn find(&self, symbol: &str) -> Result<Option<QuoteRecord>, QuoteError> {
            Ok(self.records.lock().unwrap().get(symbol).cloned())
        }
    }

    fn fetcher() -> QuoteFetcher {
        QuoteFetcher::new(Arc::new(StaticQuotes), InstrumentKind::Ordinary)
            .with_delays(Duration::ZERO, Duration::ZERO)
    }

    fn symbols(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    async fn memory_store() -> QuoteStore {
        QuoteStore::new("sqlite::memory:").await.unwrap()
    }

    #[tokio::test]
    async fn test_cycle_persists_merged_records() {
        let store = memory_store().await;
        let analyzer = InsightGenerator::new(Arc::new(EchoInsights)).with_batch_delay(Duration::ZERO);
        let orchestrator =
            RefreshOrchestrator::new(fetcher(), Arc::new(analyzer), Arc::new(store.clone()))
                .with_symbols(symbols(&["aapl", "BADSYM"]));

        let outcome = orchestrator.run_cycle().await;
        assert_eq!(outcome, CycleOutcome::Completed { persisted: 2 });
        assert_eq!(orchestrator.state(), CycleState::Idle);

        let aapl = store.find("AAPL").await.unwrap().unwrap();
        assert_eq!(aapl.close, 100.0);
        assert_eq!(aapl.percent_change, 1.0);
        assert_eq!(aapl.ai_insights, "steady");
        assert!(aapl.last_updated.is_some());

        let bad = store.find("BADSYM").await.unwrap().unwrap();
        assert!(bad.is_placeholder());
    }

    #[tokio::test]
    async fn test_two_cycles_only_move_last_updated() {
        let store = memory_store().await;
        let analyzer = InsightGenerator::new(Arc::new(EchoInsights)).with_batch_delay(Duration::ZERO);
        let orchestrator =
            RefreshOrchestrator::new(fetcher(), Arc::new(analyzer), Arc::new(store.clone()))
                .with_symbols(symbols(&["MSFT", "NVDA"]));

        orchestrator.run_cycle().await;
        let first = store.list_recent().await.unwrap();
        orchestrator.run_cycle().await;
        let second = store.list_recent().await.unwrap();

        assert_eq!(first.len(), second.len());
        let strip = |r: &QuoteRecord| QuoteRecord {
            last_updated: None,
            created_at: None,
            updated_at: None,
            ..r.clone()
        };
        let by_symbol = |records: &[QuoteRecord]| -> HashMap<String, QuoteRecord> {
            records.iter().map(|r| (r.symbol.clone(), strip(r))).collect()
        };
        assert_eq!(by_symbol(&first), by_symbol(&second));

        let before = first.iter().find(|r| r.symbol == "MSFT").unwrap();
        let after = second.iter().find(|r| r.symbol == "MSFT").unwrap();
        assert!(after.last_updated >= before.last_updated);
        assert_eq!(after.created_at, before.created_at);
    }

    #[tokio::test]
    async fn test_generator_failure_persists_nothing() {
        let store = memory_store().await;
        let orchestrator =
            RefreshOrchestrator::new(fetcher(), Arc::new(BrokenAnalyzer), Arc::new(store.clone()))
                .with_symbols(symbols(&["AAPL", "TSLA"]));

        let outcome = orchestrator.run_cycle().await;
        assert!(matches!(outcome, CycleOutcome::Failed { persisted: 0, .. }));
        assert_eq!(store.count().await.unwrap(), 0);
        assert_eq!(orchestrator.state(), CycleState::Idle);
    }

    #[tokio::test]
    async fn test_persistence_failure_aborts_remaining_symbols() {
        let inner = memory_store().await;
        let store = FlakyStore {
            inner: inner.clone(),
            remaining: AtomicUsize::new(1),
        };
        let analyzer = InsightGenerator::new(Arc::new(EchoInsights)).with_batch_delay(Duration::ZERO);
        let orchestrator = RefreshOrchestrator::new(fetcher(), Arc::new(analyzer), Arc::new(store))
            .with_symbols(symbols(&["AAPL", "GOOGL", "AMZN"]));

        let outcome = orchestrator.run_cycle().await;
        match outcome {
            CycleOutcome::Failed { persisted, error } => {
                assert_eq!(persisted, 1);
                assert!(error.contains("disk full"));
            }
            other => panic!("expected failure, got {:?}", other),
        }
        assert_eq!(inner.count().await.unwrap(), 1);
        assert!(inner.find("AAPL").await.unwrap().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_overlapping_trigger_is_skipped() {
        let store = Arc::new(MapStore::default());
        let analyzer = Arc::new(SlowAnalyzer::default());
        let orchestrator = Arc::new(
            RefreshOrchestrator::new(fetcher(), analyzer.clone(), store.clone())
                .with_symbols(symbols(&["AAPL"])),
        );

        let first = {
            let orchestrator = Arc::clone(&orchestrator);
            tokio::spawn(async move { orchestrator.run_cycle().await })
        };
        // Let the first cycle reach the slow analyzer
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(orchestrator.state(), CycleState::Enriching);

        assert_eq!(orchestrator.run_cycle().await, CycleOutcome::Skipped);
        assert_eq!(first.await.unwrap(), CycleOutcome::Completed { persisted: 1 });
        assert_eq!(analyzer.calls.load(Ordering::SeqCst), 1);

        // Guard released once the first cycle finished
        assert_eq!(orchestrator.run_cycle().await, CycleOutcome::Completed { persisted: 1 });
        assert_eq!(store.records.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_add_symbol_ignores_duplicates() {
        let store = memory_store().await;
        let orchestrator =
            RefreshOrchestrator::new(fetcher(), Arc::new(BrokenAnalyzer), Arc::new(store));

        let defaults = InstrumentKind::Ordinary.default_symbols();
        assert_eq!(orchestrator.symbols(), defaults);

        assert!(orchestrator.add_symbol("amd"));
        assert!(!orchestrator.add_symbol("AMD"));
        assert!(!orchestrator.add_symbol("AAPL"));
        assert!(!orchestrator.add_symbol("  "));
        assert_eq!(orchestrator.symbols().len(), defaults.len() + 1);
        assert_eq!(orchestrator.symbols().last().map(String::as_str), Some("AMD"));
    }
}
