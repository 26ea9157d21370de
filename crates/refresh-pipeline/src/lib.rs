pub mod fetcher;
pub mod insights;
pub mod orchestrator;
pub mod scheduler;
pub mod store;

pub use fetcher::{build_record, QuoteFetcher, DEFAULT_FETCH_DELAY, DEFAULT_VARIANT_DELAY};
pub use insights::{
    build_prompt, InsightGenerator, ANALYSIS_UNAVAILABLE, DEFAULT_BATCH_DELAY, DEFAULT_BATCH_SIZE,
    INSIGHTS_UNAVAILABLE,
};
pub use orchestrator::{CycleOutcome, CycleState, RefreshOrchestrator};
pub use scheduler::{default_cadences, Cadence, CronSchedule, Scheduler, FALLBACK_CRON, MARKET_HOURS_CRON};
pub use store::QuoteStore;
