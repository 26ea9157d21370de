//! Cron-style cadences evaluated once per minute in their own timezone.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Datelike, Timelike, Utc};
use chrono_tz::Tz;
use quote_core::QuoteError;

use crate::orchestrator::{CycleOutcome, RefreshOrchestrator};

pub const MARKET_HOURS_CRON: &str = "*/15 9-16 * * 1-5";
pub const FALLBACK_CRON: &str = "0 * * * *";

/// Five-field cron expression: minute hour day-of-month month day-of-week
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CronSchedule {
    expression: String,
    minutes: Vec<bool>,
    hours: Vec<bool>,
    days: Vec<bool>,
    months: Vec<bool>,
    weekdays: Vec<bool>,
    days_restricted: bool,
    weekdays_restricted: bool,
}

impl CronSchedule {
    pub fn parse(expression: &str) -> Result<Self, QuoteError> {
        let fields: Vec<&str> = expression.split_whitespace().collect();
        if fields.len() != 5 {
            return Err(QuoteError::InvalidData(format!(
                "cron expression '{}' must have 5 fields",
                expression
            )));
        }

        let mut weekdays = parse_field(fields[4], 0, 7)?;
        // 7 is an alias for Sunday
        if weekdays[7] {
            weekdays[0] = true;
        }
        weekdays.truncate(7);

        Ok(Self {
            expression: expression.to_string(),
            minutes: parse_field(fields[0], 0, 59)?,
            hours: parse_field(fields[1], 0, 23)?,
            days: parse_field(fields[2], 1, 31)?,
            months: parse_field(fields[3], 1, 12)?,
            weekdays,
            days_restricted: fields[2] != "*",
            weekdays_restricted: fields[4] != "*",
        })
    }

    pub fn expression(&self) -> &str {
        &self.expression
    }

    /// Whether the schedule fires during the given local minute
    pub fn matches<T: Datelike + Timelike>(&self, at: &T) -> bool {
        if !self.minutes[at.minute() as usize]
            || !self.hours[at.hour() as usize]
            || !self.months[at.month() as usize]
        {
            return false;
        }

        let day = self.days[at.day() as usize];
        let weekday = self.weekdays[at.weekday().num_days_from_sunday() as usize];

        // Standard cron: when both day fields are restricted either may match
        match (self.days_restricted, self.weekdays_restricted) {
            (true, true) => day || weekday,
            _ => day && weekday,
        }
    }
}

/// Parse one cron field into a lookup table indexed by value
fn parse_field(field: &str, min: u32, max: u32) -> Result<Vec<bool>, QuoteError> {
    let invalid = || QuoteError::InvalidData(format!("invalid cron field '{}'", field));
    let mut allowed = vec![false; max as usize + 1];

    for part in field.split(',') {
        let (range, step) = match part.split_once('/') {
            Some((range, step)) => (range, step.parse::<u32>().map_err(|_| invalid())?),
            None => (part, 1),
        };
        if step == 0 {
            return Err(invalid());
        }

        let (start, end) = if range == "*" {
            (min, max)
        } else if let Some((a, b)) = range.split_once('-') {
            (
                a.parse::<u32>().map_err(|_| invalid())?,
                b.parse::<u32>().map_err(|_| invalid())?,
            )
        } else {
            let value = range.parse::<u32>().map_err(|_| invalid())?;
            // "5/10" means starting at 5 through the end
            if part.contains('/') {
                (value, max)
            } else {
                (value, value)
            }
        };

        if start < min || end > max || start > end {
            return Err(invalid());
        }

        for value in (start..=end).step_by(step as usize) {
            allowed[value as usize] = true;
        }
    }

    Ok(allowed)
}

/// A named schedule bound to a timezone
#[derive(Debug, Clone)]
pub struct Cadence {
    pub name: String,
    pub schedule: CronSchedule,
    pub timezone: Tz,
}

impl Cadence {
    pub fn new(name: impl Into<String>, expression: &str, timezone: Tz) -> Result<Self, QuoteError> {
        Ok(Self {
            name: name.into(),
            schedule: CronSchedule::parse(expression)?,
            timezone,
        })
    }

    pub fn is_due(&self, at: DateTime<Utc>) -> bool {
        self.schedule.matches(&at.with_timezone(&self.timezone))
    }
}

/// The trading-hours cadence plus the hourly fallback
pub fn default_cadences() -> Result<Vec<Cadence>, QuoteError> {
    Ok(vec![
        Cadence::new("market-hours", MARKET_HOURS_CRON, chrono_tz::America::New_York)?,
        Cadence::new("hourly", FALLBACK_CRON, chrono_tz::UTC)?,
    ])
}

/// Fires refresh cycles whenever a cadence is due
pub struct Scheduler {
    orchestrator: Arc<RefreshOrchestrator>,
    cadences: Vec<Cadence>,
    run_on_startup: bool,
}

impl Scheduler {
    pub fn new(orchestrator: Arc<RefreshOrchestrator>, cadences: Vec<Cadence>) -> Self {
        Self {
            orchestrator,
            cadences,
            run_on_startup: false,
        }
    }

    /// Also run one cycle as soon as `run` starts
    pub fn with_startup_run(mut self, enabled: bool) -> Self {
        self.run_on_startup = enabled;
        self
    }

    /// Names of the cadences due at `at`
    pub fn due(&self, at: DateTime<Utc>) -> Vec<&str> {
        self.cadences
            .iter()
            .filter(|c| c.is_due(at))
            .map(|c| c.name.as_str())
            .collect()
    }

    /// Start a cycle in the background; overlapping cycles are skipped by the orchestrator
    pub fn trigger(&self, reason: &str) -> tokio::task::JoinHandle<CycleOutcome> {
        tracing::info!("Refresh triggered ({})", reason);
        let orchestrator = Arc::clone(&self.orchestrator);
        tokio::spawn(async move { orchestrator.run_cycle().await })
    }

    /// Fire at most one cycle for the minute containing `at`, however many
    /// cadences are due in it
    pub fn tick(&self, at: DateTime<Utc>) -> Option<tokio::task::JoinHandle<CycleOutcome>> {
        let due = self.due(at);
        if due.is_empty() {
            return None;
        }
        Some(self.trigger(&due.join(", ")))
    }

    /// Evaluate cadences at each minute boundary until `shutdown` resolves
    pub async fn run(self, shutdown: impl Future<Output = ()>) {
        for cadence in &self.cadences {
            tracing::info!(
                "Scheduled {} refresh: '{}' ({})",
                cadence.name,
                cadence.schedule.expression(),
                cadence.timezone
            );
        }

        if self.run_on_startup {
            self.trigger("startup");
        }

        tokio::pin!(shutdown);

        loop {
            let wait = until_next_minute(Utc::now());

            tokio::select! {
                _ = &mut shutdown => {
                    tracing::info!("Scheduler shutting down");
                    break;
                }
                _ = tokio::time::sleep(wait) => {
                    // Land on the boundary even if the timer fired slightly early
                    self.tick(Utc::now() + chrono::Duration::seconds(1));
                }
            }
        }
    }
}

/// Time left until the next whole minute
fn until_next_minute(now: DateTime<Utc>) -> Duration {
    let elapsed_ms = u64::from(now.second()) * 1000 + u64::from(now.timestamp_subsec_millis());
    Duration::from_millis(60_000u64.saturating_sub(elapsed_ms).max(1))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetcher::QuoteFetcher;
    use async_trait::async_trait;
    use chrono::TimeZone;
    use quote_core::{
        InsightAnalyzer, InstrumentKind, ProviderQuote, ProviderStatistics, QuoteProvider,
        QuoteRecord, RecordStore,
    };
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::Notify;

    struct FlatQuotes;

    #[async_trait]
    impl QuoteProvider for FlatQuotes {
        async fn quote(&self, symbol: &str) -> Result<ProviderQuote, QuoteError> {
            Ok(ProviderQuote {
                symbol: Some(symbol.to_string()),
                long_name: Some(format!("{} Inc.", symbol)),
                regular_market_price: Some(50.0),
                ..Default::default()
            })
        }

        async fn statistics(&self, _symbol: &str) -> Result<ProviderStatistics, QuoteError> {
            Ok(ProviderStatistics::default())
        }
    }

    /// Counts cycles that reached the enrichment step
    #[derive(Default)]
    struct CountingAnalyzer {
        calls: AtomicUsize,
        entered: Notify,
    }

    #[async_trait]
    impl InsightAnalyzer for CountingAnalyzer {
        async fn batch_analyze(
            &self,
            _records: &[QuoteRecord],
        ) -> Result<HashMap<String, String>, QuoteError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.entered.notify_one();
            Ok(HashMap::new())
        }
    }

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

    fn counting_scheduler(cadences: Vec<Cadence>) -> (Scheduler, Arc<CountingAnalyzer>) {
        let fetcher = QuoteFetcher::new(Arc::new(FlatQuotes), InstrumentKind::Ordinary)
            .with_delays(Duration::ZERO, Duration::ZERO);
        let analyzer = Arc::new(CountingAnalyzer::default());
        let orchestrator = Arc::new(
            RefreshOrchestrator::new(fetcher, analyzer.clone(), Arc::new(MapStore::default()))
                .with_symbols(vec!["AAPL".to_string()]),
        );
        (Scheduler::new(orchestrator, cadences), analyzer)
    }

    fn utc(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, 0).unwrap()
    }

    #[test]
    fn test_parse_rejects_bad_expressions() {
        assert!(CronSchedule::parse("* * * *").is_err());
        assert!(CronSchedule::parse("60 * * * *").is_err());
        assert!(CronSchedule::parse("*/0 * * * *").is_err());
        assert!(CronSchedule::parse("5-1 * * * *").is_err());
        assert!(CronSchedule::parse("a * * * *").is_err());
        assert!(CronSchedule::parse("0 0 0 * *").is_err());
    }

    #[test]
    fn test_field_forms() {
        let cron = CronSchedule::parse("5,10-20/5,50/5 * * * *").unwrap();
        let hits: Vec<u32> = (0..60)
            .filter(|m| cron.matches(&utc(2024, 3, 4, 12, *m)))
            .collect();
        assert_eq!(hits, vec![5, 10, 15, 20, 50, 55]);
    }

    #[test]
    fn test_sunday_as_seven() {
        let cron = CronSchedule::parse("0 12 * * 7").unwrap();
        // 2024-03-03 was a Sunday
        assert!(cron.matches(&utc(2024, 3, 3, 12, 0)));
        assert!(!cron.matches(&utc(2024, 3, 4, 12, 0)));
    }

    #[test]
    fn test_day_fields_or_when_both_restricted() {
        let cron = CronSchedule::parse("0 0 1 * 1").unwrap();
        // First of the month (a Friday) and any Monday
        assert!(cron.matches(&utc(2024, 3, 1, 0, 0)));
        assert!(cron.matches(&utc(2024, 3, 4, 0, 0)));
        assert!(!cron.matches(&utc(2024, 3, 5, 0, 0)));
    }

    #[test]
    fn test_market_hours_in_new_york() {
        let cadences = default_cadences().unwrap();
        let market = &cadences[0];

        // 2024-03-05 is a Tuesday; 14:30 UTC is 09:30 EST
        assert!(market.is_due(utc(2024, 3, 5, 14, 30)));
        assert!(!market.is_due(utc(2024, 3, 5, 14, 31)));
        // 16:45 local is still inside the 9-16 hour window
        assert!(market.is_due(utc(2024, 3, 5, 21, 45)));
        // 17:00 local is not
        assert!(!market.is_due(utc(2024, 3, 5, 22, 0)));
        // Saturday
        assert!(!market.is_due(utc(2024, 3, 9, 15, 0)));
        // After DST starts 13:15 UTC is 09:15 EDT
        assert!(market.is_due(utc(2024, 3, 12, 13, 15)));
    }

    #[test]
    fn test_fallback_on_the_hour() {
        let cadences = default_cadences().unwrap();
        let hourly = &cadences[1];
        assert!(hourly.is_due(utc(2024, 3, 9, 3, 0)));
        assert!(!hourly.is_due(utc(2024, 3, 9, 3, 15)));
    }

    #[test]
    fn test_until_next_minute() {
        let at = Utc.with_ymd_and_hms(2024, 3, 5, 10, 0, 45).unwrap();
        assert_eq!(until_next_minute(at), Duration::from_secs(15));
        let on_boundary = utc(2024, 3, 5, 10, 0);
        assert_eq!(until_next_minute(on_boundary), Duration::from_secs(60));
    }

    #[test]
    fn test_custom_cadence_timezone() {
        let cadence = Cadence::new("tokyo-open", "0 9 * * 1-5", chrono_tz::Asia::Tokyo).unwrap();
        // 00:00 UTC Tuesday is 09:00 JST Tuesday
        assert!(cadence.is_due(utc(2024, 3, 5, 0, 0)));
        assert!(!cadence.is_due(utc(2024, 3, 5, 9, 0)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_both_cadences_due_at_three_pm_new_york() {
        let (scheduler, _) = counting_scheduler(default_cadences().unwrap());
        // 2024-03-05 20:00 UTC is 15:00 EST on a Tuesday
        assert_eq!(
            scheduler.due(utc(2024, 3, 5, 20, 0)),
            vec!["market-hours", "hourly"]
        );
        assert_eq!(scheduler.due(utc(2024, 3, 5, 20, 15)), vec!["market-hours"]);
        assert!(scheduler.due(utc(2024, 3, 9, 20, 15)).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_coinciding_cadences_fire_one_cycle() {
        let (scheduler, analyzer) = counting_scheduler(default_cadences().unwrap());

        let handle = scheduler.tick(utc(2024, 3, 5, 20, 0)).unwrap();
        assert_eq!(handle.await.unwrap(), CycleOutcome::Completed { persisted: 1 });
        assert_eq!(analyzer.calls.load(Ordering::SeqCst), 1);

        assert!(scheduler.tick(utc(2024, 3, 5, 20, 7)).is_none());
        assert_eq!(analyzer.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_startup_run_happens_immediately() {
        let (scheduler, analyzer) = counting_scheduler(Vec::new());
        let scheduler = scheduler.with_startup_run(true);

        let counter = analyzer.clone();
        let finished = tokio::time::timeout(
            Duration::from_secs(120),
            scheduler.run(async move { counter.entered.notified().await }),
        )
        .await;

        assert!(finished.is_ok());
        assert_eq!(analyzer.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_cycle_without_startup_run_or_due_cadence() {
        let (scheduler, analyzer) = counting_scheduler(Vec::new());

        let counter = analyzer.clone();
        let finished = tokio::time::timeout(
            Duration::from_secs(120),
            scheduler.run(async move { counter.entered.notified().await }),
        )
        .await;

        assert!(finished.is_err());
        assert_eq!(analyzer.calls.load(Ordering::SeqCst), 0);
    }
}
