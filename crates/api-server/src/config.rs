use anyhow::{Context, Result};
use chrono_tz::Tz;
use gemini_client::GeminiConfig;
use quote_core::InstrumentKind;
use refresh_pipeline::{FALLBACK_CRON, MARKET_HOURS_CRON};
use std::env;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub port: u16,
    pub database_url: String,

    // Providers
    pub gemini_api_key: String,
    pub gemini_model: String,
    pub gemini_base_url: String,
    pub yahoo_base_url: String,
    pub provider_timeout: Duration,

    // What to track
    pub kind: InstrumentKind,
    pub symbols: Vec<String>,

    // Pacing
    pub fetch_delay: Duration,
    pub variant_delay: Duration,
    pub insight_batch_delay: Duration,

    // Cadences
    pub market_hours_cron: String,
    pub market_hours_tz: Tz,
    pub fallback_cron: String,
    pub fallback_tz: Tz,
    pub run_on_startup: bool,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        let kind: InstrumentKind = env::var("INSTRUMENT_KIND")
            .unwrap_or_else(|_| "ordinary".to_string())
            .parse()
            .context("INSTRUMENT_KIND must be 'ordinary' or 'preferred'")?;

        // An empty override falls back to the kind's default list
        let symbols = env::var("SYMBOLS")
            .ok()
            .map(|s| parse_symbols(&s))
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| kind.default_symbols());

        Ok(Self {
            port: env::var("PORT")
                .unwrap_or_else(|_| "5000".to_string())
                .parse()
                .context("PORT must be a valid port number")?,
            database_url: env::var("DATABASE_URL")
                .unwrap_or_else(|_| "sqlite:stocks.db".to_string()),

            gemini_api_key: env::var("GEMINI_API_KEY").unwrap_or_default(),
            gemini_model: env::var("GEMINI_MODEL")
                .unwrap_or_else(|_| gemini_client::DEFAULT_MODEL.to_string()),
            gemini_base_url: env::var("GEMINI_BASE_URL")
                .unwrap_or_else(|_| gemini_client::DEFAULT_BASE_URL.to_string()),
            yahoo_base_url: env::var("YAHOO_BASE_URL")
                .unwrap_or_else(|_| yahoo_client::DEFAULT_BASE_URL.to_string()),
            provider_timeout: Duration::from_secs(
                env::var("PROVIDER_TIMEOUT_SECS")
                    .unwrap_or_else(|_| "30".to_string())
                    .parse()
                    .context("PROVIDER_TIMEOUT_SECS must be a whole number of seconds")?,
            ),

            kind,
            symbols,

            fetch_delay: millis("FETCH_DELAY_MS", 1000)?,
            variant_delay: millis("VARIANT_DELAY_MS", 500)?,
            insight_batch_delay: millis("INSIGHT_BATCH_DELAY_MS", 2000)?,

            market_hours_cron: env::var("MARKET_HOURS_CRON")
                .unwrap_or_else(|_| MARKET_HOURS_CRON.to_string()),
            market_hours_tz: timezone("MARKET_HOURS_TZ", "America/New_York")?,
            fallback_cron: env::var("FALLBACK_CRON").unwrap_or_else(|_| FALLBACK_CRON.to_string()),
            fallback_tz: timezone("FALLBACK_TZ", "UTC")?,
            run_on_startup: env::var("RUN_ON_STARTUP")
                .unwrap_or_else(|_| "true".to_string())
                .parse()
                .context("RUN_ON_STARTUP must be true or false")?,
        })
    }

    /// Generative-text client settings, sharing the provider timeout
    pub fn gemini(&self) -> GeminiConfig {
        GeminiConfig {
            base_url: self.gemini_base_url.clone(),
            model: self.gemini_model.clone(),
            api_key: self.gemini_api_key.clone(),
            timeout: self.provider_timeout,
        }
    }
}

pub fn parse_symbols(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_uppercase())
        .filter(|s| !s.is_empty())
        .collect()
}

fn millis(var: &str, default: u64) -> Result<Duration> {
    let value = match env::var(var) {
        Ok(v) => v
            .parse()
            .with_context(|| format!("{} must be a whole number of milliseconds", var))?,
        Err(_) => default,
    };
    Ok(Duration::from_millis(value))
}

fn timezone(var: &str, default: &str) -> Result<Tz> {
    let name = env::var(var).unwrap_or_else(|_| default.to_string());
    name.parse::<Tz>()
        .map_err(|e| anyhow::anyhow!("{} '{}' is not a known timezone: {}", var, name, e))
}
