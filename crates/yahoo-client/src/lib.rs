use async_trait::async_trait;
use chrono::{DateTime, Utc};
use quote_core::{ProviderQuote, ProviderStatistics, QuoteError, QuoteProvider};
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "https://query1.finance.yahoo.com";

const MAX_ATTEMPTS: u32 = 3;
const RATE_LIMIT_BACKOFF_SECS: u64 = 5;

#[derive(Clone)]
pub struct YahooClient {
    base_url: String,
    client: Client,
}

impl YahooClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Self {
        let client = Client::builder()
            .timeout(timeout)
            // The quote endpoints reject requests without a browser-like agent
            .user_agent("Mozilla/5.0 (compatible; stock-insights/0.1)")
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Send a request with automatic 429 retry.
    async fn send_request(&self, builder: reqwest::RequestBuilder) -> Result<reqwest::Response, QuoteError> {
        let request = builder.build().map_err(|e| QuoteError::ProviderError(e.to_string()))?;

        let (request, client) = (&request, &self.client);
        retry_rate_limited(
            move || async move {
                let req_clone = request.try_clone()
                    .ok_or_else(|| QuoteError::ProviderError("Cannot clone request".to_string()))?;
                client.execute(req_clone).await
                    .map_err(|e| QuoteError::ProviderError(e.to_string()))
            },
            |response| response.status().as_u16() == 429,
        )
        .await
    }

    async fn get_text(&self, builder: reqwest::RequestBuilder) -> Result<String, QuoteError> {
        let response = self.send_request(builder).await?;

        if !response.status().is_success() {
            return Err(QuoteError::ProviderError(format!(
                "HTTP {}: {}",
                response.status(),
                response.text().await.unwrap_or_default()
            )));
        }

        response.text().await.map_err(|e| QuoteError::ProviderError(e.to_string()))
    }

    /// Get the primary quote for a symbol
    pub async fn get_quote(&self, symbol: &str) -> Result<ProviderQuote, QuoteError> {
        let url = format!("{}/v7/finance/quote", self.base_url);
        let body = self.get_text(self.client.get(&url).query(&[("symbols", symbol)])).await?;
        parse_quote_response(&body, symbol)
    }

    /// Get summary detail and key statistics for a symbol
    pub async fn get_quote_summary(&self, symbol: &str) -> Result<ProviderStatistics, QuoteError> {
        let url = format!("{}/v10/finance/quoteSummary/{}", self.base_url, symbol);
        let body = self
            .get_text(self.client.get(&url).query(&[("modules", "summaryDetail,defaultKeyStatistics")]))
            .await?;
        parse_summary_response(&body, symbol)
    }
}

#[async_trait]
impl QuoteProvider for YahooClient {
    async fn quote(&self, symbol: &str) -> Result<ProviderQuote, QuoteError> {
        self.get_quote(symbol).await
    }

    async fn statistics(&self, symbol: &str) -> Result<ProviderStatistics, QuoteError> {
        self.get_quote_summary(symbol).await
    }
}

fn parse_quote_response(body: &str, symbol: &str) -> Result<ProviderQuote, QuoteError> {
    let response: QuoteResponse = serde_json::from_str(body)
        .map_err(|e| QuoteError::InvalidData(format!("failed to parse quote response: {}", e)))?;

    if let Some(error) = response.quote_response.error {
        if !error.is_null() {
            return Err(QuoteError::ProviderError(format!("quote error for {}: {}", symbol, error)));
        }
    }

    let raw = response
        .quote_response
        .result
        .into_iter()
        .next()
        .ok_or_else(|| QuoteError::ProviderError(format!("No quote returned for {}", symbol)))?;

    Ok(ProviderQuote {
        symbol: raw.symbol,
        long_name: raw.long_name,
        short_name: raw.short_name,
        regular_market_open: raw.regular_market_open,
        regular_market_day_high: raw.regular_market_day_high,
        regular_market_day_low: raw.regular_market_day_low,
        regular_market_price: raw.regular_market_price,
        regular_market_volume: raw.regular_market_volume,
        market_cap: raw.market_cap,
        trailing_pe: raw.trailing_pe,
        dividend_yield: raw.dividend_yield,
        dividend_rate: raw.dividend_rate,
        regular_market_change_percent: raw.regular_market_change_percent,
        sector: raw.sector,
        country: raw.country,
        fifty_two_week_high: raw.fifty_two_week_high,
        fifty_two_week_low: raw.fifty_two_week_low,
        average_volume: raw.average_daily_volume_3_month.or(raw.average_daily_volume_10_day),
        currency: raw.currency,
        full_exchange_name: raw.full_exchange_name,
        exchange: raw.exchange,
        ex_dividend_date: raw.ex_dividend_date.and_then(epoch_to_utc),
        dividend_date: raw.dividend_date.and_then(epoch_to_utc),
    })
}

fn parse_summary_response(body: &str, symbol: &str) -> Result<ProviderStatistics, QuoteError> {
    let response: SummaryResponse = serde_json::from_str(body)
        .map_err(|e| QuoteError::InvalidData(format!("failed to parse summary response: {}", e)))?;

    let result = response
        .quote_summary
        .result
        .and_then(|r| r.into_iter().next())
        .ok_or_else(|| QuoteError::ProviderError(format!("No summary returned for {}", symbol)))?;

    let stats = result.default_key_statistics.unwrap_or_default();
    let detail = result.summary_detail.unwrap_or_default();

    Ok(ProviderStatistics {
        trailing_pe: stats.trailing_pe.raw().or(detail.trailing_pe.raw()),
        beta: stats.beta.raw().or(detail.beta.raw()),
        par_value: stats.par_value.raw().or(detail.par_value.raw()),
    })
}

fn epoch_to_utc(secs: i64) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp(secs, 0)
}

// Quote response structures
#[derive(Debug, Deserialize)]
struct QuoteResponse {
    #[serde(rename = "quoteResponse")]
    quote_response: QuoteResponseData,
}

#[derive(Debug, Deserialize)]
struct QuoteResponseData {
    #[serde(default)]
    result: Vec<RawQuote>,
    #[serde(default)]
    error: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawQuote {
    symbol: Option<String>,
    long_name: Option<String>,
    short_name: Option<String>,
    regular_market_open: Option<f64>,
    regular_market_day_high: Option<f64>,
    regular_market_day_low: Option<f64>,
    regular_market_price: Option<f64>,
    regular_market_volume: Option<f64>,
    market_cap: Option<f64>,
    #[serde(rename = "trailingPE")]
    trailing_pe: Option<f64>,
    dividend_yield: Option<f64>,
    dividend_rate: Option<f64>,
    regular_market_change_percent: Option<f64>,
    sector: Option<String>,
    country: Option<String>,
    fifty_two_week_high: Option<f64>,
    fifty_two_week_low: Option<f64>,
    average_daily_volume_3_month: Option<f64>,
    average_daily_volume_10_day: Option<f64>,
    currency: Option<String>,
    full_exchange_name: Option<String>,
    exchange: Option<String>,
    ex_dividend_date: Option<i64>,
    dividend_date: Option<i64>,
}

// Summary response structures
#[derive(Debug, Deserialize)]
struct SummaryResponse {
    #[serde(rename = "quoteSummary")]
    quote_summary: SummaryData,
}

#[derive(Debug, Deserialize)]
struct SummaryData {
    result: Option<Vec<SummaryResult>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SummaryResult {
    summary_detail: Option<SummaryModule>,
    default_key_statistics: Option<SummaryModule>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SummaryModule {
    #[serde(default, rename = "trailingPE")]
    trailing_pe: Option<RawValue>,
    #[serde(default)]
    beta: Option<RawValue>,
    #[serde(default)]
    par_value: Option<RawValue>,
}

/// Yahoo wraps numeric summary fields as `{"raw": 1.23, "fmt": "1.23"}`
#[derive(Debug, Deserialize)]
struct RawValue {
    raw: Option<f64>,
}

trait RawExt {
    fn raw(&self) -> Option<f64>;
}

impl RawExt for Option<RawValue> {
    fn raw(&self) -> Option<f64> {
        self.as_ref().and_then(|v| v.raw)
    }
}

/// Run `send` up to `MAX_ATTEMPTS` times while `is_limited` says the reply was
/// rate limited, pausing between attempts but not after the last one.
async fn retry_rate_limited<T, F, Fut>(
    mut send: F,
    is_limited: impl Fn(&T) -> bool,
) -> Result<T, QuoteError>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, QuoteError>>,
{
    for attempt in 1..=MAX_ATTEMPTS {
        let reply = send().await?;
        if !is_limited(&reply) {
            return Ok(reply);
        }

        if attempt < MAX_ATTEMPTS {
            tracing::warn!(
                "Yahoo 429 rate limited, waiting {}s before retry {}/{}",
                RATE_LIMIT_BACKOFF_SECS, attempt, MAX_ATTEMPTS
            );
            tokio::time::sleep(Duration::from_secs(RATE_LIMIT_BACKOFF_SECS)).await;
        } else {
            tracing::warn!("Yahoo 429 rate limited on final attempt {}/{}", attempt, MAX_ATTEMPTS);
        }
    }

    Err(QuoteError::RateLimited(format!("Yahoo still rate limiting after {} attempts", MAX_ATTEMPTS)))
}
