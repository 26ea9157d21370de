use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Latest snapshot of a single instrument, as stored and served
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuoteRecord {
    pub symbol: String,
    pub name: String,
    #[serde(default)]
    pub open: f64,
    #[serde(default)]
    pub high: f64,
    #[serde(default)]
    pub low: f64,
    #[serde(default)]
    pub close: f64,
    #[serde(default)]
    pub volume: f64,
    #[serde(default)]
    pub market_cap: f64,
    #[serde(default)]
    pub pe_ratio: f64,
    /// Percentage (2.5 means 2.5%)
    #[serde(default)]
    pub dividend_yield: f64,
    /// Percentage (2.0 means 2.0%)
    #[serde(default)]
    pub percent_change: f64,
    #[serde(default)]
    pub fifty_two_week_high: f64,
    #[serde(default)]
    pub fifty_two_week_low: f64,
    #[serde(default)]
    pub average_volume: f64,
    #[serde(default)]
    pub beta: f64,
    #[serde(default)]
    pub sector: String,
    #[serde(default)]
    pub country: String,
    /// Present only for preferred instruments
    #[serde(flatten, default, skip_serializing_if = "Option::is_none")]
    pub preferred: Option<PreferredDetails>,
    #[serde(default)]
    pub ai_insights: String,
    #[serde(default)]
    pub last_updated: Option<DateTime<Utc>>,
    /// Set by the store on first insert
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    /// Set by the store on every write
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

/// Dividend and par-value fields carried by preferred instruments
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreferredDetails {
    pub dividend_rate: f64,
    pub currency: String,
    pub exchange: String,
    pub par_value: f64,
    pub ex_dividend_date: Option<DateTime<Utc>>,
    pub dividend_date: Option<DateTime<Utc>>,
    pub stock_type: String,
}

impl Default for PreferredDetails {
    fn default() -> Self {
        Self {
            dividend_rate: 0.0,
            currency: "USD".to_string(),
            exchange: String::new(),
            par_value: 25.0,
            ex_dividend_date: None,
            dividend_date: None,
            stock_type: "Preferred".to_string(),
        }
    }
}

impl QuoteRecord {
    /// True when every measured field is still at its default, i.e. the fetch failed.
    pub fn is_placeholder(&self) -> bool {
        self.name == self.symbol
            && [
                self.open,
                self.high,
                self.low,
                self.close,
                self.volume,
                self.market_cap,
                self.pe_ratio,
                self.dividend_yield,
                self.percent_change,
                self.fifty_two_week_high,
                self.fifty_two_week_low,
                self.average_volume,
                self.beta,
            ]
            .iter()
            .all(|v| *v == 0.0)
    }
}

/// Primary quote as returned by the market-data provider. Every field may be missing.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProviderQuote {
    pub symbol: Option<String>,
    pub long_name: Option<String>,
    pub short_name: Option<String>,
    pub regular_market_open: Option<f64>,
    pub regular_market_day_high: Option<f64>,
    pub regular_market_day_low: Option<f64>,
    pub regular_market_price: Option<f64>,
    pub regular_market_volume: Option<f64>,
    pub market_cap: Option<f64>,
    pub trailing_pe: Option<f64>,
    /// Fraction (0.025 means 2.5%)
    pub dividend_yield: Option<f64>,
    pub dividend_rate: Option<f64>,
    /// Fraction (0.02 means 2.0%)
    pub regular_market_change_percent: Option<f64>,
    pub sector: Option<String>,
    pub country: Option<String>,
    pub fifty_two_week_high: Option<f64>,
    pub fifty_two_week_low: Option<f64>,
    pub average_volume: Option<f64>,
    pub currency: Option<String>,
    pub full_exchange_name: Option<String>,
    pub exchange: Option<String>,
    pub ex_dividend_date: Option<DateTime<Utc>>,
    pub dividend_date: Option<DateTime<Utc>>,
}

/// Supplementary statistics from the provider's summary endpoint
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProviderStatistics {
    pub trailing_pe: Option<f64>,
    pub beta: Option<f64>,
    pub par_value: Option<f64>,
}
