//! Quote fetcher: one normalized record per requested symbol.

use std::sync::Arc;
use std::time::Duration;

use quote_core::{
    preferred_variants, InstrumentKind, PreferredDetails, ProviderQuote, ProviderStatistics,
    QuoteProvider, QuoteRecord,
};

pub const DEFAULT_FETCH_DELAY: Duration = Duration::from_millis(1000);
pub const DEFAULT_VARIANT_DELAY: Duration = Duration::from_millis(500);

#[derive(Clone)]
pub struct QuoteFetcher {
    provider: Arc<dyn QuoteProvider>,
    kind: InstrumentKind,
    fetch_delay: Duration,
    variant_delay: Duration,
}

impl QuoteFetcher {
    pub fn new(provider: Arc<dyn QuoteProvider>, kind: InstrumentKind) -> Self {
        Self {
            provider,
            kind,
            fetch_delay: DEFAULT_FETCH_DELAY,
            variant_delay: DEFAULT_VARIANT_DELAY,
        }
    }

    pub fn with_delays(mut self, fetch_delay: Duration, variant_delay: Duration) -> Self {
        self.fetch_delay = fetch_delay;
        self.variant_delay = variant_delay;
        self
    }

    pub fn kind(&self) -> InstrumentKind {
        self.kind
    }

    /// Same provider and delays, different instrument kind
    pub fn for_kind(&self, kind: InstrumentKind) -> Self {
        Self {
            kind,
            ..self.clone()
        }
    }

    /// Fetch every symbol sequentially. The output has the same length and
    /// order as `symbols`; failed symbols become placeholder records.
    pub async fn fetch(&self, symbols: &[String]) -> Vec<QuoteRecord> {
        let mut records = Vec::with_capacity(symbols.len());

        for (i, symbol) in symbols.iter().enumerate() {
            let symbol = symbol.trim().to_uppercase();
            tracing::info!("Fetching {} data for {}...", self.kind.display_name(), symbol);

            records.push(self.fetch_one(&symbol).await);

            if i + 1 < symbols.len() && !self.fetch_delay.is_zero() {
                tokio::time::sleep(self.fetch_delay).await;
            }
        }

        records
    }

    async fn fetch_one(&self, symbol: &str) -> QuoteRecord {
        let quote = match self.provider.quote(symbol).await {
            Ok(quote) => quote,
            Err(e) => {
                tracing::error!("Error fetching {} data for {}: {}", self.kind.display_name(), symbol, e);
                return self.kind.placeholder(symbol);
            }
        };

        let stats = match self.provider.statistics(symbol).await {
            Ok(stats) => Some(stats),
            Err(e) => {
                tracing::warn!("Limited data available for {} ({}), using quote fields only", symbol, e);
                None
            }
        };

        build_record(self.kind, symbol, &quote, stats.as_ref())
    }

    /// Resolve the preferred series (`-PA` .. `-PL`) that exist for a parent
    /// company, then fetch full records for just those.
    pub async fn fetch_by_company(&self, company: &str) -> Vec<QuoteRecord> {
        let variants = preferred_variants(company);
        let mut found = Vec::new();

        for (i, variant) in variants.iter().enumerate() {
            match self.provider.quote(variant).await {
                Ok(quote) if has_price(&quote) => found.push(variant.clone()),
                Ok(_) => tracing::debug!("{} returned no price, skipping", variant),
                Err(e) => tracing::debug!("{} not listed: {}", variant, e),
            }

            if i + 1 < variants.len() && !self.variant_delay.is_zero() {
                tokio::time::sleep(self.variant_delay).await;
            }
        }

        if found.is_empty() {
            tracing::info!("No preferred stocks found for {}", company.to_uppercase());
            return Vec::new();
        }

        tracing::info!("Found {} preferred series for {}: {:?}", found.len(), company.to_uppercase(), found);
        self.fetch(&found).await
    }
}

fn has_price(quote: &ProviderQuote) -> bool {
    value(quote.regular_market_price).is_some_and(|p| p != 0.0)
}

/// Finite provider value, if any
fn value(v: Option<f64>) -> Option<f64> {
    v.filter(|x| x.is_finite())
}

fn text(v: &Option<String>) -> Option<String> {
    v.as_ref().map(|s| s.trim()).filter(|s| !s.is_empty()).map(|s| s.to_string())
}

/// Provider fraction to percentage (0.025 -> 2.5)
fn percent(v: Option<f64>) -> f64 {
    value(v).map(|x| x * 100.0).unwrap_or(0.0)
}

/// Normalize a provider quote (plus optional statistics) into a record.
pub fn build_record(
    kind: InstrumentKind,
    symbol: &str,
    quote: &ProviderQuote,
    stats: Option<&ProviderStatistics>,
) -> QuoteRecord {
    let stat = |f: fn(&ProviderStatistics) -> Option<f64>| stats.and_then(|s| value(f(s)));

    let preferred = match kind {
        InstrumentKind::Ordinary => None,
        InstrumentKind::Preferred => {
            let defaults = PreferredDetails::default();
            Some(PreferredDetails {
                dividend_rate: value(quote.dividend_rate).unwrap_or(0.0),
                currency: text(&quote.currency).unwrap_or(defaults.currency),
                exchange: text(&quote.full_exchange_name)
                    .or_else(|| text(&quote.exchange))
                    .unwrap_or(defaults.exchange),
                par_value: stat(|s| s.par_value).unwrap_or(defaults.par_value),
                ex_dividend_date: quote.ex_dividend_date,
                dividend_date: quote.dividend_date,
                stock_type: defaults.stock_type,
            })
        }
    };

    QuoteRecord {
        symbol: symbol.to_string(),
        name: text(&quote.long_name)
            .or_else(|| text(&quote.short_name))
            .unwrap_or_else(|| symbol.to_string()),
        open: value(quote.regular_market_open).unwrap_or(0.0),
        high: value(quote.regular_market_day_high).unwrap_or(0.0),
        low: value(quote.regular_market_day_low).unwrap_or(0.0),
        close: value(quote.regular_market_price).unwrap_or(0.0),
        volume: value(quote.regular_market_volume).unwrap_or(0.0),
        market_cap: value(quote.market_cap).unwrap_or(0.0),
        pe_ratio: value(quote.trailing_pe)
            .or_else(|| stat(|s| s.trailing_pe))
            .unwrap_or(0.0),
        dividend_yield: percent(quote.dividend_yield),
        percent_change: percent(quote.regular_market_change_percent),
        fifty_two_week_high: value(quote.fifty_two_week_high).unwrap_or(0.0),
        fifty_two_week_low: value(quote.fifty_two_week_low).unwrap_or(0.0),
        average_volume: value(quote.average_volume).unwrap_or(0.0),
        beta: stat(|s| s.beta).unwrap_or(0.0),
        sector: text(&quote.sector).unwrap_or_else(|| kind.default_sector().to_string()),
        country: text(&quote.country).unwrap_or_default(),
        preferred,
        ..Default::default()
    }
}
