use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::{PreferredDetails, QuoteError, QuoteRecord};

const ORDINARY_SYMBOLS: &[&str] = &["AAPL", "GOOGL", "MSFT", "TSLA", "AMZN", "META", "NVDA", "NFLX"];

const PREFERRED_SYMBOLS: &[&str] = &[
    "BAC-PL", // Bank of America Series L
    "JPM-PC", // JPMorgan Chase Series C
    "WFC-PL", // Wells Fargo Series L
    "C-PN",   // Citigroup Series N
    "GS-PA",  // Goldman Sachs Series A
    "MS-PA",  // Morgan Stanley Series A
    "USB-PA", // U.S. Bancorp Series A
    "PNC-PP", // PNC Financial Series P
    "TFC-PO", // Truist Financial Series O
    "KEY-PJ", // KeyCorp Series J
];

/// Series suffixes tried when resolving a company's preferred issues
pub const PREFERRED_SUFFIXES: &[&str] = &[
    "PA", "PB", "PC", "PD", "PE", "PF", "PG", "PH", "PI", "PJ", "PK", "PL",
];

/// Instrument class the service tracks. Drives default symbols, placeholder
/// defaults and the labels surfaced by the API.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InstrumentKind {
    #[default]
    Ordinary,
    Preferred,
}

impl InstrumentKind {
    pub fn default_symbols(&self) -> Vec<String> {
        let symbols = match self {
            InstrumentKind::Ordinary => ORDINARY_SYMBOLS,
            InstrumentKind::Preferred => PREFERRED_SYMBOLS,
        };
        symbols.iter().map(|s| s.to_string()).collect()
    }

    /// Value of the `type` field in list responses
    pub fn label(&self) -> &'static str {
        match self {
            InstrumentKind::Ordinary => "stocks",
            InstrumentKind::Preferred => "preferred-stocks",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            InstrumentKind::Ordinary => "stock",
            InstrumentKind::Preferred => "preferred stock",
        }
    }

    pub fn not_found_message(&self) -> &'static str {
        match self {
            InstrumentKind::Ordinary => "Stock not found",
            InstrumentKind::Preferred => "Preferred stock not found",
        }
    }

    pub fn service_name(&self) -> &'static str {
        match self {
            InstrumentKind::Ordinary => "Stock API",
            InstrumentKind::Preferred => "Preferred Stock API",
        }
    }

    /// Sector used when the provider does not report one
    pub fn default_sector(&self) -> &'static str {
        match self {
            InstrumentKind::Ordinary => "",
            // Preferred issues are overwhelmingly bank-issued
            InstrumentKind::Preferred => "Financial",
        }
    }

    pub fn default_preferred_details(&self) -> Option<PreferredDetails> {
        match self {
            InstrumentKind::Ordinary => None,
            InstrumentKind::Preferred => Some(PreferredDetails::default()),
        }
    }

    /// Record written for a symbol whose quote could not be fetched
    pub fn placeholder(&self, symbol: &str) -> QuoteRecord {
        QuoteRecord {
            symbol: symbol.to_string(),
            name: symbol.to_string(),
            sector: self.default_sector().to_string(),
            preferred: self.default_preferred_details(),
            ..Default::default()
        }
    }
}

impl fmt::Display for InstrumentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InstrumentKind::Ordinary => write!(f, "ordinary"),
            InstrumentKind::Preferred => write!(f, "preferred"),
        }
    }
}

impl FromStr for InstrumentKind {
    type Err = QuoteError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ordinary" | "common" | "stock" | "stocks" => Ok(InstrumentKind::Ordinary),
            "preferred" | "preferred-stocks" => Ok(InstrumentKind::Preferred),
            other => Err(QuoteError::UnknownKind(other.to_string())),
        }
    }
}

/// All preferred-series tickers for a parent company, `-PA` through `-PL`
pub fn preferred_variants(company: &str) -> Vec<String> {
    let company = company.trim().to_uppercase();
    PREFERRED_SUFFIXES
        .iter()
        .map(|suffix| format!("{}-{}", company, suffix))
        .collect()
}
