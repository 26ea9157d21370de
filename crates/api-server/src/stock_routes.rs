//! Stock Query Routes
//!
//! Read-only views over the record store, plus on-demand lookups that go
//! straight to the quote provider without persisting anything.

use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use quote_core::{InstrumentKind, QuoteRecord};
use serde::Serialize;

use crate::{AppError, AppState};

/// Symbol used by the preferred-stock smoke test
pub const TEST_PREFERRED_SYMBOL: &str = "BAC-PL";

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StockListResponse {
    pub success: bool,
    pub data: Vec<QuoteRecord>,
    pub last_updated: Option<DateTime<Utc>>,
    pub count: usize,
    #[serde(rename = "type")]
    pub kind: &'static str,
}

#[derive(Debug, Serialize)]
pub struct StockResponse {
    pub success: bool,
    pub data: QuoteRecord,
}

#[derive(Debug, Serialize)]
pub struct CompanyResponse {
    pub success: bool,
    pub data: Vec<QuoteRecord>,
    pub company: String,
    pub count: usize,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TestPreferredResponse {
    pub success: bool,
    pub message: String,
    pub test_data: Vec<QuoteRecord>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct AddSymbolResponse {
    pub success: bool,
    pub message: String,
    pub symbols: Vec<String>,
}

pub fn stock_routes() -> Router<AppState> {
    Router::new()
        .route("/api/stocks", get(list_stocks))
        .route("/api/stocks/company/:symbol", get(stocks_by_company))
        .route("/api/stocks/:symbol", get(get_stock))
        .route("/api/test-preferred", get(test_preferred))
        .route("/api/symbols/:symbol", post(add_symbol))
}

/// All stored records, most recently refreshed first
async fn list_stocks(State(state): State<AppState>) -> Result<Json<StockListResponse>, AppError> {
    let data = state.store.list_recent().await?;
    let last_updated = data.first().and_then(|r| r.last_updated);

    Ok(Json(StockListResponse {
        success: true,
        count: data.len(),
        last_updated,
        kind: state.orchestrator.kind().label(),
        data,
    }))
}

async fn get_stock(
    State(state): State<AppState>,
    Path(symbol): Path<String>,
) -> Result<Json<StockResponse>, AppError> {
    let symbol = symbol.trim().to_uppercase();

    let record = state
        .store
        .find(&symbol)
        .await?
        .ok_or_else(|| AppError::not_found(state.orchestrator.kind().not_found_message()))?;

    Ok(Json(StockResponse {
        success: true,
        data: record,
    }))
}

/// Try every preferred series of a company and fetch the ones that trade
async fn stocks_by_company(
    State(state): State<AppState>,
    Path(symbol): Path<String>,
) -> Result<Json<CompanyResponse>, AppError> {
    let company = symbol.trim().to_uppercase();
    if company.is_empty() {
        return Err(AppError::bad_request("Company symbol is required"));
    }

    tracing::info!("Looking up preferred series for {}", company);
    let data = state
        .orchestrator
        .fetcher()
        .for_kind(InstrumentKind::Preferred)
        .fetch_by_company(&company)
        .await;

    Ok(Json(CompanyResponse {
        success: true,
        count: data.len(),
        company,
        data,
    }))
}

async fn test_preferred(State(state): State<AppState>) -> Json<TestPreferredResponse> {
    let fetcher = state.orchestrator.fetcher().for_kind(InstrumentKind::Preferred);
    let test_data = fetcher.fetch(&[TEST_PREFERRED_SYMBOL.to_string()]).await;

    Json(TestPreferredResponse {
        success: true,
        message: "Preferred stock service is working".to_string(),
        test_data,
        timestamp: Utc::now(),
    })
}

async fn add_symbol(
    State(state): State<AppState>,
    Path(symbol): Path<String>,
) -> Result<Json<AddSymbolResponse>, AppError> {
    let symbol = symbol.trim().to_uppercase();
    if symbol.is_empty() {
        return Err(AppError::bad_request("Symbol is required"));
    }

    let message = if state.orchestrator.add_symbol(&symbol) {
        format!("Added {} to tracked symbols", symbol)
    } else {
        format!("{} is already tracked", symbol)
    };

    Ok(Json(AddSymbolResponse {
        success: true,
        message,
        symbols: state.orchestrator.symbols(),
    }))
}
