use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use quote_core::{PreferredDetails, QuoteError, QuoteRecord, RecordStore};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};

/// SQLite-backed record store, one row per symbol
#[derive(Clone)]
pub struct QuoteStore {
    pool: SqlitePool,
}

impl QuoteStore {
    /// Open (creating if missing) the database and apply the schema
    pub async fn new(database_url: &str) -> Result<Self, QuoteError> {
        let options = SqliteConnectOptions::from_str(database_url)
            .map_err(db_err)?
            .create_if_missing(true);

        // Every in-memory connection is its own database, so keep exactly one alive
        let pool = if database_url.contains(":memory:") {
            SqlitePoolOptions::new()
                .max_connections(1)
                .min_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
                .connect_with(options)
                .await
        } else {
            SqlitePoolOptions::new()
                .max_connections(5)
                .connect_with(options)
                .await
        }
        .map_err(db_err)?;

        let store = Self { pool };
        store.init_schema().await?;

        Ok(store)
    }

    async fn init_schema(&self) -> Result<(), QuoteError> {
        let schema = include_str!("../schema.sql");

        // sqlx runs one statement per query
        for statement in schema.split(';') {
            let stmt = statement.trim();
            if !stmt.is_empty() {
                sqlx::query(stmt).execute(&self.pool).await.map_err(db_err)?;
            }
        }

        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn count(&self) -> Result<i64, QuoteError> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM quotes")
            .fetch_one(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(count)
    }
}

#[async_trait]
impl RecordStore for QuoteStore {
    async fn upsert(&self, record: &QuoteRecord) -> Result<(), QuoteError> {
        let now = Utc::now();
        let preferred = record.preferred.as_ref();

        sqlx::query(
            r#"
            INSERT INTO quotes (
                symbol, name, open, high, low, close, volume,
                market_cap, pe_ratio, dividend_yield, percent_change,
                fifty_two_week_high, fifty_two_week_low, average_volume, beta,
                sector, country,
                dividend_rate, currency, exchange, par_value, ex_dividend_date, dividend_date, stock_type,
                ai_insights, last_updated, created_at, updated_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(symbol) DO UPDATE SET
                name = excluded.name,
                open = excluded.open,
                high = excluded.high,
                low = excluded.low,
                close = excluded.close,
                volume = excluded.volume,
                market_cap = excluded.market_cap,
                pe_ratio = excluded.pe_ratio,
                dividend_yield = excluded.dividend_yield,
                percent_change = excluded.percent_change,
                fifty_two_week_high = excluded.fifty_two_week_high,
                fifty_two_week_low = excluded.fifty_two_week_low,
                average_volume = excluded.average_volume,
                beta = excluded.beta,
                sector = excluded.sector,
                country = excluded.country,
                dividend_rate = excluded.dividend_rate,
                currency = excluded.currency,
                exchange = excluded.exchange,
                par_value = excluded.par_value,
                ex_dividend_date = excluded.ex_dividend_date,
                dividend_date = excluded.dividend_date,
                stock_type = excluded.stock_type,
                ai_insights = excluded.ai_insights,
                last_updated = excluded.last_updated,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&record.symbol)
        .bind(&record.name)
        .bind(record.open)
        .bind(record.high)
        .bind(record.low)
        .bind(record.close)
        .bind(record.volume)
        .bind(record.market_cap)
        .bind(record.pe_ratio)
        .bind(record.dividend_yield)
        .bind(record.percent_change)
        .bind(record.fifty_two_week_high)
        .bind(record.fifty_two_week_low)
        .bind(record.average_volume)
        .bind(record.beta)
        .bind(&record.sector)
        .bind(&record.country)
        .bind(preferred.map(|p| p.dividend_rate))
        .bind(preferred.map(|p| p.currency.clone()))
        .bind(preferred.map(|p| p.exchange.clone()))
        .bind(preferred.map(|p| p.par_value))
        .bind(preferred.and_then(|p| p.ex_dividend_date))
        .bind(preferred.and_then(|p| p.dividend_date))
        .bind(preferred.map(|p| p.stock_type.clone()))
        .bind(&record.ai_insights)
        .bind(record.last_updated)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(())
    }

    async fn list_recent(&self) -> Result<Vec<QuoteRecord>, QuoteError> {
        let rows = sqlx::query_as::<_, QuoteRow>(
            "SELECT * FROM quotes ORDER BY last_updated DESC, symbol ASC",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(rows.into_iter().map(QuoteRecord::from).collect())
    }

    async fn find(&self, symbol: &str) -> Result<Option<QuoteRecord>, QuoteError> {
        let row = sqlx::query_as::<_, QuoteRow>("SELECT * FROM quotes WHERE symbol = ?")
            .bind(symbol)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;

        Ok(row.map(QuoteRecord::from))
    }
}

fn db_err(e: sqlx::Error) -> QuoteError {
    QuoteError::DatabaseError(e.to_string())
}

#[derive(Debug, sqlx::FromRow)]
struct QuoteRow {
    symbol: String,
    name: String,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    volume: f64,
    market_cap: f64,
    pe_ratio: f64,
    dividend_yield: f64,
    percent_change: f64,
    fifty_two_week_high: f64,
    fifty_two_week_low: f64,
    average_volume: f64,
    beta: f64,
    sector: String,
    country: String,
    dividend_rate: Option<f64>,
    currency: Option<String>,
    exchange: Option<String>,
    par_value: Option<f64>,
    ex_dividend_date: Option<DateTime<Utc>>,
    dividend_date: Option<DateTime<Utc>>,
    stock_type: Option<String>,
    ai_insights: String,
    last_updated: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<QuoteRow> for QuoteRecord {
    fn from(row: QuoteRow) -> Self {
        // stock_type is only written for preferred instruments
        let preferred = row.stock_type.map(|stock_type| {
            let defaults = PreferredDetails::default();
            PreferredDetails {
                dividend_rate: row.dividend_rate.unwrap_or(defaults.dividend_rate),
                currency: row.currency.unwrap_or(defaults.currency),
                exchange: row.exchange.unwrap_or(defaults.exchange),
                par_value: row.par_value.unwrap_or(defaults.par_value),
                ex_dividend_date: row.ex_dividend_date,
                dividend_date: row.dividend_date,
                stock_type,
            }
        });

        QuoteRecord {
            symbol: row.symbol,
            name: row.name,
            open: row.open,
            high: row.high,
            low: row.low,
            close: row.close,
            volume: row.volume,
            market_cap: row.market_cap,
            pe_ratio: row.pe_ratio,
            dividend_yield: row.dividend_yield,
            percent_change: row.percent_change,
            fifty_two_week_high: row.fifty_two_week_high,
            fifty_two_week_low: row.fifty_two_week_low,
            average_volume: row.average_volume,
            beta: row.beta,
            sector: row.sector,
            country: row.country,
            preferred,
            ai_insights: row.ai_insights,
            last_updated: row.last_updated,
            created_at: Some(row.created_at),
            updated_at: Some(row.updated_at),
        }
    }
}
