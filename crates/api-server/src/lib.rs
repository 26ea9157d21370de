pub mod config;
pub mod error;
pub mod health_routes;
pub mod request_id;
pub mod stock_routes;


use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use axum::{extract::Request, http::StatusCode, middleware, response::IntoResponse, Router};
use gemini_client::GeminiClient;
use quote_core::RecordStore;
use refresh_pipeline::{
    Cadence, InsightGenerator, QuoteFetcher, QuoteStore, RefreshOrchestrator, Scheduler,
};
use tokio::sync::watch;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use yahoo_client::YahooClient;

pub use config::AppConfig;
pub use error::AppError;

#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<RefreshOrchestrator>,
    pub store: Arc<dyn RecordStore>,
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .merge(stock_routes::stock_routes())
        .merge(health_routes::health_routes())
        .fallback(not_found)
        .layer(middleware::from_fn(request_id::request_id_middleware))
        .layer(
            TraceLayer::new_for_http().make_span_with(|req: &Request| {
                tracing::info_span!(
                    "http_request",
                    method = %req.method(),
                    uri = %req.uri(),
                    request_id = tracing::field::Empty,
                )
            }),
        )
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn not_found() -> impl IntoResponse {
    AppError {
        status: StatusCode::NOT_FOUND,
        message: "Not found".to_string(),
    }
}

fn init_tracing() {
    let filter = || {
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"))
    };

    let json_logging = std::env::var("RUST_LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);
    if json_logging {
        tracing_subscriber::fmt().json().with_env_filter(filter()).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter()).init();
    }
}

pub async fn run_server() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    std::panic::set_hook(Box::new(|info| {
        eprintln!("PANIC: {info}");
        tracing::error!("PANIC: {info}");
    }));

    let config = AppConfig::from_env()?;
    tracing::info!("Configuration loaded");
    tracing::info!("  Instrument kind: {}", config.kind);
    tracing::info!("  Tracking {} symbols: {}", config.symbols.len(), config.symbols.join(", "));
    tracing::info!("  Database: {}", config.database_url);

    let store = Arc::new(
        QuoteStore::new(&config.database_url)
            .await
            .with_context(|| format!("Failed to open record store at {}", config.database_url))?,
    );
    tracing::info!("Record store ready");

    let quotes = Arc::new(YahooClient::new(
        config.yahoo_base_url.clone(),
        config.provider_timeout,
    ));
    let insights = Arc::new(GeminiClient::new(config.gemini()));

    let fetcher = QuoteFetcher::new(quotes, config.kind)
        .with_delays(config.fetch_delay, config.variant_delay);
    let generator = InsightGenerator::new(insights).with_batch_delay(config.insight_batch_delay);
    let orchestrator = Arc::new(
        RefreshOrchestrator::new(fetcher, Arc::new(generator), store.clone())
            .with_symbols(config.symbols.clone()),
    );

    let cadences = vec![
        Cadence::new("market-hours", &config.market_hours_cron, config.market_hours_tz)
            .context("Invalid MARKET_HOURS_CRON")?,
        Cadence::new("hourly", &config.fallback_cron, config.fallback_tz)
            .context("Invalid FALLBACK_CRON")?,
    ];
    let scheduler = Scheduler::new(orchestrator.clone(), cadences)
        .with_startup_run(config.run_on_startup);

    let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
    let scheduler_task = tokio::spawn(scheduler.run(async move {
        let _ = shutdown_rx.changed().await;
    }));

    let app = build_router(AppState {
        orchestrator,
        store,
    });

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    tracing::info!("Server running on port {}", config.port);
    tracing::info!("Available endpoints:");
    tracing::info!("  - GET  /api/stocks");
    tracing::info!("  - GET  /api/stocks/:symbol");
    tracing::info!("  - GET  /api/stocks/company/:symbol");
    tracing::info!("  - POST /api/symbols/:symbol");
    tracing::info!("  - GET  /api/test-preferred");
    tracing::info!("  - GET  /api/health");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            let _ = shutdown_tx.send(true);
        })
        .await
        .context("HTTP server error")?;

    let _ = scheduler_task.await;
    tracing::info!("Shutdown complete");

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("Received SIGINT"),
        _ = terminate => tracing::info!("Received SIGTERM"),
    }
}
