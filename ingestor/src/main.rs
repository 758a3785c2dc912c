use axum::{http::StatusCode, routing::get, Router};
use std::sync::Arc;
use storage_ingestor::{logging, metrics, rest, schema, Config};
use tokio::sync::Mutex;
use tracing::{error, info};

#[tokio::main]
async fn main() {
    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{}", e);
            std::process::exit(1);
        }
    };

    let _log_guard = logging::init_logging(&config.log_level, config.log_dir.as_deref(), "api");

    info!("Starting storage monitor ingestor");
    info!("HTTP server: {}", config.http_addr);
    info!("Database: {}", config.database_host());

    if let Err(e) = metrics::init_metrics() {
        error!("Failed to register metrics: {}", e);
    }

    let gateway = match schema::connect_ready(&config.database_url).await {
        Ok(gateway) => gateway,
        Err(e) => {
            error!("Failed to prepare database: {}", e);
            std::process::exit(1);
        }
    };

    let app = Router::new()
        .route("/metrics", get(metrics_handler))
        .merge(rest::create_router(Arc::new(Mutex::new(gateway))));

    let listener = match tokio::net::TcpListener::bind(&config.http_addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("Failed to bind to {}: {}", config.http_addr, e);
            std::process::exit(1);
        }
    };

    info!("HTTP server listening on {}", config.http_addr);

    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        error!("HTTP server error: {}", e);
        std::process::exit(1);
    }

    info!("Shutting down");
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Received shutdown signal");
}

async fn metrics_handler() -> Result<String, (StatusCode, String)> {
    metrics::gather_metrics().map_err(|e| {
        error!("Failed to encode metrics: {}", e);
        (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
    })
}
