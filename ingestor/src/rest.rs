use crate::db::Gateway;
use crate::envelope::Envelope;
use crate::errors::Error;
use crate::ingest::ingest_reading;
use crate::metrics::{INGEST_LATENCY_SECONDS, READINGS_SAVED_TOTAL, REJECTED_REQUESTS_TOTAL, REQUESTS_TOTAL};
use crate::validate::parse_reading;
use axum::{
    body::Bytes,
    extract::State,
    http::Method,
    routing::{any, get},
    Router,
};
use serde_json::json;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

/// The one database handle, shared by all requests. Holding the lock for a
/// whole request keeps transactions from interleaving on the connection.
pub type SharedGateway = Arc<Mutex<Gateway>>;

#[derive(Debug, Clone)]
struct AppState {
    gateway: SharedGateway,
}

pub fn create_router(gateway: SharedGateway) -> Router {
    let state = AppState { gateway };

    Router::new()
        .route("/receive_data", any(receive_data))
        .route("/health", get(health))
        .with_state(state)
}

async fn receive_data(State(state): State<AppState>, method: Method, body: Bytes) -> Envelope {
    REQUESTS_TOTAL.inc();

    if method != Method::POST {
        warn!("Rejected method: {}", method);
        REJECTED_REQUESTS_TOTAL.inc();
        return Envelope::error_with("Method not allowed", json!({ "allowed": "POST" }));
    }

    debug!("Received payload: {}", String::from_utf8_lossy(&body));

    let reading = match parse_reading(&body) {
        Ok(reading) => reading,
        Err(e) => {
            match &e {
                Error::InvalidPayload(detail) => warn!("Invalid JSON data: {}", detail),
                other => warn!("{}", other),
            }
            REJECTED_REQUESTS_TOTAL.inc();
            return Envelope::error(e.to_string());
        }
    };

    let start = Instant::now();
    // Spawned so a client hanging up cannot cancel the write halfway.
    let gateway = Arc::clone(&state.gateway);
    let stored = tokio::spawn(async move {
        let mut gateway = gateway.lock().await;
        ingest_reading(&mut gateway, &reading).await
    })
    .await;

    match stored {
        Ok(Ok(receipt)) => {
            INGEST_LATENCY_SECONDS.observe(start.elapsed().as_secs_f64());
            READINGS_SAVED_TOTAL.inc();
            info!("Data processing complete for device {}", receipt.device_number);
            Envelope::success("Data received and saved", json!(receipt))
        }
        Ok(Err(e)) => {
            error!("Failed to store reading for device {}: {}", reading.device_number, e);
            Envelope::error(format!("Server error: {}", e))
        }
        Err(e) => {
            error!("Ingest task for device {} did not finish: {}", reading.device_number, e);
            Envelope::error(format!("Server error: {}", e))
        }
    }
}

async fn health() -> &'static str {
    "ok"
}
