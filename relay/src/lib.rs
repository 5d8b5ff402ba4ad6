//! Rendezvous registry for DecentriLicense.
//!
//! Clients in WAN mode register the device that bound a license and ask
//! who holds a license before electing. The registry keeps everything in
//! memory; a restart forgets all devices, which only costs clients a hint.

mod error;
mod registry;

pub use error::{RegistryError, RegistryResult};
pub use registry::{Registry, INACTIVE_AFTER, TRANSFER_RECENCY};

use axum::{
    extract::{Path, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use chrono::Utc;
use decentri_types::registry::{Ack, DeviceRecord, HeartbeatRequest, RegistryStats, TransferRequest};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

#[derive(Serialize)]
struct Health {
    status: &'static str,
    service: &'static str,
    timestamp: i64,
}

fn ack(message: &str) -> Json<Ack> {
    Json(Ack {
        success: true,
        message: message.to_string(),
    })
}

async fn health_handler() -> impl IntoResponse {
    Json(Health {
        status: "healthy",
        service: "decentrilicense-registry",
        timestamp: Utc::now().timestamp(),
    })
}

async fn stats_handler(State(registry): State<Arc<Registry>>) -> Json<RegistryStats> {
    Json(registry.stats().await)
}

async fn register_handler(
    State(registry): State<Arc<Registry>>,
    headers: HeaderMap,
    Json(mut record): Json<DeviceRecord>,
) -> Json<Ack> {
    if record.public_ip.is_empty()
        && let Some(forwarded) = headers.get("x-forwarded-for").and_then(|v| v.to_str().ok())
    {
        record.public_ip = forwarded.split(',').next().unwrap_or_default().trim().to_string();
    }
    registry.register(record, Utc::now()).await;
    ack("Device registered successfully")
}

async fn heartbeat_handler(
    State(registry): State<Arc<Registry>>,
    Json(request): Json<HeartbeatRequest>,
) -> Json<Ack> {
    let success = registry.heartbeat(&request.device_id, Utc::now()).await;
    Json(Ack {
        success,
        message: String::new(),
    })
}

async fn holder_handler(
    State(registry): State<Arc<Registry>>,
    Path(code): Path<String>,
) -> Response {
    match registry.holder(&code).await {
        Some(device) => (
            [(header::CACHE_CONTROL, "public, max-age=10")],
            Json(device),
        )
            .into_response(),
        None => (StatusCode::NOT_FOUND, "License not found").into_response(),
    }
}

async fn transfer_handler(
    State(registry): State<Arc<Registry>>,
    Json(request): Json<TransferRequest>,
) -> Result<Json<Ack>, RegistryError> {
    registry.transfer(&request, Utc::now()).await?;
    Ok(ack("Transfer request recorded"))
}

/// Build the HTTP API router over `registry`.
pub fn build_router(registry: Arc<Registry>) -> Router {
    Router::new()
        .route("/api/health", get(health_handler))
        .route("/api/stats", get(stats_handler))
        .route("/api/devices/register", post(register_handler))
        .route("/api/devices/heartbeat", post(heartbeat_handler))
        .route("/api/licenses/{code}/holder", get(holder_handler))
        .route("/api/tokens/transfer", post(transfer_handler))
        .with_state(registry)
}

/// Periodically drops devices unseen for longer than `max_age`.
pub async fn run_cleanup(registry: Arc<Registry>, every: Duration, max_age: chrono::Duration) {
    let mut ticker = tokio::time::interval(every);
    loop {
        ticker.tick().await;
        let removed = registry.cleanup_inactive(Utc::now(), max_age).await;
        if removed > 0 {
            info!(removed, "cleaned up inactive devices");
        }
    }
}
