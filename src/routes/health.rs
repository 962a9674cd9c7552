use std::collections::HashMap;
use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use chrono::Utc;

use crate::AppState;
use crate::db::repositories::{NotificationRepository, RegistrationRepository};
use crate::models::responses::{HealthResponse, ServiceHealth, StatusResponse, SystemStatistics};

/// Senders are configured at startup; a missing one is reported, not failed.
fn sender_health(configured: bool) -> ServiceHealth {
    ServiceHealth {
        status: if configured { "up" } else { "disabled" }.to_string(),
        latency_ms: None,
        error: None,
    }
}

#[utoipa::path(
    get,
    path = "/health",
    responses((status = 200, body = HealthResponse, description = "Store and sender health")),
    tag = "Health"
)]
pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let database = state.db.health_check().await;
    let status = if database.status == "up" {
        "healthy"
    } else {
        "unhealthy"
    };

    let services = HashMap::from([
        ("database".to_string(), database),
        (
            "legacy_sender".to_string(),
            sender_health(state.providers.legacy().is_some()),
        ),
        (
            "oauth_sender".to_string(),
            sender_health(state.providers.oauth().is_some()),
        ),
    ]);

    Json(HealthResponse {
        status: status.to_string(),
        timestamp: Utc::now().naive_utc(),
        services,
    })
}

#[utoipa::path(
    get,
    path = "/status",
    responses((status = 200, body = StatusResponse, description = "Delivery counters and pool state")),
    tag = "Health"
)]
pub async fn status(State(state): State<Arc<AppState>>) -> Json<StatusResponse> {
    let registrations = RegistrationRepository::new(state.db.pool.clone());
    let notifications = NotificationRepository::new(state.db.pool.clone());

    let (active_registrations, total_notifications) =
        tokio::join!(registrations.count_all_active(), notifications.count_all());

    Json(StatusResponse {
        service: state.settings.app_name.clone(),
        version: state.settings.app_version.clone(),
        environment: state.settings.environment.clone(),
        uptime_seconds: state.start_time.elapsed().as_secs(),
        database: state.db.pool_stats(),
        statistics: SystemStatistics {
            active_registrations: active_registrations.unwrap_or(0),
            total_notifications: total_notifications.unwrap_or(0),
            realtime_connections: state.ws_manager.connection_count(),
        },
        timestamp: Utc::now().naive_utc(),
    })
}

#[utoipa::path(
    get,
    path = "/",
    responses((status = 200, description = "Service info")),
    tag = "Health"
)]
pub async fn root(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "service": state.settings.app_name,
        "version": state.settings.app_version,
        "status": "running",
        "docs": "/explore/",
        "health": "/health",
    }))
}
