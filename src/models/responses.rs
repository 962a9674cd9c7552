use std::collections::HashMap;

use chrono::NaiveDateTime;
use serde::Serialize;
use utoipa::ToSchema;

use super::entities::{NotificationPreference, NotificationRecord};
use crate::services::dispatcher::DispatchResult;
use crate::services::push::DeliveryOutcome;

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RegisterResponse {
    pub registration_id: String,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UnregisterResponse {
    pub success: bool,
    pub deactivated: u64,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SendResponse {
    pub attempted: usize,
    pub sent: usize,
    pub failed: usize,
    pub per_registration: Vec<DeliveryOutcome>,
    pub notification_id: Option<String>,
    pub suppressed: bool,
}

impl SendResponse {
    pub fn new(delivery: DispatchResult, notification_id: Option<String>, suppressed: bool) -> Self {
        Self {
            attempted: delivery.attempted,
            sent: delivery.sent,
            failed: delivery.failed,
            per_registration: delivery.per_registration,
            notification_id,
            suppressed,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SendBulkResponse {
    pub requested: usize,
    pub created: usize,
    pub notification_ids: Vec<String>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct NotificationListResponse {
    pub notifications: Vec<NotificationRecord>,
    pub total: i64,
    pub unread_count: i64,
    pub limit: i64,
    pub offset: i64,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct MarkReadResponse {
    pub success: bool,
    pub updated: u64,
    pub unread_count: i64,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PreferencesResponse {
    #[serde(flatten)]
    pub preferences: NotificationPreference,
    pub count_active: i64,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ServiceHealth {
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: NaiveDateTime,
    pub services: HashMap<String, ServiceHealth>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct DatabaseStats {
    pub connected: bool,
    pub pool_size: Option<u32>,
    pub idle_connections: Option<usize>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct SystemStatistics {
    pub active_registrations: i64,
    pub total_notifications: i64,
    pub realtime_connections: usize,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct StatusResponse {
    pub service: String,
    pub version: String,
    pub environment: String,
    pub uptime_seconds: u64,
    pub database: DatabaseStats,
    pub statistics: SystemStatistics,
    pub timestamp: NaiveDateTime,
}
