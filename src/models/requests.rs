use serde::Deserialize;
use serde_json::{Map, Value};
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

use super::entities::NotificationCategory;
use crate::services::push::NotificationAction;
use crate::services::push::payload::TOPIC_REGEX;

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct RegisterRequest {
    #[validate(length(min = 1, max = 4096, message = "token is required"))]
    pub token: String,
    #[serde(default)]
    #[schema(value_type = Object)]
    pub metadata: Option<Value>,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct UnregisterRequest {
    #[validate(length(min = 1, max = 4096, message = "token is required"))]
    pub token: String,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SendRequest {
    #[validate(length(min = 1, message = "ownerId is required"))]
    pub owner_id: String,
    #[validate(length(min = 1, max = 200, message = "title must be 1-200 characters"))]
    pub title: String,
    #[validate(length(max = 2000, message = "body exceeds 2000 characters"))]
    pub body: String,
    #[serde(default = "default_category")]
    pub category: NotificationCategory,
    pub related_event_id: Option<String>,
    pub action_url: Option<String>,
    #[serde(default)]
    #[schema(value_type = Object)]
    pub data: Map<String, Value>,
    #[serde(default)]
    #[validate(length(max = 2, message = "at most 2 actions are supported"))]
    pub actions: Vec<NotificationAction>,
}

fn default_category() -> NotificationCategory {
    NotificationCategory::General
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SendBulkRequest {
    #[validate(length(min = 1, max = 1000, message = "ownerIds must hold 1-1000 entries"))]
    pub owner_ids: Vec<String>,
    #[validate(length(min = 1, max = 200, message = "title must be 1-200 characters"))]
    pub title: String,
    #[validate(length(max = 2000, message = "body exceeds 2000 characters"))]
    pub body: String,
    #[serde(default = "default_category")]
    pub category: NotificationCategory,
    pub related_event_id: Option<String>,
    pub action_url: Option<String>,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SendTopicRequest {
    #[validate(regex(path = *TOPIC_REGEX, message = "topic must match [a-zA-Z0-9-_.~%]+"))]
    pub topic: String,
    #[validate(length(min = 1, max = 200, message = "title must be 1-200 characters"))]
    pub title: String,
    #[validate(length(max = 2000, message = "body exceeds 2000 characters"))]
    pub body: String,
    pub action_url: Option<String>,
    #[serde(default)]
    #[schema(value_type = Object)]
    pub data: Map<String, Value>,
}

/// Partial update; omitted flags keep their stored value.
#[derive(Debug, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdatePreferencesRequest {
    pub event_reminder: Option<bool>,
    pub personnel_assigned: Option<bool>,
    pub event_status_changed: Option<bool>,
    pub song_added: Option<bool>,
    pub push_enabled: Option<bool>,
}

#[derive(Debug, Deserialize, Validate, IntoParams, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ListNotificationsParams {
    #[validate(range(min = 1, max = 100, message = "limit must be 1-100"))]
    #[param(default = 20)]
    pub limit: Option<i64>,
    #[validate(range(min = 0, message = "offset must be non-negative"))]
    #[param(default = 0)]
    pub offset: Option<i64>,
    #[serde(default)]
    pub unread_only: bool,
}

impl ListNotificationsParams {
    pub fn limit(&self) -> i64 {
        self.limit.unwrap_or(20)
    }

    pub fn offset(&self) -> i64 {
        self.offset.unwrap_or(0)
    }
}
