use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, Query, State};
use validator::Validate;

use crate::AppState;
use crate::db::repositories::{NotificationRepository, RegistrationRepository};
use crate::error::{AppError, ErrorBody};
use crate::middleware::{AdminAccess, AuthenticatedUser, SendAuthority};
use crate::models::requests::{
    ListNotificationsParams, RegisterRequest, SendBulkRequest, SendRequest, SendTopicRequest,
    UnregisterRequest, UpdatePreferencesRequest,
};
use crate::models::responses::{
    MarkReadResponse, NotificationListResponse, PreferencesResponse, RegisterResponse,
    SendBulkResponse, SendResponse, UnregisterResponse,
};
use crate::services::dispatcher::TopicDispatchResult;
use crate::services::notification::NotifyRequest;
use crate::services::push::{NotificationPayload, dedup_tag, token_fingerprint};

// POST /notifications/register
#[utoipa::path(
    post,
    path = "/notifications/register",
    request_body = RegisterRequest,
    responses(
        (status = 200, body = RegisterResponse, description = "Token registered"),
        (status = 401, body = ErrorBody, description = "Unauthorized"),
        (status = 422, body = ErrorBody, description = "Validation error")
    ),
    tag = "Registrations",
    security(("BearerAuth" = []))
)]
pub async fn register(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    Json(body): Json<RegisterRequest>,
) -> Result<Json<RegisterResponse>, AppError> {
    body.validate()?;

    let metadata = match body.metadata {
        Some(value) if value.is_object() => value,
        Some(_) => return Err(AppError::validation_error("metadata must be an object")),
        None => serde_json::json!({}),
    };

    let repo = RegistrationRepository::new(state.db.pool.clone());
    let registration = repo.register(&user.user_id, &body.token, &metadata).await?;

    tracing::info!(
        owner_id = %user.user_id,
        registration_id = %registration.id,
        token = %token_fingerprint(&body.token),
        "Device registered"
    );

    state.preferences.ensure_default(&user.user_id).await;

    Ok(Json(RegisterResponse {
        registration_id: registration.id,
    }))
}

// POST /notifications/unregister
#[utoipa::path(
    post,
    path = "/notifications/unregister",
    request_body = UnregisterRequest,
    responses(
        (status = 200, body = UnregisterResponse, description = "Token deactivated (idempotent)"),
        (status = 401, body = ErrorBody, description = "Unauthorized"),
        (status = 422, body = ErrorBody, description = "Validation error")
    ),
    tag = "Registrations",
    security(("BearerAuth" = []))
)]
pub async fn unregister(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    Json(body): Json<UnregisterRequest>,
) -> Result<Json<UnregisterResponse>, AppError> {
    body.validate()?;

    let repo = RegistrationRepository::new(state.db.pool.clone());
    let deactivated = repo.deactivate_token(&user.user_id, &body.token).await?;

    tracing::info!(
        owner_id = %user.user_id,
        token = %token_fingerprint(&body.token),
        deactivated = deactivated,
        "Device unregistered"
    );

    Ok(Json(UnregisterResponse {
        success: true,
        deactivated,
    }))
}

// POST /notifications/send
#[utoipa::path(
    post,
    path = "/notifications/send",
    request_body = SendRequest,
    responses(
        (status = 200, body = SendResponse, description = "Delivery counters for the send"),
        (status = 401, body = ErrorBody, description = "Unauthorized"),
        (status = 403, body = ErrorBody, description = "Caller may not send to this owner"),
        (status = 422, body = ErrorBody, description = "Validation error")
    ),
    tag = "Sends",
    security(("BearerAuth" = []), ("AdminKey" = []))
)]
pub async fn send(
    State(state): State<Arc<AppState>>,
    authority: SendAuthority,
    Json(body): Json<SendRequest>,
) -> Result<Json<SendResponse>, AppError> {
    body.validate()?;

    if !authority.may_send_to(&body.owner_id) {
        return Err(AppError::forbidden("Cannot send notifications to another user"));
    }

    let outcome = state
        .notifications
        .notify_with(NotifyRequest {
            owner_id: body.owner_id,
            title: body.title,
            body: body.body,
            category: body.category,
            related_event_id: body.related_event_id,
            action_url: body.action_url,
            data: body.data,
            actions: body.actions,
        })
        .await;

    Ok(Json(SendResponse::new(
        outcome.delivery,
        outcome.record.map(|r| r.id),
        outcome.suppressed,
    )))
}

// POST /notifications/send-bulk
#[utoipa::path(
    post,
    path = "/notifications/send-bulk",
    request_body = SendBulkRequest,
    responses(
        (status = 200, body = SendBulkResponse, description = "Records created for allowed owners"),
        (status = 401, body = ErrorBody, description = "Missing admin key"),
        (status = 403, body = ErrorBody, description = "Invalid admin key"),
        (status = 422, body = ErrorBody, description = "Validation error")
    ),
    tag = "Sends",
    security(("AdminKey" = []))
)]
pub async fn send_bulk(
    State(state): State<Arc<AppState>>,
    _admin: AdminAccess,
    Json(body): Json<SendBulkRequest>,
) -> Result<Json<SendBulkResponse>, AppError> {
    body.validate()?;

    let records = state
        .notifications
        .create_bulk(
            &body.owner_ids,
            &body.title,
            &body.body,
            body.category,
            body.related_event_id.as_deref(),
            body.action_url.as_deref(),
        )
        .await;

    Ok(Json(SendBulkResponse {
        requested: body.owner_ids.len(),
        created: records.len(),
        notification_ids: records.into_iter().map(|r| r.id).collect(),
    }))
}

// POST /notifications/send-topic
#[utoipa::path(
    post,
    path = "/notifications/send-topic",
    request_body = SendTopicRequest,
    responses(
        (status = 200, body = TopicDispatchResult, description = "Topic broadcast result"),
        (status = 401, body = ErrorBody, description = "Missing admin key"),
        (status = 403, body = ErrorBody, description = "Invalid admin key"),
        (status = 422, body = ErrorBody, description = "Validation error"),
        (status = 503, body = ErrorBody, description = "OAuth sender not configured")
    ),
    tag = "Sends",
    security(("AdminKey" = []))
)]
pub async fn send_topic(
    State(state): State<Arc<AppState>>,
    _admin: AdminAccess,
    Json(body): Json<SendTopicRequest>,
) -> Result<Json<TopicDispatchResult>, AppError> {
    body.validate()?;

    if state.providers.oauth().is_none() {
        return Err(AppError::service_unavailable(
            "Topic broadcast requires the OAuth sender",
        ));
    }

    let tag = body
        .data
        .get("tag")
        .and_then(|t| t.as_str())
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| dedup_tag(&body.topic, chrono::Utc::now().timestamp_millis()));
    let payload = NotificationPayload::new(body.title, body.body, tag)
        .with_action_url(body.action_url)
        .with_data(body.data)
        .for_topic(&body.topic);

    Ok(Json(state.dispatcher.dispatch_topic(&body.topic, &payload).await))
}

// GET /notifications
#[utoipa::path(
    get,
    path = "/notifications",
    params(ListNotificationsParams),
    responses(
        (status = 200, body = NotificationListResponse, description = "The caller's notifications, newest first"),
        (status = 401, body = ErrorBody, description = "Unauthorized"),
        (status = 422, body = ErrorBody, description = "Validation error")
    ),
    tag = "Notifications",
    security(("BearerAuth" = []))
)]
pub async fn list_notifications(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    Query(params): Query<ListNotificationsParams>,
) -> Result<Json<NotificationListResponse>, AppError> {
    params.validate()?;

    let repo = NotificationRepository::new(state.db.pool.clone());
    let limit = params.limit();
    let offset = params.offset();

    let (notifications, total, unread_count) = tokio::try_join!(
        repo.list_by_owner(&user.user_id, params.unread_only, limit, offset),
        repo.count_by_owner(&user.user_id),
        repo.count_unread(&user.user_id),
    )?;

    Ok(Json(NotificationListResponse {
        notifications,
        total,
        unread_count,
        limit,
        offset,
    }))
}

// POST /notifications/{notification_id}/read
#[utoipa::path(
    post,
    path = "/notifications/{notification_id}/read",
    params(("notification_id" = String, Path, description = "Notification ID")),
    responses(
        (status = 200, body = MarkReadResponse, description = "Notification marked read"),
        (status = 401, body = ErrorBody, description = "Unauthorized"),
        (status = 404, body = ErrorBody, description = "Notification not found")
    ),
    tag = "Notifications",
    security(("BearerAuth" = []))
)]
pub async fn mark_as_read(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    Path(notification_id): Path<String>,
) -> Result<Json<MarkReadResponse>, AppError> {
    let repo = NotificationRepository::new(state.db.pool.clone());

    if !repo.mark_as_read(&user.user_id, &notification_id).await? {
        return Err(AppError::not_found(format!(
            "Notification '{notification_id}' not found"
        )));
    }

    Ok(Json(MarkReadResponse {
        success: true,
        updated: 1,
        unread_count: repo.count_unread(&user.user_id).await?,
    }))
}

// POST /notifications/read-all
#[utoipa::path(
    post,
    path = "/notifications/read-all",
    responses(
        (status = 200, body = MarkReadResponse, description = "All notifications marked read"),
        (status = 401, body = ErrorBody, description = "Unauthorized")
    ),
    tag = "Notifications",
    security(("BearerAuth" = []))
)]
pub async fn mark_all_as_read(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
) -> Result<Json<MarkReadResponse>, AppError> {
    let repo = NotificationRepository::new(state.db.pool.clone());
    let updated = repo.mark_all_as_read(&user.user_id).await?;

    Ok(Json(MarkReadResponse {
        success: true,
        updated,
        unread_count: 0,
    }))
}

// GET /notifications/preferences
#[utoipa::path(
    get,
    path = "/notifications/preferences",
    responses(
        (status = 200, body = PreferencesResponse, description = "The caller's delivery preferences"),
        (status = 401, body = ErrorBody, description = "Unauthorized")
    ),
    tag = "Preferences",
    security(("BearerAuth" = []))
)]
pub async fn get_preferences(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
) -> Result<Json<PreferencesResponse>, AppError> {
    let registrations = RegistrationRepository::new(state.db.pool.clone());

    let (preferences, count_active) = tokio::try_join!(
        state.preferences.get_or_default(&user.user_id),
        registrations.count_active(&user.user_id),
    )?;

    Ok(Json(PreferencesResponse {
        preferences,
        count_active,
    }))
}

// PUT /notifications/preferences
#[utoipa::path(
    put,
    path = "/notifications/preferences",
    request_body = UpdatePreferencesRequest,
    responses(
        (status = 200, body = PreferencesResponse, description = "Updated preferences"),
        (status = 401, body = ErrorBody, description = "Unauthorized")
    ),
    tag = "Preferences",
    security(("BearerAuth" = []))
)]
pub async fn update_preferences(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    Json(body): Json<UpdatePreferencesRequest>,
) -> Result<Json<PreferencesResponse>, AppError> {
    let mut prefs = state.preferences.get_or_default(&user.user_id).await?;

    if let Some(v) = body.event_reminder {
        prefs.event_reminder = v;
    }
    if let Some(v) = body.personnel_assigned {
        prefs.personnel_assigned = v;
    }
    if let Some(v) = body.event_status_changed {
        prefs.event_status_changed = v;
    }
    if let Some(v) = body.song_added {
        prefs.song_added = v;
    }
    if let Some(v) = body.push_enabled {
        prefs.push_enabled = v;
    }

    let preferences = state.preferences.update(&prefs).await?;
    let count_active = RegistrationRepository::new(state.db.pool.clone())
        .count_active(&user.user_id)
        .await?;

    tracing::info!(owner_id = %user.user_id, "Preferences updated");

    Ok(Json(PreferencesResponse {
        preferences,
        count_active,
    }))
}

