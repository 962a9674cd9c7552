use std::sync::Arc;

use futures::future::join_all;
use serde_json::{Map, Value};

use super::dispatcher::{DeliveryDispatcher, DispatchResult};
use super::preferences::PreferenceGate;
use super::push::{NotificationAction, NotificationPayload};
use super::websocket::RealtimeChannel;
use crate::db::repositories::NotificationRepository;
use crate::models::entities::{NewNotification, NotificationCategory, NotificationRecord};

/// Everything a caller can say about one notification.
#[derive(Debug, Clone)]
pub struct NotifyRequest {
    pub owner_id: String,
    pub title: String,
    pub body: String,
    pub category: NotificationCategory,
    pub related_event_id: Option<String>,
    pub action_url: Option<String>,
    pub data: Map<String, Value>,
    pub actions: Vec<NotificationAction>,
}

impl NotifyRequest {
    pub fn new(
        owner_id: impl Into<String>,
        title: impl Into<String>,
        body: impl Into<String>,
        category: NotificationCategory,
    ) -> Self {
        Self {
            owner_id: owner_id.into(),
            title: title.into(),
            body: body.into(),
            category,
            related_event_id: None,
            action_url: None,
            data: Map::new(),
            actions: Vec::new(),
        }
    }

    fn new_notification(&self) -> NewNotification {
        NewNotification {
            owner_id: self.owner_id.clone(),
            title: self.title.clone(),
            body: self.body.clone(),
            category: self.category,
            related_event_id: self.related_event_id.clone(),
            action_url: self.action_url.clone(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct NotifyOutcome {
    /// The persisted record; `None` when suppressed or when persistence failed.
    pub record: Option<NotificationRecord>,
    /// True when the preference gate blocked the category.
    pub suppressed: bool,
    pub delivery: DispatchResult,
}

/// The single entry point domain code uses to tell a user something.
pub struct NotificationService {
    repo: NotificationRepository,
    preferences: PreferenceGate,
    dispatcher: Arc<DeliveryDispatcher>,
    realtime: Arc<dyn RealtimeChannel>,
}

impl NotificationService {
    pub fn new(
        repo: NotificationRepository,
        preferences: PreferenceGate,
        dispatcher: Arc<DeliveryDispatcher>,
        realtime: Arc<dyn RealtimeChannel>,
    ) -> Self {
        Self {
            repo,
            preferences,
            dispatcher,
            realtime,
        }
    }

    pub async fn notify(
        &self,
        owner_id: &str,
        title: &str,
        body: &str,
        category: NotificationCategory,
        related_event_id: Option<&str>,
        action_url: Option<&str>,
    ) -> Option<NotificationRecord> {
        let mut request = NotifyRequest::new(owner_id, title, body, category);
        request.related_event_id = related_event_id.map(str::to_string);
        request.action_url = action_url.map(str::to_string);
        self.notify_with(request).await.record
    }

    /// Gate, persist, emit, dispatch. Each step logs its own failure and the
    /// next step still runs.
    pub async fn notify_with(&self, request: NotifyRequest) -> NotifyOutcome {
        let owner_id = request.owner_id.as_str();

        self.preferences.ensure_default(owner_id).await;

        if !self.preferences.is_allowed(owner_id, request.category).await {
            tracing::debug!(
                owner_id = %owner_id,
                category = %request.category,
                "Notification suppressed by preferences"
            );
            return NotifyOutcome {
                suppressed: true,
                ..Default::default()
            };
        }

        let record = request.new_notification().into_record();
        let persisted = match self.repo.insert(&record).await {
            Ok(()) => true,
            Err(e) => {
                tracing::error!(
                    owner_id = %owner_id,
                    notification_id = %record.id,
                    error = %e,
                    "Failed to persist notification"
                );
                false
            }
        };

        if persisted {
            self.realtime.emit(owner_id, &record);
        }

        let payload = NotificationPayload::from_record(&record, request.data)
            .with_actions(request.actions);
        let delivery = self.dispatcher.dispatch(owner_id, &payload).await;

        NotifyOutcome {
            record: persisted.then_some(record),
            suppressed: false,
            delivery,
        }
    }

    /// The notify pipeline over many owners: one batch insert for the owners
    /// whose preferences allow the category, then a dispatch per owner.
    pub async fn create_bulk(
        &self,
        owner_ids: &[String],
        title: &str,
        body: &str,
        category: NotificationCategory,
        related_event_id: Option<&str>,
        action_url: Option<&str>,
    ) -> Vec<NotificationRecord> {
        let mut allowed = Vec::with_capacity(owner_ids.len());
        for owner_id in owner_ids {
            if allowed.contains(owner_id) {
                continue;
            }
            self.preferences.ensure_default(owner_id).await;
            if self.preferences.is_allowed(owner_id, category).await {
                allowed.push(owner_id.clone());
            }
        }

        let records: Vec<NotificationRecord> = allowed
            .into_iter()
            .map(|owner_id| {
                NewNotification {
                    owner_id,
                    title: title.to_string(),
                    body: body.to_string(),
                    category,
                    related_event_id: related_event_id.map(str::to_string),
                    action_url: action_url.map(str::to_string),
                }
                .into_record()
            })
            .collect();

        let persisted = match self.repo.insert_bulk(&records).await {
            Ok(()) => true,
            Err(e) => {
                tracing::error!(
                    count = records.len(),
                    error = %e,
                    "Failed to persist bulk notifications"
                );
                false
            }
        };

        if persisted {
            self.realtime.emit_many(&records);
        }

        let dispatches = records.iter().map(|record| async move {
            let payload = NotificationPayload::from_record(record, Map::new());
            self.dispatcher.dispatch(&record.owner_id, &payload).await
        });
        let results = join_all(dispatches).await;

        tracing::info!(
            recipients = records.len(),
            requested = owner_ids.len(),
            sent = results.iter().map(|r| r.sent).sum::<usize>(),
            category = %category,
            "Bulk notification completed"
        );

        if persisted { records } else { Vec::new() }
    }
}
