use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, AtomicU64, Ordering};
use std::time::Duration;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;

use super::alert::{Alert, AlertOrigin, click_target, client_tag};
use super::relay::ProviderRelay;
use super::tray::{AlertPresenter, AlertState};
use crate::models::entities::NotificationCategory;

/// Display permission granted by the user agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Permission {
    Default,
    Granted,
    Denied,
}

impl Permission {
    fn to_u8(self) -> u8 {
        match self {
            Self::Default => 0,
            Self::Granted => 1,
            Self::Denied => 2,
        }
    }

    fn from_u8(v: u8) -> Self {
        match v {
            1 => Self::Granted,
            2 => Self::Denied,
            _ => Self::Default,
        }
    }
}

/// A notification the client already has in hand.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientPayload {
    pub title: String,
    pub body: String,
    pub category: NotificationCategory,
    pub tag: String,
    pub action_url: Option<String>,
    pub icon: Option<String>,
    #[serde(default)]
    pub data: BTreeMap<String, String>,
}

impl ClientPayload {
    /// New payload with a fresh client-originated tag.
    pub fn new(
        title: impl Into<String>,
        body: impl Into<String>,
        category: NotificationCategory,
    ) -> Self {
        Self {
            title: title.into(),
            body: body.into(),
            category,
            tag: client_tag(category),
            action_url: None,
            icon: None,
            data: BTreeMap::new(),
        }
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = tag.into();
        self
    }

    pub fn with_action_url(mut self, url: impl Into<String>) -> Self {
        self.action_url = Some(url.into());
        self
    }

    fn local_alert(&self) -> Alert {
        let mut data = self.data.clone();
        data.insert("title".to_string(), self.title.clone());
        data.insert("body".to_string(), self.body.clone());
        data.insert("category".to_string(), self.category.to_string());
        if let Some(url) = &self.action_url {
            data.insert("actionUrl".to_string(), url.clone());
        }
        data.insert("tag".to_string(), self.tag.clone());

        Alert {
            tag: self.tag.clone(),
            title: self.title.clone(),
            body: self.body.clone(),
            icon: self.icon.clone(),
            data,
            origin: AlertOrigin::Local,
        }
    }
}

/// Client-side fallback: the local alert is the guarantee, the provider
/// relay is an extra path, and the presenter collapses duplicates by tag.
pub struct HybridNotifier {
    presenter: Arc<dyn AlertPresenter>,
    relay: Option<Arc<dyn ProviderRelay>>,
    permission: AtomicU8,
    scheduled: DashMap<String, (u64, JoinHandle<()>)>,
    schedule_ids: AtomicU64,
    default_route: String,
}

impl HybridNotifier {
    pub fn new(presenter: Arc<dyn AlertPresenter>, default_route: &str) -> Self {
        Self {
            presenter,
            relay: None,
            permission: AtomicU8::new(Permission::Default.to_u8()),
            scheduled: DashMap::new(),
            schedule_ids: AtomicU64::new(0),
            default_route: default_route.to_string(),
        }
    }

    pub fn with_relay(mut self, relay: Arc<dyn ProviderRelay>) -> Self {
        self.relay = Some(relay);
        self
    }

    pub fn permission(&self) -> Permission {
        Permission::from_u8(self.permission.load(Ordering::Acquire))
    }

    pub fn set_permission(&self, permission: Permission) {
        self.permission.store(permission.to_u8(), Ordering::Release);
    }

    /// Surface one logical notification. True when an alert is visible.
    pub async fn surface(&self, payload: &ClientPayload) -> bool {
        if self.permission() != Permission::Granted {
            tracing::debug!(tag = %payload.tag, "Display permission not granted, not surfacing");
            return false;
        }

        let local = self.presenter.present(payload.local_alert());

        if let Some(relay) = &self.relay {
            match relay.relay(payload).await {
                Ok(sent) => tracing::debug!(tag = %payload.tag, sent = sent, "Provider relay accepted"),
                Err(e) => tracing::warn!(tag = %payload.tag, error = %e, "Provider relay failed"),
            }
        }

        local.is_visible()
    }

    /// Handle a message delivered by the provider channel.
    pub fn handle_push_message(&self, data: &BTreeMap<String, String>) -> Option<AlertState> {
        if self.permission() != Permission::Granted {
            return None;
        }
        let alert = Alert::from_push_data(data, AlertOrigin::Provider)?;
        Some(self.presenter.present(alert))
    }

    /// Route for a clicked alert.
    pub fn click(&self, data: &BTreeMap<String, String>) -> String {
        click_target(data, &self.default_route)
    }

    /// Surface `payload` after `delay`. Scheduling again under the same key
    /// replaces the earlier timer.
    pub fn schedule(self: &Arc<Self>, key: &str, payload: ClientPayload, delay: Duration) {
        let id = self.schedule_ids.fetch_add(1, Ordering::Relaxed);
        let notifier = Arc::clone(self);
        let task_key = key.to_string();
        let spawn = move || {
            tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                notifier.surface(&payload).await;
                notifier
                    .scheduled
                    .remove_if(&task_key, |_, (scheduled_id, _)| *scheduled_id == id);
            })
        };

        // The shard stays locked until the new handle is stored
        match self.scheduled.entry(key.to_string()) {
            Entry::Occupied(mut slot) => {
                let (_, previous) = slot.insert((id, spawn()));
                previous.abort();
                tracing::debug!(key = %key, "Replaced scheduled alert");
            }
            Entry::Vacant(slot) => {
                slot.insert((id, spawn()));
            }
        }
    }

    /// Cancel a scheduled alert. True if one was pending.
    pub fn cancel(&self, key: &str) -> bool {
        match self.scheduled.remove(key) {
            Some((_, (_, handle))) => {
                handle.abort();
                true
            }
            None => false,
        }
    }

    pub fn pending_schedules(&self) -> usize {
        self.scheduled.len()
    }
}
