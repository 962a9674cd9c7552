use std::collections::BTreeMap;
use std::fmt::Display;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use utoipa::ToSchema;

use crate::models::entities::{NotificationCategory, NotificationRecord};

/// Provider topic names: letters, digits and `-_.~%`.
pub static TOPIC_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-zA-Z0-9\-_.~%]{1,900}$").unwrap());

/// Which provider generation (and addressing mode) a payload goes out on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Channel {
    /// Legacy multicast, user-directed. The default path.
    Legacy,
    /// OAuth per-message API, one call per registration token.
    OAuthToken,
    /// OAuth per-message API addressed to a broadcast topic.
    OAuthTopic(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct NotificationAction {
    pub action: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
}

/// Build the dedup tag shared by every channel surfacing one logical notification.
pub fn dedup_tag(category: impl Display, discriminator: impl Display) -> String {
    format!("{category}-{discriminator}")
}

/// One logical notification in provider-neutral form.
#[derive(Debug, Clone)]
pub struct NotificationPayload {
    pub title: String,
    pub body: String,
    pub category: Option<NotificationCategory>,
    pub tag: String,
    pub action_url: Option<String>,
    pub icon: Option<String>,
    pub notification_id: Option<String>,
    pub data: Map<String, Value>,
    pub actions: Vec<NotificationAction>,
    pub channel: Channel,
}

impl NotificationPayload {
    pub fn new(title: impl Into<String>, body: impl Into<String>, tag: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            body: body.into(),
            category: None,
            tag: tag.into(),
            action_url: None,
            icon: None,
            notification_id: None,
            data: Map::new(),
            actions: Vec::new(),
            channel: Channel::Legacy,
        }
    }

    /// Payload for a persisted record. A caller-supplied `data.tag` wins over
    /// the derived `<category>-<id>` tag so client-originated alerts collapse.
    pub fn from_record(record: &NotificationRecord, data: Map<String, Value>) -> Self {
        let tag = data
            .get("tag")
            .and_then(Value::as_str)
            .filter(|t| !t.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| dedup_tag(record.category, &record.id));

        Self {
            title: record.title.clone(),
            body: record.body.clone(),
            category: Some(record.category),
            tag,
            action_url: record.action_url.clone(),
            icon: None,
            notification_id: Some(record.id.clone()),
            data,
            actions: Vec::new(),
            channel: Channel::Legacy,
        }
    }

    /// Attach interactive actions; these are only expressible on the OAuth API.
    pub fn with_actions(mut self, actions: Vec<NotificationAction>) -> Self {
        if !actions.is_empty() {
            self.channel = Channel::OAuthToken;
        }
        self.actions = actions;
        self
    }

    pub fn with_action_url(mut self, action_url: Option<String>) -> Self {
        self.action_url = action_url;
        self
    }

    pub fn with_data(mut self, data: Map<String, Value>) -> Self {
        self.data = data;
        self
    }

    pub fn for_topic(mut self, topic: impl Into<String>) -> Self {
        self.channel = Channel::OAuthTopic(topic.into());
        self
    }

    /// The provider `data` section. Providers only carry string values, so
    /// non-string caller data is JSON-encoded. `tag` and `actionUrl` are
    /// always written last, verbatim.
    pub fn data_section(&self) -> BTreeMap<String, String> {
        let mut data: BTreeMap<String, String> = self
            .data
            .iter()
            .map(|(k, v)| {
                let value = match v {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                (k.clone(), value)
            })
            .collect();

        data.insert("title".to_string(), self.title.clone());
        data.insert("body".to_string(), self.body.clone());
        if let Some(category) = self.category {
            data.insert("category".to_string(), category.to_string());
        }
        if let Some(id) = &self.notification_id {
            data.insert("notificationId".to_string(), id.clone());
        }
        if let Some(url) = &self.action_url {
            data.insert("actionUrl".to_string(), url.clone());
        }
        data.insert("tag".to_string(), self.tag.clone());
        data
    }

    pub fn notification_section(&self) -> Value {
        json!({
            "title": self.title,
            "body": self.body,
        })
    }

    pub fn webpush_section(&self) -> Value {
        let mut notification = json!({
            "title": self.title,
            "body": self.body,
            "tag": self.tag,
            "renotify": true,
        });
        if let Some(icon) = &self.icon {
            notification["icon"] = json!(icon);
        }
        if !self.actions.is_empty() {
            notification["actions"] = json!(self.actions);
            notification["requireInteraction"] = json!(true);
        }

        let mut webpush = json!({ "notification": notification });
        if let Some(url) = &self.action_url {
            webpush["fcm_options"] = json!({ "link": url });
        }
        webpush
    }
}
