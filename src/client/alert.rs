use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::models::entities::NotificationCategory;
use crate::services::push::dedup_tag;

/// Which channel produced a visible alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertOrigin {
    Local,
    Provider,
}

/// One visible alert as the presentation layer sees it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub tag: String,
    pub title: String,
    pub body: String,
    pub icon: Option<String>,
    pub data: BTreeMap<String, String>,
    pub origin: AlertOrigin,
}

impl Alert {
    /// Build an alert from a provider message's `data` section. Returns
    /// `None` when the message carries nothing displayable.
    pub fn from_push_data(data: &BTreeMap<String, String>, origin: AlertOrigin) -> Option<Self> {
        let title = data.get("title").filter(|t| !t.is_empty())?.clone();
        let body = data.get("body").cloned().unwrap_or_default();

        let tag = match data.get("tag").filter(|t| !t.is_empty()) {
            Some(tag) => tag.clone(),
            None => {
                let category = data
                    .get("category")
                    .and_then(|c| c.parse::<NotificationCategory>().ok())
                    .unwrap_or(NotificationCategory::General);
                let discriminator = data
                    .get("notificationId")
                    .cloned()
                    .unwrap_or_else(|| chrono::Utc::now().timestamp_millis().to_string());
                dedup_tag(category, discriminator)
            }
        };

        Some(Self {
            tag,
            title,
            body,
            icon: data.get("icon").cloned(),
            data: data.clone(),
            origin,
        })
    }

    pub fn action_url(&self) -> Option<&str> {
        self.data
            .get("actionUrl")
            .map(String::as_str)
            .filter(|u| !u.is_empty())
    }
}

/// Where a click on an alert navigates: `data.actionUrl`, else `default_route`.
pub fn click_target(data: &BTreeMap<String, String>, default_route: &str) -> String {
    data.get("actionUrl")
        .map(|u| u.trim())
        .filter(|u| !u.is_empty())
        .unwrap_or(default_route)
        .to_string()
}

/// Tag for an alert the client originates itself.
pub fn client_tag(category: NotificationCategory) -> String {
    dedup_tag(category, chrono::Utc::now().timestamp_millis())
}
