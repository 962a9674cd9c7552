use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumIter, EnumString};
use utoipa::ToSchema;

// ── Enums ──

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
    EnumIter,
    ToSchema,
)]
#[serde(rename_all = "camelCase")]
#[strum(serialize_all = "camelCase")]
pub enum NotificationCategory {
    EventReminder,
    PersonnelAssigned,
    EventStatusChanged,
    EventCreated,
    SongAdded,
    MemberJoined,
    General,
}

/// Preference flag a category is gated by.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PreferenceFlag {
    EventReminder,
    PersonnelAssigned,
    EventStatusChanged,
    SongAdded,
}

impl NotificationCategory {
    /// Categories without a flag are always delivered.
    pub fn preference_flag(self) -> Option<PreferenceFlag> {
        match self {
            Self::EventReminder => Some(PreferenceFlag::EventReminder),
            Self::PersonnelAssigned => Some(PreferenceFlag::PersonnelAssigned),
            Self::EventStatusChanged | Self::EventCreated => {
                Some(PreferenceFlag::EventStatusChanged)
            }
            Self::SongAdded => Some(PreferenceFlag::SongAdded),
            Self::MemberJoined | Self::General => None,
        }
    }
}

// ── Entities ──

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DeviceRegistration {
    pub id: String,
    pub owner_id: String,
    #[serde(skip_serializing)]
    pub token: String,
    pub is_active: bool,
    pub created_at: NaiveDateTime,
    #[schema(value_type = Object)]
    pub metadata: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct NotificationPreference {
    pub owner_id: String,
    pub event_reminder: bool,
    pub personnel_assigned: bool,
    pub event_status_changed: bool,
    pub song_added: bool,
    pub push_enabled: bool,
}

impl NotificationPreference {
    /// The row lazily created for a user who never touched their settings.
    pub fn default_for(owner_id: &str) -> Self {
        Self {
            owner_id: owner_id.to_string(),
            event_reminder: true,
            personnel_assigned: true,
            event_status_changed: true,
            song_added: true,
            push_enabled: true,
        }
    }

    pub fn allows(&self, category: NotificationCategory) -> bool {
        match category.preference_flag() {
            Some(PreferenceFlag::EventReminder) => self.event_reminder,
            Some(PreferenceFlag::PersonnelAssigned) => self.personnel_assigned,
            Some(PreferenceFlag::EventStatusChanged) => self.event_status_changed,
            Some(PreferenceFlag::SongAdded) => self.song_added,
            None => true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct NotificationRecord {
    pub id: String,
    pub owner_id: String,
    pub title: String,
    pub body: String,
    pub category: NotificationCategory,
    pub related_event_id: Option<String>,
    pub action_url: Option<String>,
    pub is_read: bool,
    pub created_at: NaiveDateTime,
}

/// Fields for a record that has not been written yet.
#[derive(Debug, Clone)]
pub struct NewNotification {
    pub owner_id: String,
    pub title: String,
    pub body: String,
    pub category: NotificationCategory,
    pub related_event_id: Option<String>,
    pub action_url: Option<String>,
}

impl NewNotification {
    /// Materialise the record with a fresh id and timestamp.
    pub fn into_record(self) -> NotificationRecord {
        NotificationRecord {
            id: uuid::Uuid::new_v4().to_string(),
            owner_id: self.owner_id,
            title: self.title,
            body: self.body,
            category: self.category,
            related_event_id: self.related_event_id,
            action_url: self.action_url,
            is_read: false,
            created_at: now_seconds(),
        }
    }
}

/// SQLite stores second precision; in-memory records match what a re-read returns.
pub fn now_seconds() -> NaiveDateTime {
    use chrono::Timelike;
    let now = chrono::Utc::now().naive_utc();
    now.with_nanosecond(0).unwrap_or(now)
}
