use sqlx::SqlitePool;

use crate::models::entities::NotificationPreference;

#[derive(Clone)]
pub struct PreferenceRepository {
    pool: SqlitePool,
}

#[derive(sqlx::FromRow)]
struct PreferenceRow {
    owner_id: String,
    event_reminder: i32,
    personnel_assigned: i32,
    event_status_changed: i32,
    song_added: i32,
    push_enabled: i32,
}

impl From<PreferenceRow> for NotificationPreference {
    fn from(row: PreferenceRow) -> Self {
        Self {
            owner_id: row.owner_id,
            event_reminder: row.event_reminder != 0,
            personnel_assigned: row.personnel_assigned != 0,
            event_status_changed: row.event_status_changed != 0,
            song_added: row.song_added != 0,
            push_enabled: row.push_enabled != 0,
        }
    }
}

impl PreferenceRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn get(&self, owner_id: &str) -> Result<Option<NotificationPreference>, sqlx::Error> {
        let row = sqlx::query_as::<_, PreferenceRow>(
            "SELECT owner_id, event_reminder, personnel_assigned, event_status_changed,
                    song_added, push_enabled
             FROM notification_preferences WHERE owner_id = ?",
        )
        .bind(owner_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(NotificationPreference::from))
    }

    /// Insert the all-allowed row unless one exists. Returns true if a row was created.
    pub async fn ensure_default(&self, owner_id: &str) -> Result<bool, sqlx::Error> {
        let result =
            sqlx::query("INSERT OR IGNORE INTO notification_preferences (owner_id) VALUES (?)")
                .bind(owner_id)
                .execute(&self.pool)
                .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn upsert(
        &self,
        prefs: &NotificationPreference,
    ) -> Result<NotificationPreference, sqlx::Error> {
        sqlx::query(
            "INSERT INTO notification_preferences (
                owner_id, event_reminder, personnel_assigned, event_status_changed,
                song_added, push_enabled
            ) VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(owner_id) DO UPDATE SET
                event_reminder = excluded.event_reminder,
                personnel_assigned = excluded.personnel_assigned,
                event_status_changed = excluded.event_status_changed,
                song_added = excluded.song_added,
                push_enabled = excluded.push_enabled,
                updated_at = datetime('now')",
        )
        .bind(&prefs.owner_id)
        .bind(prefs.event_reminder)
        .bind(prefs.personnel_assigned)
        .bind(prefs.event_status_changed)
        .bind(prefs.song_added)
        .bind(prefs.push_enabled)
        .execute(&self.pool)
        .await?;

        self.get(&prefs.owner_id)
            .await?
            .ok_or(sqlx::Error::RowNotFound)
    }
}
