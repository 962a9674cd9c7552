use sqlx::SqlitePool;

use super::{format_dt, parse_dt};
use crate::models::entities::{NotificationCategory, NotificationRecord};

#[derive(Clone)]
pub struct NotificationRepository {
    pool: SqlitePool,
}

#[derive(sqlx::FromRow)]
struct NotificationRow {
    id: String,
    owner_id: String,
    title: String,
    body: String,
    category: String,
    related_event_id: Option<String>,
    action_url: Option<String>,
    is_read: i32,
    created_at: String,
}

impl From<NotificationRow> for NotificationRecord {
    fn from(row: NotificationRow) -> Self {
        Self {
            id: row.id,
            owner_id: row.owner_id,
            title: row.title,
            body: row.body,
            category: row
                .category
                .parse()
                .unwrap_or(NotificationCategory::General),
            related_event_id: row.related_event_id,
            action_url: row.action_url,
            is_read: row.is_read != 0,
            created_at: parse_dt(&row.created_at),
        }
    }
}

impl NotificationRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn insert(&self, record: &NotificationRecord) -> Result<(), sqlx::Error> {
        insert_one(&self.pool, record).await
    }

    /// Insert many records in one transaction: all land or none do.
    pub async fn insert_bulk(&self, records: &[NotificationRecord]) -> Result<(), sqlx::Error> {
        if records.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await?;
        for record in records {
            insert_one(&mut *tx, record).await?;
        }
        tx.commit().await?;
        Ok(())
    }

    pub async fn get_by_id(&self, id: &str) -> Result<Option<NotificationRecord>, sqlx::Error> {
        let row = sqlx::query_as::<_, NotificationRow>(
            "SELECT id, owner_id, title, body, category, related_event_id, action_url,
                    is_read, created_at
             FROM notifications WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(NotificationRecord::from))
    }

    pub async fn list_by_owner(
        &self,
        owner_id: &str,
        unread_only: bool,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<NotificationRecord>, sqlx::Error> {
        let rows = sqlx::query_as::<_, NotificationRow>(
            "SELECT id, owner_id, title, body, category, related_event_id, action_url,
                    is_read, created_at
             FROM notifications
             WHERE owner_id = ? AND (? = 0 OR is_read = 0)
             ORDER BY created_at DESC, id DESC
             LIMIT ? OFFSET ?",
        )
        .bind(owner_id)
        .bind(unread_only)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(NotificationRecord::from).collect())
    }

    pub async fn count_by_owner(&self, owner_id: &str) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar("SELECT COUNT(*) FROM notifications WHERE owner_id = ?")
            .bind(owner_id)
            .fetch_one(&self.pool)
            .await
    }

    pub async fn count_unread(&self, owner_id: &str) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar("SELECT COUNT(*) FROM notifications WHERE owner_id = ? AND is_read = 0")
            .bind(owner_id)
            .fetch_one(&self.pool)
            .await
    }

    pub async fn count_all(&self) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar("SELECT COUNT(*) FROM notifications")
            .fetch_one(&self.pool)
            .await
    }

    /// Mark one of the owner's notifications read. Returns false if no such row.
    pub async fn mark_as_read(&self, owner_id: &str, id: &str) -> Result<bool, sqlx::Error> {
        let result =
            sqlx::query("UPDATE notifications SET is_read = 1 WHERE id = ? AND owner_id = ?")
                .bind(id)
                .bind(owner_id)
                .execute(&self.pool)
                .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn mark_all_as_read(&self, owner_id: &str) -> Result<u64, sqlx::Error> {
        let result =
            sqlx::query("UPDATE notifications SET is_read = 1 WHERE owner_id = ? AND is_read = 0")
                .bind(owner_id)
                .execute(&self.pool)
                .await?;
        Ok(result.rows_affected())
    }
}

async fn insert_one<'e, E>(executor: E, record: &NotificationRecord) -> Result<(), sqlx::Error>
where
    E: sqlx::Executor<'e, Database = sqlx::Sqlite>,
{
    sqlx::query(
        "INSERT INTO notifications (
            id, owner_id, title, body, category, related_event_id, action_url,
            is_read, created_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&record.id)
    .bind(&record.owner_id)
    .bind(&record.title)
    .bind(&record.body)
    .bind(record.category.as_ref())
    .bind(&record.related_event_id)
    .bind(&record.action_url)
    .bind(record.is_read)
    .bind(format_dt(&record.created_at))
    .execute(executor)
    .await?;
    Ok(())
}
