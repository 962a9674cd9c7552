use sqlx::SqlitePool;
use uuid::Uuid;

use super::{is_unique_violation, parse_dt, parse_json};
use crate::models::entities::DeviceRegistration;

/// Attempts before giving up on a register racing another register of the same token.
const REGISTER_ATTEMPTS: usize = 3;

#[derive(Clone)]
pub struct RegistrationRepository {
    pool: SqlitePool,
}

#[derive(sqlx::FromRow)]
struct RegistrationRow {
    id: String,
    owner_id: String,
    token: String,
    is_active: i32,
    metadata: String,
    created_at: String,
}

impl From<RegistrationRow> for DeviceRegistration {
    fn from(row: RegistrationRow) -> Self {
        Self {
            id: row.id,
            owner_id: row.owner_id,
            token: row.token,
            is_active: row.is_active != 0,
            created_at: parse_dt(&row.created_at),
            metadata: parse_json(&row.metadata),
        }
    }
}

impl RegistrationRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Upsert a token for `owner_id`.
    ///
    /// An active row for the same owner is reused (metadata refreshed). An
    /// active row held by a different owner is deactivated and a new row is
    /// created for the new owner, so the token only ever has one live holder.
    pub async fn register(
        &self,
        owner_id: &str,
        token: &str,
        metadata: &serde_json::Value,
    ) -> Result<DeviceRegistration, sqlx::Error> {
        let metadata_json = metadata.to_string();
        let mut last_err = None;

        for _ in 0..REGISTER_ATTEMPTS {
            match self.try_register(owner_id, token, &metadata_json).await {
                Ok(registration) => return Ok(registration),
                // A concurrent register inserted the same token first; re-read and retry.
                Err(e) if is_unique_violation(&e) => last_err = Some(e),
                Err(e) => return Err(e),
            }
        }

        Err(last_err.unwrap_or(sqlx::Error::RowNotFound))
    }

    async fn try_register(
        &self,
        owner_id: &str,
        token: &str,
        metadata_json: &str,
    ) -> Result<DeviceRegistration, sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        let existing = sqlx::query_as::<_, RegistrationRow>(
            "SELECT id, owner_id, token, is_active, metadata, created_at
             FROM device_registrations
             WHERE token = ? AND is_active = 1",
        )
        .bind(token)
        .fetch_optional(&mut *tx)
        .await?;

        let registration_id = match existing {
            Some(row) if row.owner_id == owner_id => {
                sqlx::query(
                    "UPDATE device_registrations
                     SET metadata = ?, updated_at = datetime('now')
                     WHERE id = ?",
                )
                .bind(metadata_json)
                .bind(&row.id)
                .execute(&mut *tx)
                .await?;
                row.id
            }
            other => {
                if let Some(previous) = other {
                    tracing::info!(
                        registration_id = %previous.id,
                        previous_owner = %previous.owner_id,
                        new_owner = %owner_id,
                        "Token reassigned, deactivating previous registration"
                    );
                    sqlx::query(
                        "UPDATE device_registrations
                         SET is_active = 0, updated_at = datetime('now')
                         WHERE id = ?",
                    )
                    .bind(&previous.id)
                    .execute(&mut *tx)
                    .await?;
                }

                let id = Uuid::new_v4().to_string();
                sqlx::query(
                    "INSERT INTO device_registrations (id, owner_id, token, is_active, metadata)
                     VALUES (?, ?, ?, 1, ?)",
                )
                .bind(&id)
                .bind(owner_id)
                .bind(token)
                .bind(metadata_json)
                .execute(&mut *tx)
                .await?;
                id
            }
        };

        tx.commit().await?;

        self.get_by_id(&registration_id)
            .await?
            .ok_or(sqlx::Error::RowNotFound)
    }

    pub async fn get_by_id(
        &self,
        registration_id: &str,
    ) -> Result<Option<DeviceRegistration>, sqlx::Error> {
        let row = sqlx::query_as::<_, RegistrationRow>(
            "SELECT id, owner_id, token, is_active, metadata, created_at
             FROM device_registrations WHERE id = ?",
        )
        .bind(registration_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(DeviceRegistration::from))
    }

    pub async fn list_active(&self, owner_id: &str) -> Result<Vec<DeviceRegistration>, sqlx::Error> {
        let rows = sqlx::query_as::<_, RegistrationRow>(
            "SELECT id, owner_id, token, is_active, metadata, created_at
             FROM device_registrations
             WHERE owner_id = ? AND is_active = 1
             ORDER BY created_at ASC, id ASC",
        )
        .bind(owner_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(DeviceRegistration::from).collect())
    }

    /// Flip the liveness flag off. Idempotent; rows are kept for audit.
    pub async fn deactivate(&self, registration_id: &str) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE device_registrations
             SET is_active = 0, updated_at = datetime('now')
             WHERE id = ? AND is_active = 1",
        )
        .bind(registration_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Deactivate the caller's active row for `token`. Returns how many rows flipped.
    pub async fn deactivate_token(&self, owner_id: &str, token: &str) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE device_registrations
             SET is_active = 0, updated_at = datetime('now')
             WHERE owner_id = ? AND token = ? AND is_active = 1",
        )
        .bind(owner_id)
        .bind(token)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    pub async fn count_active(&self, owner_id: &str) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar(
            "SELECT COUNT(*) FROM device_registrations WHERE owner_id = ? AND is_active = 1",
        )
        .bind(owner_id)
        .fetch_one(&self.pool)
        .await
    }

    pub async fn count_all_active(&self) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar("SELECT COUNT(*) FROM device_registrations WHERE is_active = 1")
            .fetch_one(&self.pool)
            .await
    }
}
