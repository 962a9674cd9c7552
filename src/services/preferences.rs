use crate::db::repositories::PreferenceRepository;
use crate::models::entities::{NotificationCategory, NotificationPreference};

/// Per-user delivery preferences. Every check fails open: a missing row or an
/// unavailable store means "allowed".
#[derive(Clone)]
pub struct PreferenceGate {
    repo: PreferenceRepository,
}

impl PreferenceGate {
    pub fn new(repo: PreferenceRepository) -> Self {
        Self { repo }
    }

    /// Lazily create the all-allowed row. Errors are logged, never returned.
    pub async fn ensure_default(&self, owner_id: &str) {
        match self.repo.ensure_default(owner_id).await {
            Ok(true) => tracing::debug!(owner_id = %owner_id, "Created default preferences"),
            Ok(false) => {}
            Err(e) => {
                tracing::warn!(owner_id = %owner_id, error = %e, "Failed to create default preferences")
            }
        }
    }

    pub async fn is_allowed(&self, owner_id: &str, category: NotificationCategory) -> bool {
        self.load(owner_id).await.allows(category)
    }

    pub async fn is_push_enabled(&self, owner_id: &str) -> bool {
        self.load(owner_id).await.push_enabled
    }

    /// The stored row, or the default when none exists.
    pub async fn get_or_default(
        &self,
        owner_id: &str,
    ) -> Result<NotificationPreference, sqlx::Error> {
        Ok(self
            .repo
            .get(owner_id)
            .await?
            .unwrap_or_else(|| NotificationPreference::default_for(owner_id)))
    }

    pub async fn update(
        &self,
        prefs: &NotificationPreference,
    ) -> Result<NotificationPreference, sqlx::Error> {
        self.repo.upsert(prefs).await
    }

    async fn load(&self, owner_id: &str) -> NotificationPreference {
        match self.repo.get(owner_id).await {
            Ok(Some(prefs)) => prefs,
            Ok(None) => {
                let gate = self.clone();
                let owner = owner_id.to_string();
                tokio::spawn(async move { gate.ensure_default(&owner).await });
                NotificationPreference::default_for(owner_id)
            }
            Err(e) => {
                tracing::warn!(
                    owner_id = %owner_id,
                    error = %e,
                    "Preference lookup failed, allowing delivery"
                );
                NotificationPreference::default_for(owner_id)
            }
        }
    }
}
