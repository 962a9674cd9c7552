use std::collections::HashSet;
use std::sync::Arc;

use futures::future::join_all;
use serde::Serialize;
use utoipa::ToSchema;

use super::preferences::PreferenceGate;
use super::push::{
    Channel, DeliveryOutcome, ErrorKind, NotificationPayload, OAuthSender, ProviderClient,
    PushError, PushSender, token_fingerprint,
};
use crate::db::repositories::RegistrationRepository;
use crate::models::entities::DeviceRegistration;

#[derive(Debug, Clone, Default, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DispatchResult {
    pub attempted: usize,
    pub sent: usize,
    pub failed: usize,
    pub per_registration: Vec<DeliveryOutcome>,
}

impl DispatchResult {
    fn from_outcomes(outcomes: Vec<DeliveryOutcome>) -> Self {
        let sent = outcomes.iter().filter(|o| o.is_sent()).count();
        Self {
            attempted: outcomes.len(),
            sent,
            failed: outcomes.len() - sent,
            per_registration: outcomes,
        }
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TopicDispatchResult {
    pub topic: String,
    pub sent: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Fans one logical notification out to a user's registrations and feeds
/// permanent failures back into the registration store.
pub struct DeliveryDispatcher {
    registrations: RegistrationRepository,
    preferences: PreferenceGate,
    primary: Option<Arc<dyn PushSender>>,
    oauth: Option<Arc<OAuthSender>>,
}

impl DeliveryDispatcher {
    pub fn new(
        registrations: RegistrationRepository,
        preferences: PreferenceGate,
        providers: &ProviderClient,
    ) -> Self {
        Self::with_senders(
            registrations,
            preferences,
            providers.primary(),
            providers.oauth().cloned(),
        )
    }

    pub fn with_senders(
        registrations: RegistrationRepository,
        preferences: PreferenceGate,
        primary: Option<Arc<dyn PushSender>>,
        oauth: Option<Arc<OAuthSender>>,
    ) -> Self {
        Self {
            registrations,
            preferences,
            primary,
            oauth,
        }
    }

    /// Deliver `payload` to every active registration of `owner_id`.
    /// Never fails; partial and total failures show up in the counters.
    pub async fn dispatch(&self, owner_id: &str, payload: &NotificationPayload) -> DispatchResult {
        let registrations = match self.registrations.list_active(owner_id).await {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!(
                    owner_id = %owner_id,
                    error = %e,
                    "Registration lookup failed, nothing to dispatch"
                );
                return DispatchResult::default();
            }
        };
        if registrations.is_empty() {
            return DispatchResult::default();
        }

        if !self.preferences.is_push_enabled(owner_id).await {
            tracing::debug!(owner_id = %owner_id, "Push disabled by preferences");
            return DispatchResult::default();
        }

        let Some(sender) = self.sender_for(&payload.channel) else {
            tracing::warn!(owner_id = %owner_id, "No push sender configured, skipping dispatch");
            return DispatchResult::default();
        };

        let outcomes = complete_outcomes(
            &registrations,
            sender.send(&registrations, payload).await,
        );

        self.deactivate_permanent(&registrations, &outcomes).await;
        log_credential_failure(sender.name(), &outcomes);

        let result = DispatchResult::from_outcomes(outcomes);
        tracing::info!(
            owner_id = %owner_id,
            sender = sender.name(),
            tag = %payload.tag,
            attempted = result.attempted,
            sent = result.sent,
            failed = result.failed,
            "Dispatch completed"
        );
        result
    }

    /// Broadcast to a provider topic. Independent of any registration state.
    pub async fn dispatch_topic(
        &self,
        topic: &str,
        payload: &NotificationPayload,
    ) -> TopicDispatchResult {
        let result = match &self.oauth {
            Some(oauth) => oauth.send_topic(topic, payload).await,
            None => Err(PushError::Credential {
                reason: "OAuth sender not configured".to_string(),
                network: false,
            }),
        };

        match result {
            Ok(message_id) => {
                tracing::info!(topic = %topic, tag = %payload.tag, "Topic broadcast sent");
                TopicDispatchResult {
                    topic: topic.to_string(),
                    sent: true,
                    message_id: Some(message_id),
                    error_kind: None,
                    error: None,
                }
            }
            Err(err) => {
                tracing::warn!(topic = %topic, error = %err, "Topic broadcast failed");
                TopicDispatchResult {
                    topic: topic.to_string(),
                    sent: false,
                    message_id: None,
                    error_kind: Some(err.kind()),
                    error: Some(err.to_string()),
                }
            }
        }
    }

    fn sender_for(&self, channel: &Channel) -> Option<Arc<dyn PushSender>> {
        match channel {
            Channel::OAuthToken => match &self.oauth {
                Some(oauth) => Some(oauth.clone() as Arc<dyn PushSender>),
                None => {
                    tracing::warn!("Interactive actions need the OAuth sender; using primary sender");
                    self.primary.clone()
                }
            },
            Channel::Legacy | Channel::OAuthTopic(_) => self.primary.clone(),
        }
    }

    async fn deactivate_permanent(
        &self,
        registrations: &[DeviceRegistration],
        outcomes: &[DeliveryOutcome],
    ) {
        let revoked: Vec<&DeviceRegistration> = outcomes
            .iter()
            .filter(|o| o.is_permanent_failure())
            .filter_map(|o| registrations.iter().find(|r| r.id == o.registration_id))
            .collect();

        let deactivations = revoked.into_iter().map(|registration| async move {
            match self.registrations.deactivate(&registration.id).await {
                Ok(()) => tracing::info!(
                    registration_id = %registration.id,
                    token = %token_fingerprint(&registration.token),
                    "Deactivated revoked registration"
                ),
                Err(e) => tracing::error!(
                    registration_id = %registration.id,
                    error = %e,
                    "Failed to deactivate revoked registration"
                ),
            }
        });

        join_all(deactivations).await;
    }
}

/// One outcome per registration: anything the sender failed to report is a
/// transient failure.
fn complete_outcomes(
    registrations: &[DeviceRegistration],
    mut outcomes: Vec<DeliveryOutcome>,
) -> Vec<DeliveryOutcome> {
    let ids: HashSet<&str> = registrations.iter().map(|r| r.id.as_str()).collect();
    let mut seen = HashSet::new();
    outcomes.retain(|o| ids.contains(o.registration_id.as_str()) && seen.insert(o.registration_id.clone()));

    let missing = PushError::Transient("sender reported no outcome".to_string());
    for registration in registrations {
        if !seen.contains(&registration.id) {
            outcomes.push(DeliveryOutcome::failed(&registration.id, &missing));
        }
    }
    outcomes
}

fn log_credential_failure(sender: &str, outcomes: &[DeliveryOutcome]) {
    if let Some(outcome) = outcomes
        .iter()
        .find(|o| o.error_kind == Some(ErrorKind::Credential))
    {
        tracing::error!(
            sender = sender,
            reason = outcome.error.as_deref().unwrap_or_default(),
            "Provider credential failure, dispatch failed for this call"
        );
    }
}
