//! Push provider senders.
//!
//! Two provider generations share one pool of device registrations: the
//! legacy multicast API ([`legacy`]) and the OAuth per-message API
//! ([`oauth`]). Both speak [`NotificationPayload`] and report one
//! [`DeliveryOutcome`] per registration; neither ever returns an error for a
//! partial failure.

pub mod credentials;
pub mod legacy;
pub mod oauth;
pub mod payload;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use utoipa::ToSchema;

use crate::config::Settings;
use crate::models::entities::DeviceRegistration;

pub use credentials::{CredentialCache, ServiceAccount};
pub use legacy::LegacyMulticastSender;
pub use oauth::OAuthSender;
pub use payload::{Channel, NotificationAction, NotificationPayload, dedup_tag};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// The registration will never succeed again; deactivate it.
    PermanentToken,
    /// Network, 5xx, timeout or rate limit. Registration stays active.
    Transient,
    /// The sender could not authenticate with the provider.
    Credential,
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum PushError {
    #[error("registration rejected by provider: {0}")]
    PermanentToken(String),
    #[error("transient provider failure: {0}")]
    Transient(String),
    #[error("provider credential failure: {reason}")]
    Credential { reason: String, network: bool },
}

impl PushError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::PermanentToken(_) => ErrorKind::PermanentToken,
            Self::Transient(_) => ErrorKind::Transient,
            Self::Credential { .. } => ErrorKind::Credential,
        }
    }
}

impl From<reqwest::Error> for PushError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Transient("request timed out".to_string())
        } else if err.is_connect() {
            Self::Transient("connection failed".to_string())
        } else {
            Self::Transient(err.to_string())
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    Sent,
    Failed,
}

/// Result of one send attempt to one registration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryOutcome {
    pub registration_id: String,
    pub status: DeliveryStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider_message_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl DeliveryOutcome {
    pub fn sent(registration_id: &str, provider_message_id: Option<String>) -> Self {
        Self {
            registration_id: registration_id.to_string(),
            status: DeliveryStatus::Sent,
            provider_message_id,
            error_kind: None,
            error: None,
        }
    }

    pub fn failed(registration_id: &str, err: &PushError) -> Self {
        Self {
            registration_id: registration_id.to_string(),
            status: DeliveryStatus::Failed,
            provider_message_id: None,
            error_kind: Some(err.kind()),
            error: Some(err.to_string()),
        }
    }

    pub fn is_sent(&self) -> bool {
        self.status == DeliveryStatus::Sent
    }

    pub fn is_permanent_failure(&self) -> bool {
        self.error_kind == Some(ErrorKind::PermanentToken)
    }
}

#[async_trait]
pub trait PushSender: Send + Sync {
    fn name(&self) -> &'static str;

    /// Send `payload` to every registration. Returns one outcome per
    /// registration, in any order.
    async fn send(
        &self,
        registrations: &[DeviceRegistration],
        payload: &NotificationPayload,
    ) -> Vec<DeliveryOutcome>;
}

#[derive(Debug, thiserror::Error)]
pub enum ProviderInitError {
    #[error("incomplete provider configuration: {0}")]
    Incomplete(&'static str),
    #[error("invalid service account private key: {0}")]
    InvalidPrivateKey(#[from] jsonwebtoken::errors::Error),
    #[error("failed to build provider HTTP client: {0}")]
    HttpClient(#[from] reqwest::Error),
}

/// The provider senders, built once at startup from validated settings.
pub struct ProviderClient {
    legacy: Option<Arc<LegacyMulticastSender>>,
    oauth: Option<Arc<OAuthSender>>,
}

impl ProviderClient {
    pub fn from_settings(settings: &Settings) -> Result<Self, ProviderInitError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.push_timeout))
            .build()?;

        let legacy = match (&settings.legacy_push_url, &settings.legacy_server_key) {
            (Some(url), Some(key)) => {
                tracing::info!(url = %url, batch_limit = settings.legacy_batch_limit, "Legacy multicast sender enabled");
                Some(Arc::new(LegacyMulticastSender::new(
                    http.clone(),
                    url,
                    key,
                    settings.legacy_batch_limit,
                )))
            }
            (None, None) => None,
            _ => {
                return Err(ProviderInitError::Incomplete(
                    "LEGACY_PUSH_URL and LEGACY_SERVER_KEY must be set together",
                ));
            }
        };

        let oauth = match (
            &settings.fcm_project_id,
            &settings.fcm_client_email,
            &settings.fcm_private_key,
        ) {
            (Some(project_id), Some(client_email), Some(private_key)) => {
                let account =
                    ServiceAccount::new(client_email, private_key, &settings.fcm_token_uri)?;
                tracing::info!(
                    project_id = %project_id,
                    client_email = %client_email,
                    "OAuth per-message sender enabled"
                );
                Some(Arc::new(OAuthSender::new(
                    http.clone(),
                    &settings.fcm_api_base,
                    project_id,
                    CredentialCache::new(account, http),
                    settings.fcm_concurrency,
                )))
            }
            (None, None, None) => None,
            _ => {
                return Err(ProviderInitError::Incomplete(
                    "FCM_PROJECT_ID, FCM_CLIENT_EMAIL and FCM_PRIVATE_KEY must be set together",
                ));
            }
        };

        if legacy.is_none() && oauth.is_none() {
            tracing::warn!("No push provider configured; push delivery disabled");
        }

        Ok(Self { legacy, oauth })
    }

    pub fn new(
        legacy: Option<Arc<LegacyMulticastSender>>,
        oauth: Option<Arc<OAuthSender>>,
    ) -> Self {
        Self { legacy, oauth }
    }

    /// Sender for ordinary user-directed sends: legacy if configured, else OAuth.
    pub fn primary(&self) -> Option<Arc<dyn PushSender>> {
        match (&self.legacy, &self.oauth) {
            (Some(legacy), _) => Some(legacy.clone() as Arc<dyn PushSender>),
            (None, Some(oauth)) => Some(oauth.clone() as Arc<dyn PushSender>),
            (None, None) => None,
        }
    }

    pub fn legacy(&self) -> Option<&Arc<LegacyMulticastSender>> {
        self.legacy.as_ref()
    }

    pub fn oauth(&self) -> Option<&Arc<OAuthSender>> {
        self.oauth.as_ref()
    }
}

/// Short stable fingerprint of a device token, safe to log.
pub fn token_fingerprint(token: &str) -> String {
    let digest = hex::encode(Sha256::digest(token.as_bytes()));
    digest[..12].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fingerprint_is_stable_and_short() {
        let a = token_fingerprint("device-token-abc");
        assert_eq!(a.len(), 12);
        assert_eq!(a, token_fingerprint("device-token-abc"));
        assert_ne!(a, token_fingerprint("device-token-abd"));
    }

    #[test]
    fn failed_outcome_carries_kind() {
        let outcome = DeliveryOutcome::failed("reg-1", &PushError::PermanentToken("NotRegistered".into()));
        assert!(outcome.is_permanent_failure());
        assert!(!outcome.is_sent());

        let transient = DeliveryOutcome::failed("reg-2", &PushError::Transient("timeout".into()));
        assert!(!transient.is_permanent_failure());
        assert_eq!(transient.error_kind, Some(ErrorKind::Transient));
    }

    #[test]
    fn partial_oauth_settings_are_rejected() {
        let settings = Settings {
            fcm_project_id: Some("club".into()),
            ..Settings::default()
        };
        assert!(matches!(
            ProviderClient::from_settings(&settings),
            Err(ProviderInitError::Incomplete(_))
        ));
    }

    #[test]
    fn malformed_private_key_is_a_startup_error() {
        let settings = Settings {
            fcm_project_id: Some("club".into()),
            fcm_client_email: Some("svc@club.iam.gserviceaccount.com".into()),
            fcm_private_key: Some("not a pem".into()),
            ..Settings::default()
        };
        assert!(matches!(
            ProviderClient::from_settings(&settings),
            Err(ProviderInitError::InvalidPrivateKey(_))
        ));
    }

    #[test]
    fn no_providers_means_no_primary() {
        let client = ProviderClient::from_settings(&Settings::default()).unwrap();
        assert!(client.primary().is_none());
        assert!(client.oauth().is_none());
    }
}
