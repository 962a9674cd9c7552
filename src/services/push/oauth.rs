use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use serde::Deserialize;
use serde_json::{Value, json};

use super::{
    CredentialCache, DeliveryOutcome, ErrorKind, NotificationPayload, PushError, PushSender,
    token_fingerprint,
};
use crate::models::entities::DeviceRegistration;

/// Message target on the per-message API: exactly one of token or topic.
enum Target<'a> {
    Token(&'a str),
    Topic(&'a str),
}

/// OAuth per-message sender. One HTTP call per token (or per topic).
pub struct OAuthSender {
    http: reqwest::Client,
    send_url: String,
    credentials: CredentialCache,
    concurrency: usize,
}

#[derive(Debug, Deserialize, Default)]
struct ErrorEnvelope {
    #[serde(default)]
    error: ApiError,
}

#[derive(Debug, Deserialize, Default)]
pub struct ApiError {
    #[serde(default)]
    pub code: Option<u16>,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub details: Vec<ErrorDetail>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ErrorDetail {
    #[serde(default)]
    pub error_code: Option<String>,
}

#[derive(Deserialize)]
struct SendResponse {
    name: String,
}

/// Map a per-message API error onto the shared taxonomy.
pub fn classify(http_status: u16, error: &ApiError) -> ErrorKind {
    let error_code = error
        .details
        .iter()
        .find_map(|d| d.error_code.as_deref())
        .unwrap_or("");

    if http_status == 401 || error.status == "UNAUTHENTICATED" {
        return ErrorKind::Credential;
    }

    match error_code {
        "UNREGISTERED" | "SENDER_ID_MISMATCH" => return ErrorKind::PermanentToken,
        "INVALID_ARGUMENT" if error.message.contains("registration token") => {
            return ErrorKind::PermanentToken;
        }
        _ => {}
    }

    match error.status.as_str() {
        "NOT_FOUND" => ErrorKind::PermanentToken,
        "INVALID_ARGUMENT" if error.message.contains("registration token") => {
            ErrorKind::PermanentToken
        }
        "PERMISSION_DENIED" => ErrorKind::Credential,
        _ => ErrorKind::Transient,
    }
}

impl OAuthSender {
    pub fn new(
        http: reqwest::Client,
        api_base: &str,
        project_id: &str,
        credentials: CredentialCache,
        concurrency: usize,
    ) -> Self {
        Self {
            http,
            send_url: format!(
                "{}/v1/projects/{}/messages:send",
                api_base.trim_end_matches('/'),
                project_id
            ),
            credentials,
            concurrency: concurrency.max(1),
        }
    }

    pub fn credentials(&self) -> &CredentialCache {
        &self.credentials
    }

    /// Broadcast to every registration subscribed to `topic`.
    /// Returns the provider message name.
    pub async fn send_topic(
        &self,
        topic: &str,
        payload: &NotificationPayload,
    ) -> Result<String, PushError> {
        let access_token = self.credentials.access_token().await?;
        self.send_message(&access_token, Target::Topic(topic), payload)
            .await
    }

    async fn send_message(
        &self,
        access_token: &str,
        target: Target<'_>,
        payload: &NotificationPayload,
    ) -> Result<String, PushError> {
        let mut message = json!({
            "notification": payload.notification_section(),
            "data": payload.data_section(),
            "webpush": payload.webpush_section(),
        });
        match target {
            Target::Token(token) => message["token"] = Value::from(token),
            Target::Topic(topic) => message["topic"] = Value::from(topic),
        }

        let resp = self
            .http
            .post(&self.send_url)
            .bearer_auth(access_token)
            .json(&json!({ "message": message }))
            .send()
            .await?;

        let status = resp.status();
        if status.is_success() {
            let sent: SendResponse = resp
                .json()
                .await
                .map_err(|e| PushError::Transient(format!("malformed send response: {e}")))?;
            return Ok(sent.name);
        }

        let envelope: ErrorEnvelope = resp.json().await.unwrap_or_default();
        let description = if envelope.error.message.is_empty() {
            format!("HTTP {status}")
        } else {
            format!("HTTP {status}: {}", envelope.error.message)
        };

        match classify(status.as_u16(), &envelope.error) {
            ErrorKind::PermanentToken => Err(PushError::PermanentToken(description)),
            ErrorKind::Credential => {
                self.credentials.invalidate(access_token).await;
                Err(PushError::Credential {
                    reason: description,
                    network: false,
                })
            }
            ErrorKind::Transient => Err(PushError::Transient(description)),
        }
    }
}

#[async_trait]
impl PushSender for OAuthSender {
    fn name(&self) -> &'static str {
        "oauth"
    }

    async fn send(
        &self,
        registrations: &[DeviceRegistration],
        payload: &NotificationPayload,
    ) -> Vec<DeliveryOutcome> {
        // One bearer per dispatch; a failed exchange fails every registration
        let access_token = match self.credentials.access_token().await {
            Ok(token) => token,
            Err(err) => {
                tracing::warn!(
                    registrations = registrations.len(),
                    error = %err,
                    "No bearer credential, failing dispatch"
                );
                return registrations
                    .iter()
                    .map(|registration| DeliveryOutcome::failed(&registration.id, &err))
                    .collect();
            }
        };
        let access_token = access_token.as_str();

        let sends: Vec<_> = registrations
            .iter()
            .map(|registration| async move {
                let target = Target::Token(&registration.token);
                match self.send_message(access_token, target, payload).await {
                    Ok(name) => DeliveryOutcome::sent(&registration.id, Some(name)),
                    Err(err) => {
                        tracing::debug!(
                            registration_id = %registration.id,
                            token = %token_fingerprint(&registration.token),
                            error = %err,
                            "Per-message send failed"
                        );
                        DeliveryOutcome::failed(&registration.id, &err)
                    }
                }
            })
            .collect();

        stream::iter(sends)
            .buffer_unordered(self.concurrency)
            .collect()
            .await
    }
}
