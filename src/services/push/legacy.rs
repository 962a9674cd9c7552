use std::collections::BTreeMap;

use async_trait::async_trait;
use futures::future::join_all;
use reqwest::header::AUTHORIZATION;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{DeliveryOutcome, ErrorKind, NotificationPayload, PushError, PushSender};
use crate::models::entities::DeviceRegistration;

/// Error codes meaning the token is gone for good.
const PERMANENT_CODES: &[&str] = &[
    "messaging/registration-token-not-registered",
    "messaging/invalid-registration-token",
    "NotRegistered",
    "InvalidRegistration",
];

/// Legacy multicast sender: one call per batch of tokens, with a positional
/// per-token result array in the response.
pub struct LegacyMulticastSender {
    http: reqwest::Client,
    url: String,
    server_key: String,
    batch_limit: usize,
}

#[derive(Serialize)]
struct MulticastRequest<'a> {
    tokens: Vec<&'a str>,
    notification: Value,
    data: BTreeMap<String, String>,
    webpush: Value,
}

#[derive(Deserialize)]
struct MulticastResponse {
    #[serde(default)]
    responses: Vec<TokenResponse>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TokenResponse {
    success: bool,
    #[serde(default)]
    message_id: Option<String>,
    #[serde(default)]
    error: Option<LegacyError>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum LegacyError {
    Code(String),
    Detailed {
        code: String,
        #[serde(default)]
        message: Option<String>,
    },
}

impl LegacyError {
    fn code(&self) -> &str {
        match self {
            Self::Code(code) | Self::Detailed { code, .. } => code,
        }
    }

    fn into_push_error(self) -> PushError {
        let description = match &self {
            Self::Code(code) => code.clone(),
            Self::Detailed { code, message } => match message {
                Some(m) => format!("{code}: {m}"),
                None => code.clone(),
            },
        };
        match classify(self.code()) {
            ErrorKind::PermanentToken => PushError::PermanentToken(description),
            _ => PushError::Transient(description),
        }
    }
}

/// Map a legacy per-token error code onto the shared taxonomy.
pub fn classify(code: &str) -> ErrorKind {
    if PERMANENT_CODES.contains(&code) {
        ErrorKind::PermanentToken
    } else {
        ErrorKind::Transient
    }
}

impl LegacyMulticastSender {
    pub fn new(http: reqwest::Client, url: &str, server_key: &str, batch_limit: usize) -> Self {
        Self {
            http,
            url: url.to_string(),
            server_key: server_key.to_string(),
            batch_limit: batch_limit.max(1),
        }
    }

    async fn send_batch(
        &self,
        batch: &[DeviceRegistration],
        payload: &NotificationPayload,
    ) -> Vec<DeliveryOutcome> {
        let responses = match self.post_batch(batch, payload).await {
            Ok(responses) => responses,
            Err(err) => {
                tracing::warn!(
                    batch_size = batch.len(),
                    error = %err,
                    "Legacy multicast call failed"
                );
                return batch
                    .iter()
                    .map(|r| DeliveryOutcome::failed(&r.id, &err))
                    .collect();
            }
        };

        let mut responses = responses.into_iter();
        batch
            .iter()
            .map(|registration| match responses.next() {
                Some(TokenResponse {
                    success: true,
                    message_id,
                    ..
                }) => DeliveryOutcome::sent(&registration.id, message_id),
                Some(TokenResponse {
                    error: Some(error), ..
                }) => DeliveryOutcome::failed(&registration.id, &error.into_push_error()),
                Some(_) => DeliveryOutcome::failed(
                    &registration.id,
                    &PushError::Transient("provider reported failure without a reason".into()),
                ),
                None => DeliveryOutcome::failed(
                    &registration.id,
                    &PushError::Transient("missing entry in multicast response".into()),
                ),
            })
            .collect()
    }

    async fn post_batch(
        &self,
        batch: &[DeviceRegistration],
        payload: &NotificationPayload,
    ) -> Result<Vec<TokenResponse>, PushError> {
        let body = MulticastRequest {
            tokens: batch.iter().map(|r| r.token.as_str()).collect(),
            notification: payload.notification_section(),
            data: payload.data_section(),
            webpush: payload.webpush_section(),
        };

        let resp = self
            .http
            .post(&self.url)
            .header(AUTHORIZATION, format!("key={}", self.server_key))
            .json(&body)
            .send()
            .await?;

        let status = resp.status();
        if status.as_u16() == 401 || status.as_u16() == 403 {
            return Err(PushError::Credential {
                reason: format!("legacy server key rejected (HTTP {status})"),
                network: false,
            });
        }
        if !status.is_success() {
            return Err(PushError::Transient(format!("HTTP {status}")));
        }

        let parsed: MulticastResponse = resp
            .json()
            .await
            .map_err(|e| PushError::Transient(format!("malformed multicast response: {e}")))?;
        Ok(parsed.responses)
    }
}

#[async_trait]
impl PushSender for LegacyMulticastSender {
    fn name(&self) -> &'static str {
        "legacy"
    }

    async fn send(
        &self,
        registrations: &[DeviceRegistration],
        payload: &NotificationPayload,
    ) -> Vec<DeliveryOutcome> {
        let batches = registrations
            .chunks(self.batch_limit)
            .map(|batch| self.send_batch(batch, payload));

        join_all(batches).await.into_iter().flatten().collect()
    }
}
