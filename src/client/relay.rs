use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use super::hybrid::ClientPayload;

#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("relay request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("server rejected relay request with HTTP {status}: {message}")]
    Rejected { status: u16, message: String },
}

/// Asks the server to push a payload back to this user's devices.
#[async_trait]
pub trait ProviderRelay: Send + Sync {
    /// Returns how many registrations the provider accepted.
    async fn relay(&self, payload: &ClientPayload) -> Result<usize, RelayError>;
}

#[derive(Deserialize)]
struct SendCounts {
    sent: usize,
}

#[derive(Deserialize)]
struct RegisterBody {
    #[serde(rename = "registrationId")]
    registration_id: String,
}

async fn rejected(resp: reqwest::Response) -> RelayError {
    let status = resp.status().as_u16();
    let message = resp
        .json::<serde_json::Value>()
        .await
        .ok()
        .and_then(|v| v["message"].as_str().map(str::to_string))
        .unwrap_or_default();
    RelayError::Rejected { status, message }
}

fn client(timeout: Duration) -> Result<reqwest::Client, RelayError> {
    Ok(reqwest::Client::builder().timeout(timeout).build()?)
}

/// Relays through `POST /notifications/send` with the user's own session.
pub struct ServerRelay {
    http: reqwest::Client,
    base_url: String,
    session_token: String,
    owner_id: String,
}

impl ServerRelay {
    pub fn new(
        base_url: &str,
        session_token: &str,
        owner_id: &str,
        timeout: Duration,
    ) -> Result<Self, RelayError> {
        Ok(Self {
            http: client(timeout)?,
            base_url: base_url.trim_end_matches('/').to_string(),
            session_token: session_token.to_string(),
            owner_id: owner_id.to_string(),
        })
    }
}

#[async_trait]
impl ProviderRelay for ServerRelay {
    async fn relay(&self, payload: &ClientPayload) -> Result<usize, RelayError> {
        let mut data = payload.data.clone();
        data.insert("tag".to_string(), payload.tag.clone());

        let resp = self
            .http
            .post(format!("{}/notifications/send", self.base_url))
            .bearer_auth(&self.session_token)
            .json(&json!({
                "ownerId": self.owner_id,
                "title": payload.title,
                "body": payload.body,
                "category": payload.category,
                "actionUrl": payload.action_url,
                "data": data,
            }))
            .send()
            .await?;

        if !resp.status().is_success() {
            return Err(rejected(resp).await);
        }

        let counts: SendCounts = resp.json().await?;
        Ok(counts.sent)
    }
}

/// Registers and unregisters this device's provider token with the server.
pub struct Registrar {
    http: reqwest::Client,
    base_url: String,
    session_token: String,
}

impl Registrar {
    pub fn new(base_url: &str, session_token: &str, timeout: Duration) -> Result<Self, RelayError> {
        Ok(Self {
            http: client(timeout)?,
            base_url: base_url.trim_end_matches('/').to_string(),
            session_token: session_token.to_string(),
        })
    }

    /// Returns the server's registration id.
    pub async fn register(
        &self,
        token: &str,
        metadata: serde_json::Value,
    ) -> Result<String, RelayError> {
        let resp = self
            .http
            .post(format!("{}/notifications/register", self.base_url))
            .bearer_auth(&self.session_token)
            .json(&json!({ "token": token, "metadata": metadata }))
            .send()
            .await?;

        if !resp.status().is_success() {
            return Err(rejected(resp).await);
        }

        let body: RegisterBody = resp.json().await?;
        Ok(body.registration_id)
    }

    pub async fn unregister(&self, token: &str) -> Result<(), RelayError> {
        let resp = self
            .http
            .post(format!("{}/notifications/unregister", self.base_url))
            .bearer_auth(&self.session_token)
            .json(&json!({ "token": token }))
            .send()
            .await?;

        if !resp.status().is_success() {
            return Err(rejected(resp).await);
        }
        Ok(())
    }
}
