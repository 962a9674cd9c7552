use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chrono::Utc;
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tokio::time::Instant;

use super::PushError;

const MESSAGING_SCOPE: &str = "https://www.googleapis.com/auth/firebase.messaging";
const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
const ASSERTION_LIFETIME_SECS: i64 = 3600;

/// Refresh this long before the provider-reported expiry, capped at half
/// the token lifetime.
const REFRESH_SKEW: Duration = Duration::from_secs(60);

/// Lifetime assumed when the token response omits `expires_in`.
const DEFAULT_EXPIRES_IN: u64 = 3600;

/// Service-account identity used to sign bearer-credential assertions.
pub struct ServiceAccount {
    client_email: String,
    token_uri: String,
    key: EncodingKey,
}

impl std::fmt::Debug for ServiceAccount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceAccount")
            .field("client_email", &self.client_email)
            .field("token_uri", &self.token_uri)
            .finish_non_exhaustive()
    }
}

#[derive(Serialize)]
struct AssertionClaims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: i64,
    exp: i64,
}

impl ServiceAccount {
    /// Parses the PEM private key up front so a bad key fails at startup.
    pub fn new(
        client_email: &str,
        private_key_pem: &str,
        token_uri: &str,
    ) -> Result<Self, jsonwebtoken::errors::Error> {
        let key = EncodingKey::from_rsa_pem(private_key_pem.as_bytes())?;
        Ok(Self {
            client_email: client_email.to_string(),
            token_uri: token_uri.to_string(),
            key,
        })
    }

    pub fn client_email(&self) -> &str {
        &self.client_email
    }

    fn sign_assertion(&self) -> Result<String, PushError> {
        let now = Utc::now().timestamp();
        let claims = AssertionClaims {
            iss: &self.client_email,
            scope: MESSAGING_SCOPE,
            aud: &self.token_uri,
            iat: now,
            exp: now + ASSERTION_LIFETIME_SECS,
        };
        jsonwebtoken::encode(&Header::new(Algorithm::RS256), &claims, &self.key).map_err(|e| {
            PushError::Credential {
                reason: format!("failed to sign assertion: {e}"),
                network: false,
            }
        })
    }
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default = "default_expires_in")]
    expires_in: u64,
}

fn default_expires_in() -> u64 {
    DEFAULT_EXPIRES_IN
}

#[derive(Deserialize, Default)]
struct TokenErrorResponse {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    error_description: Option<String>,
}

#[derive(Clone)]
struct CachedToken {
    access_token: String,
    refresh_at: Instant,
}

impl CachedToken {
    fn new(access_token: String, expires_in: Duration) -> Self {
        let skew = REFRESH_SKEW.min(expires_in / 2);
        Self {
            access_token,
            refresh_at: Instant::now() + (expires_in - skew),
        }
    }

    fn is_fresh(&self) -> bool {
        Instant::now() < self.refresh_at
    }
}

/// Process-wide bearer credential with expiry.
///
/// The mutex is held across the assertion exchange: callers arriving during a
/// refresh wait for it and then read the fresh token instead of starting their
/// own exchange.
pub struct CredentialCache {
    account: ServiceAccount,
    http: reqwest::Client,
    cached: Mutex<Option<CachedToken>>,
    exchanges: AtomicU64,
}

impl CredentialCache {
    pub fn new(account: ServiceAccount, http: reqwest::Client) -> Self {
        Self {
            account,
            http,
            cached: Mutex::new(None),
            exchanges: AtomicU64::new(0),
        }
    }

    pub async fn access_token(&self) -> Result<String, PushError> {
        let mut cached = self.cached.lock().await;
        if let Some(token) = cached.as_ref().filter(|t| t.is_fresh()) {
            return Ok(token.access_token.clone());
        }

        let fresh = self.exchange().await?;
        let access_token = fresh.access_token.clone();
        *cached = Some(fresh);
        Ok(access_token)
    }

    /// Drop the cached credential if it is still the one the provider rejected.
    pub async fn invalidate(&self, rejected: &str) {
        let mut cached = self.cached.lock().await;
        if cached
            .as_ref()
            .is_some_and(|t| t.access_token == rejected)
        {
            tracing::warn!(
                client_email = %self.account.client_email,
                "Provider rejected bearer credential, dropping cache"
            );
            *cached = None;
        }
    }

    /// Number of assertion exchanges performed since startup.
    pub fn exchange_count(&self) -> u64 {
        self.exchanges.load(Ordering::Relaxed)
    }

    async fn exchange(&self) -> Result<CachedToken, PushError> {
        let assertion = self.account.sign_assertion()?;
        self.exchanges.fetch_add(1, Ordering::Relaxed);

        let resp = self
            .http
            .post(&self.account.token_uri)
            .form(&[("grant_type", JWT_BEARER_GRANT), ("assertion", assertion.as_str())])
            .send()
            .await
            .map_err(|e| {
                let reason = if e.is_timeout() {
                    "token endpoint timed out".to_string()
                } else {
                    format!("token endpoint unreachable: {e}")
                };
                tracing::error!(
                    client_email = %self.account.client_email,
                    reason = %reason,
                    "Bearer credential exchange failed"
                );
                PushError::Credential {
                    reason,
                    network: true,
                }
            })?;

        let status = resp.status();
        if !status.is_success() {
            let detail: TokenErrorResponse = resp.json().await.unwrap_or_default();
            let reason = format!(
                "token endpoint returned HTTP {status}: {} {}",
                detail.error.unwrap_or_default(),
                detail.error_description.unwrap_or_default()
            )
            .trim_end()
            .to_string();
            tracing::error!(
                client_email = %self.account.client_email,
                reason = %reason,
                "Bearer credential exchange rejected"
            );
            return Err(PushError::Credential {
                reason,
                network: false,
            });
        }

        let token: TokenResponse = resp.json().await.map_err(|e| PushError::Credential {
            reason: format!("malformed token response: {e}"),
            network: false,
        })?;

        tracing::info!(
            client_email = %self.account.client_email,
            expires_in = token.expires_in,
            "Obtained provider bearer credential"
        );

        Ok(CachedToken::new(
            token.access_token,
            Duration::from_secs(token.expires_in),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn token_inside_skew_window_is_stale() {
        let token = CachedToken::new("a".into(), Duration::from_secs(3600));
        assert!(token.is_fresh());

        tokio::time::advance(Duration::from_secs(3530)).await;
        assert!(token.is_fresh());
        tokio::time::advance(Duration::from_secs(20)).await;
        assert!(!token.is_fresh());
    }

    #[tokio::test(start_paused = true)]
    async fn short_lived_token_is_still_cached() {
        let token = CachedToken::new("b".into(), Duration::from_secs(40));
        assert!(token.is_fresh());

        tokio::time::advance(Duration::from_secs(19)).await;
        assert!(token.is_fresh());
        tokio::time::advance(Duration::from_secs(2)).await;
        assert!(!token.is_fresh());
    }

    #[test]
    fn zero_lifetime_token_is_never_fresh() {
        let token = CachedToken::new("c".into(), Duration::ZERO);
        assert!(!token.is_fresh());
    }

    #[test]
    fn missing_expires_in_uses_provider_default() {
        let token: TokenResponse =
            serde_json::from_str(r#"{"access_token":"ya29.x","token_type":"Bearer"}"#).unwrap();
        assert_eq!(token.expires_in, DEFAULT_EXPIRES_IN);

        let token: TokenResponse =
            serde_json::from_str(r#"{"access_token":"ya29.x","expires_in":120}"#).unwrap();
        assert_eq!(token.expires_in, 120);
    }

    #[test]
    fn non_pem_key_is_rejected() {
        assert!(ServiceAccount::new("svc@example.com", "garbage", "http://localhost/token").is_err());
    }
}
