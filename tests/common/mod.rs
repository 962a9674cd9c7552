#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::{Form, Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::post;
use axum::{Json, Router};
use club_notify::config::Settings;
use club_notify::{AppState, build_router};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use reqwest::Client;
use serde_json::{Value, json};
use tempfile::TempDir;

pub const ADMIN_KEY: &str = "test-admin-key";
pub const LEGACY_SERVER_KEY: &str = "test-server-key";
pub const PROJECT_ID: &str = "club-test";
pub const SERVICE_ACCOUNT_KEY: &str = include_str!("../fixtures/service_account_key.pem");

// ── Fake push provider ──
//
// Token prefixes drive the response:
//   revoked-*  provider reports the token unregistered
//   flaky-*    provider reports a transient failure
//   slow-*     response delayed by 1.5s
//   hang-*     response delayed past the client timeout

#[derive(Default)]
pub struct FakeProvider {
    pub legacy_calls: AtomicUsize,
    pub legacy_bodies: Mutex<Vec<Value>>,
    pub exchanges: AtomicUsize,
    pub expires_in: AtomicU64,
    pub oauth_sends: AtomicUsize,
    pub oauth_bodies: Mutex<Vec<Value>>,
    pub reject_next_bearer: AtomicBool,
    pub reject_exchange: AtomicBool,
    issued: AtomicUsize,
}

impl FakeProvider {
    pub fn legacy_calls(&self) -> usize {
        self.legacy_calls.load(Ordering::SeqCst)
    }

    pub fn exchanges(&self) -> usize {
        self.exchanges.load(Ordering::SeqCst)
    }

    pub fn oauth_sends(&self) -> usize {
        self.oauth_sends.load(Ordering::SeqCst)
    }

    pub fn last_legacy_body(&self) -> Option<Value> {
        self.legacy_bodies.lock().unwrap().last().cloned()
    }

    pub fn last_oauth_body(&self) -> Option<Value> {
        self.oauth_bodies.lock().unwrap().last().cloned()
    }
}

async fn token_delay(token: &str) {
    if token.starts_with("slow-") {
        tokio::time::sleep(Duration::from_millis(1500)).await;
    } else if token.starts_with("hang-") {
        tokio::time::sleep(Duration::from_secs(5)).await;
    }
}

async fn legacy_send(
    State(provider): State<Arc<FakeProvider>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    let authorized = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v == format!("key={LEGACY_SERVER_KEY}"));
    if !authorized {
        return (StatusCode::UNAUTHORIZED, Json(json!({"error": "bad key"})));
    }

    provider.legacy_calls.fetch_add(1, Ordering::SeqCst);
    provider.legacy_bodies.lock().unwrap().push(body.clone());

    let tokens: Vec<String> = body["tokens"]
        .as_array()
        .map(|a| a.iter().filter_map(|t| t.as_str().map(str::to_string)).collect())
        .unwrap_or_default();

    for token in &tokens {
        token_delay(token).await;
    }

    let responses: Vec<Value> = tokens
        .iter()
        .enumerate()
        .map(|(i, token)| {
            if token.starts_with("revoked-") {
                json!({"success": false, "error": {"code": "messaging/registration-token-not-registered", "message": "Requested entity was not found."}})
            } else if token.starts_with("flaky-") {
                json!({"success": false, "error": "Unavailable"})
            } else {
                json!({"success": true, "messageId": format!("legacy-{i}")})
            }
        })
        .collect();

    (StatusCode::OK, Json(json!({ "responses": responses })))
}

async fn token_exchange(
    State(provider): State<Arc<FakeProvider>>,
    Form(form): Form<std::collections::HashMap<String, String>>,
) -> (StatusCode, Json<Value>) {
    provider.exchanges.fetch_add(1, Ordering::SeqCst);
    tokio::time::sleep(Duration::from_millis(100)).await;

    let grant_ok = form.get("grant_type").map(String::as_str)
        == Some("urn:ietf:params:oauth:grant-type:jwt-bearer");
    let assertion_ok = form
        .get("assertion")
        .is_some_and(|a| a.split('.').count() == 3);
    if provider.reject_exchange.load(Ordering::SeqCst) {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({"error": "invalid_grant", "error_description": "Invalid JWT Signature."})),
        );
    }
    if !grant_ok || !assertion_ok {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({"error": "invalid_grant", "error_description": "bad assertion"})),
        );
    }

    let n = provider.issued.fetch_add(1, Ordering::SeqCst);
    (
        StatusCode::OK,
        Json(json!({
            "access_token": format!("access-{n}"),
            "expires_in": provider.expires_in.load(Ordering::SeqCst),
            "token_type": "Bearer",
        })),
    )
}

async fn oauth_send(
    State(provider): State<Arc<FakeProvider>>,
    Path((project, action)): Path<(String, String)>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    if project != PROJECT_ID || action != "messages:send" {
        return (StatusCode::NOT_FOUND, Json(json!({"error": {"code": 404, "status": "NOT_FOUND", "message": "no such project"}})));
    }

    let bearer_ok = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.starts_with("Bearer access-"));
    if !bearer_ok || provider.reject_next_bearer.swap(false, Ordering::SeqCst) {
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({"error": {"code": 401, "status": "UNAUTHENTICATED", "message": "Request had invalid authentication credentials."}})),
        );
    }

    provider.oauth_sends.fetch_add(1, Ordering::SeqCst);
    provider.oauth_bodies.lock().unwrap().push(body.clone());

    let message = &body["message"];
    if let Some(token) = message["token"].as_str() {
        token_delay(token).await;
        if token.starts_with("revoked-") {
            return (
                StatusCode::NOT_FOUND,
                Json(json!({"error": {"code": 404, "status": "NOT_FOUND", "message": "Requested entity was not found.",
                    "details": [{"@type": "type.googleapis.com/google.firebase.fcm.v1.FcmError", "errorCode": "UNREGISTERED"}]}})),
            );
        }
        if token.starts_with("flaky-") {
            return (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({"error": {"code": 503, "status": "UNAVAILABLE", "message": "The service is currently unavailable."}})),
            );
        }
    }

    let n = provider.oauth_sends.load(Ordering::SeqCst);
    (
        StatusCode::OK,
        Json(json!({ "name": format!("projects/{PROJECT_ID}/messages/{n}") })),
    )
}

async fn spawn_provider() -> (String, Arc<FakeProvider>) {
    let provider = Arc::new(FakeProvider {
        expires_in: AtomicU64::new(3600),
        ..Default::default()
    });

    let app = Router::new()
        .route("/legacy/send", post(legacy_send))
        .route("/token", post(token_exchange))
        .route("/v1/projects/{project}/{action}", post(oauth_send))
        .with_state(provider.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (format!("http://{addr}"), provider)
}

// ── Application under test ──

pub struct TestOptions {
    pub legacy: bool,
    pub oauth: bool,
    pub legacy_batch_limit: usize,
}

impl Default for TestOptions {
    fn default() -> Self {
        Self {
            legacy: true,
            oauth: true,
            legacy_batch_limit: 500,
        }
    }
}

pub struct TestApp {
    pub base: String,
    pub state: Arc<AppState>,
    pub provider: Arc<FakeProvider>,
    pub client: Client,
    _dir: TempDir,
}

pub async fn spawn_app() -> TestApp {
    spawn_app_with(TestOptions::default()).await
}

pub async fn spawn_app_with(options: TestOptions) -> TestApp {
    let (provider_base, provider) = spawn_provider().await;
    let dir = tempfile::tempdir().unwrap();

    let mut settings = Settings {
        database_path: dir.path().join("club.db").to_string_lossy().into_owned(),
        migrations_dir: Some(concat!(env!("CARGO_MANIFEST_DIR"), "/migrations/sqlite").into()),
        admin_api_key: Some(ADMIN_KEY.into()),
        push_timeout: 2,
        legacy_batch_limit: options.legacy_batch_limit,
        ..Settings::default()
    };
    if options.legacy {
        settings.legacy_push_url = Some(format!("{provider_base}/legacy/send"));
        settings.legacy_server_key = Some(LEGACY_SERVER_KEY.into());
    }
    if options.oauth {
        settings.fcm_project_id = Some(PROJECT_ID.into());
        settings.fcm_client_email = Some("notifier@club-test.iam.gserviceaccount.com".into());
        settings.fcm_private_key = Some(SERVICE_ACCOUNT_KEY.into());
        settings.fcm_token_uri = format!("{provider_base}/token");
        settings.fcm_api_base = provider_base.clone();
    }

    let state = AppState::initialize(settings).await.unwrap();
    let app = build_router(state.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    TestApp {
        base: format!("http://{addr}"),
        state,
        provider,
        client: http_client(),
        _dir: dir,
    }
}

/// Build a reusable HTTP client.
pub fn http_client() -> Client {
    Client::builder()
        .timeout(Duration::from_secs(30))
        .build()
        .expect("Failed to build HTTP client")
}

// ── Auth helpers ──

pub fn session_token(user_id: &str) -> String {
    session_token_with(user_id, &Settings::default().jwt_issuer, 3600)
}

pub fn session_token_with(user_id: &str, issuer: &str, ttl_secs: i64) -> String {
    let now = chrono::Utc::now().timestamp();
    let claims = json!({
        "sub": user_id,
        "iss": issuer,
        "iat": now,
        "exp": now + ttl_secs,
    });
    jsonwebtoken::encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(Settings::default().jwt_secret_key.as_bytes()),
    )
    .unwrap()
}

/// Return `Authorization: Bearer <token>` header value.
pub fn auth_header(user_id: &str) -> String {
    format!("Bearer {}", session_token(user_id))
}

/// Unique user ID for test isolation.
pub fn unique_user() -> String {
    format!("member_{}", uuid::Uuid::new_v4().simple())
}

// ── API helpers ──

impl TestApp {
    pub fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base)
    }

    pub async fn register(&self, user_id: &str, token: &str) -> String {
        let resp = self
            .client
            .post(self.url("/notifications/register"))
            .header("Authorization", auth_header(user_id))
            .json(&json!({"token": token, "metadata": {"platform": "web"}}))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);
        let data: Value = resp.json().await.unwrap();
        data["registrationId"].as_str().unwrap().to_string()
    }

    /// Admin send; returns the response body.
    pub async fn admin_send(&self, body: Value) -> Value {
        let resp = self
            .client
            .post(self.url("/notifications/send"))
            .header("X-Admin-Key", ADMIN_KEY)
            .json(&body)
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);
        resp.json().await.unwrap()
    }

    pub async fn send_to(&self, owner_id: &str, category: &str) -> Value {
        self.admin_send(json!({
            "ownerId": owner_id,
            "title": "Rehearsal moved",
            "body": "Now starting at 8pm",
            "category": category,
            "actionUrl": "/events/event-1",
        }))
        .await
    }

    pub async fn set_preferences(&self, user_id: &str, body: Value) -> Value {
        let resp = self
            .client
            .put(self.url("/notifications/preferences"))
            .header("Authorization", auth_header(user_id))
            .json(&body)
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);
        resp.json().await.unwrap()
    }

    pub async fn list_notifications(&self, user_id: &str) -> Value {
        let resp = self
            .client
            .get(self.url("/notifications"))
            .header("Authorization", auth_header(user_id))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);
        resp.json().await.unwrap()
    }
}
