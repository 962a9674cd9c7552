mod common;

use common::{TestOptions, spawn_app, spawn_app_with};

#[tokio::test]
async fn test_root_endpoint() {
    let app = spawn_app().await;

    let resp = app.client.get(app.url("/")).send().await.unwrap();
    assert_eq!(resp.status(), 200);

    let data: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(data["service"], "Club Notification Service");
    assert_eq!(data["version"], "1.0.0");
    assert_eq!(data["docs"], "/explore/");
}

#[tokio::test]
async fn test_health_endpoint() {
    let app = spawn_app().await;

    let resp = app.client.get(app.url("/health")).send().await.unwrap();
    assert_eq!(resp.status(), 200);

    let data: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(data["status"], "healthy");
    assert!(data["timestamp"].is_string());
    assert_eq!(data["services"]["database"]["status"], "up");
    assert!(data["services"]["database"]["latency_ms"].is_number());
    assert_eq!(data["services"]["legacy_sender"]["status"], "up");
    assert_eq!(data["services"]["oauth_sender"]["status"], "up");
}

#[tokio::test]
async fn test_health_reports_disabled_providers() {
    let app = spawn_app_with(TestOptions {
        legacy: false,
        oauth: false,
        ..Default::default()
    })
    .await;

    let data: serde_json::Value = app
        .client
        .get(app.url("/health"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(data["status"], "healthy");
    assert_eq!(data["services"]["legacy_sender"]["status"], "disabled");
    assert_eq!(data["services"]["oauth_sender"]["status"], "disabled");
}

#[tokio::test]
async fn test_status_endpoint() {
    let app = spawn_app().await;
    let user = common::unique_user();
    app.register(&user, "device-a").await;
    app.send_to(&user, "general").await;

    let resp = app.client.get(app.url("/status")).send().await.unwrap();
    assert_eq!(resp.status(), 200);

    let data: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(data["service"], "Club Notification Service");
    assert_eq!(data["environment"], "development");
    assert!(data["uptime_seconds"].is_number());
    assert!(data["timestamp"].is_string());
    assert_eq!(data["database"]["connected"], true);

    assert_eq!(data["statistics"]["active_registrations"], 1);
    assert_eq!(data["statistics"]["total_notifications"], 1);
    assert_eq!(data["statistics"]["realtime_connections"], 0);
}

#[tokio::test]
async fn test_openapi_document_served() {
    let app = spawn_app().await;

    let resp = app
        .client
        .get(app.url("/api-docs/openapi.json"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    let doc: serde_json::Value = resp.json().await.unwrap();
    assert!(doc["paths"]["/notifications/send"].is_object());
    assert!(doc["paths"]["/notifications/send-topic"].is_object());
    assert!(doc["components"]["securitySchemes"]["AdminKey"].is_object());
}
