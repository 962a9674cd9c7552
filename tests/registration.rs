mod common;

use club_notify::db::repositories::RegistrationRepository;
use common::{auth_header, spawn_app, unique_user};
use serde_json::json;

#[tokio::test]
async fn test_register_returns_registration_id() {
    let app = spawn_app().await;
    let user = unique_user();

    let id = app.register(&user, "device-token-1").await;
    assert!(!id.is_empty());

    let repo = RegistrationRepository::new(app.state.db.pool.clone());
    let active = repo.list_active(&user).await.unwrap();
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].id, id);
    assert_eq!(active[0].metadata["platform"], "web");
}

#[tokio::test]
async fn test_register_same_token_twice_is_idempotent() {
    let app = spawn_app().await;
    let user = unique_user();

    let first = app.register(&user, "device-token-1").await;
    let second = app.register(&user, "device-token-1").await;
    assert_eq!(first, second);

    let repo = RegistrationRepository::new(app.state.db.pool.clone());
    assert_eq!(repo.count_active(&user).await.unwrap(), 1);
}

#[tokio::test]
async fn test_token_moves_to_new_owner() {
    let app = spawn_app().await;
    let alice = unique_user();
    let bob = unique_user();

    let old = app.register(&alice, "shared-device").await;
    let new = app.register(&bob, "shared-device").await;
    assert_ne!(old, new);

    let repo = RegistrationRepository::new(app.state.db.pool.clone());
    assert_eq!(repo.count_active(&alice).await.unwrap(), 0);
    assert_eq!(repo.count_active(&bob).await.unwrap(), 1);

    // Alice no longer reaches the device
    let data = app.send_to(&alice, "general").await;
    assert_eq!(data["attempted"], 0);
}

#[tokio::test]
async fn test_unregister_is_idempotent() {
    let app = spawn_app().await;
    let user = unique_user();
    app.register(&user, "device-token-1").await;

    for expected in [1, 0] {
        let resp = app
            .client
            .post(app.url("/notifications/unregister"))
            .header("Authorization", auth_header(&user))
            .json(&json!({"token": "device-token-1"}))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);

        let data: serde_json::Value = resp.json().await.unwrap();
        assert_eq!(data["success"], true);
        assert_eq!(data["deactivated"], expected);
    }

    let repo = RegistrationRepository::new(app.state.db.pool.clone());
    assert_eq!(repo.count_active(&user).await.unwrap(), 0);
}

#[tokio::test]
async fn test_unregister_ignores_other_owners_tokens() {
    let app = spawn_app().await;
    let owner = unique_user();
    let other = unique_user();
    app.register(&owner, "device-token-1").await;

    let resp = app
        .client
        .post(app.url("/notifications/unregister"))
        .header("Authorization", auth_header(&other))
        .json(&json!({"token": "device-token-1"}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let data: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(data["deactivated"], 0);

    let repo = RegistrationRepository::new(app.state.db.pool.clone());
    assert_eq!(repo.count_active(&owner).await.unwrap(), 1);
}

#[tokio::test]
async fn test_register_requires_auth() {
    let app = spawn_app().await;

    let resp = app
        .client
        .post(app.url("/notifications/register"))
        .json(&json!({"token": "device-token-1"}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 401);

    let resp = app
        .client
        .post(app.url("/notifications/register"))
        .header("Authorization", "Bearer not-a-jwt")
        .json(&json!({"token": "device-token-1"}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 401);
}

#[tokio::test]
async fn test_expired_or_foreign_sessions_rejected() {
    let app = spawn_app().await;
    let user = unique_user();

    for token in [
        common::session_token_with(&user, "club_auth", -3600),
        common::session_token_with(&user, "someone_else", 3600),
    ] {
        let resp = app
            .client
            .post(app.url("/notifications/register"))
            .bearer_auth(token)
            .json(&json!({"token": "device-token-1"}))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 401);
    }
}

#[tokio::test]
async fn test_register_validation() {
    let app = spawn_app().await;
    let user = unique_user();

    let resp = app
        .client
        .post(app.url("/notifications/register"))
        .header("Authorization", auth_header(&user))
        .json(&json!({"token": ""}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 422);

    let resp = app
        .client
        .post(app.url("/notifications/register"))
        .header("Authorization", auth_header(&user))
        .json(&json!({"token": "device-token-1", "metadata": "chrome"}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 422);
}
