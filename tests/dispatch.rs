mod common;

use std::time::{Duration, Instant};

use club_notify::db::repositories::RegistrationRepository;
use club_notify::models::entities::NotificationCategory;
use club_notify::services::push::NotificationPayload;
use common::{TestOptions, auth_header, spawn_app, spawn_app_with, unique_user};
use serde_json::json;

#[tokio::test]
async fn test_revoked_registration_is_deactivated() {
    let app = spawn_app().await;
    let user = unique_user();
    let good = app.register(&user, "device-good").await;
    let revoked = app.register(&user, "revoked-device").await;

    let data = app.send_to(&user, "eventReminder").await;
    assert_eq!(data["attempted"], 2);
    assert_eq!(data["sent"], 1);
    assert_eq!(data["failed"], 1);

    let outcomes = data["perRegistration"].as_array().unwrap();
    let failed = outcomes
        .iter()
        .find(|o| o["registrationId"] == revoked.as_str())
        .unwrap();
    assert_eq!(failed["status"], "failed");
    assert_eq!(failed["errorKind"], "permanent_token");
    let sent = outcomes
        .iter()
        .find(|o| o["registrationId"] == good.as_str())
        .unwrap();
    assert_eq!(sent["status"], "sent");

    // Deactivation has completed by the time the send returns
    let repo = RegistrationRepository::new(app.state.db.pool.clone());
    assert!(!repo.get_by_id(&revoked).await.unwrap().unwrap().is_active);
    assert!(repo.get_by_id(&good).await.unwrap().unwrap().is_active);

    let data = app.send_to(&user, "eventReminder").await;
    assert_eq!(data["attempted"], 1);
    assert_eq!(data["sent"], 1);
}

#[tokio::test]
async fn test_transient_failure_keeps_registration() {
    let app = spawn_app().await;
    let user = unique_user();
    let flaky = app.register(&user, "flaky-device").await;

    let data = app.send_to(&user, "general").await;
    assert_eq!(data["attempted"], 1);
    assert_eq!(data["failed"], 1);
    assert_eq!(data["perRegistration"][0]["errorKind"], "transient");

    // The record survives a total delivery failure
    assert!(data["notificationId"].is_string());
    let list = app.list_notifications(&user).await;
    assert_eq!(list["total"], 1);

    let repo = RegistrationRepository::new(app.state.db.pool.clone());
    assert!(repo.get_by_id(&flaky).await.unwrap().unwrap().is_active);

    let data = app.send_to(&user, "general").await;
    assert_eq!(data["attempted"], 1);
}

#[tokio::test]
async fn test_provider_timeout_is_transient() {
    let app = spawn_app().await;
    let user = unique_user();
    let hanging = app.register(&user, "hang-device").await;

    let started = Instant::now();
    let data = app.send_to(&user, "general").await;
    assert!(started.elapsed() < Duration::from_secs(4));

    assert_eq!(data["failed"], 1);
    assert_eq!(data["perRegistration"][0]["errorKind"], "transient");

    let repo = RegistrationRepository::new(app.state.db.pool.clone());
    assert!(repo.get_by_id(&hanging).await.unwrap().unwrap().is_active);
}

#[tokio::test]
async fn test_no_registrations_means_nothing_attempted() {
    let app = spawn_app().await;
    let user = unique_user();

    let data = app.send_to(&user, "general").await;
    assert_eq!(data["attempted"], 0);
    assert_eq!(data["sent"], 0);
    assert!(data["notificationId"].is_string());
    assert_eq!(app.provider.legacy_calls(), 0);
}

#[tokio::test]
async fn test_no_providers_configured() {
    let app = spawn_app_with(TestOptions {
        legacy: false,
        oauth: false,
        ..Default::default()
    })
    .await;
    let user = unique_user();
    app.register(&user, "device-a").await;

    let data = app.send_to(&user, "general").await;
    assert_eq!(data["attempted"], 0);
    assert!(data["notificationId"].is_string());
}

#[tokio::test]
async fn test_oauth_only_sends_per_token() {
    let app = spawn_app_with(TestOptions {
        legacy: false,
        ..Default::default()
    })
    .await;
    let user = unique_user();
    app.register(&user, "device-a").await;
    app.register(&user, "device-b").await;
    let revoked = app.register(&user, "revoked-device").await;

    let data = app.send_to(&user, "general").await;
    assert_eq!(data["attempted"], 3);
    assert_eq!(data["sent"], 2);
    assert_eq!(data["failed"], 1);
    assert_eq!(app.provider.oauth_sends(), 3);
    assert_eq!(app.provider.legacy_calls(), 0);

    let repo = RegistrationRepository::new(app.state.db.pool.clone());
    assert!(!repo.get_by_id(&revoked).await.unwrap().unwrap().is_active);
}

#[tokio::test]
async fn test_legacy_batches_are_chunked() {
    let app = spawn_app_with(TestOptions {
        legacy_batch_limit: 2,
        ..Default::default()
    })
    .await;
    let user = unique_user();
    for i in 0..5 {
        app.register(&user, &format!("device-{i}")).await;
    }

    let data = app.send_to(&user, "general").await;
    assert_eq!(data["attempted"], 5);
    assert_eq!(data["sent"], 5);
    assert_eq!(app.provider.legacy_calls(), 3);
}

#[tokio::test]
async fn test_slow_owner_does_not_block_others() {
    let app = spawn_app().await;
    let slow_user = unique_user();
    let fast_user = unique_user();
    app.register(&slow_user, "slow-device").await;
    app.register(&fast_user, "device-a").await;

    let slow_state = app.state.clone();
    let slow_owner = slow_user.clone();
    let slow = tokio::spawn(async move {
        slow_state
            .notifications
            .notify(
                &slow_owner,
                "Setlist updated",
                "Three songs added",
                club_notify::models::entities::NotificationCategory::SongAdded,
                None,
                None,
            )
            .await
    });

    tokio::time::sleep(Duration::from_millis(200)).await;
    let started = Instant::now();
    let data = app.send_to(&fast_user, "general").await;
    assert_eq!(data["sent"], 1);
    assert!(started.elapsed() < Duration::from_secs(1));

    assert!(slow.await.unwrap().is_some());
}

#[tokio::test]
async fn test_payload_carries_tag_and_action_url() {
    let app = spawn_app().await;
    let user = unique_user();
    app.register(&user, "device-a").await;

    let data = app.send_to(&user, "eventStatusChanged").await;
    let id = data["notificationId"].as_str().unwrap();

    let body = app.provider.last_legacy_body().unwrap();
    assert_eq!(body["data"]["tag"], format!("eventStatusChanged-{id}"));
    assert_eq!(body["data"]["actionUrl"], "/events/event-1");
    assert_eq!(body["data"]["notificationId"], id);
    assert_eq!(body["data"]["category"], "eventStatusChanged");
    assert_eq!(body["notification"]["title"], "Rehearsal moved");
    assert_eq!(body["webpush"]["notification"]["tag"], format!("eventStatusChanged-{id}"));
}

#[tokio::test]
async fn test_caller_tag_is_kept_verbatim() {
    let app = spawn_app().await;
    let user = unique_user();
    app.register(&user, "device-a").await;

    app.admin_send(json!({
        "ownerId": user,
        "title": "Reminder",
        "body": "Soundcheck at 6",
        "category": "eventReminder",
        "data": {"tag": "eventReminder-1700000000000", "eventId": 42},
    }))
    .await;

    let body = app.provider.last_legacy_body().unwrap();
    assert_eq!(body["data"]["tag"], "eventReminder-1700000000000");
    // Non-string values are JSON-encoded
    assert_eq!(body["data"]["eventId"], "42");
}

#[tokio::test]
async fn test_actions_use_oauth_sender() {
    let app = spawn_app().await;
    let user = unique_user();
    app.register(&user, "device-a").await;

    let data = app
        .admin_send(json!({
            "ownerId": user,
            "title": "You were assigned",
            "body": "Bass, Friday gig",
            "category": "personnelAssigned",
            "actions": [
                {"action": "accept", "title": "Accept"},
                {"action": "decline", "title": "Decline"},
            ],
        }))
        .await;
    assert_eq!(data["sent"], 1);

    assert_eq!(app.provider.legacy_calls(), 0);
    assert_eq!(app.provider.oauth_sends(), 1);
    let body = app.provider.last_oauth_body().unwrap();
    assert_eq!(body["message"]["token"], "device-a");
    let actions = body["message"]["webpush"]["notification"]["actions"]
        .as_array()
        .unwrap();
    assert_eq!(actions.len(), 2);
    assert_eq!(actions[0]["action"], "accept");
}

#[tokio::test]
async fn test_too_many_actions_rejected() {
    let app = spawn_app().await;
    let user = unique_user();

    let resp = app
        .client
        .post(app.url("/notifications/send"))
        .header("Authorization", auth_header(&user))
        .json(&json!({
            "ownerId": user,
            "title": "t",
            "body": "b",
            "actions": [
                {"action": "a", "title": "A"},
                {"action": "b", "title": "B"},
                {"action": "c", "title": "C"},
            ],
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 422);
}

#[tokio::test]
async fn test_users_send_only_to_themselves() {
    let app = spawn_app().await;
    let user = unique_user();
    let other = unique_user();
    app.register(&user, "device-a").await;

    let resp = app
        .client
        .post(app.url("/notifications/send"))
        .header("Authorization", auth_header(&user))
        .json(&json!({"ownerId": user, "title": "Note to self", "body": ""}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let data: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(data["sent"], 1);

    let resp = app
        .client
        .post(app.url("/notifications/send"))
        .header("Authorization", auth_header(&user))
        .json(&json!({"ownerId": other, "title": "Hi", "body": ""}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 403);

    let resp = app
        .client
        .post(app.url("/notifications/send"))
        .header("X-Admin-Key", "wrong-key")
        .json(&json!({"ownerId": other, "title": "Hi", "body": ""}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 403);

    let resp = app
        .client
        .post(app.url("/notifications/send"))
        .json(&json!({"ownerId": other, "title": "Hi", "body": ""}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 401);
}

#[tokio::test]
async fn test_unreadable_registrations_send_nothing() {
    let app = spawn_app().await;
    let user = unique_user();
    app.register(&user, "device-a").await;

    sqlx::query("DROP TABLE device_registrations")
        .execute(&app.state.db.pool)
        .await
        .unwrap();

    let payload = NotificationPayload::new("Rehearsal moved", "Now at 8pm", "general-1");
    let result = app.state.dispatcher.dispatch(&user, &payload).await;
    assert_eq!(result.attempted, 0);
    assert_eq!(result.sent, 0);
    assert_eq!(result.failed, 0);
    assert!(result.per_registration.is_empty());

    // The inbox record is still written
    let data = app.send_to(&user, "general").await;
    assert_eq!(data["attempted"], 0);
    assert!(data["notificationId"].is_string());
    assert_eq!(app.provider.legacy_calls(), 0);
}

#[tokio::test]
async fn test_closed_store_fails_quietly() {
    let app = spawn_app().await;
    let user = unique_user();
    app.register(&user, "device-a").await;

    app.state.db.pool.close().await;

    assert!(
        app.state
            .preferences
            .is_allowed(&user, NotificationCategory::SongAdded)
            .await
    );

    let payload = NotificationPayload::new("Setlist updated", "Two songs added", "songAdded-1");
    let result = app.state.dispatcher.dispatch(&user, &payload).await;
    assert_eq!(result.attempted, 0);
    assert_eq!(app.provider.legacy_calls(), 0);

    let record = app
        .state
        .notifications
        .notify(&user, "Setlist updated", "", NotificationCategory::SongAdded, None, None)
        .await;
    assert!(record.is_none());
}
