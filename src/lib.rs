pub mod client;
pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;

use std::sync::Arc;
use std::time::Instant;

use anyhow::Context;
use axum::Router;
use axum::http::header;
use tower_http::compression::CompressionLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use config::Settings;
use db::Database;
use db::repositories::{NotificationRepository, PreferenceRepository, RegistrationRepository};
use services::dispatcher::DeliveryDispatcher;
use services::notification::NotificationService;
use services::preferences::PreferenceGate;
use services::push::ProviderClient;
use services::websocket::WsManager;

pub struct AppState {
    pub db: Database,
    pub settings: Settings,
    pub start_time: Instant,
    pub providers: ProviderClient,
    pub preferences: PreferenceGate,
    pub dispatcher: Arc<DeliveryDispatcher>,
    pub notifications: NotificationService,
    pub ws_manager: Arc<WsManager>,
}

impl AppState {
    /// Connect the database, run migrations and build every service.
    pub async fn initialize(settings: Settings) -> anyhow::Result<Arc<Self>> {
        let database = Database::connect(&settings)
            .await
            .context("Failed to connect to database")?;

        let migrations_dir = db::resolve_migrations_dir(&settings);
        db::run_migrations(&database.pool, &migrations_dir)
            .await
            .context("Failed to run migrations")?;

        let providers =
            ProviderClient::from_settings(&settings).context("Invalid push provider settings")?;

        Ok(Arc::new(Self::new(database, settings, providers)))
    }

    pub fn new(db: Database, settings: Settings, providers: ProviderClient) -> Self {
        let preferences = PreferenceGate::new(PreferenceRepository::new(db.pool.clone()));
        let dispatcher = Arc::new(DeliveryDispatcher::new(
            RegistrationRepository::new(db.pool.clone()),
            preferences.clone(),
            &providers,
        ));
        let ws_manager = Arc::new(WsManager::new(settings.realtime_buffer));
        let notifications = NotificationService::new(
            NotificationRepository::new(db.pool.clone()),
            preferences.clone(),
            dispatcher.clone(),
            ws_manager.clone(),
        );

        Self {
            db,
            settings,
            start_time: Instant::now(),
            providers,
            preferences,
            dispatcher,
            notifications,
            ws_manager,
        }
    }
}

pub fn build_router(state: Arc<AppState>) -> Router {
    use axum::routing::{get, post};
    use routes::{health, notifications, openapi, websocket};

    let cors = build_cors(&state.settings);

    Router::new()
        // Health
        .route("/", get(health::root))
        .route("/health", get(health::health))
        .route("/status", get(health::status))
        // Registrations
        .route("/notifications/register", post(notifications::register))
        .route("/notifications/unregister", post(notifications::unregister))
        // Sends
        .route("/notifications/send", post(notifications::send))
        .route("/notifications/send-bulk", post(notifications::send_bulk))
        .route("/notifications/send-topic", post(notifications::send_topic))
        // In-app list
        .route("/notifications", get(notifications::list_notifications))
        .route("/notifications/{notification_id}/read", post(notifications::mark_as_read))
        .route("/notifications/read-all", post(notifications::mark_all_as_read))
        // Preferences
        .route(
            "/notifications/preferences",
            get(notifications::get_preferences).put(notifications::update_preferences),
        )
        // WebSocket
        .route("/notifications/ws/{owner_id}", get(websocket::ws_notifications))
        .merge(openapi::swagger_ui())
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

fn build_cors(settings: &Settings) -> CorsLayer {
    let origins = settings.cors_origins_list();

    if origins.contains(&"*".to_string()) {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        let allowed: Vec<_> = origins.iter().filter_map(|o| o.parse().ok()).collect();
        use axum::http::Method;
        CorsLayer::new()
            .allow_origin(allowed)
            .allow_methods([Method::GET, Method::POST, Method::PUT, Method::OPTIONS])
            .allow_headers([
                header::AUTHORIZATION,
                header::CONTENT_TYPE,
                header::ACCEPT,
                header::ORIGIN,
                header::HeaderName::from_static(middleware::ADMIN_KEY_HEADER),
            ])
            .allow_credentials(true)
    }
}
