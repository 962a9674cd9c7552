use utoipa::OpenApi;
use utoipa::openapi::security::{ApiKey, ApiKeyValue, Http, HttpAuthScheme, SecurityScheme};
use utoipa_swagger_ui::SwaggerUi;

use crate::middleware::ADMIN_KEY_HEADER;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Club Notification API",
        version = "1.0.0",
        description = "Device registration, notification delivery and in-app notification history"
    ),
    paths(
        // Health
        super::health::root,
        super::health::health,
        super::health::status,
        // Registrations
        super::notifications::register,
        super::notifications::unregister,
        // Sends
        super::notifications::send,
        super::notifications::send_bulk,
        super::notifications::send_topic,
        // Notifications
        super::notifications::list_notifications,
        super::notifications::mark_as_read,
        super::notifications::mark_all_as_read,
        // Preferences
        super::notifications::get_preferences,
        super::notifications::update_preferences,
        // Realtime
        super::websocket::ws_notifications,
    ),
    components(schemas(
        // Requests
        crate::models::requests::RegisterRequest,
        crate::models::requests::UnregisterRequest,
        crate::models::requests::SendRequest,
        crate::models::requests::SendBulkRequest,
        crate::models::requests::SendTopicRequest,
        crate::models::requests::UpdatePreferencesRequest,
        // Responses
        crate::models::responses::RegisterResponse,
        crate::models::responses::UnregisterResponse,
        crate::models::responses::SendResponse,
        crate::models::responses::SendBulkResponse,
        crate::models::responses::NotificationListResponse,
        crate::models::responses::MarkReadResponse,
        crate::models::responses::PreferencesResponse,
        crate::models::responses::ServiceHealth,
        crate::models::responses::HealthResponse,
        crate::models::responses::StatusResponse,
        crate::models::responses::DatabaseStats,
        crate::models::responses::SystemStatistics,
        crate::services::dispatcher::TopicDispatchResult,
        // Delivery
        crate::services::push::DeliveryOutcome,
        crate::services::push::DeliveryStatus,
        crate::services::push::ErrorKind,
        crate::services::push::NotificationAction,
        // Entities
        crate::models::entities::NotificationCategory,
        crate::models::entities::NotificationRecord,
        crate::models::entities::NotificationPreference,
        // Error
        crate::error::ErrorBody,
    )),
    modifiers(&SecurityAddon),
    tags(
        (name = "Health", description = "Health and status endpoints"),
        (name = "Registrations", description = "Device token registration"),
        (name = "Sends", description = "Notification triggers and topic broadcast"),
        (name = "Notifications", description = "In-app notification history"),
        (name = "Preferences", description = "Per-user delivery preferences"),
        (name = "Realtime", description = "WebSocket side channel"),
    )
)]
pub struct ApiDoc;

struct SecurityAddon;

impl utoipa::Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "BearerAuth",
                SecurityScheme::Http(Http::new(HttpAuthScheme::Bearer)),
            );
            components.add_security_scheme(
                "AdminKey",
                SecurityScheme::ApiKey(ApiKey::Header(ApiKeyValue::new(ADMIN_KEY_HEADER))),
            );
        }
    }
}

pub fn swagger_ui() -> SwaggerUi {
    SwaggerUi::new("/explore").url("/api-docs/openapi.json", ApiDoc::openapi())
}
