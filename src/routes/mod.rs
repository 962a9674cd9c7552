pub mod health;
pub mod notifications;
pub mod openapi;
pub mod websocket;
