pub mod dispatcher;
pub mod notification;
pub mod preferences;
pub mod push;
pub mod websocket;
