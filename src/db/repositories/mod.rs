pub mod notification_repository;
pub mod preference_repository;
pub mod registration_repository;

pub use notification_repository::NotificationRepository;
pub use preference_repository::PreferenceRepository;
pub use registration_repository::RegistrationRepository;

/// Parse a SQLite datetime string into NaiveDateTime.
pub(crate) fn parse_dt(s: &str) -> chrono::NaiveDateTime {
    chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").unwrap_or_default()
}

/// Format a NaiveDateTime the way SQLite's datetime('now') does.
pub(crate) fn format_dt(dt: &chrono::NaiveDateTime) -> String {
    dt.format("%Y-%m-%d %H:%M:%S").to_string()
}

/// Parse a JSON string, returning an empty object on failure.
pub(crate) fn parse_json(s: &str) -> serde_json::Value {
    serde_json::from_str(s).unwrap_or(serde_json::Value::Object(Default::default()))
}

/// True when the error is a UNIQUE constraint violation.
pub(crate) fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.is_unique_violation())
}
