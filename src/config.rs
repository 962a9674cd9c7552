use std::env;

#[derive(Debug, Clone)]
pub struct Settings {
    // App
    pub app_name: String,
    pub app_version: String,
    pub environment: String,
    pub host: String,
    pub port: u16,

    // Database
    pub database_path: String,
    pub database_pool_size: u32,
    pub database_pool_timeout: u64,
    pub migrations_dir: Option<String>,

    // JWT (session auth)
    pub jwt_secret_key: String,
    pub jwt_algorithm: String,
    pub jwt_issuer: String,

    // Admin access to send endpoints
    pub admin_api_key: Option<String>,

    // CORS
    pub cors_origins: String,

    // Logging
    pub log_level: String,
    pub log_format: String,

    // Sentry
    pub sentry_dsn: Option<String>,
    pub sentry_traces_sample_rate: f32,

    // Push providers
    pub push_timeout: u64,
    pub legacy_push_url: Option<String>,
    pub legacy_server_key: Option<String>,
    pub legacy_batch_limit: usize,
    pub fcm_project_id: Option<String>,
    pub fcm_client_email: Option<String>,
    pub fcm_private_key: Option<String>,
    pub fcm_token_uri: String,
    pub fcm_api_base: String,
    pub fcm_concurrency: usize,

    // Real-time side channel
    pub realtime_buffer: usize,

    // Client routing
    pub default_action_url: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            app_name: "Club Notification Service".into(),
            app_version: "1.0.0".into(),
            environment: "development".into(),
            host: "0.0.0.0".into(),
            port: 8000,

            database_path: "data/club_notify.db".into(),
            database_pool_size: 10,
            database_pool_timeout: 30,
            migrations_dir: None,

            jwt_secret_key: "dev-secret-change-me".into(),
            jwt_algorithm: "HS256".into(),
            jwt_issuer: "club_auth".into(),

            admin_api_key: None,

            cors_origins: "*".into(),

            log_level: "info".into(),
            log_format: "json".into(),

            sentry_dsn: None,
            sentry_traces_sample_rate: 0.1,

            push_timeout: 10,
            legacy_push_url: None,
            legacy_server_key: None,
            legacy_batch_limit: 500,
            fcm_project_id: None,
            fcm_client_email: None,
            fcm_private_key: None,
            fcm_token_uri: "https://oauth2.googleapis.com/token".into(),
            fcm_api_base: "https://fcm.googleapis.com".into(),
            fcm_concurrency: 16,

            realtime_buffer: 64,

            default_action_url: "/dashboard".into(),
        }
    }
}

fn optional(key: &str) -> Option<String> {
    env::var(key).ok().filter(|s| !s.trim().is_empty())
}

impl Settings {
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            app_name: env::var("APP_NAME").unwrap_or(defaults.app_name),
            app_version: env::var("APP_VERSION").unwrap_or(defaults.app_version),
            environment: env::var("ENVIRONMENT").unwrap_or(defaults.environment),
            host: env::var("HOST").unwrap_or(defaults.host),
            port: env::var("PORT")
                .unwrap_or("8000".into())
                .parse()
                .unwrap_or(defaults.port),

            database_path: env::var("DATABASE_PATH").unwrap_or(defaults.database_path),
            database_pool_size: env::var("DATABASE_POOL_SIZE")
                .unwrap_or("10".into())
                .parse()
                .unwrap_or(defaults.database_pool_size),
            database_pool_timeout: env::var("DATABASE_POOL_TIMEOUT")
                .unwrap_or("30".into())
                .parse()
                .unwrap_or(defaults.database_pool_timeout),
            migrations_dir: optional("MIGRATIONS_DIR"),

            jwt_secret_key: env::var("JWT_SECRET_KEY").unwrap_or(defaults.jwt_secret_key),
            jwt_algorithm: env::var("JWT_ALGORITHM").unwrap_or(defaults.jwt_algorithm),
            jwt_issuer: env::var("JWT_ISSUER").unwrap_or(defaults.jwt_issuer),

            admin_api_key: optional("ADMIN_API_KEY"),

            cors_origins: env::var("CORS_ORIGINS").unwrap_or(defaults.cors_origins),

            log_level: env::var("LOG_LEVEL").unwrap_or(defaults.log_level),
            log_format: env::var("LOG_FORMAT").unwrap_or(defaults.log_format),

            sentry_dsn: optional("SENTRY_DSN"),
            sentry_traces_sample_rate: env::var("SENTRY_TRACES_SAMPLE_RATE")
                .unwrap_or("0.1".into())
                .parse()
                .unwrap_or(defaults.sentry_traces_sample_rate),

            push_timeout: env::var("PUSH_TIMEOUT")
                .unwrap_or("10".into())
                .parse()
                .unwrap_or(defaults.push_timeout),
            legacy_push_url: optional("LEGACY_PUSH_URL"),
            legacy_server_key: optional("LEGACY_SERVER_KEY"),
            legacy_batch_limit: env::var("LEGACY_BATCH_LIMIT")
                .unwrap_or("500".into())
                .parse()
                .unwrap_or(defaults.legacy_batch_limit),
            fcm_project_id: optional("FCM_PROJECT_ID"),
            fcm_client_email: optional("FCM_CLIENT_EMAIL"),
            // Private keys usually arrive with escaped newlines from env files
            fcm_private_key: optional("FCM_PRIVATE_KEY").map(|k| k.replace("\\n", "\n")),
            fcm_token_uri: env::var("FCM_TOKEN_URI").unwrap_or(defaults.fcm_token_uri),
            fcm_api_base: env::var("FCM_API_BASE").unwrap_or(defaults.fcm_api_base),
            fcm_concurrency: env::var("FCM_CONCURRENCY")
                .unwrap_or("16".into())
                .parse()
                .unwrap_or(defaults.fcm_concurrency),

            realtime_buffer: env::var("REALTIME_BUFFER")
                .unwrap_or("64".into())
                .parse()
                .unwrap_or(defaults.realtime_buffer),

            default_action_url: env::var("DEFAULT_ACTION_URL")
                .unwrap_or(defaults.default_action_url),
        }
    }

    pub fn cors_origins_list(&self) -> Vec<String> {
        if self.cors_origins == "*" {
            return vec!["*".to_string()];
        }
        self.cors_origins
            .split(',')
            .map(|s| s.trim().to_string())
            .collect()
    }

    #[inline]
    pub fn legacy_configured(&self) -> bool {
        self.legacy_push_url.is_some() && self.legacy_server_key.is_some()
    }

    #[inline]
    pub fn oauth_configured(&self) -> bool {
        self.fcm_project_id.is_some()
            && self.fcm_client_email.is_some()
            && self.fcm_private_key.is_some()
    }
}
