pub mod repositories;

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use sqlx::migrate::{MigrateError, Migrator};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{ConnectOptions, SqlitePool};

use crate::config::Settings;
use crate::models::responses::{DatabaseStats, ServiceHealth};

/// SQLite store holding registrations, preferences and the notification inbox.
#[derive(Clone)]
pub struct Database {
    pub pool: SqlitePool,
    pub db_path: String,
}

impl Database {
    pub async fn connect(settings: &Settings) -> Result<Self, sqlx::Error> {
        let db_path = resolve_db_path(&settings.database_path);

        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).ok();
        }

        let timeout = Duration::from_secs(settings.database_pool_timeout);
        let connect_options = SqliteConnectOptions::new()
            .filename(&db_path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(timeout)
            .pragma("foreign_keys", "ON")
            .disable_statement_logging();

        let pool = SqlitePoolOptions::new()
            .max_connections(settings.database_pool_size)
            .acquire_timeout(timeout)
            .connect_with(connect_options)
            .await?;

        let version: String = sqlx::query_scalar("SELECT sqlite_version()")
            .fetch_one(&pool)
            .await?;

        let db_path = db_path.to_string_lossy().into_owned();
        tracing::info!(
            sqlite_version = %version,
            path = %db_path,
            pool_size = settings.database_pool_size,
            "Notification store opened"
        );

        Ok(Self { pool, db_path })
    }

    pub async fn health_check(&self) -> ServiceHealth {
        let start = Instant::now();
        match sqlx::query_scalar::<_, i32>("SELECT 1")
            .fetch_one(&self.pool)
            .await
        {
            Ok(_) => ServiceHealth {
                status: "up".to_string(),
                latency_ms: Some(start.elapsed().as_millis() as i64),
                error: None,
            },
            Err(e) => ServiceHealth {
                status: "down".to_string(),
                latency_ms: None,
                error: Some(e.to_string()),
            },
        }
    }

    pub fn pool_stats(&self) -> DatabaseStats {
        DatabaseStats {
            connected: !self.pool.is_closed(),
            pool_size: Some(self.pool.size()),
            idle_connections: Some(self.pool.num_idle()),
        }
    }
}

/// Apply the schema. The service cannot run without its tables, so a
/// missing directory is an error.
pub async fn run_migrations(pool: &SqlitePool, migrations_dir: &str) -> Result<(), MigrateError> {
    let migrator = Migrator::new(Path::new(migrations_dir)).await?;
    migrator.run(pool).await?;

    tracing::info!(path = %migrations_dir, "Migrations applied");
    Ok(())
}

/// Explicit setting, then the container path, then cwd.
pub fn resolve_migrations_dir(settings: &Settings) -> String {
    if let Some(dir) = &settings.migrations_dir {
        return dir.clone();
    }
    if Path::new("/app/migrations/sqlite").exists() {
        "/app/migrations/sqlite".to_string()
    } else {
        "./migrations/sqlite".to_string()
    }
}

fn resolve_db_path(db_path: &str) -> PathBuf {
    let path = Path::new(db_path);
    if path.is_absolute() {
        return path.to_path_buf();
    }
    std::env::current_dir()
        .unwrap_or_else(|_| PathBuf::from("."))
        .join(path)
}
