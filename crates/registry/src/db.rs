use std::path::Path;

use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Pool, Sqlite};
use tracing::info;

use crate::config::RegistryConfig;
use crate::error::{StoreError, StoreResult};

mod github_apps;
mod private_keys;
mod servers;
mod sources;
mod types;

pub use types::{
    GithubApp, KeyType, NewPrivateKey, NewServer, NewSource, Owner, Permissions, PrivateKey,
    PrivateKeySummary, Secret, Server, Source, SourceType,
};

const DEFAULT_MAX_CONNECTIONS: u32 = 5;

/// Resolves the timestamps of a locally created row: omitted values take the
/// write-time instant, and a lone `created_at` is mirrored into `updated_at`.
fn write_timestamps(
    created_at: Option<DateTime<Utc>>,
    updated_at: Option<DateTime<Utc>>,
) -> (DateTime<Utc>, DateTime<Utc>) {
    let created_at = created_at.unwrap_or_else(Utc::now);
    (created_at, updated_at.unwrap_or(created_at))
}

/// Handle to the registry database. Cloning shares the underlying pool.
#[derive(Debug, Clone)]
pub struct DbClient {
    pool: Pool<Sqlite>,
}

#[allow(clippy::missing_errors_doc)]
impl DbClient {
    pub async fn connect(database_path: &str, max_connections: u32) -> StoreResult<Self> {
        let connect_options = SqliteConnectOptions::new()
            .filename(database_path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .foreign_keys(true)
            .synchronous(SqliteSynchronous::Normal);

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections.max(1))
            .connect_with(connect_options)
            .await?;

        Ok(Self { pool })
    }

    pub async fn initialize(database_path: &str) -> StoreResult<Self> {
        Self::open(database_path, DEFAULT_MAX_CONNECTIONS).await
    }

    pub async fn initialize_with(config: &RegistryConfig) -> StoreResult<Self> {
        Self::open(&config.database_path(), config.max_connections()).await
    }

    async fn open(database_path: &str, max_connections: u32) -> StoreResult<Self> {
        if let Some(parent_dir) = Path::new(database_path).parent() {
            std::fs::create_dir_all(parent_dir)
                .map_err(|error| StoreError::StorageUnavailable(sqlx::Error::Io(error)))?;
        }

        let db = Self::connect(database_path, max_connections).await?;
        db.run_migrations().await?;
        db.ensure_wal_mode().await?;

        info!(database_path, max_connections, "registry database ready");
        Ok(db)
    }

    pub async fn run_migrations(&self) -> StoreResult<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(sqlx::Error::from)?;
        Ok(())
    }

    pub async fn ensure_wal_mode(&self) -> StoreResult<()> {
        let journal_mode: String = sqlx::query_scalar("PRAGMA journal_mode=WAL;")
            .fetch_one(&self.pool)
            .await?;

        if journal_mode.to_uppercase() != "WAL" {
            return Err(StoreError::Storage(sqlx::Error::Configuration(
                format!("SQLite WAL mode is not enabled (journal_mode={journal_mode})").into(),
            )));
        }

        Ok(())
    }

    #[must_use]
    pub fn pool(&self) -> Pool<Sqlite> {
        self.pool.clone()
    }
}
