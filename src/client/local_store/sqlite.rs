//! # SQLite Local Store
//!
//! Persists the key-value data in a single `local_storage` table so the local
//! copy survives restarts. The file is created on first open and runs in WAL
//! mode.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use presensi_sync::client::local_store::{LocalStore, SqliteLocalStore};
//!
//! # async fn example() -> presensi_sync::shared::error::Result<()> {
//! let store = SqliteLocalStore::open("/tmp/presensi/local.db").await?;
//! store.set("currentDivision", "Sekum").await?;
//! # Ok(())
//! # }
//! ```

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};
use std::path::Path;
use std::str::FromStr;
use tokio::sync::broadcast;

use super::{LocalStore, StorageEvent, StoreOrigin, STORAGE_EVENT_CAPACITY};
use crate::shared::error::{Result, SyncError};

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS local_storage (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL,
    updated_at TEXT NOT NULL
)";

/// SQLite-backed [`LocalStore`]
#[derive(Debug)]
pub struct SqliteLocalStore {
    pool: SqlitePool,
    origin: StoreOrigin,
    events: broadcast::Sender<StorageEvent>,
}

impl SqliteLocalStore {
    /// Open or create the database file
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                SyncError::storage(format!("Failed to create {}: {}", parent.display(), e))
            })?;
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await?;

        sqlx::query("PRAGMA journal_mode=WAL").execute(&pool).await?;
        sqlx::query("PRAGMA synchronous=NORMAL").execute(&pool).await?;

        tracing::info!("[LocalStore] Opened SQLite store at {}", path.display());
        Self::with_pool(pool).await
    }

    /// Private in-memory database, mostly for tests
    pub async fn in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?;
        // Every connection to :memory: is its own database, so pin one
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;
        Self::with_pool(pool).await
    }

    async fn with_pool(pool: SqlitePool) -> Result<Self> {
        sqlx::query(SCHEMA).execute(&pool).await?;
        let (events, _) = broadcast::channel(STORAGE_EVENT_CAPACITY);
        Ok(Self {
            pool,
            origin: StoreOrigin::new(),
            events,
        })
    }

    /// Another handle onto the same database with a distinct origin
    pub fn attach_tab(&self) -> Self {
        Self {
            pool: self.pool.clone(),
            origin: StoreOrigin::new(),
            events: self.events.clone(),
        }
    }

    /// All stored keys, sorted
    pub async fn keys(&self) -> Result<Vec<String>> {
        let rows = sqlx::query("SELECT key FROM local_storage ORDER BY key")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.iter().map(|row| row.get::<String, _>("key")).collect())
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    fn publish(&self, key: &str, value: Option<String>) {
        let _ = self.events.send(StorageEvent {
            key: key.to_string(),
            value,
            origin: self.origin,
        });
    }
}

#[async_trait]
impl LocalStore for SqliteLocalStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let row = sqlx::query("SELECT value FROM local_storage WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|row| row.get::<String, _>("value")))
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        sqlx::query("INSERT OR REPLACE INTO local_storage (key, value, updated_at) VALUES (?, ?, ?)")
            .bind(key)
            .bind(value)
            .bind(chrono::Utc::now().to_rfc3339())
            .execute(&self.pool)
            .await?;
        self.publish(key, Some(value.to_string()));
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        let result = sqlx::query("DELETE FROM local_storage WHERE key = ?")
            .bind(key)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() > 0 {
            self.publish(key, None);
        }
        Ok(())
    }

    fn origin(&self) -> StoreOrigin {
        self.origin
    }

    fn changes(&self) -> Option<broadcast::Receiver<StorageEvent>> {
        Some(self.events.subscribe())
    }
}
