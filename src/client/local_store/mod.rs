//! # Local Store Module
//!
//! Key-value persistence for the on-device copy of the attendance data.
//! Every bucket value is one string under `{division}_{gender}_{suffix}`;
//! the active scope lives under `currentDivision`/`currentGender`.
//!
//! ## Key Components
//!
//! - `LocalStore`: the string key-value adapter trait
//! - `LocalState`: typed accessors on top of any `LocalStore`
//! - `memory.rs`: in-process store whose handles ("tabs") share data
//! - `sqlite.rs`: SQLite-backed store for persistence across restarts
//!
//! ## Storage Events
//!
//! Stores publish a [`StorageEvent`] for every write. Several handles may
//! share the same data; each has its own [`StoreOrigin`] so a handle can
//! ignore its own writes and react only to changes made elsewhere.
//!
//! ## Partition Locks
//!
//! Every writer of a bucket value holds [`LocalState::lock_partition`] across
//! its read-modify-write, so a local edit and a remote merge on the same
//! (bucket, scope) never overwrite each other.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use presensi_sync::client::local_store::{LocalState, MemoryLocalStore};
//! use presensi_sync::shared::model::{Bucket, Scope};
//! use std::sync::Arc;
//!
//! # async fn example() -> presensi_sync::shared::error::Result<()> {
//! let state = LocalState::new(Arc::new(MemoryLocalStore::new()));
//! let scope = state.current_scope().await;
//! let names = state.read(Bucket::Names, scope).await?;
//! # Ok(())
//! # }
//! ```

pub mod memory;
pub mod sqlite;

pub use memory::MemoryLocalStore;
pub use sqlite::SqliteLocalStore;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{broadcast, Mutex, OwnedMutexGuard};
use uuid::Uuid;

use crate::shared::error::Result;
use crate::shared::model::{
    Bucket, BucketValue, Division, Gender, Scope, SignatureMap, CURRENT_DIVISION_KEY,
    CURRENT_GENDER_KEY,
};

/// Capacity of the storage event channel
pub(crate) const STORAGE_EVENT_CAPACITY: usize = 256;

/// Identity of one handle onto shared local data
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StoreOrigin(Uuid);

impl StoreOrigin {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for StoreOrigin {
    fn default() -> Self {
        Self::new()
    }
}

/// A key was written or removed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageEvent {
    pub key: String,
    /// `None` when the key was removed
    pub value: Option<String>,
    pub origin: StoreOrigin,
}

/// String key-value persistence
#[async_trait]
pub trait LocalStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;

    async fn set(&self, key: &str, value: &str) -> Result<()>;

    async fn remove(&self, key: &str) -> Result<()>;

    /// Origin stamped on events written through this handle
    fn origin(&self) -> StoreOrigin;

    /// Subscribe to writes made through any handle sharing this data
    fn changes(&self) -> Option<broadcast::Receiver<StorageEvent>> {
        None
    }
}

/// Per-partition write locks shared by every clone of a [`LocalState`]
type PartitionLocks = Mutex<HashMap<(Bucket, Scope), Arc<Mutex<()>>>>;

/// Typed view over a [`LocalStore`]
#[derive(Clone)]
pub struct LocalState {
    store: Arc<dyn LocalStore>,
    partitions: Arc<PartitionLocks>,
}

impl std::fmt::Debug for LocalState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalState").finish_non_exhaustive()
    }
}

impl LocalState {
    pub fn new(store: Arc<dyn LocalStore>) -> Self {
        Self {
            store,
            partitions: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn store(&self) -> &Arc<dyn LocalStore> {
        &self.store
    }

    /// Exclusive write access to one (bucket, scope) partition
    ///
    /// Held across a read-modify-write of the bucket value; released on drop.
    pub async fn lock_partition(&self, bucket: Bucket, scope: Scope) -> OwnedMutexGuard<()> {
        let lock = {
            let mut partitions = self.partitions.lock().await;
            Arc::clone(partitions.entry((bucket, scope)).or_default())
        };
        lock.lock_owned().await
    }

    /// Active scope, defaulting each half independently to `Khusus`/`Ikhwan`
    pub async fn current_scope(&self) -> Scope {
        let defaults = Scope::default();
        let division = self
            .read_selector::<Division>(CURRENT_DIVISION_KEY)
            .await
            .unwrap_or(defaults.division);
        let gender = self
            .read_selector::<Gender>(CURRENT_GENDER_KEY)
            .await
            .unwrap_or(defaults.gender);
        Scope::new(division, gender)
    }

    async fn read_selector<T: std::str::FromStr>(&self, key: &str) -> Option<T> {
        match self.store.get(key).await {
            Ok(Some(raw)) => match raw.parse::<T>() {
                Ok(value) => Some(value),
                Err(_) => {
                    tracing::warn!("[LocalStore] Ignoring unknown {} value '{}'", key, raw);
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                tracing::warn!("[LocalStore] Failed to read {}: {}", key, e);
                None
            }
        }
    }

    pub async fn set_current_scope(&self, scope: Scope) -> Result<()> {
        self.store.set(CURRENT_DIVISION_KEY, scope.division.as_str()).await?;
        self.store.set(CURRENT_GENDER_KEY, scope.gender.as_str()).await
    }

    /// Read a bucket value; a missing or unreadable value reads as empty
    pub async fn read(&self, bucket: Bucket, scope: Scope) -> Result<BucketValue> {
        let key = scope.storage_key(bucket);
        let Some(raw) = self.store.get(&key).await? else {
            return Ok(BucketValue::empty(bucket));
        };
        match BucketValue::from_stored(bucket, &raw) {
            Ok(value) => Ok(value),
            Err(e) => {
                tracing::warn!("[LocalStore] Discarding unreadable value at {}: {}", key, e);
                Ok(BucketValue::empty(bucket))
            }
        }
    }

    pub async fn write(&self, scope: Scope, value: &BucketValue) -> Result<()> {
        let key = scope.storage_key(value.bucket());
        self.store.set(&key, &value.to_stored()?).await
    }

    pub async fn signatures(&self, scope: Scope) -> Result<SignatureMap> {
        match self.read(Bucket::Signatures, scope).await? {
            BucketValue::Signatures(map) => Ok(map),
            _ => Ok(SignatureMap::new()),
        }
    }

    pub async fn get_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        match self.store.get(key).await? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    pub async fn set_json<T: Serialize + Sync>(&self, key: &str, value: &T) -> Result<()> {
        let raw = serde_json::to_string(value)?;
        self.store.set(key, &raw).await
    }

    pub async fn remove(&self, key: &str) -> Result<()> {
        self.store.remove(key).await
    }
}
