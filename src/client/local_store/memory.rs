//! # In-Memory Local Store
//!
//! Process-local key-value store. Handles created with
//! [`MemoryLocalStore::attach_tab`] share the same entries and event channel
//! but carry their own origin, which models several browser tabs over one
//! storage area.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};

use super::{LocalStore, StorageEvent, StoreOrigin, STORAGE_EVENT_CAPACITY};
use crate::shared::error::Result;

#[derive(Debug)]
struct SharedEntries {
    entries: RwLock<HashMap<String, String>>,
    events: broadcast::Sender<StorageEvent>,
}

/// In-memory [`LocalStore`]
#[derive(Debug)]
pub struct MemoryLocalStore {
    shared: Arc<SharedEntries>,
    origin: StoreOrigin,
}

impl MemoryLocalStore {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(STORAGE_EVENT_CAPACITY);
        Self {
            shared: Arc::new(SharedEntries {
                entries: RwLock::new(HashMap::new()),
                events,
            }),
            origin: StoreOrigin::new(),
        }
    }

    /// Another handle onto the same data with a distinct origin
    pub fn attach_tab(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
            origin: StoreOrigin::new(),
        }
    }

    /// Number of stored keys
    pub async fn len(&self) -> usize {
        self.shared.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    fn publish(&self, key: &str, value: Option<String>) {
        // No receivers is fine
        let _ = self.shared.events.send(StorageEvent {
            key: key.to_string(),
            value,
            origin: self.origin,
        });
    }
}

impl Default for MemoryLocalStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LocalStore for MemoryLocalStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.shared.entries.read().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        self.shared
            .entries
            .write()
            .await
            .insert(key.to_string(), value.to_string());
        self.publish(key, Some(value.to_string()));
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        let removed = self.shared.entries.write().await.remove(key);
        if removed.is_some() {
            self.publish(key, None);
        }
        Ok(())
    }

    fn origin(&self) -> StoreOrigin {
        self.origin
    }

    fn changes(&self) -> Option<broadcast::Receiver<StorageEvent>> {
        Some(self.shared.events.subscribe())
    }
}
