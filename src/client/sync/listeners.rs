//! # Change Listener Registry
//!
//! Keeps one live query open per (bucket, scope) partition, 5 buckets across
//! 14 scopes, and forwards every non-empty snapshot to a [`ChangeSink`],
//! normally the reconciliation engine.
//!
//! ## Payloads
//!
//! - non-signature buckets forward the single most recent document
//! - signatures forward the whole scope flattened into a name map
//!
//! ## Lifecycle
//!
//! Each live query is drained by its own task. Dropping the task drops the
//! subscription, which closes the query on the backend. A failure to open or
//! keep one query is logged for that partition only; its siblings keep
//! running.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use crate::client::remote::documents::{flatten_signatures, select_latest};
use crate::client::remote::{RemoteDocument, RemoteStore, RemoteSubscription};
use crate::shared::error::Result;
use crate::shared::model::{Bucket, Scope, SignatureMap};

/// Data forwarded for one live notification
#[derive(Debug, Clone, PartialEq)]
pub enum ChangePayload {
    Latest {
        bucket: Bucket,
        document: RemoteDocument,
    },
    Signatures(SignatureMap),
}

impl ChangePayload {
    /// Select or flatten a non-empty snapshot
    pub fn from_snapshot(bucket: Bucket, documents: &[RemoteDocument]) -> Option<Self> {
        if documents.is_empty() {
            return None;
        }
        if bucket == Bucket::Signatures {
            return Some(ChangePayload::Signatures(flatten_signatures(documents)));
        }
        select_latest(documents).map(|document| ChangePayload::Latest {
            bucket,
            document: document.clone(),
        })
    }
}

/// Receiver of live changes
#[async_trait]
pub trait ChangeSink: Send + Sync {
    async fn on_change(&self, scope: Scope, payload: ChangePayload);
}

pub struct ChangeListenerRegistry {
    remote: Arc<dyn RemoteStore>,
    sink: Arc<dyn ChangeSink>,
    handles: Mutex<HashMap<(Bucket, Scope), JoinHandle<()>>>,
}

impl std::fmt::Debug for ChangeListenerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChangeListenerRegistry").finish_non_exhaustive()
    }
}

impl ChangeListenerRegistry {
    pub fn new(remote: Arc<dyn RemoteStore>, sink: Arc<dyn ChangeSink>) -> Self {
        Self {
            remote,
            sink,
            handles: Mutex::new(HashMap::new()),
        }
    }

    /// Open a live query on one partition, replacing any existing one
    pub async fn subscribe(&self, bucket: Bucket, scope: Scope) -> Result<()> {
        let subscription = self.remote.subscribe(bucket, scope).await?;
        let task = tokio::spawn(forward(subscription, Arc::clone(&self.sink)));

        if let Some(previous) = self.handles.lock().await.insert((bucket, scope), task) {
            previous.abort();
        }
        Ok(())
    }

    /// Open every partition's live query; returns how many are listening
    pub async fn subscribe_all(&self) -> usize {
        let mut established = 0;
        for scope in Scope::all() {
            for bucket in Bucket::ALL {
                match self.subscribe(bucket, scope).await {
                    Ok(()) => established += 1,
                    Err(e) => tracing::error!(
                        "[Listener] Failed to listen to {} for {}: {}",
                        bucket.collection(),
                        scope,
                        e
                    ),
                }
            }
        }
        tracing::info!("[Listener] {} live queries established", established);
        established
    }

    /// Close every live query at once
    pub async fn unsubscribe_all(&self) {
        let handles: Vec<JoinHandle<()>> = {
            let mut guard = self.handles.lock().await;
            guard.drain().map(|(_, handle)| handle).collect()
        };
        let count = handles.len();
        for handle in handles {
            handle.abort();
        }
        if count > 0 {
            tracing::info!("[Listener] Closed {} live queries", count);
        }
    }

    /// Teardown then subscribe again
    pub async fn restart(&self) -> usize {
        self.unsubscribe_all().await;
        self.subscribe_all().await
    }

    /// Live queries whose task is still running
    pub async fn active_count(&self) -> usize {
        self.handles
            .lock()
            .await
            .values()
            .filter(|handle| !handle.is_finished())
            .count()
    }
}

impl Drop for ChangeListenerRegistry {
    fn drop(&mut self) {
        if let Ok(mut handles) = self.handles.try_lock() {
            for (_, handle) in handles.drain() {
                handle.abort();
            }
        }
    }
}

async fn forward(mut subscription: RemoteSubscription, sink: Arc<dyn ChangeSink>) {
    let bucket = subscription.bucket();
    let scope = subscription.scope();

    while let Some(snapshot) = subscription.next().await {
        match snapshot {
            Ok(documents) => {
                if let Some(payload) = ChangePayload::from_snapshot(bucket, &documents) {
                    tracing::debug!(
                        "[Listener] {} documents from {} for {}",
                        documents.len(),
                        bucket.collection(),
                        scope
                    );
                    sink.on_change(scope, payload).await;
                }
            }
            Err(e) => {
                tracing::error!(
                    "[Listener] Error listening to {} for {}: {}",
                    bucket.collection(),
                    scope,
                    e
                );
            }
        }
    }
    tracing::debug!("[Listener] Live query on {} for {} closed", bucket.collection(), scope);
}
