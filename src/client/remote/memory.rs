//! # In-Memory Remote Store
//!
//! A process-local document store that behaves like the hosted backend:
//! per-bucket collections, merge upserts stamped with a strictly increasing
//! server clock, live snapshots per (bucket, scope) and image uploads.
//!
//! Faults can be injected for tests and demos: the whole backend can be made
//! unavailable, single signature pushes or whole buckets can be made to
//! fail, and individual live queries can be refused.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Mutex;
use tokio::sync::RwLock;

use super::{Fields, ImagePayload, RemoteDocument, RemoteStore, RemoteSubscription, SnapshotSender};
use crate::shared::error::{Result, SyncError};
use crate::shared::model::{now_millis, Bucket, Millis, Scope};

struct Subscriber {
    bucket: Bucket,
    scope: Scope,
    sender: SnapshotSender,
}

#[derive(Default)]
struct Faults {
    signatures: HashSet<String>,
    buckets: HashSet<Bucket>,
    subscriptions: HashSet<(Bucket, Scope)>,
}

/// Record of one accepted upsert
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpsertRecord {
    pub bucket: Bucket,
    pub doc_id: String,
}

/// In-memory [`RemoteStore`]
pub struct MemoryRemoteStore {
    collections: RwLock<HashMap<Bucket, BTreeMap<String, Fields>>>,
    images: RwLock<HashMap<String, usize>>,
    subscribers: Mutex<Vec<Subscriber>>,
    faults: Mutex<Faults>,
    upserts: Mutex<Vec<UpsertRecord>>,
    available: AtomicBool,
    clock: AtomicI64,
}

impl std::fmt::Debug for MemoryRemoteStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryRemoteStore")
            .field("available", &self.available.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}

impl Default for MemoryRemoteStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryRemoteStore {
    pub fn new() -> Self {
        Self {
            collections: RwLock::new(HashMap::new()),
            images: RwLock::new(HashMap::new()),
            subscribers: Mutex::new(Vec::new()),
            faults: Mutex::new(Faults::default()),
            upserts: Mutex::new(Vec::new()),
            available: AtomicBool::new(true),
            clock: AtomicI64::new(0),
        }
    }

    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Fail every push of the named person's signature
    pub fn fail_signature(&self, name: &str) {
        if let Ok(mut faults) = self.faults.lock() {
            faults.signatures.insert(name.trim().to_string());
        }
    }

    /// Fail every push to a bucket
    pub fn fail_bucket(&self, bucket: Bucket) {
        if let Ok(mut faults) = self.faults.lock() {
            faults.buckets.insert(bucket);
        }
    }

    /// Refuse live queries on one partition
    pub fn fail_subscription(&self, bucket: Bucket, scope: Scope) {
        if let Ok(mut faults) = self.faults.lock() {
            faults.subscriptions.insert((bucket, scope));
        }
    }

    pub fn clear_faults(&self) {
        if let Ok(mut faults) = self.faults.lock() {
            *faults = Faults::default();
        }
    }

    /// Accepted upserts, oldest first
    pub fn upserts(&self) -> Vec<UpsertRecord> {
        self.upserts.lock().map(|u| u.clone()).unwrap_or_default()
    }

    pub fn upsert_count(&self, bucket: Bucket) -> usize {
        self.upserts().iter().filter(|u| u.bucket == bucket).count()
    }

    pub fn clear_upserts(&self) {
        if let Ok(mut upserts) = self.upserts.lock() {
            upserts.clear();
        }
    }

    /// Number of stored images
    pub async fn image_count(&self) -> usize {
        self.images.read().await.len()
    }

    /// Live queries still held by a listener
    pub fn subscriber_count(&self) -> usize {
        self.subscribers
            .lock()
            .map(|mut subs| {
                subs.retain(|s| !s.sender.is_closed());
                subs.len()
            })
            .unwrap_or(0)
    }

    pub async fn document(&self, bucket: Bucket, doc_id: &str) -> Option<RemoteDocument> {
        self.collections
            .read()
            .await
            .get(&bucket)
            .and_then(|docs| docs.get(doc_id))
            .map(|fields| RemoteDocument::new(doc_id, fields.clone()))
    }

    /// Store a document verbatim, keeping whatever `updatedAt` it carries
    ///
    /// Stands in for writes made by other devices.
    pub async fn insert_document(&self, bucket: Bucket, doc_id: &str, fields: Fields) {
        let scope = {
            let mut collections = self.collections.write().await;
            let docs = collections.entry(bucket).or_default();
            docs.insert(doc_id.to_string(), fields.clone());
            RemoteDocument::new(doc_id, fields).scope()
        };
        if let Some(scope) = scope {
            self.notify(bucket, scope).await;
        }
    }

    fn next_timestamp(&self) -> Millis {
        let now = now_millis();
        let mut current = self.clock.load(Ordering::SeqCst);
        loop {
            let next = now.max(current + 1);
            match self
                .clock
                .compare_exchange(current, next, Ordering::SeqCst, Ordering::SeqCst)
            {
                Ok(_) => return next,
                Err(actual) => current = actual,
            }
        }
    }

    fn ensure_available(&self) -> Result<()> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(SyncError::unavailable("remote store is offline"))
        }
    }

    async fn matching(&self, bucket: Bucket, scope: Scope) -> Vec<RemoteDocument> {
        let collections = self.collections.read().await;
        let Some(docs) = collections.get(&bucket) else {
            return Vec::new();
        };
        docs.iter()
            .map(|(id, fields)| RemoteDocument::new(id.clone(), fields.clone()))
            .filter(|doc| doc.scope() == Some(scope))
            .collect()
    }

    async fn notify(&self, bucket: Bucket, scope: Scope) {
        let snapshot = self.matching(bucket, scope).await;
        if let Ok(mut subs) = self.subscribers.lock() {
            subs.retain(|sub| {
                if sub.bucket != bucket || sub.scope != scope {
                    return !sub.sender.is_closed();
                }
                sub.sender.send(Ok(snapshot.clone())).is_ok()
            });
        }
    }

    fn check_push_faults(&self, bucket: Bucket, fields: &Fields) -> Result<()> {
        let Ok(faults) = self.faults.lock() else {
            return Ok(());
        };
        if faults.buckets.contains(&bucket) {
            return Err(SyncError::remote(format!("write to {} rejected", bucket.collection())));
        }
        if bucket == Bucket::Signatures {
            let name = fields.get("name").and_then(Value::as_str).unwrap_or_default();
            if faults.signatures.contains(name.trim()) {
                return Err(SyncError::remote(format!("write of signature '{}' rejected", name)));
            }
        }
        Ok(())
    }
}

#[async_trait]
impl RemoteStore for MemoryRemoteStore {
    fn is_available(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }

    async fn query(&self, bucket: Bucket, scope: Scope) -> Result<Vec<RemoteDocument>> {
        self.ensure_available()?;
        Ok(self.matching(bucket, scope).await)
    }

    async fn upsert(&self, bucket: Bucket, doc_id: &str, fields: Fields) -> Result<()> {
        self.ensure_available()?;
        self.check_push_faults(bucket, &fields)?;

        let scope = {
            let mut collections = self.collections.write().await;
            let document = collections
                .entry(bucket)
                .or_default()
                .entry(doc_id.to_string())
                .or_default();
            document.extend(fields);
            document.insert("updatedAt".into(), json!(self.next_timestamp()));
            RemoteDocument::new(doc_id, document.clone()).scope()
        };

        if let Ok(mut upserts) = self.upserts.lock() {
            upserts.push(UpsertRecord {
                bucket,
                doc_id: doc_id.to_string(),
            });
        }

        if let Some(scope) = scope {
            self.notify(bucket, scope).await;
        }
        Ok(())
    }

    async fn subscribe(&self, bucket: Bucket, scope: Scope) -> Result<RemoteSubscription> {
        self.ensure_available()?;
        let refused = self
            .faults
            .lock()
            .map(|f| f.subscriptions.contains(&(bucket, scope)))
            .unwrap_or(false);
        if refused {
            return Err(SyncError::remote(format!(
                "listen on {} for {} denied",
                bucket.collection(),
                scope
            )));
        }

        let (sender, subscription) = RemoteSubscription::channel(bucket, scope);
        let _ = sender.send(Ok(self.matching(bucket, scope).await));
        if let Ok(mut subs) = self.subscribers.lock() {
            subs.push(Subscriber {
                bucket,
                scope,
                sender,
            });
        }
        Ok(subscription)
    }

    async fn upload_image(&self, path: &str, payload: &ImagePayload) -> Result<String> {
        self.ensure_available()?;
        self.images.write().await.insert(path.to_string(), payload.len());
        Ok(format!("memory://{}", path))
    }
}
