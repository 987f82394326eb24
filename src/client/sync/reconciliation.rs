//! # Reconciliation Engine
//!
//! Decides whether remote data overwrites the local copy, and is the only
//! writer allowed to do so.
//!
//! ## Merge Policy
//!
//! - **names, titles, date**: whole-value replace when the remote timestamp is
//!   strictly newer than the last one applied for that (bucket, scope)
//! - **info**: same gate; envelope keys are stripped before storing
//! - **signatures**: no timestamp gate; a per-person fill-forward merge that
//!   only ever fills empty fields
//!
//! Both rules are order-independent, so the live listener path and the
//! periodic pull path may race on the same partition and still converge.
//!
//! ## Notifications
//!
//! Applied updates are always persisted, but a bucket event reaches the
//! observers only when the updated scope is the current one.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use presensi_sync::client::sync::reconciliation::{ReconciliationEngine, RemoteUpdate};
//! # use presensi_sync::client::local_store::{LocalState, MemoryLocalStore};
//! # use presensi_sync::shared::event::ObserverRegistry;
//! # use presensi_sync::shared::model::{BucketValue, Scope, SyncRecord};
//! # use std::sync::Arc;
//! # async fn example() {
//! # let local = LocalState::new(Arc::new(MemoryLocalStore::new()));
//! let engine = ReconciliationEngine::new(local, Arc::new(ObserverRegistry::new()));
//! let record = SyncRecord {
//!     scope: Scope::default(),
//!     value: BucketValue::Names(vec!["Alice".into()]),
//!     user_id: None,
//!     user_email: None,
//!     updated_at: 100,
//! };
//! let result = engine.reconcile(Scope::default(), RemoteUpdate::Record(record)).await;
//! assert!(result.applied);
//! # }
//! ```

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

use super::listeners::{ChangePayload, ChangeSink};
use crate::client::local_store::LocalState;
use crate::client::remote::documents::{decode_record, flatten_signatures, select_latest};
use crate::client::remote::RemoteDocument;
use crate::shared::event::{ObserverId, ObserverRegistry, SyncObserver};
use crate::shared::model::{
    now_millis, Bucket, BucketValue, Millis, Scope, SignatureMap, SyncRecord, RESERVED_INFO_KEYS,
};

/// Remote data offered to the engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteUpdate {
    /// Latest record of a non-signature bucket
    Record(SyncRecord),
    /// Flattened signatures of one scope
    Signatures(SignatureMap),
}

impl RemoteUpdate {
    pub fn bucket(&self) -> Bucket {
        match self {
            RemoteUpdate::Record(record) => record.bucket(),
            RemoteUpdate::Signatures(_) => Bucket::Signatures,
        }
    }
}

/// What happened to a remote update
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// Local value overwritten or merged
    Applied,
    /// Remote timestamp not newer than the last applied one
    Stale,
    /// Signature merge found nothing to fill
    Unchanged,
    /// Malformed record, or the local store could not be updated
    Discarded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reconciliation {
    pub bucket: Bucket,
    pub scope: Scope,
    pub applied: bool,
    pub outcome: ReconcileOutcome,
}

impl Reconciliation {
    fn new(bucket: Bucket, scope: Scope, outcome: ReconcileOutcome) -> Self {
        Self {
            bucket,
            scope,
            applied: outcome == ReconcileOutcome::Applied,
            outcome,
        }
    }
}

/// Timestamp-gated, fill-forward reconciliation of remote data
pub struct ReconciliationEngine {
    local: LocalState,
    observers: Arc<ObserverRegistry>,
    /// Last applied remote timestamp per partition; held across each
    /// compare-and-write
    sync_times: Mutex<HashMap<(Bucket, Scope), Millis>>,
}

impl std::fmt::Debug for ReconciliationEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReconciliationEngine")
            .field("observers", &self.observers)
            .finish_non_exhaustive()
    }
}

impl ReconciliationEngine {
    pub fn new(local: LocalState, observers: Arc<ObserverRegistry>) -> Self {
        Self {
            local,
            observers,
            sync_times: Mutex::new(HashMap::new()),
        }
    }

    pub fn observers(&self) -> &Arc<ObserverRegistry> {
        &self.observers
    }

    pub fn register_observer(&self, observer: Arc<dyn SyncObserver>) -> ObserverId {
        self.observers.register(observer)
    }

    pub fn unregister_observer(&self, id: ObserverId) -> bool {
        self.observers.unregister(id)
    }

    /// Last remote timestamp applied to a partition
    pub async fn last_sync_time(&self, bucket: Bucket, scope: Scope) -> Option<Millis> {
        self.sync_times.lock().await.get(&(bucket, scope)).copied()
    }

    /// Offer remote data for one scope
    ///
    /// Never fails: malformed data and local store errors are logged and
    /// reported as [`ReconcileOutcome::Discarded`].
    pub async fn reconcile(&self, scope: Scope, update: RemoteUpdate) -> Reconciliation {
        let bucket = update.bucket();
        let (outcome, value) = match update {
            RemoteUpdate::Record(record) => self.apply_record(scope, record).await,
            RemoteUpdate::Signatures(incoming) => self.merge_signatures(scope, incoming).await,
        };

        if let Some(value) = value {
            if self.local.current_scope().await == scope {
                self.observers.emit_bucket(scope, value);
            } else {
                tracing::debug!("[Sync] Stored {} for background scope {}", bucket, scope);
            }
        }

        Reconciliation::new(bucket, scope, outcome)
    }

    /// Decode and reconcile one non-signature document
    pub async fn reconcile_document(
        &self,
        bucket: Bucket,
        scope: Scope,
        document: &RemoteDocument,
    ) -> Reconciliation {
        match decode_record(bucket, scope, document) {
            Ok(record) => self.reconcile(scope, RemoteUpdate::Record(record)).await,
            Err(e) => {
                tracing::warn!("[Sync] Discarding document {}: {}", document.id, e);
                Reconciliation::new(bucket, scope, ReconcileOutcome::Discarded)
            }
        }
    }

    /// Reconcile a full result set of one partition
    ///
    /// Returns `None` for an empty set.
    pub async fn reconcile_snapshot(
        &self,
        bucket: Bucket,
        scope: Scope,
        documents: &[RemoteDocument],
    ) -> Option<Reconciliation> {
        if documents.is_empty() {
            return None;
        }
        if bucket == Bucket::Signatures {
            let signatures = flatten_signatures(documents);
            return Some(self.reconcile(scope, RemoteUpdate::Signatures(signatures)).await);
        }
        let latest = select_latest(documents)?;
        Some(self.reconcile_document(bucket, scope, latest).await)
    }

    async fn apply_record(
        &self,
        scope: Scope,
        record: SyncRecord,
    ) -> (ReconcileOutcome, Option<BucketValue>) {
        let bucket = record.bucket();
        let key = (bucket, scope);
        let mut sync_times = self.sync_times.lock().await;

        let cached = sync_times.get(&key).copied().unwrap_or(0);
        if record.updated_at <= cached {
            tracing::debug!(
                "[Sync] Ignoring {} for {}: remote {} not newer than {}",
                bucket,
                scope,
                record.updated_at,
                cached
            );
            return (ReconcileOutcome::Stale, None);
        }

        let value = match record.value {
            BucketValue::Info(mut info) => {
                info.retain(|key, _| !RESERVED_INFO_KEYS.contains(&key.as_str()));
                BucketValue::Info(info)
            }
            other => other,
        };

        let _partition = self.local.lock_partition(bucket, scope).await;
        if let Err(e) = self.local.write(scope, &value).await {
            tracing::error!("[Sync] Failed to store remote {} for {}: {}", bucket, scope, e);
            return (ReconcileOutcome::Discarded, None);
        }
        sync_times.insert(key, record.updated_at);

        tracing::info!("[Sync] Applied remote {} for {} ({})", bucket, scope, record.updated_at);
        (ReconcileOutcome::Applied, Some(value))
    }

    async fn merge_signatures(
        &self,
        scope: Scope,
        incoming: SignatureMap,
    ) -> (ReconcileOutcome, Option<BucketValue>) {
        let mut sync_times = self.sync_times.lock().await;
        let _partition = self.local.lock_partition(Bucket::Signatures, scope).await;

        let mut local = match self.local.signatures(scope).await {
            Ok(local) => local,
            Err(e) => {
                tracing::error!("[Sync] Failed to read signatures for {}: {}", scope, e);
                return (ReconcileOutcome::Discarded, None);
            }
        };

        let mut changed = 0usize;
        for (name, entry) in incoming {
            let name = name.trim();
            if name.is_empty() {
                continue;
            }
            match local.get_mut(name) {
                Some(existing) => {
                    if existing.fill_forward(&entry) {
                        changed += 1;
                    }
                }
                None => {
                    local.insert(name.to_string(), entry);
                    changed += 1;
                }
            }
        }

        if changed == 0 {
            return (ReconcileOutcome::Unchanged, None);
        }

        let value = BucketValue::Signatures(local);
        if let Err(e) = self.local.write(scope, &value).await {
            tracing::error!("[Sync] Failed to store merged signatures for {}: {}", scope, e);
            return (ReconcileOutcome::Discarded, None);
        }
        sync_times.insert((Bucket::Signatures, scope), now_millis());

        tracing::info!("[Sync] Merged {} signature entries for {}", changed, scope);
        (ReconcileOutcome::Applied, Some(value))
    }
}

#[async_trait]
impl ChangeSink for ReconciliationEngine {
    async fn on_change(&self, scope: Scope, payload: ChangePayload) {
        match payload {
            ChangePayload::Latest { bucket, document } => {
                self.reconcile_document(bucket, scope, &document).await;
            }
            ChangePayload::Signatures(signatures) => {
                self.reconcile(scope, RemoteUpdate::Signatures(signatures)).await;
            }
        }
    }
}
