//! # Outbound Sync Queue
//!
//! Pushes local mutations to the remote store.
//!
//! ## Features
//!
//! - **De-duplicated pending set**: queueing a bucket that is already
//!   pending is a no-op
//! - **Debounce**: a new pending bucket restarts a short quiet timer; the
//!   flush runs when it elapses
//! - **Single flight**: at most one flush runs at a time; triggers that
//!   arrive meanwhile coalesce into exactly one follow-up flush
//! - **Full resync**: after the pending buckets, every other bucket of the
//!   current scope is pushed too, so each bucket is attempted once per cycle
//! - **Signature batches**: one document per person, pushed sequentially in
//!   fixed-size batches; a failed person never stops the others
//! - **Tab-to-tab events**: writes made through another handle onto the same
//!   local data are picked up and queued
//!
//! ## Usage
//!
//! ```rust,no_run
//! # use presensi_sync::client::sync::queue::OutboundSyncQueue;
//! # use presensi_sync::shared::model::Bucket;
//! # async fn example(queue: OutboundSyncQueue) {
//! queue.enqueue(Bucket::Names);
//! queue.enqueue(Bucket::Names); // still one pending entry
//!
//! let report = queue.flush().await;
//! println!("pushed {:?}", report.pushed);
//! # }
//! ```

use std::collections::hash_map::DefaultHasher;
use std::collections::{BTreeSet, HashMap};
use std::hash::{Hash, Hasher};
use std::sync::{Arc, Mutex};
use tokio::sync::{broadcast, RwLock};
use tokio::task::JoinHandle;

use super::metrics::SyncMetrics;
use super::network_monitor::Connectivity;
use super::sync_state::ErrorLog;
use crate::client::local_store::LocalState;
use crate::client::remote::documents::{
    document_id, record_fields, signature_document_id, signature_fields, signature_image_path,
};
use crate::client::remote::{ImagePayload, RemoteStore};
use crate::client::session::SessionProvider;
use crate::shared::config::SyncConfig;
use crate::shared::error::{Result, SyncError};
use crate::shared::model::{now_millis, Bucket, Scope, SignatureEntry};
use crate::shared::user::SessionUser;

/// Why a flush pushed nothing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    Offline,
    Unavailable,
    Unauthorized,
    /// Another flush was running; a follow-up was scheduled instead
    Coalesced,
}

/// Per-person results of pushing the signatures bucket
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SignaturePushReport {
    pub attempted: usize,
    pub succeeded: usize,
    /// Names whose push failed
    pub failed: Vec<String>,
    pub images_uploaded: usize,
}

/// Outcome of one flush cycle
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FlushReport {
    pub skipped: Option<SkipReason>,
    pub scope: Option<Scope>,
    /// Buckets that were pending when the cycle began
    pub drained: Vec<Bucket>,
    /// Buckets pushed without error, in push order
    pub pushed: Vec<Bucket>,
    pub failed: Vec<(Bucket, SyncError)>,
    pub signatures: Option<SignaturePushReport>,
}

impl FlushReport {
    fn skipped(reason: SkipReason) -> Self {
        Self {
            skipped: Some(reason),
            ..Self::default()
        }
    }

    /// Buckets attempted this cycle, in order
    pub fn attempted(&self) -> Vec<Bucket> {
        let mut attempted: Vec<Bucket> = self.pushed.clone();
        attempted.extend(self.failed.iter().map(|(bucket, _)| *bucket));
        attempted
    }

    pub fn is_success(&self) -> bool {
        self.skipped.is_none() && self.failed.is_empty()
    }
}

#[derive(Debug, Default)]
struct FlightState {
    running: bool,
    follow_up: bool,
}

struct CachedUpload {
    digest: u64,
    url: String,
    size: usize,
}

struct QueueInner {
    local: LocalState,
    remote: Arc<dyn RemoteStore>,
    session: Arc<dyn SessionProvider>,
    connectivity: Arc<dyn Connectivity>,
    config: SyncConfig,
    pending: Mutex<BTreeSet<Bucket>>,
    debounce: Mutex<Option<JoinHandle<()>>>,
    watcher: Mutex<Option<JoinHandle<()>>>,
    flight: Mutex<FlightState>,
    uploads: tokio::sync::Mutex<HashMap<(Scope, String), CachedUpload>>,
    metrics: RwLock<SyncMetrics>,
    last_sync: RwLock<Option<String>>,
    errors: ErrorLog,
}

/// Clears the in-flight flag however the flush ends
/// Clears `running` if a flush is cancelled mid-cycle
struct FlightGuard<'a> {
    flight: &'a Mutex<FlightState>,
    released: bool,
}

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        if let Ok(mut flight) = self.flight.lock() {
            flight.running = false;
        }
    }
}

/// Debounced, single-flight push queue
#[derive(Clone)]
pub struct OutboundSyncQueue {
    inner: Arc<QueueInner>,
}

impl std::fmt::Debug for OutboundSyncQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OutboundSyncQueue")
            .field("pending", &self.pending())
            .field("is_syncing", &self.is_syncing())
            .finish()
    }
}

impl OutboundSyncQueue {
    pub fn new(
        config: SyncConfig,
        local: LocalState,
        remote: Arc<dyn RemoteStore>,
        session: Arc<dyn SessionProvider>,
        connectivity: Arc<dyn Connectivity>,
    ) -> Self {
        Self {
            inner: Arc::new(QueueInner {
                local,
                remote,
                session,
                connectivity,
                config,
                pending: Mutex::new(BTreeSet::new()),
                debounce: Mutex::new(None),
                watcher: Mutex::new(None),
                flight: Mutex::new(FlightState::default()),
                uploads: tokio::sync::Mutex::new(HashMap::new()),
                metrics: RwLock::new(SyncMetrics::new()),
                last_sync: RwLock::new(None),
                errors: ErrorLog::new(),
            }),
        }
    }

    /// Mark a bucket as needing a push and (re)start the debounce timer
    ///
    /// Returns `false` when the bucket was already pending.
    pub fn enqueue(&self, bucket: Bucket) -> bool {
        let inserted = self
            .inner
            .pending
            .lock()
            .map(|mut pending| pending.insert(bucket))
            .unwrap_or(false);

        if !inserted {
            tracing::debug!("[Queue] {} already pending", bucket);
            return false;
        }

        tracing::debug!("[Queue] Queued {}", bucket);
        self.schedule_debounce();
        true
    }

    fn schedule_debounce(&self) {
        let queue = self.clone();
        let delay = self.inner.config.debounce();
        let task = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            // Run detached so a later enqueue cannot abort a flush in progress
            tokio::spawn(async move {
                queue.flush().await;
            });
        });

        if let Ok(mut debounce) = self.inner.debounce.lock() {
            if let Some(previous) = debounce.replace(task) {
                previous.abort();
            }
        }
    }

    /// Pending buckets, sorted
    pub fn pending(&self) -> Vec<Bucket> {
        self.inner
            .pending
            .lock()
            .map(|pending| pending.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.pending().is_empty()
    }

    pub fn is_syncing(&self) -> bool {
        self.inner
            .flight
            .lock()
            .map(|flight| flight.running)
            .unwrap_or(false)
    }

    pub async fn metrics(&self) -> SyncMetrics {
        self.inner.metrics.read().await.clone()
    }

    pub async fn last_sync(&self) -> Option<String> {
        self.inner.last_sync.read().await.clone()
    }

    pub fn recent_errors(&self) -> Vec<String> {
        self.inner.errors.snapshot()
    }

    /// Push pending buckets, then resync the rest of the current scope
    ///
    /// If a flush is already running this schedules one follow-up run and
    /// returns at once with [`SkipReason::Coalesced`]. Otherwise the report
    /// describes the last cycle this call ran.
    pub async fn flush(&self) -> FlushReport {
        {
            let Ok(mut flight) = self.inner.flight.lock() else {
                return FlushReport::skipped(SkipReason::Coalesced);
            };
            if flight.running {
                flight.follow_up = true;
                tracing::debug!("[Queue] Flush in flight, follow-up scheduled");
                return FlushReport::skipped(SkipReason::Coalesced);
            }
            flight.running = true;
        }
        let mut guard = FlightGuard {
            flight: &self.inner.flight,
            released: false,
        };

        loop {
            let report = self.run_cycle().await;

            // Leave flight under the same lock that saw no follow-up
            let again = match self.inner.flight.lock() {
                Ok(mut flight) if flight.follow_up => {
                    flight.follow_up = false;
                    true
                }
                Ok(mut flight) => {
                    flight.running = false;
                    guard.released = true;
                    false
                }
                Err(_) => false,
            };
            if !again {
                return report;
            }
            tracing::debug!("[Queue] Running follow-up flush");
        }
    }

    async fn run_cycle(&self) -> FlushReport {
        let inner = &self.inner;

        if !inner.connectivity.is_online() {
            tracing::info!("[Queue] Offline, keeping {} pending buckets", self.pending().len());
            inner.metrics.write().await.record_flush_skipped();
            return FlushReport::skipped(SkipReason::Offline);
        }
        if !inner.remote.is_available() {
            tracing::info!("[Queue] Remote store unavailable, keeping local changes");
            inner.metrics.write().await.record_flush_skipped();
            return FlushReport::skipped(SkipReason::Unavailable);
        }
        let Some(user) = inner.session.current_user() else {
            tracing::info!("[Queue] No user logged in, skipping remote push");
            inner.metrics.write().await.record_flush_skipped();
            return FlushReport::skipped(SkipReason::Unauthorized);
        };

        inner.metrics.write().await.record_flush_start();

        let drained: Vec<Bucket> = inner
            .pending
            .lock()
            .map(|mut pending| std::mem::take(&mut *pending).into_iter().collect())
            .unwrap_or_default();
        let scope = inner.local.current_scope().await;

        tracing::info!("[Queue] Flushing {:?} for {}", drained, scope);

        let mut report = FlushReport {
            scope: Some(scope),
            drained: drained.clone(),
            ..FlushReport::default()
        };

        let resync = Bucket::ALL.into_iter().filter(|b| !drained.contains(b));
        for bucket in drained.iter().copied().chain(resync) {
            self.push_and_record(bucket, scope, &user, &mut report).await;
        }

        {
            let mut metrics = inner.metrics.write().await;
            if report.failed.is_empty() {
                metrics.record_flush_success();
            } else {
                metrics.record_flush_failure();
            }
        }
        *inner.last_sync.write().await = Some(chrono::Utc::now().to_rfc3339());

        if report.failed.is_empty() {
            tracing::info!("[Queue] Flush complete for {}", scope);
        } else {
            tracing::error!(
                "[Queue] Flush for {} finished with {} failed buckets",
                scope,
                report.failed.len()
            );
        }
        report
    }

    async fn push_and_record(
        &self,
        bucket: Bucket,
        scope: Scope,
        user: &SessionUser,
        report: &mut FlushReport,
    ) {
        let result = match bucket {
            Bucket::Signatures => match self.push_signatures(scope, user).await {
                Ok(signatures) => {
                    let failed = signatures.failed.len();
                    let total = signatures.attempted;
                    report.signatures = Some(signatures);
                    if failed == 0 {
                        Ok(())
                    } else {
                        Err(SyncError::PartialFailure { failed, total })
                    }
                }
                Err(e) => Err(e),
            },
            _ => self.push_record(bucket, scope, user).await,
        };

        match result {
            Ok(()) => {
                tracing::debug!("[Queue] Pushed {} for {}", bucket, scope);
                report.pushed.push(bucket);
            }
            Err(e) => {
                tracing::error!("[Queue] Error syncing {} for {}: {}", bucket, scope, e);
                self.inner.errors.push(format!("{} ({}): {}", bucket, scope, e));
                if e != SyncError::Unauthorized {
                    // Retried by the next push cycle; no debounce restart
                    if let Ok(mut pending) = self.inner.pending.lock() {
                        pending.insert(bucket);
                    }
                }
                report.failed.push((bucket, e));
            }
        }
    }

    async fn push_record(&self, bucket: Bucket, scope: Scope, user: &SessionUser) -> Result<()> {
        let value = self.inner.local.read(bucket, scope).await?;
        let fields = record_fields(scope, &value, user)?;
        self.inner
            .remote
            .upsert(bucket, &document_id(bucket, scope, &user.uid), fields)
            .await
    }

    async fn push_signatures(&self, scope: Scope, user: &SessionUser) -> Result<SignaturePushReport> {
        let signatures = self.inner.local.signatures(scope).await?;
        let entries: Vec<(String, SignatureEntry)> = signatures
            .into_iter()
            .filter(|(name, _)| !name.trim().is_empty())
            .collect();

        let batch_size = self.inner.config.signature_batch_size.max(1);
        let mut report = SignaturePushReport {
            attempted: entries.len(),
            ..SignaturePushReport::default()
        };

        tracing::info!("[Queue] Syncing {} signatures for {}", entries.len(), scope);

        for (index, batch) in entries.chunks(batch_size).enumerate() {
            for (name, entry) in batch {
                let result = self.push_signature(scope, name, entry, user, &mut report).await;
                self.inner
                    .metrics
                    .write()
                    .await
                    .record_signature_push(result.is_ok());
                match result {
                    Ok(()) => report.succeeded += 1,
                    Err(e) => {
                        tracing::warn!("[Queue] Failed to sync signature for \"{}\": {}", name, e);
                        report.failed.push(name.clone());
                    }
                }
            }
            tracing::debug!("[Queue] Signature batch {} done ({} entries)", index + 1, batch.len());
        }

        Ok(report)
    }

    async fn push_signature(
        &self,
        scope: Scope,
        name: &str,
        entry: &SignatureEntry,
        user: &SessionUser,
        report: &mut SignaturePushReport,
    ) -> Result<()> {
        let mut fields = signature_fields(scope, name, entry, user, &self.inner.config.app_version);

        if !entry.image.is_empty() {
            match self.resolve_image(scope, name, &entry.image, user, report).await {
                Ok((url, size)) => {
                    fields.insert("signatureUrl".into(), url.into());
                    if let Some(size) = size {
                        fields.insert("imageSize".into(), size.into());
                    }
                }
                Err(e) => {
                    // The document is still saved without an image reference
                    tracing::warn!("[Queue] Image upload failed for \"{}\": {}", name, e);
                    fields.insert("imageError".into(), e.to_string().into());
                }
            }
        }

        self.inner
            .remote
            .upsert(
                Bucket::Signatures,
                &signature_document_id(scope, name, &user.uid),
                fields,
            )
            .await
    }

    /// Reference URL for a signature image, uploading data URLs once
    async fn resolve_image(
        &self,
        scope: Scope,
        name: &str,
        image: &str,
        user: &SessionUser,
        report: &mut SignaturePushReport,
    ) -> Result<(String, Option<usize>)> {
        let Some(payload) = ImagePayload::from_data_url(image)? else {
            return Ok((image.to_string(), None));
        };

        let digest = {
            let mut hasher = DefaultHasher::new();
            image.hash(&mut hasher);
            hasher.finish()
        };
        let key = (scope, name.trim().to_string());

        let mut uploads = self.inner.uploads.lock().await;
        if let Some(cached) = uploads.get(&key) {
            if cached.digest == digest {
                return Ok((cached.url.clone(), Some(cached.size)));
            }
        }

        let path = signature_image_path(&user.uid, scope, name.trim(), now_millis());
        let url = self.inner.remote.upload_image(&path, &payload).await?;
        tracing::debug!("[Queue] Uploaded signature image for \"{}\" to {}", name, path);

        report.images_uploaded += 1;
        self.inner.metrics.write().await.record_image_upload();
        uploads.insert(
            key,
            CachedUpload {
                digest,
                url: url.clone(),
                size: payload.len(),
            },
        );
        Ok((url, Some(payload.len())))
    }

    /// Queue buckets written through other handles onto the same local data
    pub fn watch_storage(&self) {
        let store = Arc::clone(self.inner.local.store());
        let Some(mut events) = store.changes() else {
            tracing::debug!("[Queue] Local store publishes no change events");
            return;
        };
        let own_origin = store.origin();
        let queue = self.clone();

        let task = tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(event) => {
                        if event.origin == own_origin {
                            continue;
                        }
                        if let Some(bucket) = Bucket::from_storage_key(&event.key) {
                            tracing::debug!("[Queue] {} changed in another tab", event.key);
                            queue.enqueue(bucket);
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        tracing::warn!("[Queue] Missed {} storage events, queueing everything", missed);
                        for bucket in Bucket::ALL {
                            queue.enqueue(bucket);
                        }
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });

        if let Ok(mut watcher) = self.inner.watcher.lock() {
            if let Some(previous) = watcher.replace(task) {
                previous.abort();
            }
        }
    }

    /// Cancel the debounce timer and the storage watcher
    ///
    /// Pending buckets are kept for the next start.
    pub fn stop(&self) {
        if let Ok(mut debounce) = self.inner.debounce.lock() {
            if let Some(task) = debounce.take() {
                task.abort();
            }
        }
        if let Ok(mut watcher) = self.inner.watcher.lock() {
            if let Some(task) = watcher.take() {
                task.abort();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::local_store::{LocalStore, MemoryLocalStore};
    use crate::client::remote::{Fields, MemoryRemoteStore, RemoteDocument, RemoteSubscription};
    use crate::client::session::StaticSession;
    use crate::client::sync::network_monitor::NetworkMonitor;
    use crate::shared::event::ObserverRegistry;
    use crate::shared::model::{BucketValue, SignatureMap};
    use std::time::Duration;

    struct Fixture {
        queue: OutboundSyncQueue,
        local: LocalState,
        store: Arc<MemoryLocalStore>,
        remote: Arc<MemoryRemoteStore>,
        network: Arc<NetworkMonitor>,
        session: Arc<StaticSession>,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(MemoryLocalStore::new());
        let local = LocalState::new(store.clone());
        let remote = Arc::new(MemoryRemoteStore::new());
        let network = Arc::new(NetworkMonitor::new(true, Arc::new(ObserverRegistry::new())));
        let session = Arc::new(StaticSession::signed_in(SessionUser::new(
            "u1",
            "osis@mail.test",
            "osis",
        )));
        let queue = OutboundSyncQueue::new(
            SyncConfig::default(),
            local.clone(),
            remote.clone(),
            session.clone(),
            network.clone(),
        );
        Fixture {
            queue,
            local,
            store,
            remote,
            network,
            session,
        }
    }

    #[tokio::test]
    async fn test_enqueue_deduplicates() {
        let f = fixture();
        assert!(f.queue.enqueue(Bucket::Names));
        assert!(!f.queue.enqueue(Bucket::Names));
        assert!(f.queue.enqueue(Bucket::Date));
        assert_eq!(f.queue.pending(), vec![Bucket::Names, Bucket::Date]);
        f.queue.stop();
    }

    #[tokio::test]
    async fn test_flush_pushes_each_bucket_once() {
        let f = fixture();
        f.local
            .write(Scope::default(), &BucketValue::Names(vec!["Alice".into()]))
            .await
            .unwrap();
        for _ in 0..5 {
            f.queue.enqueue(Bucket::Names);
        }
        f.queue.stop();

        let report = f.queue.flush().await;

        assert!(report.is_success());
        assert_eq!(report.drained, vec![Bucket::Names]);
        assert_eq!(report.pushed[0], Bucket::Names);
        assert_eq!(report.pushed.len(), 5);
        assert_eq!(f.remote.upsert_count(Bucket::Names), 1);
        assert!(f.queue.is_empty());

        let doc = f
            .remote
            .document(Bucket::Names, "Khusus_Ikhwan_names_u1")
            .await
            .unwrap();
        assert_eq!(doc.fields["names"], serde_json::json!(["Alice"]));
        assert_eq!(doc.str_field("userEmail"), Some("osis@mail.test"));
    }

    #[tokio::test]
    async fn test_offline_flush_keeps_pending() {
        let f = fixture();
        f.queue.enqueue(Bucket::Titles);
        f.queue.stop();
        f.network.set_online(false);

        let report = f.queue.flush().await;
        assert_eq!(report.skipped, Some(SkipReason::Offline));
        assert_eq!(f.queue.pending(), vec![Bucket::Titles]);
        assert!(f.remote.upserts().is_empty());
        assert!(!f.queue.is_syncing());
    }

    #[tokio::test]
    async fn test_signed_out_flush_skips_remote() {
        let f = fixture();
        f.session.set_user(None);
        f.queue.enqueue(Bucket::Info);
        f.queue.stop();

        let report = f.queue.flush().await;
        assert_eq!(report.skipped, Some(SkipReason::Unauthorized));
        assert_eq!(f.queue.pending(), vec![Bucket::Info]);
    }

    #[tokio::test]
    async fn test_signature_failures_are_isolated() {
        let f = fixture();
        let scope = Scope::default();
        let mut signatures = SignatureMap::new();
        for name in ["A1", "A2", "A3", "A4", "A5", "A6", "A7"] {
            signatures.insert(name.to_string(), SignatureEntry::new("", "hadir"));
        }
        f.local.write(scope, &BucketValue::Signatures(signatures)).await.unwrap();
        f.remote.fail_signature("A3");

        let report = f.queue.flush().await;
        let signatures = report.signatures.clone().unwrap();

        assert_eq!(signatures.attempted, 7);
        assert_eq!(signatures.succeeded, 6);
        assert_eq!(signatures.failed, vec!["A3".to_string()]);
        assert_eq!(f.remote.upsert_count(Bucket::Signatures), 6);
        assert!(matches!(
            report.failed.as_slice(),
            [(Bucket::Signatures, SyncError::PartialFailure { failed: 1, total: 7 })]
        ));
        assert_eq!(f.queue.pending(), vec![Bucket::Signatures]);
        assert_eq!(f.queue.metrics().await.signature_failures, 1);
    }

    #[tokio::test]
    async fn test_signature_image_uploaded_once() {
        let f = fixture();
        let scope = Scope::default();
        let mut signatures = SignatureMap::new();
        signatures.insert(
            "Siti Aisyah".to_string(),
            SignatureEntry::new("data:image/png;base64,aGVsbG8=", ""),
        );
        f.local.write(scope, &BucketValue::Signatures(signatures)).await.unwrap();

        f.queue.flush().await;
        f.queue.flush().await;

        assert_eq!(f.remote.image_count().await, 1);
        let doc = f
            .remote
            .document(Bucket::Signatures, "Khusus_Ikhwan_Siti_Aisyah_u1")
            .await
            .unwrap();
        assert!(doc.str_field("signatureUrl").unwrap().starts_with("memory://signatures/u1/Khusus/Ikhwan/"));
        assert_eq!(doc.fields["imageSize"], 5);
        assert_eq!(doc.fields["hasImage"], true);
        assert_eq!(doc.str_field("name"), Some("Siti Aisyah"));
    }

    #[tokio::test]
    async fn test_bad_image_still_saves_document() {
        let f = fixture();
        let mut signatures = SignatureMap::new();
        signatures.insert("Budi".to_string(), SignatureEntry::new("data:image/png;base64,@@", "sakit"));
        f.local
            .write(Scope::default(), &BucketValue::Signatures(signatures))
            .await
            .unwrap();

        let report = f.queue.flush().await;
        assert!(report.is_success());
        let doc = f
            .remote
            .document(Bucket::Signatures, "Khusus_Ikhwan_Budi_u1")
            .await
            .unwrap();
        assert!(doc.fields.contains_key("imageError"));
        assert_eq!(doc.str_field("keterangan"), Some("sakit"));
    }

    #[tokio::test]
    async fn test_failed_bucket_is_requeued() {
        let f = fixture();
        f.remote.fail_bucket(Bucket::Date);

        let report = f.queue.flush().await;
        assert_eq!(report.failed.len(), 1);
        assert_eq!(f.queue.pending(), vec![Bucket::Date]);
        assert_eq!(f.queue.recent_errors().len(), 1);
        assert!(!f.queue.is_syncing());
    }

    #[tokio::test(start_paused = true)]
    async fn test_debounce_flushes_after_quiet_period() {
        let f = fixture();
        f.queue.enqueue(Bucket::Names);
        tokio::time::sleep(Duration::from_millis(600)).await;
        f.queue.enqueue(Bucket::Titles);
        tokio::time::sleep(Duration::from_millis(600)).await;
        assert!(f.remote.upserts().is_empty());

        tokio::time::sleep(Duration::from_millis(600)).await;
        assert_eq!(f.remote.upsert_count(Bucket::Names), 1);
        assert_eq!(f.remote.upsert_count(Bucket::Titles), 1);
        assert!(f.queue.is_empty());
    }

    #[tokio::test]
    async fn test_storage_events_from_other_tabs() {
        let f = fixture();
        f.queue.watch_storage();
        let other_tab = f.store.attach_tab();

        f.local
            .write(Scope::default(), &BucketValue::Date("2024-05-01".into()))
            .await
            .unwrap();
        other_tab
            .set("Khusus_Ikhwan_reportTitles", "[\"Rapat\"]")
            .await
            .unwrap();
        other_tab.set("currentDivision", "Sekum").await.unwrap();

        for _ in 0..10 {
            if !f.queue.is_empty() {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert_eq!(f.queue.pending(), vec![Bucket::Titles]);
        f.queue.stop();
    }

    /// Remote whose upserts take a while, to hold a flush open
    struct SlowUpserts {
        inner: Arc<MemoryRemoteStore>,
        delay: Duration,
    }

    #[async_trait::async_trait]
    impl RemoteStore for SlowUpserts {
        async fn query(&self, bucket: Bucket, scope: Scope) -> Result<Vec<RemoteDocument>> {
            self.inner.query(bucket, scope).await
        }

        async fn upsert(&self, bucket: Bucket, doc_id: &str, fields: Fields) -> Result<()> {
            tokio::time::sleep(self.delay).await;
            self.inner.upsert(bucket, doc_id, fields).await
        }

        async fn subscribe(&self, bucket: Bucket, scope: Scope) -> Result<RemoteSubscription> {
            self.inner.subscribe(bucket, scope).await
        }

        async fn upload_image(&self, path: &str, payload: &ImagePayload) -> Result<String> {
            self.inner.upload_image(path, payload).await
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_enqueue_during_flush_runs_one_follow_up() {
        let f = fixture();
        let queue = OutboundSyncQueue::new(
            SyncConfig::default(),
            f.local.clone(),
            Arc::new(SlowUpserts {
                inner: f.remote.clone(),
                delay: Duration::from_millis(50),
            }),
            f.session.clone(),
            f.network.clone(),
        );
        let scope = Scope::default();
        f.local
            .write(scope, &BucketValue::Names(vec!["Alice".into()]))
            .await
            .unwrap();
        queue.enqueue(Bucket::Names);
        queue.stop();

        let in_flight = tokio::spawn({
            let queue = queue.clone();
            async move { queue.flush().await }
        });
        for _ in 0..10 {
            if queue.is_syncing() {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert!(queue.is_syncing());

        f.local
            .write(scope, &BucketValue::Titles(vec!["Rapat".into()]))
            .await
            .unwrap();
        queue.enqueue(Bucket::Titles);
        queue.stop();
        assert_eq!(queue.flush().await.skipped, Some(SkipReason::Coalesced));
        assert_eq!(queue.flush().await.skipped, Some(SkipReason::Coalesced));

        let report = in_flight.await.unwrap();

        assert!(report.is_success());
        assert_eq!(report.drained, vec![Bucket::Titles]);
        assert_eq!(queue.metrics().await.total_flushes, 2);
        assert_eq!(f.remote.upsert_count(Bucket::Titles), 2);
        assert!(queue.is_empty());
        assert!(!queue.is_syncing());
    }

    #[tokio::test]
    async fn test_back_to_back_flushes_both_run() {
        let f = fixture();
        f.queue.flush().await;
        assert!(!f.queue.is_syncing());

        let report = f.queue.flush().await;
        assert_eq!(report.skipped, None);
        assert_eq!(f.queue.metrics().await.total_flushes, 2);
    }
}
