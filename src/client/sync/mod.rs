//! # Sync Service
//!
//! Wires the sync components to one local store, one remote store and one
//! session.
//!
//! ## Architecture
//!
//! - **Reconciliation Engine**: applies remote data locally, newest wins for
//!   records, fill-forward merge for signatures
//! - **Change Listener Registry**: one live query per bucket and scope,
//!   feeding the engine
//! - **Outbound Sync Queue**: debounced, single-flight push of local writes
//! - **Periodic Sync Driver**: startup pull, timed pull and push, visibility
//! - **Network Monitor**: online/offline transitions
//! - **Sync State / Metrics**: status snapshot and counters
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use presensi_sync::client::remote::MemoryRemoteStore;
//! use presensi_sync::client::sync::SyncService;
//!
//! # async fn example() -> presensi_sync::shared::error::Result<()> {
//! let service = SyncService::builder()
//!     .remote(Arc::new(MemoryRemoteStore::new()))
//!     .build()?;
//!
//! service.start().await;
//! service.save_names(vec!["Ahmad".into(), "Budi".into()]).await?;
//!
//! let status = service.status().await;
//! println!("pending: {:?}", status.pending);
//! # Ok(())
//! # }
//! ```

pub mod listeners;
pub mod metrics;
pub mod network_monitor;
pub mod periodic;
pub mod queue;
pub mod reconciliation;
pub mod sync_state;

pub use listeners::{ChangeListenerRegistry, ChangePayload, ChangeSink};
pub use metrics::SyncMetrics;
pub use network_monitor::{Connectivity, NetworkMonitor, NetworkStatus};
pub use periodic::{PeriodicSyncDriver, PullReport};
pub use queue::{FlushReport, OutboundSyncQueue, SignaturePushReport, SkipReason};
pub use reconciliation::{ReconcileOutcome, Reconciliation, ReconciliationEngine, RemoteUpdate};
pub use sync_state::SyncState;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::client::local_store::{LocalState, LocalStore, MemoryLocalStore};
use crate::client::remote::RemoteStore;
use crate::client::session::{SessionProvider, StaticSession};
use crate::shared::config::SyncConfig;
use crate::shared::error::{Result, SyncError};
use crate::shared::event::{ObserverId, ObserverRegistry, SyncObserver};
use crate::shared::model::{Bucket, BucketValue, InfoRecord, Scope, SignatureEntry};

/// Main sync service coordinator
pub struct SyncService {
    config: SyncConfig,
    local: LocalState,
    observers: Arc<ObserverRegistry>,
    network: Arc<NetworkMonitor>,
    engine: Arc<ReconciliationEngine>,
    listeners: ChangeListenerRegistry,
    queue: OutboundSyncQueue,
    periodic: PeriodicSyncDriver,
    running: AtomicBool,
    /// Serializes start/stop
    lifecycle: Mutex<()>,
}

impl std::fmt::Debug for SyncService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncService")
            .field("running", &self.is_running())
            .field("queue", &self.queue)
            .finish_non_exhaustive()
    }
}

impl SyncService {
    pub fn builder() -> SyncServiceBuilder {
        SyncServiceBuilder::default()
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn local(&self) -> &LocalState {
        &self.local
    }

    pub fn engine(&self) -> &Arc<ReconciliationEngine> {
        &self.engine
    }

    pub fn queue(&self) -> &OutboundSyncQueue {
        &self.queue
    }

    pub fn network(&self) -> &Arc<NetworkMonitor> {
        &self.network
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Open live queries, watch local storage and start the timers
    ///
    /// Calling it on a running service does nothing.
    pub async fn start(&self) {
        let _lifecycle = self.lifecycle.lock().await;
        if self.is_running() {
            tracing::debug!("[Sync] Service already running");
            return;
        }

        let listening = self.listeners.subscribe_all().await;
        self.queue.watch_storage();
        self.periodic.start();
        self.running.store(true, Ordering::SeqCst);

        tracing::info!("[Sync] Service started with {} live queries", listening);
    }

    /// Close live queries and cancel every timer; pending buckets survive
    pub async fn stop(&self) {
        let _lifecycle = self.lifecycle.lock().await;
        if !self.is_running() {
            return;
        }

        self.listeners.unsubscribe_all().await;
        self.queue.stop();
        self.periodic.stop();
        self.running.store(false, Ordering::SeqCst);

        tracing::info!("[Sync] Service stopped");
    }

    pub async fn restart(&self) {
        tracing::info!("[Sync] Restarting service");
        self.stop().await;
        self.start().await;
    }

    /// Record a connectivity change
    ///
    /// Coming back online flushes the queue immediately and returns the
    /// report; every other call returns `None`.
    pub async fn set_online(&self, online: bool) -> Option<FlushReport> {
        match self.network.set_online(online) {
            Some(NetworkStatus::Online) => {
                tracing::info!("[Sync] Back online, flushing queue");
                Some(self.queue.flush().await)
            }
            Some(NetworkStatus::Offline) => {
                tracing::info!("[Sync] Offline, pushes paused");
                None
            }
            None => None,
        }
    }

    /// Page visibility changed; ignored while the service is stopped
    pub fn notify_visibility(&self, visible: bool) {
        if !self.is_running() {
            return;
        }
        self.periodic.notify_visibility(visible);
    }

    pub async fn current_scope(&self) -> Scope {
        self.local.current_scope().await
    }

    /// Persist the scope the user is working in
    pub async fn set_scope(&self, scope: Scope) -> Result<()> {
        self.local.set_current_scope(scope).await?;
        tracing::info!("[Sync] Current scope is now {}", scope);
        Ok(())
    }

    /// Read a bucket of the current scope
    pub async fn read(&self, bucket: Bucket) -> Result<BucketValue> {
        let scope = self.current_scope().await;
        self.local.read(bucket, scope).await
    }

    pub async fn save_names(&self, names: Vec<String>) -> Result<()> {
        self.save(BucketValue::Names(names)).await
    }

    pub async fn save_titles(&self, titles: Vec<String>) -> Result<()> {
        self.save(BucketValue::Titles(titles)).await
    }

    pub async fn save_info(&self, info: InfoRecord) -> Result<()> {
        self.save(BucketValue::Info(info)).await
    }

    pub async fn save_date(&self, date: impl Into<String>) -> Result<()> {
        self.save(BucketValue::Date(date.into())).await
    }

    async fn save(&self, value: BucketValue) -> Result<()> {
        let scope = self.current_scope().await;
        {
            let _partition = self.local.lock_partition(value.bucket(), scope).await;
            self.local.write(scope, &value).await?;
        }
        self.queue.enqueue(value.bucket());
        Ok(())
    }

    /// Store one person's signature in the current scope
    ///
    /// Only the supplied fields are overwritten. Returns the stored entry.
    pub async fn record_signature(
        &self,
        name: &str,
        image: Option<String>,
        keterangan: Option<String>,
    ) -> Result<SignatureEntry> {
        let name = name.trim();
        if name.is_empty() {
            return Err(SyncError::validation("name", "Name cannot be empty"));
        }

        let scope = self.current_scope().await;
        let partition = self.local.lock_partition(Bucket::Signatures, scope).await;
        let mut signatures = self.local.signatures(scope).await?;
        let entry = signatures.entry(name.to_string()).or_default();
        if let Some(image) = image {
            entry.image = image;
        }
        if let Some(keterangan) = keterangan {
            entry.keterangan = keterangan;
        }
        let stored = entry.clone();

        self.local
            .write(scope, &BucketValue::Signatures(signatures))
            .await?;
        drop(partition);
        self.queue.enqueue(Bucket::Signatures);

        tracing::debug!("[Sync] Recorded signature for {} in {}", name, scope);
        Ok(stored)
    }

    pub async fn flush(&self) -> FlushReport {
        self.queue.flush().await
    }

    pub async fn pull(&self) -> PullReport {
        self.periodic.pull_current_scope().await
    }

    pub async fn metrics(&self) -> SyncMetrics {
        self.queue.metrics().await
    }

    pub async fn status(&self) -> SyncState {
        SyncState {
            running: self.is_running(),
            is_syncing: self.queue.is_syncing(),
            last_sync: self.queue.last_sync().await,
            current_scope: self.current_scope().await,
            pending: self.queue.pending(),
            network_status: self.network.status(),
            active_listeners: self.listeners.active_count().await,
            errors: self.queue.recent_errors(),
        }
    }

    pub fn register_observer(&self, observer: Arc<dyn SyncObserver>) -> ObserverId {
        self.observers.register(observer)
    }

    pub fn unregister_observer(&self, id: ObserverId) -> bool {
        self.observers.unregister(id)
    }
}

/// Builder for [`SyncService`]
///
/// Only the remote store is required. The local store defaults to an
/// in-memory one, the session to signed out, and the network to online.
#[derive(Default)]
pub struct SyncServiceBuilder {
    config: Option<SyncConfig>,
    local_store: Option<Arc<dyn LocalStore>>,
    remote: Option<Arc<dyn RemoteStore>>,
    session: Option<Arc<dyn SessionProvider>>,
    observers: Option<Arc<ObserverRegistry>>,
    network: Option<Arc<NetworkMonitor>>,
    offline: bool,
}

impl SyncServiceBuilder {
    pub fn config(mut self, config: SyncConfig) -> Self {
        self.config = Some(config);
        self
    }

    pub fn local_store(mut self, store: Arc<dyn LocalStore>) -> Self {
        self.local_store = Some(store);
        self
    }

    pub fn remote(mut self, remote: Arc<dyn RemoteStore>) -> Self {
        self.remote = Some(remote);
        self
    }

    pub fn session(mut self, session: Arc<dyn SessionProvider>) -> Self {
        self.session = Some(session);
        self
    }

    /// Share an observer registry, e.g. with an [`AuthManager`](crate::client::auth::AuthManager)
    pub fn observers(mut self, observers: Arc<ObserverRegistry>) -> Self {
        self.observers = Some(observers);
        self
    }

    /// Share a network monitor; overrides [`online`](Self::online)
    pub fn network(mut self, network: Arc<NetworkMonitor>) -> Self {
        self.network = Some(network);
        self
    }

    /// Initial connectivity
    pub fn online(mut self, online: bool) -> Self {
        self.offline = !online;
        self
    }

    pub fn build(self) -> Result<SyncService> {
        let config = self.config.unwrap_or_default();
        config
            .validate()
            .map_err(|e| SyncError::validation("config", e.to_string()))?;

        let remote = self
            .remote
            .ok_or_else(|| SyncError::validation("remote", "A remote store is required"))?;
        let store: Arc<dyn LocalStore> = match self.local_store {
            Some(store) => store,
            None => Arc::new(MemoryLocalStore::new()),
        };
        let session: Arc<dyn SessionProvider> = match self.session {
            Some(session) => session,
            None => Arc::new(StaticSession::default()),
        };
        let observers = self.observers.unwrap_or_default();

        let local = LocalState::new(store);
        let network = match self.network {
            Some(network) => network,
            None => Arc::new(NetworkMonitor::new(!self.offline, Arc::clone(&observers))),
        };
        let engine = Arc::new(ReconciliationEngine::new(local.clone(), Arc::clone(&observers)));
        let listeners = ChangeListenerRegistry::new(Arc::clone(&remote), engine.clone());
        let queue = OutboundSyncQueue::new(
            config.clone(),
            local.clone(),
            Arc::clone(&remote),
            session,
            network.clone(),
        );
        let periodic = PeriodicSyncDriver::new(
            config.clone(),
            local.clone(),
            remote,
            Arc::clone(&engine),
            queue.clone(),
            network.clone(),
            Arc::clone(&observers),
        );

        Ok(SyncService {
            config,
            local,
            observers,
            network,
            engine,
            listeners,
            queue,
            periodic,
            running: AtomicBool::new(false),
            lifecycle: Mutex::new(()),
        })
    }
}
