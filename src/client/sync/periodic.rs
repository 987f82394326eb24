//! # Periodic Sync Driver
//!
//! Time- and visibility-driven fallback for the event-driven paths.
//!
//! ## Features
//!
//! - **Startup pull**: one pull of the current scope before the cadence
//!   starts, announced with a notice
//! - **Pull loop**: every pull interval, re-fetch the latest record of each
//!   bucket of the current scope and reconcile it
//! - **Push loop**: every push interval, flush the queue if it has work and
//!   no flush is running
//! - **Visibility**: regaining visibility pulls after a short settle delay
//!
//! Connectivity is checked at the moment each pull or push would start.

use std::sync::{Arc, Mutex};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use super::network_monitor::Connectivity;
use super::queue::OutboundSyncQueue;
use super::reconciliation::ReconciliationEngine;
use crate::client::local_store::LocalState;
use crate::client::remote::RemoteStore;
use crate::shared::config::SyncConfig;
use crate::shared::event::{Notice, ObserverRegistry};
use crate::shared::model::{Bucket, Scope};

pub const SYNCED_NOTICE: &str = "Data synchronized from cloud";
pub const SYNC_FAILED_NOTICE: &str = "Auto-sync failed. Please check connection.";

/// Result of pulling one scope
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PullReport {
    pub scope: Option<Scope>,
    /// Buckets whose remote data was applied locally
    pub applied: Vec<Bucket>,
    pub failed: Vec<Bucket>,
    /// Pull abandoned because the network dropped or the remote vanished
    pub interrupted: bool,
}

impl PullReport {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty() && !self.interrupted
    }
}

struct DriverInner {
    config: SyncConfig,
    local: LocalState,
    remote: Arc<dyn RemoteStore>,
    engine: Arc<ReconciliationEngine>,
    queue: OutboundSyncQueue,
    connectivity: Arc<dyn Connectivity>,
    observers: Arc<ObserverRegistry>,
    /// Pull and push loops
    loops: Mutex<Vec<JoinHandle<()>>>,
    /// Pending settled pull after a visibility regain
    visibility: Mutex<Option<JoinHandle<()>>>,
}

#[derive(Clone)]
pub struct PeriodicSyncDriver {
    inner: Arc<DriverInner>,
}

impl std::fmt::Debug for PeriodicSyncDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PeriodicSyncDriver")
            .field("running", &self.is_running())
            .finish()
    }
}

impl PeriodicSyncDriver {
    pub fn new(
        config: SyncConfig,
        local: LocalState,
        remote: Arc<dyn RemoteStore>,
        engine: Arc<ReconciliationEngine>,
        queue: OutboundSyncQueue,
        connectivity: Arc<dyn Connectivity>,
        observers: Arc<ObserverRegistry>,
    ) -> Self {
        Self {
            inner: Arc::new(DriverInner {
                config,
                local,
                remote,
                engine,
                queue,
                connectivity,
                observers,
                loops: Mutex::new(Vec::new()),
                visibility: Mutex::new(None),
            }),
        }
    }

    pub fn is_running(&self) -> bool {
        self.inner
            .loops
            .lock()
            .map(|tasks| tasks.iter().any(|t| !t.is_finished()))
            .unwrap_or(false)
    }

    /// Start the startup pull and both loops; no-op when already running
    pub fn start(&self) {
        if self.is_running() {
            tracing::debug!("[Periodic] Already running");
            return;
        }

        let driver = self.clone();
        let pull_loop = tokio::spawn(async move {
            driver.startup_pull().await;

            let mut interval = tokio::time::interval(driver.inner.config.pull_interval());
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            interval.tick().await;
            loop {
                interval.tick().await;
                if driver.inner.connectivity.is_online() {
                    driver.pull_current_scope().await;
                }
            }
        });

        let driver = self.clone();
        let push_loop = tokio::spawn(async move {
            let mut interval = tokio::time::interval(driver.inner.config.push_interval());
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            interval.tick().await;
            loop {
                interval.tick().await;
                let queue = &driver.inner.queue;
                if driver.inner.connectivity.is_online() && !queue.is_syncing() && !queue.is_empty() {
                    tracing::debug!("[Periodic] Pushing {} pending buckets", queue.pending().len());
                    queue.flush().await;
                }
            }
        });

        if let Ok(mut loops) = self.inner.loops.lock() {
            loops.retain(|t| !t.is_finished());
            loops.push(pull_loop);
            loops.push(push_loop);
        }
        tracing::info!(
            "[Periodic] Started (pull every {:?}, push every {:?})",
            self.inner.config.pull_interval(),
            self.inner.config.push_interval()
        );
    }

    /// Abort the loops and any pending visibility pull
    pub fn stop(&self) {
        if let Some(task) = self.inner.visibility.lock().ok().and_then(|mut v| v.take()) {
            task.abort();
        }
        let loops: Vec<JoinHandle<()>> = self
            .inner
            .loops
            .lock()
            .map(|mut loops| loops.drain(..).collect())
            .unwrap_or_default();
        if loops.is_empty() {
            return;
        }
        for task in loops {
            task.abort();
        }
        tracing::info!("[Periodic] Stopped");
    }

    /// Page visibility changed; becoming visible schedules a settled pull
    ///
    /// Ignored while the driver is stopped. A newer regain replaces a pull
    /// that is still settling.
    pub fn notify_visibility(&self, visible: bool) {
        if !visible {
            return;
        }
        if !self.is_running() {
            tracing::debug!("[Periodic] Not running, ignoring visibility change");
            return;
        }
        let driver = self.clone();
        let settle = self.inner.config.visibility_settle();
        let task = tokio::spawn(async move {
            tokio::time::sleep(settle).await;
            if driver.inner.connectivity.is_online() {
                tracing::debug!("[Periodic] Page visible again, pulling");
                driver.pull_current_scope().await;
            }
        });
        if let Ok(mut pending) = self.inner.visibility.lock() {
            if let Some(previous) = pending.replace(task) {
                previous.abort();
            }
        }
    }

    async fn startup_pull(&self) {
        if !self.inner.connectivity.is_online() || !self.inner.remote.is_available() {
            tracing::info!("[Periodic] Skipping startup pull, remote not reachable");
            return;
        }

        let report = self.pull_current_scope().await;
        let notice = if report.is_success() {
            Notice::success(SYNCED_NOTICE)
        } else {
            Notice::error(SYNC_FAILED_NOTICE)
        };
        self.inner.observers.emit_notice(notice);
    }

    /// Fetch and reconcile every bucket of the current scope
    pub async fn pull_current_scope(&self) -> PullReport {
        let inner = &self.inner;
        let scope = inner.local.current_scope().await;
        let mut report = PullReport {
            scope: Some(scope),
            ..PullReport::default()
        };

        for bucket in Bucket::ALL {
            if !inner.connectivity.is_online() || !inner.remote.is_available() {
                tracing::info!("[Periodic] Pull of {} interrupted", scope);
                report.interrupted = true;
                break;
            }

            let documents = if bucket == Bucket::Signatures {
                inner.remote.query(bucket, scope).await
            } else {
                inner
                    .remote
                    .latest(bucket, scope)
                    .await
                    .map(|latest| latest.into_iter().collect())
            };

            match documents {
                Ok(documents) => {
                    if let Some(result) = inner.engine.reconcile_snapshot(bucket, scope, &documents).await {
                        if result.applied {
                            report.applied.push(bucket);
                        }
                    }
                }
                Err(e) => {
                    tracing::warn!("[Periodic] Error pulling {} for {}: {}", bucket, scope, e);
                    report.failed.push(bucket);
                }
            }
        }

        tracing::debug!("[Periodic] Pulled {}: applied {:?}", scope, report.applied);
        report
    }
}

impl Drop for DriverInner {
    fn drop(&mut self) {
        if let Ok(mut loops) = self.loops.lock() {
            for task in loops.drain(..) {
                task.abort();
            }
        }
        if let Some(task) = self.visibility.lock().ok().and_then(|mut v| v.take()) {
            task.abort();
        }
    }
}
