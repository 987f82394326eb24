//! UI Notification Surface
//!
//! Events produced by the sync layer for the rendering layer, and the
//! observer registry that delivers them. Observers register typed callbacks;
//! there is no ambient event bus.
//!
//! # Events
//!
//! - one bucket event per bucket (`namesUpdate`, `titlesUpdate`, ...) carrying
//!   `{bucketValue, division, gender}`
//! - `networkStatus` carrying `{isOnline}`
//! - `authStateChanged` carrying `{isLoggedIn, user, profile, source}`
//! - `notice` for non-blocking user-facing messages

use serde::Serialize;
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, RwLock};
use uuid::Uuid;

use crate::shared::model::{Bucket, BucketValue, Division, Gender, Scope};
use crate::shared::user::{AuthSource, SessionUser, UserProfile};

/// A bucket changed for the active scope
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BucketUpdate {
    pub bucket_value: BucketValue,
    pub division: Division,
    pub gender: Gender,
}

impl BucketUpdate {
    pub fn new(scope: Scope, value: BucketValue) -> Self {
        Self {
            bucket_value: value,
            division: scope.division,
            gender: scope.gender,
        }
    }

    pub fn bucket(&self) -> Bucket {
        self.bucket_value.bucket()
    }

    pub fn scope(&self) -> Scope {
        Scope::new(self.division, self.gender)
    }
}

/// Session changed
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthStateChange {
    pub is_logged_in: bool,
    pub user: Option<SessionUser>,
    pub profile: Option<UserProfile>,
    pub source: AuthSource,
}

/// Severity of a user-facing notice
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NoticeLevel {
    Success,
    Info,
    Error,
}

/// Non-blocking user-facing message
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
}

impl Notice {
    pub fn success(message: impl Into<String>) -> Self {
        Self { level: NoticeLevel::Success, message: message.into() }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self { level: NoticeLevel::Error, message: message.into() }
    }
}

/// Everything the sync layer tells the UI
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncEvent {
    Bucket(BucketUpdate),
    NetworkStatus { is_online: bool },
    AuthState(AuthStateChange),
    Notice(Notice),
}

impl SyncEvent {
    /// DOM-style event name
    pub fn name(&self) -> &'static str {
        match self {
            SyncEvent::Bucket(update) => update.bucket().event_name(),
            SyncEvent::NetworkStatus { .. } => "networkStatus",
            SyncEvent::AuthState(_) => "authStateChanged",
            SyncEvent::Notice(_) => "notice",
        }
    }

    /// Event detail as JSON
    pub fn detail(&self) -> serde_json::Value {
        let detail = match self {
            SyncEvent::Bucket(update) => serde_json::to_value(update),
            SyncEvent::NetworkStatus { is_online } => Ok(serde_json::json!({ "isOnline": is_online })),
            SyncEvent::AuthState(change) => serde_json::to_value(change),
            SyncEvent::Notice(notice) => serde_json::to_value(notice),
        };
        detail.unwrap_or(serde_json::Value::Null)
    }
}

/// Typed callbacks for sync events
///
/// Every method defaults to a no-op so observers implement only what they
/// render.
pub trait SyncObserver: Send + Sync {
    fn on_bucket_update(&self, _update: &BucketUpdate) {}

    fn on_network_status(&self, _is_online: bool) {}

    fn on_auth_state(&self, _change: &AuthStateChange) {}

    fn on_notice(&self, _notice: &Notice) {}
}

/// Handle returned by [`ObserverRegistry::register`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverId(Uuid);

/// Registered observers
///
/// An observer that panics is logged and skipped; the remaining observers
/// still receive the event.
#[derive(Default)]
pub struct ObserverRegistry {
    observers: RwLock<HashMap<ObserverId, Arc<dyn SyncObserver>>>,
}

impl std::fmt::Debug for ObserverRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObserverRegistry")
            .field("observers", &self.len())
            .finish()
    }
}

impl ObserverRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, observer: Arc<dyn SyncObserver>) -> ObserverId {
        let id = ObserverId(Uuid::new_v4());
        if let Ok(mut observers) = self.observers.write() {
            observers.insert(id, observer);
        }
        id
    }

    pub fn unregister(&self, id: ObserverId) -> bool {
        self.observers
            .write()
            .map(|mut observers| observers.remove(&id).is_some())
            .unwrap_or(false)
    }

    pub fn len(&self) -> usize {
        self.observers.read().map(|o| o.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Deliver an event to every observer
    pub fn emit(&self, event: &SyncEvent) {
        let observers: Vec<Arc<dyn SyncObserver>> = match self.observers.read() {
            Ok(observers) => observers.values().cloned().collect(),
            Err(_) => return,
        };

        tracing::debug!("[Events] Dispatching {} to {} observers", event.name(), observers.len());

        for observer in observers {
            let delivered = catch_unwind(AssertUnwindSafe(|| match event {
                SyncEvent::Bucket(update) => observer.on_bucket_update(update),
                SyncEvent::NetworkStatus { is_online } => observer.on_network_status(*is_online),
                SyncEvent::AuthState(change) => observer.on_auth_state(change),
                SyncEvent::Notice(notice) => observer.on_notice(notice),
            }));
            if delivered.is_err() {
                tracing::error!("[Events] Observer panicked while handling {}", event.name());
            }
        }
    }

    pub fn emit_bucket(&self, scope: Scope, value: BucketValue) {
        self.emit(&SyncEvent::Bucket(BucketUpdate::new(scope, value)));
    }

    pub fn emit_network(&self, is_online: bool) {
        self.emit(&SyncEvent::NetworkStatus { is_online });
    }

    pub fn emit_notice(&self, notice: Notice) {
        self.emit(&SyncEvent::Notice(notice));
    }
}
