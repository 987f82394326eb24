//! # Network Monitor
//!
//! Tracks the platform's connectivity indicator and announces transitions
//! to observers as `networkStatus` events.
//!
//! Sync components never cache the flag; they ask [`Connectivity::is_online`]
//! at the moment they are about to touch the network.

use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::shared::event::ObserverRegistry;

/// Connectivity indicator read at call time
pub trait Connectivity: Send + Sync {
    fn is_online(&self) -> bool;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NetworkStatus {
    Online,
    Offline,
}

impl From<bool> for NetworkStatus {
    fn from(online: bool) -> Self {
        if online {
            NetworkStatus::Online
        } else {
            NetworkStatus::Offline
        }
    }
}

#[derive(Debug)]
pub struct NetworkMonitor {
    online: AtomicBool,
    observers: Arc<ObserverRegistry>,
}

impl NetworkMonitor {
    pub fn new(online: bool, observers: Arc<ObserverRegistry>) -> Self {
        Self {
            online: AtomicBool::new(online),
            observers,
        }
    }

    pub fn status(&self) -> NetworkStatus {
        self.is_online().into()
    }

    /// Record the platform's current connectivity
    ///
    /// Returns the new status when it changed; observers hear about changes
    /// only.
    pub fn set_online(&self, online: bool) -> Option<NetworkStatus> {
        let previous = self.online.swap(online, Ordering::SeqCst);
        if previous == online {
            return None;
        }
        if online {
            tracing::info!("[Network] Back online");
        } else {
            tracing::warn!("[Network] Connection lost, working from local data");
        }
        self.observers.emit_network(online);
        Some(online.into())
    }
}

impl Connectivity for NetworkMonitor {
    fn is_online(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }
}
