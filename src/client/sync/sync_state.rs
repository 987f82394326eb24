//! # Sync State
//!
//! Point-in-time snapshot of the sync layer for status displays, and the
//! bounded log of recent failures it reports.

use serde::Serialize;
use std::collections::VecDeque;
use std::sync::Mutex;

use super::network_monitor::NetworkStatus;
use crate::shared::model::{Bucket, Scope};

/// Failures kept for display
pub const MAX_RECENT_ERRORS: usize = 20;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SyncState {
    /// Whether the service has been started
    pub running: bool,
    /// A flush is in flight
    pub is_syncing: bool,
    /// RFC 3339 time of the last completed flush
    pub last_sync: Option<String>,
    pub current_scope: Scope,
    pub pending: Vec<Bucket>,
    pub network_status: NetworkStatus,
    /// Live queries currently open
    pub active_listeners: usize,
    pub errors: Vec<String>,
}

/// Bounded, oldest-first log of failure messages
#[derive(Debug, Default)]
pub struct ErrorLog {
    entries: Mutex<VecDeque<String>>,
}

impl ErrorLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, message: impl Into<String>) {
        if let Ok(mut entries) = self.entries.lock() {
            if entries.len() == MAX_RECENT_ERRORS {
                entries.pop_front();
            }
            entries.push_back(message.into());
        }
    }

    pub fn snapshot(&self) -> Vec<String> {
        self.entries
            .lock()
            .map(|e| e.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn clear(&self) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.clear();
        }
    }
}
