//! # Remote Store Module
//!
//! Document-oriented remote storage: one collection per bucket, documents
//! filtered by `division`/`gender`, live snapshots per (bucket, scope) and
//! upsert-with-merge writes stamped by the server with `updatedAt`.
//!
//! ## Key Components
//!
//! - `RemoteStore`: the adapter trait the sync layer consumes
//! - `RemoteDocument`: a document id plus its JSON fields
//! - `RemoteSubscription`: a live query, cancelled by dropping it
//! - `documents.rs`: document ids, field encoding and record decoding
//! - `memory.rs`: in-process remote with server timestamps and fault injection
//!
//! No wire client lives here; a Firestore or HTTP backend implements
//! [`RemoteStore`] outside this crate.

pub mod documents;
pub mod memory;

pub use documents::{flatten_signatures, select_latest, ImagePayload};
pub use memory::MemoryRemoteStore;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::mpsc;

use crate::shared::error::Result;
use crate::shared::model::{Bucket, Millis, Scope};

/// Field map of a remote document
pub type Fields = serde_json::Map<String, Value>;

/// A document as read from the remote store
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteDocument {
    pub id: String,
    pub fields: Fields,
}

impl RemoteDocument {
    pub fn new(id: impl Into<String>, fields: Fields) -> Self {
        Self {
            id: id.into(),
            fields,
        }
    }

    pub fn str_field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).and_then(Value::as_str)
    }

    /// Server update time in epoch millis; 0 when absent or unreadable
    ///
    /// Accepts epoch millis, an RFC 3339 string, or a `{seconds, nanoseconds}`
    /// timestamp object.
    pub fn updated_at(&self) -> Millis {
        match self.fields.get("updatedAt") {
            Some(Value::Number(n)) => n
                .as_i64()
                .or_else(|| n.as_f64().map(|f| f as i64))
                .unwrap_or(0),
            Some(Value::String(s)) => chrono::DateTime::parse_from_rfc3339(s)
                .map(|dt| dt.timestamp_millis())
                .unwrap_or(0),
            Some(Value::Object(ts)) => {
                let seconds = ts.get("seconds").and_then(Value::as_i64).unwrap_or(0);
                let nanos = ts.get("nanoseconds").and_then(Value::as_i64).unwrap_or(0);
                seconds
                    .checked_mul(1_000)
                    .and_then(|millis| millis.checked_add(nanos / 1_000_000))
                    .unwrap_or(0)
            }
            _ => 0,
        }
    }

    /// Scope named by the document's `division` and `gender` fields
    pub fn scope(&self) -> Option<Scope> {
        let division = self.str_field("division")?.parse().ok()?;
        let gender = self.str_field("gender")?.parse().ok()?;
        Some(Scope::new(division, gender))
    }
}

/// One live-query notification: the full result set, or the listener error
pub type Snapshot = Result<Vec<RemoteDocument>>;

/// Sending half of a live query, held by the remote backend
pub type SnapshotSender = mpsc::UnboundedSender<Snapshot>;

/// A live query on one (bucket, scope) partition
///
/// Dropping the subscription unsubscribes; the backend notices the closed
/// channel on its next notification.
#[derive(Debug)]
pub struct RemoteSubscription {
    bucket: Bucket,
    scope: Scope,
    receiver: mpsc::UnboundedReceiver<Snapshot>,
}

impl RemoteSubscription {
    /// Create a subscription and the sender the backend feeds it through
    pub fn channel(bucket: Bucket, scope: Scope) -> (SnapshotSender, Self) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (
            sender,
            Self {
                bucket,
                scope,
                receiver,
            },
        )
    }

    pub fn bucket(&self) -> Bucket {
        self.bucket
    }

    pub fn scope(&self) -> Scope {
        self.scope
    }

    /// Next snapshot, or `None` once the backend closed the query
    pub async fn next(&mut self) -> Option<Snapshot> {
        self.receiver.recv().await
    }
}

/// Remote document store
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Whether the backend is configured and reachable
    fn is_available(&self) -> bool {
        true
    }

    /// All documents of a (bucket, scope) partition
    async fn query(&self, bucket: Bucket, scope: Scope) -> Result<Vec<RemoteDocument>>;

    /// Most recent document of a partition
    async fn latest(&self, bucket: Bucket, scope: Scope) -> Result<Option<RemoteDocument>> {
        let documents = self.query(bucket, scope).await?;
        Ok(select_latest(&documents).cloned())
    }

    /// Merge `fields` into a document, creating it if needed
    ///
    /// The backend stamps `updatedAt` with its own clock.
    async fn upsert(&self, bucket: Bucket, doc_id: &str, fields: Fields) -> Result<()>;

    /// Open a live query; the current result set is delivered first
    async fn subscribe(&self, bucket: Bucket, scope: Scope) -> Result<RemoteSubscription>;

    /// Store an image and return its reference URL
    async fn upload_image(&self, path: &str, payload: &ImagePayload) -> Result<String>;
}
