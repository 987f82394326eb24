//! Shared Module
//!
//! Platform-agnostic types used by every part of the sync layer: the
//! attendance data model, user identity, UI events, errors and configuration.

/// Scopes, buckets and bucket values
pub mod model;

/// User identity and profiles
pub mod user;

/// UI notification surface
pub mod event;

/// Shared error types
pub mod error;

/// Sync configuration
pub mod config;

/// Re-export commonly used types for convenience
pub use config::{ConfigError, SyncConfig, SyncConfigBuilder};
pub use error::{AuthError, SyncError};
pub use event::{BucketUpdate, Notice, ObserverRegistry, SyncEvent, SyncObserver};
pub use model::{Bucket, BucketValue, Division, Gender, Scope, SignatureEntry, SignatureMap, SyncRecord};
pub use user::{AuthSource, SessionUser, UserProfile};
