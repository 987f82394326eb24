//! Presensi Sync - client-side sync layer for attendance data
//!
//! Keeps a browser-style local key/value store and a cloud document store
//! eventually consistent for attendance sheets: people's names, column
//! titles, free-form info, the attendance date and per-person signatures.
//! Every piece of data belongs to one organisational scope (division x
//! gender); fourteen scopes exist.
//!
//! # Module Structure
//!
//! - **`shared`** - platform-agnostic types
//!   - Scopes, buckets and bucket values
//!   - Events and the observer registry
//!   - Error types and configuration
//!
//! - **`client`** - the in-page sync layer
//!   - Local and remote store seams with in-memory and SQLite backends
//!   - Reconciliation of remote data (newest wins, signatures fill forward)
//!   - Live listeners over every bucket and scope
//!   - Debounced, single-flight outbound queue
//!   - Periodic pull/push and the auth gate
//!
//! # Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use presensi_sync::client::local_store::SqliteLocalStore;
//! use presensi_sync::client::remote::MemoryRemoteStore;
//! use presensi_sync::client::sync::SyncService;
//! use presensi_sync::shared::config::SyncConfig;
//!
//! # async fn example() -> presensi_sync::shared::error::Result<()> {
//! let config = SyncConfig::default();
//! let store = SqliteLocalStore::open(config.database_path()).await?;
//!
//! let service = SyncService::builder()
//!     .config(config)
//!     .local_store(Arc::new(store))
//!     .remote(Arc::new(MemoryRemoteStore::new()))
//!     .build()?;
//! service.start().await;
//! # Ok(())
//! # }
//! ```
//!
//! # Concurrency
//!
//! All components run on tokio. Shared state sits behind `Arc` with tokio
//! locks where a lock is held across store I/O and std locks elsewhere.
//! Background work (live queries, debounce, timers) runs in spawned tasks
//! that are aborted on stop.
//!
//! # Logging
//!
//! Components log through `tracing` with a bracketed tag per component
//! (`[Sync]`, `[Listener]`, `[Queue]`, `[Periodic]`, `[Auth]`). Installing a
//! subscriber is left to the embedding application.

/// Shared types and data structures
pub mod shared;

/// Client-side sync layer
pub mod client;
