//! Client-side sync layer
//!
//! - **`local_store`** - key/value persistence the page reads from
//! - **`remote`** - cloud document store seam and in-memory backend
//! - **`session`** - who is signed in
//! - **`auth`** - cloud login with local-credential fallback
//! - **`sync`** - reconciliation, live listeners, outbound queue, timers

pub mod auth;
pub mod local_store;
pub mod remote;
pub mod session;
pub mod sync;

pub use auth::{AuthManager, CloudAuth, LoginOutcome};
pub use session::{SessionProvider, StaticSession};
pub use sync::{SyncService, SyncServiceBuilder};
