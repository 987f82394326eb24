//! Common test utilities and helpers
//!
//! - Tracing setup
//! - Wired-up service fixtures
//! - Remote document builders
//! - Recording observer and assertion helpers

pub mod assertions;
pub mod fixtures;

pub use assertions::*;
pub use fixtures::*;
