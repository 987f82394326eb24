//! Integration tests over a fully wired service

pub mod auth_flow_test;
pub mod sqlite_store_test;
pub mod sync_flow_test;
