//! Property-based tests

pub mod reconcile_proptest;
pub mod signature_proptest;
