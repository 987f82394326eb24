//! Assertion helpers for local and remote state

use presensi_sync::client::local_store::LocalState;
use presensi_sync::client::remote::MemoryRemoteStore;
use presensi_sync::shared::model::{Bucket, BucketValue, Scope};
use pretty_assertions::assert_eq;

/// Assert the locally stored value of a bucket
pub async fn assert_stored(local: &LocalState, scope: Scope, expected: BucketValue) {
    let bucket = expected.bucket();
    let actual = match local.read(bucket, scope).await {
        Ok(value) => value,
        Err(e) => panic!("Failed to read {} for {}: {:?}", bucket, scope, e),
    };
    assert_eq!(actual, expected, "local {} for {}", bucket, scope);
}

/// Assert that a bucket holds its empty value locally
pub async fn assert_untouched(local: &LocalState, bucket: Bucket, scope: Scope) {
    assert_stored(local, scope, BucketValue::empty(bucket)).await;
}

/// Assert how many upserts a bucket received
pub fn assert_pushes(remote: &MemoryRemoteStore, bucket: Bucket, expected: usize) {
    let actual = remote.upsert_count(bucket);
    assert!(
        actual == expected,
        "Expected {} pushes to {}, got {}",
        expected,
        bucket.collection(),
        actual
    );
}
