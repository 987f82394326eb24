//! Service state persisted through the SQLite local store

use presensi_sync::client::local_store::{LocalState, SqliteLocalStore};
use presensi_sync::client::remote::MemoryRemoteStore;
use presensi_sync::client::sync::SyncService;
use presensi_sync::shared::model::{Bucket, BucketValue, Division, Gender, Scope, SignatureEntry};
use pretty_assertions::assert_eq;
use std::sync::Arc;
use tempfile::TempDir;

use crate::common::*;

#[tokio::test]
async fn test_writes_survive_reopen() {
    init_tracing();
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("nested").join("local.db");
    let scope = Scope::new(Division::Bendum, Gender::Akhwat);

    {
        let store = Arc::new(SqliteLocalStore::open(&path).await.unwrap());
        let service = SyncService::builder()
            .local_store(store.clone())
            .remote(Arc::new(MemoryRemoteStore::new()))
            .build()
            .unwrap();

        service.set_scope(scope).await.unwrap();
        service.save_titles(vec!["Hadir".into()]).await.unwrap();
        service
            .record_signature("Nur", Some("https://img.test/nur.png".into()), Some("izin".into()))
            .await
            .unwrap();
        service.queue().stop();
        store.close().await;
    }

    let reopened = LocalState::new(Arc::new(SqliteLocalStore::open(&path).await.unwrap()));
    assert_eq!(reopened.current_scope().await, scope);
    assert_stored(&reopened, scope, BucketValue::Titles(vec!["Hadir".into()])).await;
    assert_eq!(
        reopened.signatures(scope).await.unwrap().get("Nur"),
        Some(&SignatureEntry::new("https://img.test/nur.png", "izin"))
    );
    assert_untouched(&reopened, Bucket::Names, scope).await;
}
