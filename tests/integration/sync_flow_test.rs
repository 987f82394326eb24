//! End-to-end sync behaviour against the in-memory stores

use presensi_sync::client::local_store::LocalState;
use presensi_sync::client::remote::RemoteDocument;
use presensi_sync::client::sync::{ReconcileOutcome, SignaturePushReport, SkipReason};
use presensi_sync::shared::event::Notice;
use presensi_sync::shared::model::{
    Bucket, BucketValue, Division, Gender, InfoRecord, Scope, SignatureEntry,
};
use pretty_assertions::assert_eq;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

use crate::common::*;

fn names(values: &[&str]) -> BucketValue {
    BucketValue::Names(values.iter().map(|v| v.to_string()).collect())
}

#[tokio::test]
async fn test_live_change_lands_in_its_own_scope() {
    let h = TestHarness::new();
    let sekum = Scope::new(Division::Sekum, Gender::Akhwat);
    h.service.start().await;

    h.remote
        .insert_document(Bucket::Names, "other_device", names_doc(sekum, &["Siti"], 100))
        .await;

    assert!(wait_for_value(&h.local, sekum, &names(&["Siti"])).await);
    assert_untouched(&h.local, Bucket::Names, Scope::default()).await;
    assert!(h.observer.bucket_updates().iter().all(|u| u.scope() != sekum));
    h.service.stop().await;
}

#[tokio::test]
async fn test_live_change_in_current_scope_notifies() {
    let h = TestHarness::new();
    h.service.start().await;

    h.remote
        .insert_document(
            Bucket::Titles,
            "other_device",
            titles_doc(Scope::default(), &["Hadir", "Izin"], 100),
        )
        .await;

    assert!(
        wait_until(|| h
            .observer
            .bucket_updates()
            .iter()
            .any(|u| u.bucket() == Bucket::Titles && u.scope() == Scope::default()))
        .await
    );
    assert_stored(
        &h.local,
        Scope::default(),
        BucketValue::Titles(vec!["Hadir".into(), "Izin".into()]),
    )
    .await;
    h.service.stop().await;
}

#[tokio::test]
async fn test_older_remote_document_is_ignored() {
    let h = TestHarness::new();
    let scope = Scope::default();
    h.service.start().await;

    h.remote
        .insert_document(Bucket::Names, "newer", names_doc(scope, &["Baru"], 200))
        .await;
    assert!(wait_for_value(&h.local, scope, &names(&["Baru"])).await);

    let older = RemoteDocument::new("older", names_doc(scope, &["Lama"], 100));
    let result = h
        .service
        .engine()
        .reconcile_document(Bucket::Names, scope, &older)
        .await;

    assert_eq!(result.outcome, ReconcileOutcome::Stale);
    assert_stored(&h.local, scope, names(&["Baru"])).await;
    h.service.stop().await;
}

#[tokio::test]
async fn test_info_envelope_is_stripped() {
    let h = TestHarness::new();
    let scope = Scope::default();
    h.service.start().await;

    h.remote
        .insert_document(
            Bucket::Info,
            "other_device",
            info_doc(scope, json!({ "kelas": "XII IPA", "wali": "Pak Budi" }), 10),
        )
        .await;

    let expected: InfoRecord = [("kelas", "XII IPA"), ("wali", "Pak Budi")]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    assert!(wait_for_value(&h.local, scope, &BucketValue::Info(expected)).await);
    h.service.stop().await;
}

#[tokio::test]
async fn test_remote_signature_fills_only_empty_fields() {
    let h = TestHarness::new();
    let scope = Scope::default();
    h.service
        .record_signature("Ahmad", Some("local-image".into()), None)
        .await
        .unwrap();
    h.service.queue().stop();

    h.remote
        .insert_document(
            Bucket::Signatures,
            "other_device_ahmad",
            signature_doc(scope, "Ahmad", "remote-image", "hadir", 50),
        )
        .await;
    h.service.start().await;

    let mut expected = presensi_sync::shared::model::SignatureMap::new();
    expected.insert("Ahmad".into(), SignatureEntry::new("local-image", "hadir"));
    assert!(wait_for_value(&h.local, scope, &BucketValue::Signatures(expected)).await);
    h.service.stop().await;
}

#[tokio::test]
async fn test_signature_batch_isolates_failures() {
    let h = TestHarness::new();
    for i in 1..=7 {
        h.service
            .record_signature(&format!("A{}", i), None, Some("hadir".into()))
            .await
            .unwrap();
    }
    h.service.queue().stop();
    h.remote.fail_signature("A3");

    let report = h.service.flush().await;

    assert_eq!(
        report.signatures,
        Some(SignaturePushReport {
            attempted: 7,
            succeeded: 6,
            failed: vec!["A3".to_string()],
            images_uploaded: 0,
        })
    );
    assert_pushes(&h.remote, Bucket::Signatures, 6);
    assert_eq!(h.service.queue().pending(), vec![Bucket::Signatures]);

    h.remote.clear_faults();
    let report = h.service.flush().await;
    assert!(report.is_success());
    assert_pushes(&h.remote, Bucket::Signatures, 13);
    assert!(h.service.queue().is_empty());
}

#[tokio::test]
async fn test_repeated_writes_push_once() {
    let h = TestHarness::new();
    h.service.save_names(vec!["A".into()]).await.unwrap();
    h.service.save_names(vec!["A".into(), "B".into()]).await.unwrap();
    h.service.save_names(vec!["A".into(), "B".into(), "C".into()]).await.unwrap();
    h.service.save_date("2024-05-01").await.unwrap();
    h.service.queue().stop();

    let report = h.service.flush().await;

    assert_eq!(report.drained, vec![Bucket::Names, Bucket::Date]);
    assert_eq!(report.attempted().len(), Bucket::ALL.len());
    for bucket in Bucket::ALL {
        assert_pushes(&h.remote, bucket, 1);
    }
    let doc = h
        .remote
        .document(Bucket::Names, "Khusus_Ikhwan_names_uid-1")
        .await
        .unwrap();
    assert_eq!(doc.fields["names"], json!(["A", "B", "C"]));
    assert_eq!(doc.fields["userId"], json!("uid-1"));
}

#[tokio::test]
async fn test_offline_writes_flush_on_reconnect() {
    let h = TestHarness::new();
    assert!(h.service.set_online(false).await.is_none());
    h.service.save_names(vec!["Offline".into()]).await.unwrap();
    h.service.queue().stop();

    assert_eq!(h.service.flush().await.skipped, Some(SkipReason::Offline));
    assert_eq!(h.service.queue().pending(), vec![Bucket::Names]);

    let report = h.service.set_online(true).await.unwrap();
    assert!(report.is_success());
    assert!(h.service.queue().is_empty());
    assert_pushes(&h.remote, Bucket::Names, 1);
    assert_eq!(h.observer.network_changes(), vec![false, true]);
}

#[tokio::test]
async fn test_signed_out_writes_stay_local() {
    let h = TestHarness::new();
    h.session.set_user(None);
    h.service.save_names(vec!["Lokal".into()]).await.unwrap();
    h.service.queue().stop();

    assert_eq!(h.service.flush().await.skipped, Some(SkipReason::Unauthorized));
    assert_stored(&h.local, Scope::default(), names(&["Lokal"])).await;
    assert_pushes(&h.remote, Bucket::Names, 0);
}

#[tokio::test]
async fn test_startup_pull_announces_sync() {
    let h = TestHarness::new();
    h.remote
        .insert_document(Bucket::Names, "other_device", names_doc(Scope::default(), &["Awal"], 5))
        .await;

    h.service.start().await;

    assert!(wait_until(|| !h.observer.notices().is_empty()).await);
    assert_eq!(h.observer.notices()[0], Notice::success("Data synchronized from cloud"));
    assert_stored(&h.local, Scope::default(), names(&["Awal"])).await;
    h.service.stop().await;
}

#[tokio::test]
async fn test_startup_pull_skipped_without_remote() {
    let h = TestHarness::new();
    h.remote.set_available(false);

    h.service.start().await;
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert!(h.observer.notices().is_empty());
    h.service.stop().await;
}

#[tokio::test]
async fn test_restart_keeps_one_listener_per_partition() {
    let h = TestHarness::new();
    h.service.start().await;
    h.service.start().await;
    h.service.restart().await;

    assert_eq!(h.service.status().await.active_listeners, 70);
    assert!(wait_until(|| h.remote.subscriber_count() == 70).await);

    h.service.stop().await;
    assert!(wait_until(|| h.remote.subscriber_count() == 0).await);
}

#[tokio::test]
async fn test_write_from_another_tab_is_queued() {
    let h = TestHarness::new();
    h.service.start().await;

    let other_tab = LocalState::new(Arc::new(h.store.attach_tab()));
    other_tab
        .write(Scope::default(), &BucketValue::Titles(vec!["Sakit".into()]))
        .await
        .unwrap();

    assert!(
        wait_until(|| h.service.queue().pending().contains(&Bucket::Titles)
            || h.remote.upsert_count(Bucket::Titles) > 0)
        .await
    );
    h.service.stop().await;
}

#[tokio::test]
async fn test_status_reports_pending_and_errors() {
    let h = TestHarness::new();
    h.remote.fail_bucket(Bucket::Date);
    h.service.save_date("2024-05-02").await.unwrap();
    h.service.queue().stop();

    let report = h.service.flush().await;
    assert_eq!(report.failed.len(), 1);

    let status = h.service.status().await;
    assert!(!status.running);
    assert!(!status.is_syncing);
    assert_eq!(status.pending, vec![Bucket::Date]);
    assert_eq!(status.errors.len(), 1);
    assert!(status.last_sync.is_some());

    let metrics = h.service.metrics().await;
    assert_eq!(metrics.failed_flushes, 1);
}
