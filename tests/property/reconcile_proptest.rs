//! Property-based tests for timestamp-gated reconciliation
//!
//! Delivering the same records in any order, any number of times, converges
//! on the newest one.

use presensi_sync::client::local_store::{LocalState, MemoryLocalStore};
use presensi_sync::client::remote::documents::select_latest;
use presensi_sync::client::remote::RemoteDocument;
use presensi_sync::client::sync::{ReconcileOutcome, ReconciliationEngine, RemoteUpdate};
use presensi_sync::shared::event::ObserverRegistry;
use presensi_sync::shared::model::{Bucket, BucketValue, Scope, SyncRecord};
use proptest::prelude::*;
use serde_json::json;
use std::collections::BTreeSet;
use std::sync::Arc;

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
}

fn record(updated_at: i64) -> SyncRecord {
    SyncRecord {
        scope: Scope::default(),
        value: BucketValue::Names(vec![format!("name-{}", updated_at)]),
        user_id: None,
        user_email: None,
        updated_at,
    }
}

proptest! {
    #[test]
    fn test_delivery_order_does_not_matter(
        timestamps in prop::collection::btree_set(1i64..10_000, 1..12),
        order in any::<prop::sample::Index>(),
    ) {
        let mut records: Vec<i64> = timestamps.iter().copied().collect();
        let pivot = order.index(records.len());
        records.rotate_left(pivot);
        let newest = *timestamps.iter().max().unwrap();

        let stored = runtime().block_on(async {
            let local = LocalState::new(Arc::new(MemoryLocalStore::new()));
            let engine = ReconciliationEngine::new(local.clone(), Arc::new(ObserverRegistry::new()));
            for at in &records {
                engine.reconcile(Scope::default(), RemoteUpdate::Record(record(*at))).await;
            }
            local.read(Bucket::Names, Scope::default()).await.unwrap()
        });

        prop_assert_eq!(stored, record(newest).value);
    }

    #[test]
    fn test_redelivery_is_a_no_op(timestamps in prop::collection::btree_set(1i64..10_000, 1..8)) {
        let outcomes = runtime().block_on(async {
            let local = LocalState::new(Arc::new(MemoryLocalStore::new()));
            let engine = ReconciliationEngine::new(local, Arc::new(ObserverRegistry::new()));
            for at in &timestamps {
                engine.reconcile(Scope::default(), RemoteUpdate::Record(record(*at))).await;
            }
            let mut outcomes = Vec::new();
            for at in &timestamps {
                let result = engine
                    .reconcile(Scope::default(), RemoteUpdate::Record(record(*at)))
                    .await;
                outcomes.push(result.outcome);
            }
            outcomes
        });

        prop_assert!(outcomes.iter().all(|o| *o == ReconcileOutcome::Stale));
    }

    #[test]
    fn test_latest_selection_ignores_input_order(
        stamps in prop::collection::vec(0i64..5, 1..10),
        order in any::<prop::sample::Index>(),
    ) {
        let docs: Vec<RemoteDocument> = stamps
            .iter()
            .enumerate()
            .map(|(i, at)| {
                RemoteDocument::new(
                    format!("doc-{}", i),
                    json!({ "updatedAt": at }).as_object().cloned().unwrap(),
                )
            })
            .collect();
        let mut shuffled = docs.clone();
        let pivot = order.index(shuffled.len());
        shuffled.rotate_left(pivot);
        shuffled.reverse();

        let expected = select_latest(&docs).map(|d| d.id.clone());
        let actual = select_latest(&shuffled).map(|d| d.id.clone());
        prop_assert_eq!(&expected, &actual);

        let newest = stamps.iter().max().copied().unwrap();
        let winners: BTreeSet<String> = docs
            .iter()
            .filter(|d| d.updated_at() == newest)
            .map(|d| d.id.clone())
            .collect();
        prop_assert_eq!(actual, winners.into_iter().next_back());
    }
}
