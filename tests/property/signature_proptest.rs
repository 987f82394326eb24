//! Property-based tests for the fill-forward signature merge

use presensi_sync::client::local_store::{LocalState, MemoryLocalStore};
use presensi_sync::client::sync::{ReconciliationEngine, RemoteUpdate};
use presensi_sync::shared::event::ObserverRegistry;
use presensi_sync::shared::model::{Scope, SignatureEntry, SignatureMap};
use proptest::prelude::*;
use std::sync::Arc;

fn entry() -> impl Strategy<Value = SignatureEntry> {
    (prop_oneof!["", "[a-z]{1,6}"], prop_oneof!["", "[a-z]{1,6}"])
        .prop_map(|(image, keterangan)| SignatureEntry::new(image, keterangan))
}

fn signature_map() -> impl Strategy<Value = SignatureMap> {
    prop::collection::btree_map("[A-E]", entry(), 0..5)
}

proptest! {
    #[test]
    fn test_fill_forward_never_clears_or_overwrites(mut local in entry(), incoming in entry()) {
        let before = local.clone();
        let changed = local.fill_forward(&incoming);

        if !before.image.is_empty() {
            prop_assert_eq!(&local.image, &before.image);
        } else {
            prop_assert_eq!(&local.image, &incoming.image);
        }
        if !before.keterangan.is_empty() {
            prop_assert_eq!(&local.keterangan, &before.keterangan);
        } else {
            prop_assert_eq!(&local.keterangan, &incoming.keterangan);
        }
        prop_assert_eq!(changed, local != before);
    }

    #[test]
    fn test_merge_keeps_populated_local_fields(local in signature_map(), incoming in signature_map()) {
        let merged = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap()
            .block_on(async {
                let state = LocalState::new(Arc::new(MemoryLocalStore::new()));
                let engine = ReconciliationEngine::new(state.clone(), Arc::new(ObserverRegistry::new()));
                engine.reconcile(Scope::default(), RemoteUpdate::Signatures(local.clone())).await;
                engine.reconcile(Scope::default(), RemoteUpdate::Signatures(incoming.clone())).await;
                // A second delivery of the same data changes nothing
                engine.reconcile(Scope::default(), RemoteUpdate::Signatures(incoming.clone())).await;
                state.signatures(Scope::default()).await.unwrap()
            });

        for (name, entry) in &local {
            let stored = &merged[name];
            if !entry.image.is_empty() {
                prop_assert_eq!(&stored.image, &entry.image);
            }
            if !entry.keterangan.is_empty() {
                prop_assert_eq!(&stored.keterangan, &entry.keterangan);
            }
        }
        for name in incoming.keys() {
            prop_assert!(merged.contains_key(name));
        }
    }
}
