//! The auth gate as the session behind the sync service

use async_trait::async_trait;
use presensi_sync::client::auth::{AuthManager, CloudAuth};
use presensi_sync::client::local_store::{LocalState, MemoryLocalStore};
use presensi_sync::client::remote::MemoryRemoteStore;
use presensi_sync::client::sync::{NetworkMonitor, SkipReason, SyncService};
use presensi_sync::shared::config::SyncConfig;
use presensi_sync::shared::error::AuthError;
use presensi_sync::shared::event::ObserverRegistry;
use presensi_sync::shared::user::{AuthSource, SessionUser};
use std::sync::Arc;

use crate::common::*;

const EMAIL: &str = "osis.school@mail.test";

struct UnreachableCloud;

#[async_trait]
impl CloudAuth for UnreachableCloud {
    async fn sign_in(&self, _email: &str, _password: &str) -> Result<SessionUser, AuthError> {
        Err(AuthError::Internal("auth/internal-error".into()))
    }

    async fn sign_out(&self) -> Result<(), AuthError> {
        Ok(())
    }
}

struct Wired {
    auth: Arc<AuthManager>,
    service: SyncService,
    remote: Arc<MemoryRemoteStore>,
    observer: Arc<RecordingObserver>,
}

fn wired(cloud: Option<Arc<dyn CloudAuth>>) -> Wired {
    init_tracing();
    let config = SyncConfig::builder()
        .local_credential(EMAIL, "OSIS")
        .build()
        .unwrap();
    let store = Arc::new(MemoryLocalStore::new());
    let observers = Arc::new(ObserverRegistry::new());
    let network = Arc::new(NetworkMonitor::new(true, observers.clone()));
    let remote = Arc::new(MemoryRemoteStore::new());

    let auth = Arc::new(AuthManager::new(
        &config,
        LocalState::new(store.clone()),
        cloud,
        network.clone(),
        observers.clone(),
    ));
    let service = SyncService::builder()
        .config(config)
        .local_store(store)
        .remote(remote.clone())
        .session(auth.clone())
        .observers(observers.clone())
        .network(network)
        .build()
        .unwrap();

    let observer = Arc::new(RecordingObserver::default());
    observers.register(observer.clone());

    Wired {
        auth,
        service,
        remote,
        observer,
    }
}

#[tokio::test]
async fn test_pushes_follow_the_login_state() {
    let w = wired(None);
    w.service.save_names(vec!["Ahmad".into()]).await.unwrap();
    w.service.queue().stop();

    assert_eq!(w.service.flush().await.skipped, Some(SkipReason::Unauthorized));

    w.auth.login(EMAIL, "OSIS").await.unwrap();
    assert!(w.service.flush().await.is_success());
    assert!(w
        .remote
        .document(
            presensi_sync::shared::model::Bucket::Names,
            "Khusus_Ikhwan_names_local_osis_school_mail_test"
        )
        .await
        .is_some());

    w.auth.logout().await;
    assert_eq!(w.service.flush().await.skipped, Some(SkipReason::Unauthorized));
}

#[tokio::test]
async fn test_cloud_outage_falls_back_to_local_credentials() {
    let w = wired(Some(Arc::new(UnreachableCloud) as Arc<dyn CloudAuth>));

    let outcome = w.auth.login(EMAIL, "OSIS").await.unwrap();

    assert_eq!(outcome.source, AuthSource::Local);
    assert_eq!(outcome.profile.role, "SCHOOL");
    let auth_events = w.observer.auth.lock().unwrap().clone();
    assert_eq!(auth_events.len(), 1);
    assert_eq!(auth_events[0].source, AuthSource::Local);
}

#[tokio::test]
async fn test_offline_login_skips_cloud() {
    let w = wired(Some(Arc::new(UnreachableCloud) as Arc<dyn CloudAuth>));
    w.service.set_online(false).await;

    assert_eq!(w.auth.login(EMAIL, "wrong").await, Err(AuthError::WrongPassword));
    assert_eq!(
        w.auth.login("guest@mail.test", "x").await,
        Err(AuthError::NotAuthorized)
    );
}
