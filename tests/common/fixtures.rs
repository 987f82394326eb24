//! Service fixtures and remote document builders

use presensi_sync::client::local_store::{LocalState, MemoryLocalStore};
use presensi_sync::client::remote::{Fields, MemoryRemoteStore};
use presensi_sync::client::session::StaticSession;
use presensi_sync::client::sync::SyncService;
use presensi_sync::shared::config::SyncConfig;
use presensi_sync::shared::event::{AuthStateChange, BucketUpdate, Notice, SyncObserver};
use presensi_sync::shared::model::{BucketValue, Scope};
use presensi_sync::shared::user::SessionUser;
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Install a test subscriber once; honours `RUST_LOG`
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init();
}

pub fn test_user() -> SessionUser {
    SessionUser::new("uid-1", "osis.school@mail.test", "osis school")
}

/// Everything observers were told
#[derive(Default)]
pub struct RecordingObserver {
    pub buckets: Mutex<Vec<BucketUpdate>>,
    pub network: Mutex<Vec<bool>>,
    pub auth: Mutex<Vec<AuthStateChange>>,
    pub notices: Mutex<Vec<Notice>>,
}

impl RecordingObserver {
    pub fn bucket_updates(&self) -> Vec<BucketUpdate> {
        self.buckets.lock().unwrap().clone()
    }

    pub fn notices(&self) -> Vec<Notice> {
        self.notices.lock().unwrap().clone()
    }

    pub fn network_changes(&self) -> Vec<bool> {
        self.network.lock().unwrap().clone()
    }
}

impl SyncObserver for RecordingObserver {
    fn on_bucket_update(&self, update: &BucketUpdate) {
        self.buckets.lock().unwrap().push(update.clone());
    }

    fn on_network_status(&self, is_online: bool) {
        self.network.lock().unwrap().push(is_online);
    }

    fn on_auth_state(&self, change: &AuthStateChange) {
        self.auth.lock().unwrap().push(change.clone());
    }

    fn on_notice(&self, notice: &Notice) {
        self.notices.lock().unwrap().push(notice.clone());
    }
}

/// A signed-in service over in-memory stores
pub struct TestHarness {
    pub service: SyncService,
    pub store: Arc<MemoryLocalStore>,
    pub local: LocalState,
    pub remote: Arc<MemoryRemoteStore>,
    pub session: Arc<StaticSession>,
    pub observer: Arc<RecordingObserver>,
}

impl TestHarness {
    pub fn new() -> Self {
        Self::with_config(SyncConfig::default())
    }

    pub fn with_config(config: SyncConfig) -> Self {
        init_tracing();
        let store = Arc::new(MemoryLocalStore::new());
        let remote = Arc::new(MemoryRemoteStore::new());
        let session = Arc::new(StaticSession::signed_in(test_user()));
        let service = SyncService::builder()
            .config(config)
            .local_store(store.clone())
            .remote(remote.clone())
            .session(session.clone())
            .build()
            .expect("service builds");
        let observer = Arc::new(RecordingObserver::default());
        service.register_observer(observer.clone());

        Self {
            local: service.local().clone(),
            service,
            store,
            remote,
            session,
            observer,
        }
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}

fn fields(value: Value) -> Fields {
    value.as_object().cloned().expect("object literal")
}

fn envelope(scope: Scope, updated_at: i64) -> Value {
    json!({
        "division": scope.division.as_str(),
        "gender": scope.gender.as_str(),
        "userId": "uid-remote",
        "userEmail": "remote@mail.test",
        "updatedAt": updated_at,
    })
}

fn merge(mut base: Value, extra: Value) -> Fields {
    if let (Some(base), Some(extra)) = (base.as_object_mut(), extra.as_object()) {
        for (key, value) in extra {
            base.insert(key.clone(), value.clone());
        }
    }
    fields(base)
}

pub fn names_doc(scope: Scope, names: &[&str], updated_at: i64) -> Fields {
    merge(envelope(scope, updated_at), json!({ "names": names }))
}

pub fn titles_doc(scope: Scope, titles: &[&str], updated_at: i64) -> Fields {
    merge(envelope(scope, updated_at), json!({ "titles": titles }))
}

pub fn date_doc(scope: Scope, date: &str, updated_at: i64) -> Fields {
    merge(envelope(scope, updated_at), json!({ "date": date }))
}

pub fn info_doc(scope: Scope, info: Value, updated_at: i64) -> Fields {
    merge(envelope(scope, updated_at), info)
}

pub fn signature_doc(scope: Scope, name: &str, image: &str, keterangan: &str, updated_at: i64) -> Fields {
    merge(
        envelope(scope, updated_at),
        json!({ "name": name, "signatureUrl": image, "keterangan": keterangan }),
    )
}

/// Poll the local store until a bucket holds `expected`
pub async fn wait_for_value(local: &LocalState, scope: Scope, expected: &BucketValue) -> bool {
    for _ in 0..400 {
        if local.read(expected.bucket(), scope).await.ok().as_ref() == Some(expected) {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    false
}

/// Poll a synchronous condition
pub async fn wait_until(mut check: impl FnMut() -> bool) -> bool {
    for _ in 0..400 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    false
}
