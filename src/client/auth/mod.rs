//! # Authentication Gate
//!
//! Decides who is signed in for the sync layer.
//!
//! ## Features
//!
//! - **Cloud first**: when a cloud provider is configured, reachable and the
//!   network is up, it is tried first
//! - **Local fallback**: network, internal and permission failures of the
//!   cloud provider fall back to the configured credential table; other
//!   cloud failures are returned as-is
//! - **Persistent session**: the last session is stored under `currentUser`
//!   and each user's profile under `user_profile_{email}`
//! - **Auth events**: every login, logout and restore is broadcast to the
//!   observers
//!
//! ## Usage
//!
//! ```rust,no_run
//! # use presensi_sync::client::auth::AuthManager;
//! # async fn example(auth: AuthManager) {
//! match auth.login("osis.school@mail.test", "secret").await {
//!     Ok(outcome) => println!("signed in as {}", outcome.user.display_name),
//!     Err(e) => println!("login failed: {}", e),
//! }
//! # }
//! ```

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use crate::client::local_store::LocalState;
use crate::client::session::SessionProvider;
use crate::client::sync::network_monitor::Connectivity;
use crate::shared::config::SyncConfig;
use crate::shared::error::AuthError;
use crate::shared::event::{AuthStateChange, ObserverRegistry, SyncEvent};
use crate::shared::model::{profile_key, CURRENT_USER_KEY};
use crate::shared::user::{AuthSource, SessionUser, StoredSession, UserProfile};

/// Cloud identity provider
#[async_trait]
pub trait CloudAuth: Send + Sync {
    /// Whether the provider SDK is loaded at all
    fn is_available(&self) -> bool {
        true
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<SessionUser, AuthError>;

    async fn sign_out(&self) -> Result<(), AuthError>;

    /// Stored cloud profile, if the provider keeps one
    async fn fetch_profile(&self, _user: &SessionUser) -> Result<Option<UserProfile>, AuthError> {
        Ok(None)
    }
}

/// Successful login
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginOutcome {
    pub user: SessionUser,
    pub profile: UserProfile,
    pub source: AuthSource,
}

#[derive(Debug, Clone)]
struct ActiveSession {
    user: SessionUser,
    profile: UserProfile,
    source: AuthSource,
}

pub struct AuthManager {
    local: LocalState,
    cloud: Option<Arc<dyn CloudAuth>>,
    connectivity: Arc<dyn Connectivity>,
    credentials: BTreeMap<String, String>,
    observers: Arc<ObserverRegistry>,
    session: RwLock<Option<ActiveSession>>,
}

impl std::fmt::Debug for AuthManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthManager")
            .field("cloud", &self.cloud.is_some())
            .field("logged_in", &self.is_logged_in())
            .finish_non_exhaustive()
    }
}

impl AuthManager {
    pub fn new(
        config: &SyncConfig,
        local: LocalState,
        cloud: Option<Arc<dyn CloudAuth>>,
        connectivity: Arc<dyn Connectivity>,
        observers: Arc<ObserverRegistry>,
    ) -> Self {
        Self {
            local,
            cloud,
            connectivity,
            credentials: config.local_credentials.clone(),
            observers,
            session: RwLock::new(None),
        }
    }

    pub fn is_logged_in(&self) -> bool {
        self.session.read().map(|s| s.is_some()).unwrap_or(false)
    }

    pub fn current_profile(&self) -> Option<UserProfile> {
        self.session
            .read()
            .ok()
            .and_then(|s| s.as_ref().map(|active| active.profile.clone()))
    }

    pub fn current_source(&self) -> Option<AuthSource> {
        self.session
            .read()
            .ok()
            .and_then(|s| s.as_ref().map(|active| active.source))
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<LoginOutcome, AuthError> {
        if email.is_empty() || password.is_empty() {
            return Err(AuthError::MissingCredentials);
        }
        tracing::info!("[Auth] Attempting login for {}", email);

        let cloud = self
            .cloud
            .as_ref()
            .filter(|cloud| cloud.is_available() && self.connectivity.is_online());
        let Some(cloud) = cloud else {
            tracing::info!("[Auth] Cloud auth not reachable, using local login");
            return self.local_login(email, password).await;
        };

        match cloud.sign_in(email, password).await {
            Ok(user) => {
                let profile = self.cloud_profile(cloud.as_ref(), &user).await;
                tracing::info!("[Auth] Cloud login successful for {}", email);
                Ok(self.establish(user, profile, AuthSource::Cloud).await)
            }
            Err(e) if e.allows_local_fallback() => {
                tracing::warn!("[Auth] Cloud login failed ({}), trying local login", e);
                self.local_login(email, password).await
            }
            Err(e) => {
                tracing::warn!("[Auth] Cloud login rejected: {}", e);
                Err(e)
            }
        }
    }

    async fn local_login(&self, email: &str, password: &str) -> Result<LoginOutcome, AuthError> {
        let Some(expected) = self.credentials.get(email) else {
            return Err(AuthError::NotAuthorized);
        };
        if expected != password {
            return Err(AuthError::WrongPassword);
        }

        let user = SessionUser::local(email);
        let now = chrono::Utc::now().to_rfc3339();
        let created_at = self
            .stored_profile(email)
            .await
            .and_then(|p| p.created_at)
            .unwrap_or_else(|| now.clone());
        let profile = UserProfile {
            email: email.to_string(),
            display_name: user.display_name.clone(),
            role: local_role(email),
            uid: Some(user.uid.clone()),
            created_at: Some(created_at),
            last_login: Some(now),
        };

        tracing::info!("[Auth] Local login successful for {}", email);
        Ok(self.establish(user, profile, AuthSource::Local).await)
    }

    /// Cloud profile, else the locally stored one, else a fresh one
    async fn cloud_profile(&self, cloud: &dyn CloudAuth, user: &SessionUser) -> UserProfile {
        let now = chrono::Utc::now().to_rfc3339();
        let existing = match cloud.fetch_profile(user).await {
            Ok(Some(profile)) => Some(profile),
            Ok(None) => self.stored_profile(&user.email).await,
            Err(e) => {
                tracing::warn!("[Auth] Could not load cloud profile: {}", e);
                self.stored_profile(&user.email).await
            }
        };

        let mut profile = existing.unwrap_or_else(|| UserProfile {
            email: user.email.clone(),
            display_name: user.display_name.clone(),
            role: "user".to_string(),
            uid: Some(user.uid.clone()),
            created_at: Some(now.clone()),
            last_login: None,
        });
        profile.last_login = Some(now);
        profile
    }

    async fn stored_profile(&self, email: &str) -> Option<UserProfile> {
        match self.local.get_json::<UserProfile>(&profile_key(email)).await {
            Ok(profile) => profile,
            Err(e) => {
                tracing::warn!("[Auth] Ignoring unreadable profile for {}: {}", email, e);
                None
            }
        }
    }

    async fn establish(&self, user: SessionUser, profile: UserProfile, source: AuthSource) -> LoginOutcome {
        let stored = StoredSession {
            email: user.email.clone(),
            display_name: user.display_name.clone(),
            is_logged_in: true,
            uid: Some(user.uid.clone()),
            last_login: profile.last_login.clone(),
            source: Some(source),
        };
        if let Err(e) = self.local.set_json(CURRENT_USER_KEY, &stored).await {
            tracing::warn!("[Auth] Could not persist session: {}", e);
        }
        if let Err(e) = self.local.set_json(&profile_key(&user.email), &profile).await {
            tracing::warn!("[Auth] Could not persist profile: {}", e);
        }

        self.activate(user.clone(), profile.clone(), source);
        LoginOutcome { user, profile, source }
    }

    fn activate(&self, user: SessionUser, profile: UserProfile, source: AuthSource) {
        if let Ok(mut session) = self.session.write() {
            *session = Some(ActiveSession {
                user: user.clone(),
                profile: profile.clone(),
                source,
            });
        }
        self.observers.emit(&SyncEvent::AuthState(AuthStateChange {
            is_logged_in: true,
            user: Some(user),
            profile: Some(profile),
            source,
        }));
    }

    /// Sign out everywhere and forget the persisted session
    pub async fn logout(&self) {
        let previous = self.session.write().ok().and_then(|mut s| s.take());
        let source = previous
            .as_ref()
            .map(|active| active.source)
            .unwrap_or(AuthSource::Local);

        if let (AuthSource::Cloud, Some(cloud)) = (source, &self.cloud) {
            if let Err(e) = cloud.sign_out().await {
                tracing::warn!("[Auth] Cloud sign-out failed: {}", e);
            }
        }
        if let Err(e) = self.local.remove(CURRENT_USER_KEY).await {
            tracing::warn!("[Auth] Could not clear persisted session: {}", e);
        }

        tracing::info!("[Auth] Logged out");
        self.observers.emit(&SyncEvent::AuthState(AuthStateChange {
            is_logged_in: false,
            user: None,
            profile: None,
            source,
        }));
    }

    /// Revive a persisted logged-in session
    pub async fn restore_session(&self) -> Option<SessionUser> {
        let stored = match self.local.get_json::<StoredSession>(CURRENT_USER_KEY).await {
            Ok(Some(stored)) if stored.is_logged_in => stored,
            Ok(_) => return None,
            Err(e) => {
                tracing::warn!("[Auth] Ignoring unreadable persisted session: {}", e);
                return None;
            }
        };

        let user = stored.user();
        let source = stored.source.unwrap_or_else(|| user.source());
        let profile = self.stored_profile(&user.email).await.unwrap_or(UserProfile {
            email: stored.email.clone(),
            display_name: stored.display_name.clone(),
            role: "user".to_string(),
            uid: Some(user.uid.clone()),
            created_at: None,
            last_login: stored.last_login.clone(),
        });

        tracing::info!("[Auth] Restored session for {}", user.email);
        self.activate(user.clone(), profile, source);
        Some(user)
    }
}

impl SessionProvider for AuthManager {
    fn current_user(&self) -> Option<SessionUser> {
        self.session
            .read()
            .ok()
            .and_then(|s| s.as_ref().map(|active| active.user.clone()))
    }
}

/// Second dot-separated segment of the email, upper-cased
fn local_role(email: &str) -> String {
    email
        .split('.')
        .nth(1)
        .map(|segment| segment.to_uppercase())
        .unwrap_or_else(|| "user".to_string())
}
