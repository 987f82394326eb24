//! User identity types
//!
//! Identity and profile shapes produced by the auth gate and consumed by the
//! sync layer when stamping remote writes.

use serde::{Deserialize, Serialize};

/// Where a session came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthSource {
    /// Cloud authentication provider
    Cloud,
    /// Local credential table
    Local,
}

/// Prefix of user ids minted by the local credential table
pub const LOCAL_UID_PREFIX: &str = "local_";

/// Signed-in user identity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionUser {
    pub uid: String,
    pub email: String,
    pub display_name: String,
}

impl SessionUser {
    pub fn new(uid: impl Into<String>, email: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            uid: uid.into(),
            email: email.into(),
            display_name: display_name.into(),
        }
    }

    /// Build the identity of a locally authenticated user
    pub fn local(email: &str) -> Self {
        Self {
            uid: local_uid(email),
            email: email.to_string(),
            display_name: display_name_from_email(email),
        }
    }

    pub fn source(&self) -> AuthSource {
        if self.uid.starts_with(LOCAL_UID_PREFIX) {
            AuthSource::Local
        } else {
            AuthSource::Cloud
        }
    }
}

/// `local_` followed by the email with every non-alphanumeric replaced by `_`
pub fn local_uid(email: &str) -> String {
    let sanitized: String = email
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();
    format!("{}{}", LOCAL_UID_PREFIX, sanitized)
}

/// Email local part with dots turned into spaces
pub fn display_name_from_email(email: &str) -> String {
    email.split('@').next().unwrap_or(email).replace('.', " ")
}

/// Per-user profile kept in the local store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub email: String,
    pub display_name: String,
    #[serde(default = "default_role")]
    pub role: String,
    #[serde(default)]
    pub uid: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub last_login: Option<String>,
}

fn default_role() -> String {
    "user".to_string()
}

/// Last-session blob persisted under `currentUser`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredSession {
    pub email: String,
    pub display_name: String,
    pub is_logged_in: bool,
    #[serde(default)]
    pub uid: Option<String>,
    #[serde(default)]
    pub last_login: Option<String>,
    #[serde(default)]
    pub source: Option<AuthSource>,
}

impl StoredSession {
    /// Session identity, minting a local uid when none was stored
    pub fn user(&self) -> SessionUser {
        SessionUser {
            uid: self.uid.clone().unwrap_or_else(|| local_uid(&self.email)),
            email: self.email.clone(),
            display_name: self.display_name.clone(),
        }
    }
}
