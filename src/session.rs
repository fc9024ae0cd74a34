//! Session state and expiry handling.
//!
//! The access token is kept in memory (zeroized on drop) and mirrored to the
//! OS keyring so a restarted app resumes the session. An expired token, or
//! any HTTP 401 from the backend, logs the operator out. Working-list drafts
//! are not touched by a logout.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use chrono::{DateTime, Duration, Utc};
use serde_json::Value;
use std::sync::{Arc, Mutex};
use tracing::{info, warn};
use zeroize::Zeroizing;

use crate::api::ApiClient;
use crate::error::ApiError;
use crate::storage;

/// Treat a token as expired slightly before its `exp` claim.
const EXPIRY_SKEW_SECONDS: i64 = 30;

/// Run by the scan and search resolvers when the backend answers 401.
pub type AuthFailureHook = Arc<dyn Fn() + Send + Sync>;

pub struct Session {
    pub username: String,
    access_token: Zeroizing<String>,
    refresh_token: Option<Zeroizing<String>>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl Session {
    pub fn new(username: &str, access_token: &str, refresh_token: Option<&str>) -> Self {
        Self {
            username: username.trim().to_string(),
            expires_at: expiry_from_jwt(access_token),
            access_token: Zeroizing::new(access_token.to_string()),
            refresh_token: refresh_token.map(|t| Zeroizing::new(t.to_string())),
        }
    }

    pub fn access_token(&self) -> &str {
        &self.access_token
    }

    pub fn refresh_token(&self) -> Option<&str> {
        self.refresh_token.as_ref().map(|t| t.as_str())
    }

    /// Tokens without an `exp` claim never expire locally; the backend's 401
    /// is the only signal for them.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at
            .map(|exp| now + Duration::seconds(EXPIRY_SKEW_SECONDS) >= exp)
            .unwrap_or(false)
    }
}

/// Read the `exp` claim of a JWT without verifying it.
pub fn expiry_from_jwt(token: &str) -> Option<DateTime<Utc>> {
    let payload = token.split('.').nth(1)?;
    let decoded = URL_SAFE_NO_PAD.decode(payload.trim_end_matches('=')).ok()?;
    let claims: Value = serde_json::from_slice(&decoded).ok()?;
    let exp = claims.get("exp").and_then(Value::as_i64)?;
    DateTime::<Utc>::from_timestamp(exp, 0)
}

pub struct SessionManager {
    current: Mutex<Option<Session>>,
    persist: bool,
}

impl SessionManager {
    /// `persist` mirrors the session to the OS keyring.
    pub fn new(persist: bool) -> Self {
        Self {
            current: Mutex::new(None),
            persist,
        }
    }

    /// Resume the session stored in the keyring. Returns `true` when a valid
    /// session was restored.
    pub fn restore(&self, api: &ApiClient) -> bool {
        if !self.persist {
            return false;
        }
        let (Some(username), Some(token)) = (
            storage::get_credential(storage::KEY_USERNAME),
            storage::get_credential(storage::KEY_ACCESS_TOKEN),
        ) else {
            return false;
        };
        let token = Zeroizing::new(token);
        let refresh = storage::get_credential(storage::KEY_REFRESH_TOKEN).map(Zeroizing::new);
        let session = Session::new(&username, &token, refresh.as_ref().map(|t| t.as_str()));
        if session.is_expired_at(Utc::now()) {
            info!(username = %session.username, "stored session expired, logging out");
            self.logout(api);
            return false;
        }
        api.set_token(Some(session.access_token()));
        info!(username = %session.username, "session restored");
        *self.lock() = Some(session);
        true
    }

    /// Install a freshly obtained session.
    pub fn begin(&self, session: Session, api: &ApiClient) {
        if self.persist {
            let mut writes = vec![
                (storage::KEY_USERNAME, session.username.clone()),
                (storage::KEY_ACCESS_TOKEN, session.access_token().to_string()),
            ];
            if let Some(refresh) = session.refresh_token() {
                writes.push((storage::KEY_REFRESH_TOKEN, refresh.to_string()));
            }
            for (key, value) in writes {
                let value = Zeroizing::new(value);
                if let Err(e) = storage::set_credential(key, &value) {
                    warn!(key, error = %e, "failed to persist session credential");
                }
            }
        }
        api.set_token(Some(session.access_token()));
        info!(username = %session.username, "session started");
        *self.lock() = Some(session);
    }

    pub fn is_authenticated(&self) -> bool {
        self.lock().is_some()
    }

    pub fn username(&self) -> Option<String> {
        self.lock().as_ref().map(|s| s.username.clone())
    }

    /// Log out when the current token has expired. Returns `true` when a
    /// logout happened.
    pub fn check_expiry(&self, api: &ApiClient, now: DateTime<Utc>) -> bool {
        let expired = self
            .lock()
            .as_ref()
            .is_some_and(|s| s.is_expired_at(now));
        if expired {
            info!("session token expired, logging out");
            self.logout(api);
        }
        expired
    }

    /// Log out on an authentication failure. Returns `true` when the error
    /// ended the session.
    pub fn handle_api_error(&self, err: &ApiError, api: &ApiClient) -> bool {
        if !err.is_auth_failure() {
            return false;
        }
        warn!("backend rejected the session, logging out");
        self.logout(api);
        true
    }

    pub fn logout(&self, api: &ApiClient) {
        let previous = self.lock().take();
        api.set_token(None);
        if self.persist {
            storage::clear_session_credentials();
        }
        if let Some(session) = previous {
            info!(username = %session.username, "logged out");
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Option<Session>> {
        self.current.lock().unwrap_or_else(|e| e.into_inner())
    }
}
