//! Staff sessions.
//!
//! A session binds a random bearer token to one staff member of one hospital.
//! Tokens are carried in the `medflow.sid` cookie, an `Authorization: Bearer`
//! header or, for WebSocket upgrades only, a `?token=` query parameter.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use async_trait::async_trait;
use axum::extract::{FromRef, FromRequestParts};
use axum::http::{
    HeaderMap,
    header::{AUTHORIZATION, COOKIE},
    request::Parts,
};
use dashmap::DashMap;
use medflow_core::{Role, TenantId};
use rand::RngCore;
use time::OffsetDateTime;

use crate::config::StaffAccount;
use crate::error::ApiError;

pub const SESSION_COOKIE: &str = "medflow.sid";

/// An authenticated staff session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub token: String,
    pub user_id: String,
    pub username: String,
    pub role: Role,
    pub tenant_id: TenantId,
    pub expires_at: OffsetDateTime,
}

impl Session {
    pub fn is_expired_at(&self, now: OffsetDateTime) -> bool {
        now >= self.expires_at
    }
}

/// Identity a session is created for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaffUser {
    pub user_id: String,
    pub username: String,
    pub role: Role,
    pub tenant_id: TenantId,
}

#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn create(&self, user: StaffUser) -> Session;

    /// Returns the live session for `token`; expired and revoked tokens resolve to `None`.
    async fn resolve(&self, token: &str) -> Option<Session>;

    /// Returns `true` if a session was removed.
    async fn revoke(&self, token: &str) -> bool;
}

pub type DynSessionStore = Arc<dyn SessionStore>;

pub struct InMemorySessionStore {
    sessions: DashMap<String, Session>,
    ttl: Duration,
}

impl InMemorySessionStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            sessions: DashMap::new(),
            ttl,
        }
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn purge_expired(&self) -> usize {
        let now = OffsetDateTime::now_utc();
        let before = self.sessions.len();
        self.sessions.retain(|_, s| !s.is_expired_at(now));
        before.saturating_sub(self.sessions.len())
    }
}

fn generate_session_token() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn create(&self, user: StaffUser) -> Session {
        let purged = self.purge_expired();
        if purged > 0 {
            tracing::debug!(purged, "expired sessions purged");
        }

        let session = Session {
            token: generate_session_token(),
            user_id: user.user_id,
            username: user.username,
            role: user.role,
            tenant_id: user.tenant_id,
            expires_at: OffsetDateTime::now_utc() + self.ttl,
        };
        self.sessions
            .insert(session.token.clone(), session.clone());
        session
    }

    async fn resolve(&self, token: &str) -> Option<Session> {
        let session = self.sessions.get(token).map(|s| s.clone())?;
        if session.is_expired_at(OffsetDateTime::now_utc()) {
            self.sessions.remove(token);
            tracing::debug!(user = %session.username, "session expired");
            return None;
        }
        Some(session)
    }

    async fn revoke(&self, token: &str) -> bool {
        self.sessions.remove(token).is_some()
    }
}

// =============================================================================
// Staff directory
// =============================================================================

/// Staff accounts keyed by hospital and username.
#[derive(Debug, Default)]
pub struct StaffDirectory {
    accounts: HashMap<(TenantId, String), StaffAccount>,
}

impl StaffDirectory {
    pub fn new(accounts: &[StaffAccount]) -> Self {
        let accounts = accounts
            .iter()
            .map(|a| ((TenantId::new(a.hospital_id.trim()), a.username.clone()), a.clone()))
            .collect();
        Self { accounts }
    }

    pub fn len(&self) -> usize {
        self.accounts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }

    /// Verifies the password against the stored argon2 hash.
    pub async fn authenticate(
        &self,
        tenant: &TenantId,
        username: &str,
        password: &str,
    ) -> Option<StaffUser> {
        let account = self
            .accounts
            .get(&(tenant.clone(), username.to_string()))?
            .clone();
        let password = password.to_string();
        let hash = account.password_hash.clone();

        let verified = tokio::task::spawn_blocking(move || verify_password(&password, &hash))
            .await
            .unwrap_or(false);
        if !verified {
            return None;
        }

        Some(StaffUser {
            user_id: account.user_id.unwrap_or_else(|| account.username.clone()),
            username: account.username,
            role: account.role,
            tenant_id: tenant.clone(),
        })
    }
}

/// Hash a password into an argon2id PHC string.
pub fn hash_password(password: &str) -> Result<String, argon2::password_hash::Error> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default().hash_password(password.as_bytes(), &salt)?;
    Ok(hash.to_string())
}

pub fn verify_password(password: &str, hash: &str) -> bool {
    PasswordHash::new(hash)
        .map(|parsed| {
            Argon2::default()
                .verify_password(password.as_bytes(), &parsed)
                .is_ok()
        })
        .unwrap_or(false)
}

// =============================================================================
// Token extraction
// =============================================================================

fn token_from_cookie(headers: &HeaderMap) -> Option<String> {
    let cookie_header = headers.get(COOKIE)?.to_str().ok()?;
    for cookie in cookie_header.split(';') {
        let cookie = cookie.trim();
        if let Some((name, value)) = cookie.split_once('=')
            && name.trim() == SESSION_COOKIE
        {
            let value = value.trim();
            if !value.is_empty() {
                return Some(value.to_string());
            }
        }
    }
    None
}

fn token_from_bearer(headers: &HeaderMap) -> Option<String> {
    headers
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(ToString::to_string)
}

/// Cookie first, then bearer header.
pub fn token_from_headers(headers: &HeaderMap) -> Option<String> {
    token_from_cookie(headers).or_else(|| token_from_bearer(headers))
}

/// `token` query parameter, accepted on WebSocket upgrades.
pub fn token_from_query(query: Option<&str>) -> Option<String> {
    url::form_urlencoded::parse(query?.as_bytes())
        .find(|(k, _)| k == "token")
        .map(|(_, v)| v.into_owned())
        .filter(|v| !v.is_empty())
}

pub fn session_cookie(token: &str, max_age: Duration, secure: bool) -> String {
    let mut cookie = format!(
        "{SESSION_COOKIE}={token}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}",
        max_age.as_secs()
    );
    if secure {
        cookie.push_str("; Secure");
    }
    cookie
}

pub fn expired_session_cookie() -> String {
    format!("{SESSION_COOKIE}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0")
}

// =============================================================================
// Extractor
// =============================================================================

/// Resolved staff session for an HTTP request.
pub struct AuthSession(pub Session);

impl<S> FromRequestParts<S> for AuthSession
where
    S: Send + Sync,
    DynSessionStore: FromRef<S>,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let store = DynSessionStore::from_ref(state);
        let token = token_from_headers(&parts.headers).ok_or(ApiError::Unauthorized)?;
        match store.resolve(&token).await {
            Some(session) => Ok(AuthSession(session)),
            None => {
                tracing::debug!("session token did not resolve");
                Err(ApiError::Unauthorized)
            }
        }
    }
}
