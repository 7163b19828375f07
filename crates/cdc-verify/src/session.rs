//! Single-use session registry for in-progress verifications.
//!
//! A session carries the cookies and CSRF token captured with a CAPTCHA so a
//! later submit can reuse them. Sessions are consumed on first use and swept
//! once they are older than the TTL.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;

use crate::cookies::CookieJar;
use crate::types::{FlowState, VerifyError, VerifyResult};

/// Default lifetime of a captured session (10 minutes).
pub const DEFAULT_SESSION_TTL: Duration = Duration::from_secs(10 * 60);

/// State captured by the CAPTCHA leg.
#[derive(Debug, Clone)]
pub struct SessionData {
    pub cookies: CookieJar,
    pub csrf_token: String,
    pub csrf_name: String,
    created_at: Instant,
}

impl SessionData {
    fn is_expired(&self, ttl: Duration) -> bool {
        self.created_at.elapsed() > ttl
    }

    /// How long ago the session was created.
    pub fn age(&self) -> Duration {
        self.created_at.elapsed()
    }

    pub fn into_flow_state(self) -> FlowState {
        FlowState {
            cookies: self.cookies,
            csrf_token: self.csrf_token,
            csrf_name: self.csrf_name,
        }
    }
}

/// In-memory store of pending sessions.
///
/// Shared by reference (usually behind an `Arc`); every mutation happens
/// under one lock so `consume` hands a session to at most one caller.
pub struct SessionStore {
    sessions: Mutex<HashMap<String, SessionData>>,
    ttl: Duration,
}

impl SessionStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Store captured state and return the new session id.
    pub async fn create(&self, state: FlowState) -> String {
        let id = uuid::Uuid::new_v4().to_string();
        let mut sessions = self.sessions.lock().await;

        sweep(&mut sessions, self.ttl);
        sessions.insert(
            id.clone(),
            SessionData {
                cookies: state.cookies,
                csrf_token: state.csrf_token,
                csrf_name: state.csrf_name,
                created_at: Instant::now(),
            },
        );
        tracing::debug!("Created session {id} ({} active)", sessions.len());
        id
    }

    /// Take the session out of the store.
    ///
    /// Missing and expired sessions both report `SessionExpired`; the caller
    /// recovers the same way in either case.
    pub async fn consume(&self, session_id: &str) -> VerifyResult<SessionData> {
        let session = self
            .sessions
            .lock()
            .await
            .remove(session_id)
            .ok_or(VerifyError::SessionExpired)?;

        if session.is_expired(self.ttl) {
            tracing::debug!("Session {session_id} expired after {:?}", session.age());
            return Err(VerifyError::SessionExpired);
        }
        Ok(session)
    }

    /// Remove all expired sessions, returning how many were dropped.
    pub async fn sweep_expired(&self) -> usize {
        let mut sessions = self.sessions.lock().await;
        sweep(&mut sessions, self.ttl)
    }

    /// Number of pending sessions.
    pub async fn len(&self) -> usize {
        self.sessions.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

fn sweep(sessions: &mut HashMap<String, SessionData>, ttl: Duration) -> usize {
    let before = sessions.len();
    sessions.retain(|_, s| !s.is_expired(ttl));
    let swept = before - sessions.len();
    if swept > 0 {
        tracing::debug!("Swept {swept} expired session(s)");
    }
    swept
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new(DEFAULT_SESSION_TTL)
    }
}
