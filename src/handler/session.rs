//! Cookie-keyed sessions.
//!
//! A worker resolves the session before the handler runs: the `SESSIONID`
//! cookie selects an existing session, otherwise a fresh one is created and
//! its id is sent back in a `Set-Cookie` line. A periodic reaper drops
//! sessions idle for longer than the configured timeout.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use parking_lot::Mutex;
use tracing::debug;
use uuid::Uuid;

/// Name of the session cookie.
pub const SESSION_COOKIE: &str = "SESSIONID";

#[derive(Debug)]
pub struct Session {
    id: String,
    created: Instant,
    last_accessed: Mutex<Instant>,
    attributes: Mutex<HashMap<String, String>>,
}

impl Session {
    pub fn new(id: impl Into<String>) -> Self {
        let now = Instant::now();
        Self {
            id: id.into(),
            created: now,
            last_accessed: Mutex::new(now),
            attributes: Mutex::new(HashMap::new()),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn creation_time(&self) -> Instant {
        self.created
    }

    pub fn last_accessed_time(&self) -> Instant {
        *self.last_accessed.lock()
    }

    pub fn touch(&self) {
        *self.last_accessed.lock() = Instant::now();
    }

    pub fn attribute(&self, key: &str) -> Option<String> {
        self.attributes.lock().get(key).cloned()
    }

    pub fn set_attribute(&self, key: impl Into<String>, value: impl Into<String>) -> Option<String> {
        self.attributes.lock().insert(key.into(), value.into())
    }

    pub fn remove_attribute(&self, key: &str) -> Option<String> {
        self.attributes.lock().remove(key)
    }

    pub fn is_expired(&self, now: Instant, idle: Duration) -> bool {
        now.saturating_duration_since(self.last_accessed_time()) > idle
    }
}

/// Session storage as seen by the request processor.
pub trait SessionStore: Send + Sync {
    /// Creates and stores a new session with a fresh id.
    fn create_session(&self) -> Arc<Session>;

    /// Looks up a live session. Expired sessions are never returned.
    fn get_session(&self, id: &str) -> Option<Arc<Session>>;

    /// Drops expired sessions, returning how many were removed.
    fn evict_expired(&self) -> usize {
        0
    }
}

/// In-process session store.
#[derive(Debug)]
pub struct MemorySessionStore {
    sessions: DashMap<String, Arc<Session>>,
    idle: Duration,
}

impl MemorySessionStore {
    pub fn new(idle: Duration) -> Self {
        Self {
            sessions: DashMap::new(),
            idle,
        }
    }

    pub fn invalidate(&self, id: &str) -> bool {
        self.sessions.remove(id).is_some()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

impl SessionStore for MemorySessionStore {
    fn create_session(&self) -> Arc<Session> {
        let session = Arc::new(Session::new(Uuid::new_v4().to_string()));
        self.sessions
            .insert(session.id().to_string(), Arc::clone(&session));
        debug!(session = session.id(), "session created");
        session
    }

    fn get_session(&self, id: &str) -> Option<Arc<Session>> {
        let session = self.sessions.get(id).map(|s| Arc::clone(s.value()))?;
        if session.is_expired(Instant::now(), self.idle) {
            self.sessions.remove(id);
            return None;
        }
        Some(session)
    }

    fn evict_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.sessions.len();
        self.sessions
            .retain(|_, session| !session.is_expired(now, self.idle));
        let evicted = before.saturating_sub(self.sessions.len());
        if evicted > 0 {
            debug!(evicted, "expired sessions dropped");
        }
        evicted
    }
}
