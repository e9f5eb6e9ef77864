//! Session capability exposed through the request facade.
//!
//! Storage is pluggable through [`SessionManager`]; [`MemorySessionManager`]
//! is the in-process reference store. Sessions are identified by a cookie
//! (default [`DEFAULT_SESSION_COOKIE`]). No persistence guarantees are made.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::{Duration, Instant, SystemTime};

use serde_json::Value;
use tracing::debug;

/// Cookie carrying the session id
pub const DEFAULT_SESSION_COOKIE: &str = "PORTICO_SESSIONID";

/// Default max-inactive interval of a session
pub const DEFAULT_MAX_INACTIVE: Duration = Duration::from_secs(30 * 60);

/// A server-side session.
///
/// Shared between the store and the exchanges that use it, so all mutation
/// goes through interior locks.
#[derive(Debug)]
pub struct Session {
    id: String,
    created_at: SystemTime,
    last_accessed: Mutex<Instant>,
    max_inactive: Duration,
    attributes: RwLock<HashMap<String, Value>>,
    valid: AtomicBool,
}

impl Session {
    pub fn new(id: impl Into<String>, max_inactive: Duration) -> Self {
        Self {
            id: id.into(),
            created_at: SystemTime::now(),
            last_accessed: Mutex::new(Instant::now()),
            max_inactive,
            attributes: RwLock::new(HashMap::new()),
            valid: AtomicBool::new(true),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn created_at(&self) -> SystemTime {
        self.created_at
    }

    pub fn last_accessed(&self) -> Instant {
        *self
            .last_accessed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    pub fn max_inactive(&self) -> Duration {
        self.max_inactive
    }

    /// Record an access, extending the session's lifetime
    pub fn touch(&self) {
        *self
            .last_accessed
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Instant::now();
    }

    pub fn is_valid(&self) -> bool {
        self.valid.load(Ordering::Acquire) && self.last_accessed().elapsed() <= self.max_inactive
    }

    pub fn invalidate(&self) {
        self.valid.store(false, Ordering::Release);
        self.attributes
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    pub fn attribute(&self, name: &str) -> Option<Value> {
        self.attributes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }

    pub fn set_attribute(&self, name: impl Into<String>, value: Value) {
        self.attributes
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.into(), value);
    }

    pub fn remove_attribute(&self, name: &str) -> Option<Value> {
        self.attributes
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(name)
    }

    pub fn attribute_names(&self) -> Vec<String> {
        self.attributes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect()
    }
}

/// Session storage used by the dispatcher and the request facade
pub trait SessionManager: Send + Sync {
    /// Look up a live session; expired or invalidated sessions are `None`
    fn find(&self, id: &str) -> Option<Arc<Session>>;

    /// Create and store a fresh session
    fn create(&self) -> Arc<Session>;

    /// Drop a session from the store
    fn invalidate(&self, id: &str);

    /// Name of the cookie carrying the session id
    fn cookie_name(&self) -> &str {
        DEFAULT_SESSION_COOKIE
    }
}

/// In-memory session store.
///
/// Expired sessions are dropped when looked up, and in bulk by
/// [`create`](SessionManager::create) once per `max_inactive` period.
pub struct MemorySessionManager {
    sessions: Mutex<HashMap<String, Arc<Session>>>,
    max_inactive: Duration,
    last_sweep: Mutex<Instant>,
}

impl Default for MemorySessionManager {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_INACTIVE)
    }
}

impl MemorySessionManager {
    pub fn new(max_inactive: Duration) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            max_inactive,
            last_sweep: Mutex::new(Instant::now()),
        }
    }

    /// Number of sessions currently held, including expired ones not yet swept
    pub fn len(&self) -> usize {
        self.sessions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remove every expired or invalidated session
    pub fn sweep(&self) -> usize {
        let mut sessions = self
            .sessions
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        *self.last_sweep.lock().unwrap_or_else(PoisonError::into_inner) = Instant::now();
        Self::sweep_locked(&mut sessions)
    }

    fn sweep_locked(sessions: &mut HashMap<String, Arc<Session>>) -> usize {
        let before = sessions.len();
        sessions.retain(|_, s| s.is_valid());
        let removed = before - sessions.len();
        if removed > 0 {
            debug!(removed, remaining = sessions.len(), "Expired sessions swept");
        }
        removed
    }

    /// True at most once per `max_inactive`; restarts the period
    fn sweep_due(&self) -> bool {
        let mut last = self.last_sweep.lock().unwrap_or_else(PoisonError::into_inner);
        if last.elapsed() >= self.max_inactive {
            *last = Instant::now();
            true
        } else {
            false
        }
    }
}

impl SessionManager for MemorySessionManager {
    fn find(&self, id: &str) -> Option<Arc<Session>> {
        let mut sessions = self
            .sessions
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        match sessions.get(id) {
            Some(session) if session.is_valid() => {
                session.touch();
                Some(Arc::clone(session))
            }
            Some(_) => {
                sessions.remove(id);
                None
            }
            None => None,
        }
    }

    fn create(&self) -> Arc<Session> {
        let session = Arc::new(Session::new(ulid::Ulid::new().to_string(), self.max_inactive));
        let sweep = self.sweep_due();
        let mut sessions = self
            .sessions
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if sweep {
            Self::sweep_locked(&mut sessions);
        }
        sessions.insert(session.id().to_string(), Arc::clone(&session));
        drop(sessions);
        debug!(session_id = %session.id(), "Session created");
        session
    }

    fn invalidate(&self, id: &str) {
        if let Some(session) = self
            .sessions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(id)
        {
            session.invalidate();
        }
    }
}
