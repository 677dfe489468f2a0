//! Session storage seam.
//!
//! The manager owns all policy (TTL, lockout, eviction); the store only
//! holds sessions and per-client failure state. Deployments that want a
//! shared store across workstations implement `SessionStore` themselves.

use chrono::{DateTime, Utc};
use forge_types::ClientId;
use std::collections::HashMap;
use std::sync::Mutex;

use crate::Session;

pub trait SessionStore: Send + Sync {
    fn get(&self, token: &str) -> Option<Session>;
    fn insert(&self, session: Session);
    fn remove(&self, token: &str) -> Option<Session>;
    fn len(&self) -> usize;
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
    /// Token of the session with the earliest `created_at`, if any.
    fn oldest_token(&self) -> Option<String>;
    /// Set `last_activity` on an existing session.
    fn touch(&self, token: &str, at: DateTime<Utc>);

    fn failure_count(&self, client: &ClientId) -> u32;
    /// Increment and return the consecutive-failure count.
    fn record_failure(&self, client: &ClientId) -> u32;
    fn reset_failures(&self, client: &ClientId);
    fn lockout_until(&self, client: &ClientId) -> Option<DateTime<Utc>>;
    fn set_lockout(&self, client: &ClientId, until: DateTime<Utc>);
    fn clear_lockout(&self, client: &ClientId);
}

#[derive(Default)]
struct Inner {
    sessions: HashMap<String, Session>,
    failures: HashMap<ClientId, u32>,
    lockouts: HashMap<ClientId, DateTime<Utc>>,
}

/// Process-local store used by default and in tests.
#[derive(Default)]
pub struct InMemorySessionStore {
    inner: Mutex<Inner>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl SessionStore for InMemorySessionStore {
    fn get(&self, token: &str) -> Option<Session> {
        self.lock().sessions.get(token).cloned()
    }

    fn insert(&self, session: Session) {
        self.lock().sessions.insert(session.token.clone(), session);
    }

    fn remove(&self, token: &str) -> Option<Session> {
        self.lock().sessions.remove(token)
    }

    fn len(&self) -> usize {
        self.lock().sessions.len()
    }

    fn oldest_token(&self) -> Option<String> {
        self.lock()
            .sessions
            .values()
            .min_by_key(|s| s.created_at)
            .map(|s| s.token.clone())
    }

    fn touch(&self, token: &str, at: DateTime<Utc>) {
        if let Some(session) = self.lock().sessions.get_mut(token) {
            session.last_activity = at;
        }
    }

    fn failure_count(&self, client: &ClientId) -> u32 {
        self.lock().failures.get(client).copied().unwrap_or(0)
    }

    fn record_failure(&self, client: &ClientId) -> u32 {
        let mut inner = self.lock();
        let count = inner.failures.entry(client.clone()).or_insert(0);
        *count += 1;
        *count
    }

    fn reset_failures(&self, client: &ClientId) {
        self.lock().failures.remove(client);
    }

    fn lockout_until(&self, client: &ClientId) -> Option<DateTime<Utc>> {
        self.lock().lockouts.get(client).copied()
    }

    fn set_lockout(&self, client: &ClientId, until: DateTime<Utc>) {
        self.lock().lockouts.insert(client.clone(), until);
    }

    fn clear_lockout(&self, client: &ClientId) {
        self.lock().lockouts.remove(client);
    }
}
