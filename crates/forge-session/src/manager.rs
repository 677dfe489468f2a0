//! Session lifecycle and lockout policy.

use chrono::{DateTime, Duration, Utc};
use forge_types::{ClientId, Role};
use rand::rngs::OsRng;
use rand::RngCore;
use tracing::{info, warn};

use crate::{Session, SessionError, SessionStore};

/// Checks a client's credential. Implementations must be constant-shape:
/// they are only consulted when the client is not locked out.
pub trait CredentialVerifier: Send + Sync {
    fn verify(&self, client: &ClientId, secret: &str) -> bool;
}

impl<F> CredentialVerifier for F
where
    F: Fn(&ClientId, &str) -> bool + Send + Sync,
{
    fn verify(&self, client: &ClientId, secret: &str) -> bool {
        self(client, secret)
    }
}

#[derive(Clone, Debug)]
pub struct SessionConfig {
    /// Fixed lifetime of every session
    pub ttl: Duration,
    /// Store capacity; the oldest session is evicted when full
    pub max_sessions: usize,
    /// Consecutive failures that trigger a lockout
    pub lockout_threshold: u32,
    pub lockout_duration: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::minutes(30),
            max_sessions: 64,
            lockout_threshold: 5,
            lockout_duration: Duration::minutes(15),
        }
    }
}

pub struct SessionManager {
    store: Box<dyn SessionStore>,
    verifier: Box<dyn CredentialVerifier>,
    config: SessionConfig,
}

impl SessionManager {
    pub fn new(
        store: Box<dyn SessionStore>,
        verifier: Box<dyn CredentialVerifier>,
        config: SessionConfig,
    ) -> Self {
        Self {
            store,
            verifier,
            config,
        }
    }

    /// Verify a credential and mint a session.
    ///
    /// The lockout window is checked before the verifier runs; a locked-out
    /// client's credential is never inspected.
    pub fn authenticate(
        &self,
        client: &ClientId,
        secret: &str,
        role: Role,
    ) -> Result<Session, SessionError> {
        self.authenticate_at(client, secret, role, Utc::now())
    }

    pub fn authenticate_at(
        &self,
        client: &ClientId,
        secret: &str,
        role: Role,
        now: DateTime<Utc>,
    ) -> Result<Session, SessionError> {
        if let Some(until) = self.store.lockout_until(client) {
            if now < until {
                return Err(SessionError::LockedOut {
                    client: client.clone(),
                    until,
                });
            }
            self.store.clear_lockout(client);
        }

        if !self.verifier.verify(client, secret) {
            let failures = self.store.record_failure(client);
            if failures >= self.config.lockout_threshold {
                let until = now + self.config.lockout_duration;
                self.store.set_lockout(client, until);
                self.store.reset_failures(client);
                warn!(client = %client, %until, "client locked out after repeated failures");
                return Err(SessionError::LockedOut {
                    client: client.clone(),
                    until,
                });
            }
            return Err(SessionError::BadCredentials);
        }

        self.store.reset_failures(client);
        Ok(self.create_session_at(client, role, now))
    }

    /// Mint a session without credential verification. Used after an
    /// out-of-band authentication, e.g. an admin console login.
    pub fn create_session(&self, client: &ClientId, role: Role) -> Session {
        self.create_session_at(client, role, Utc::now())
    }

    pub fn create_session_at(&self, client: &ClientId, role: Role, now: DateTime<Utc>) -> Session {
        while self.store.len() >= self.config.max_sessions {
            match self.store.oldest_token() {
                Some(oldest) => {
                    self.store.remove(&oldest);
                    warn!(client = %client, "session store full, evicted oldest session");
                }
                None => break,
            }
        }

        let session = Session {
            token: generate_token(),
            client: client.clone(),
            role,
            created_at: now,
            expires_at: now + self.config.ttl,
            last_activity: now,
        };
        self.store.insert(session.clone());
        info!(client = %client, expires_at = %session.expires_at, "session created");
        session
    }

    pub fn validate_session(&self, token: &str) -> Result<Session, SessionError> {
        self.validate_session_at(token, Utc::now())
    }

    pub fn validate_session_at(
        &self,
        token: &str,
        now: DateTime<Utc>,
    ) -> Result<Session, SessionError> {
        let session = self.store.get(token).ok_or(SessionError::InvalidToken)?;
        if now >= session.expires_at {
            self.store.remove(token);
            return Err(SessionError::Expired);
        }
        self.store.touch(token, now);
        Ok(Session {
            last_activity: now,
            ..session
        })
    }

    /// Returns true if a session was removed.
    pub fn revoke_session(&self, token: &str) -> bool {
        let removed = self.store.remove(token).is_some();
        if removed {
            info!("session revoked");
        }
        removed
    }

    pub fn active_sessions(&self) -> usize {
        self.store.len()
    }
}

fn generate_token() -> String {
    let mut bytes = [0u8; 32];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}
