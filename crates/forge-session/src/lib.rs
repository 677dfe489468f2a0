//! BootForge session manager
//!
//! Short-lived authentication tokens for bench workstations. Tokens are
//! high-entropy random values with a fixed TTL; validation updates the
//! activity timestamp but never extends expiry. Repeated authentication
//! failures lock a client out for a fixed window, and the lockout check
//! runs before any credential verification.

#![deny(unsafe_code)]

mod manager;
mod store;

pub use manager::{CredentialVerifier, SessionConfig, SessionManager};
pub use store::{InMemorySessionStore, SessionStore};

use chrono::{DateTime, Utc};
use forge_types::{ClientId, Role};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// An authenticated session.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Session {
    /// Opaque bearer token, 32 random bytes hex-encoded
    pub token: String,
    pub client: ClientId,
    pub role: Role,
    pub created_at: DateTime<Utc>,
    /// Absolute expiry; never moved by activity
    pub expires_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("invalid session token")]
    InvalidToken,

    #[error("session expired")]
    Expired,

    #[error("client {client} locked out until {until}")]
    LockedOut {
        client: ClientId,
        until: DateTime<Utc>,
    },

    #[error("authentication failed")]
    BadCredentials,
}
