//! Opaque session tokens.
//!
//! Clients hold a random token; the store only ever sees its SHA-256 digest.
//! A session is valid strictly before `expires_at` and is never renewed.

use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use scholar_core::UserId;

/// Raw token as presented by a client (cookie or bearer header).
#[derive(Clone, PartialEq, Eq)]
pub struct SessionToken(String);

impl SessionToken {
    /// Generate a fresh 256-bit token, hex encoded.
    pub fn generate() -> Self {
        let mut rng = rand::rng();
        let bytes: [u8; 32] = rng.random();
        Self(hex::encode(bytes))
    }

    /// Accept a presented token. Blank input is treated as no token at all.
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        if raw.is_empty() {
            None
        } else {
            Some(Self(raw.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Digest stored in place of the token.
    pub fn hash(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.0.as_bytes());
        hex::encode(hasher.finalize())
    }
}

// Tokens are credentials; keep them out of logs.
impl core::fmt::Debug for SessionToken {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str("SessionToken(..)")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub token_hash: String,
    pub user_id: UserId,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl Session {
    pub fn new(token: &SessionToken, user_id: UserId, now: DateTime<Utc>, ttl: Duration) -> Self {
        Self {
            token_hash: token.hash(),
            user_id,
            created_at: now,
            expires_at: now + ttl,
        }
    }

    /// Expired sessions are treated exactly like absent ones.
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at
    }
}

/// A session just created for a client, carrying the only copy of the token.
#[derive(Debug, Clone)]
pub struct IssuedSession {
    pub token: SessionToken,
    pub session: Session,
}
