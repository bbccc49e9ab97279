use std::{fmt, sync::Arc};

use chrono::{DateTime, Duration, Utc};
use crewlink_core::{ShareCrypto, error::CryptoError};
use crewlink_model::Actor;
use dashmap::DashMap;
use serde::Serialize;

/// A bearer session handed to a signed-in actor.
#[derive(Clone, Serialize)]
pub struct IssuedSession {
    pub token: String,
    pub actor: Actor,
    pub expires_at: DateTime<Utc>,
}

impl fmt::Debug for IssuedSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IssuedSession")
            .field("token", &"<redacted>")
            .field("actor", &self.actor)
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

#[derive(Debug, Clone)]
struct SessionRecord {
    actor: Actor,
    expires_at: DateTime<Utc>,
}

/// Maps opaque session bearers to actors.
///
/// Identity itself lives with an external provider; this directory only
/// remembers which bearer belongs to which account. Tokens are kept as
/// keyed digests.
pub struct SessionDirectory {
    crypto: Arc<ShareCrypto>,
    ttl: Duration,
    sessions: DashMap<String, SessionRecord>,
}

impl fmt::Debug for SessionDirectory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionDirectory")
            .field("ttl", &self.ttl)
            .field("active", &self.sessions.len())
            .finish()
    }
}

impl SessionDirectory {
    pub fn new(crypto: Arc<ShareCrypto>, ttl: Duration) -> Self {
        Self {
            crypto,
            ttl,
            sessions: DashMap::new(),
        }
    }

    pub fn issue(&self, actor: Actor) -> Result<IssuedSession, CryptoError> {
        let token = self.crypto.generate_token()?;
        let expires_at = Utc::now() + self.ttl;
        self.sessions.insert(
            self.crypto.hash_token(&token),
            SessionRecord { actor, expires_at },
        );
        tracing::debug!(actor_id = %actor.id, role = %actor.role, "session issued");

        Ok(IssuedSession {
            token,
            actor,
            expires_at,
        })
    }

    /// The actor behind `token`, if the session exists and is unexpired.
    pub fn resolve(&self, token: &str) -> Option<Actor> {
        let key = self.crypto.hash_token(token.trim());
        let now = Utc::now();

        let record = self.sessions.get(&key).map(|r| r.value().clone())?;
        if now >= record.expires_at {
            self.sessions.remove(&key);
            return None;
        }
        Some(record.actor)
    }

    pub fn revoke(&self, token: &str) -> bool {
        self.sessions
            .remove(&self.crypto.hash_token(token.trim()))
            .is_some()
    }

    pub fn purge_expired(&self, now: DateTime<Utc>) -> usize {
        let before = self.sessions.len();
        self.sessions.retain(|_, record| record.expires_at > now);
        before - self.sessions.len()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crewlink_model::UserId;

    fn directory(ttl: Duration) -> SessionDirectory {
        SessionDirectory::new(Arc::new(ShareCrypto::new("session-key").unwrap()), ttl)
    }

    #[test]
    fn issued_sessions_resolve_until_revoked() {
        let sessions = directory(Duration::hours(1));
        let actor = Actor::contractor(UserId::new());
        let issued = sessions.issue(actor).unwrap();

        assert_eq!(sessions.resolve(&issued.token), Some(actor));
        assert_eq!(sessions.resolve("not-a-session"), None);
        assert!(sessions.revoke(&issued.token));
        assert_eq!(sessions.resolve(&issued.token), None);
    }

    #[test]
    fn expired_sessions_are_dropped() {
        let sessions = directory(Duration::zero());
        let issued = sessions.issue(Actor::customer(UserId::new())).unwrap();

        assert_eq!(sessions.resolve(&issued.token), None);
        assert!(sessions.is_empty());

        let sessions = directory(Duration::minutes(5));
        sessions.issue(Actor::customer(UserId::new())).unwrap();
        assert_eq!(sessions.purge_expired(Utc::now() + Duration::minutes(10)), 1);
    }

    #[test]
    fn debug_output_hides_the_token() {
        let sessions = directory(Duration::hours(1));
        let issued = sessions.issue(Actor::customer(UserId::new())).unwrap();
        assert!(!format!("{issued:?}").contains(&issued.token));
    }
}
