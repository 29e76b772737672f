//! The authoritative session registry.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use super::{Session, SessionId};
use crate::error::RelayError;
use crate::Result;

/// Thread-safe mapping from session identity to live sessions.
///
/// The registry holds a non-owning association for lookup only: the
/// connection handler attached to a session decides when it ends and must
/// remove it on every exit path. An identity present here always corresponds
/// to a session whose handler is still running or is in the process of
/// deregistering.
///
/// Writers take the lock exclusively, lookups share it, and no operation
/// performs I/O under the lock.
pub struct SessionRegistry {
    sessions: RwLock<HashMap<SessionId, Arc<Session>>>,
}

impl SessionRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Insert a session under its identity.
    ///
    /// Fails with [`RelayError::DuplicateIdentity`] if the identity is
    /// already registered. Identities are random 128-bit values, so a
    /// collision is an internal invariant violation, not a client error.
    pub fn register(&self, session: Arc<Session>) -> Result<()> {
        let mut sessions = self
            .sessions
            .write()
            .map_err(|_| RelayError::LockPoisoned)?;

        let id = session.id();
        if sessions.contains_key(&id) {
            return Err(RelayError::DuplicateIdentity(id));
        }
        sessions.insert(id, session);
        Ok(())
    }

    /// Remove a session.
    ///
    /// Idempotent: absent entries are a no-op, so removal is safe to call
    /// from multiple exit paths. Returns the removed session, if any.
    pub fn remove(&self, id: &SessionId) -> Result<Option<Arc<Session>>> {
        let mut sessions = self
            .sessions
            .write()
            .map_err(|_| RelayError::LockPoisoned)?;
        Ok(sessions.remove(id))
    }

    /// Look up a session by identity. Read-only, does not affect lifetime.
    pub fn lookup(&self, id: &SessionId) -> Result<Option<Arc<Session>>> {
        let sessions = self.sessions.read().map_err(|_| RelayError::LockPoisoned)?;
        Ok(sessions.get(id).cloned())
    }

    /// Point-in-time enumeration of all sessions.
    ///
    /// For diagnostics only; inherently racy with respect to concurrent
    /// register/remove and must not be used for correctness decisions.
    pub fn snapshot(&self) -> Result<Vec<Arc<Session>>> {
        let sessions = self.sessions.read().map_err(|_| RelayError::LockPoisoned)?;
        Ok(sessions.values().cloned().collect())
    }

    /// Number of registered sessions.
    pub fn count(&self) -> usize {
        self.sessions.read().map(|s| s.len()).unwrap_or(0)
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    const TTL: Duration = Duration::from_secs(300);

    fn session() -> Arc<Session> {
        Arc::new(Session::new(SessionId::new(), TTL))
    }

    #[test]
    fn test_register_and_lookup() {
        let registry = SessionRegistry::new();
        let s = session();
        let id = s.id();

        registry.register(Arc::clone(&s)).unwrap();
        assert_eq!(registry.count(), 1);

        let found = registry.lookup(&id).unwrap().unwrap();
        assert_eq!(found.id(), id);
    }

    #[test]
    fn test_lookup_absent() {
        let registry = SessionRegistry::new();
        assert!(registry.lookup(&SessionId::new()).unwrap().is_none());
    }

    #[test]
    fn test_register_duplicate_identity() {
        let registry = SessionRegistry::new();
        let s = session();
        let id = s.id();

        registry.register(Arc::clone(&s)).unwrap();
        let dup = Arc::new(Session::new(id, TTL));
        let err = registry.register(dup).unwrap_err();
        assert!(matches!(err, RelayError::DuplicateIdentity(d) if d == id));

        // The original entry is untouched.
        assert_eq!(registry.count(), 1);
    }

    #[test]
    fn test_remove_is_idempotent() {
        let registry = SessionRegistry::new();
        let s = session();
        let id = s.id();
        registry.register(s).unwrap();

        assert!(registry.remove(&id).unwrap().is_some());
        assert!(registry.remove(&id).unwrap().is_none());
        assert_eq!(registry.count(), 0);
    }

    #[test]
    fn test_lookup_after_remove_is_not_found() {
        let registry = SessionRegistry::new();
        let s = session();
        let id = s.id();
        registry.register(s).unwrap();
        registry.remove(&id).unwrap();

        assert!(registry.lookup(&id).unwrap().is_none());
    }

    #[test]
    fn test_snapshot() {
        let registry = SessionRegistry::new();
        let ids: Vec<SessionId> = (0..3)
            .map(|_| {
                let s = session();
                let id = s.id();
                registry.register(s).unwrap();
                id
            })
            .collect();

        let snapshot = registry.snapshot().unwrap();
        assert_eq!(snapshot.len(), 3);
        for id in ids {
            assert!(snapshot.iter().any(|s| s.id() == id));
        }
    }

    #[test]
    fn test_concurrent_register_remove() {
        use std::thread;

        let registry = Arc::new(SessionRegistry::new());
        let mut handles = vec![];

        for _ in 0..50 {
            let registry = Arc::clone(&registry);
            handles.push(thread::spawn(move || {
                let s = session();
                let id = s.id();
                registry.register(s).unwrap();
                id
            }));
        }

        let ids: Vec<SessionId> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert_eq!(registry.count(), 50);

        // Removals for one identity never disturb others.
        let mut handles = vec![];
        for id in ids.clone() {
            let registry = Arc::clone(&registry);
            handles.push(thread::spawn(move || {
                registry.remove(&id).unwrap();
            }));
        }
        for h in handles {
            h.join().unwrap();
        }

        assert_eq!(registry.count(), 0);
        for id in ids {
            assert!(registry.lookup(&id).unwrap().is_none());
        }
    }
}
