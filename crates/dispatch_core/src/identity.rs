//! Identity registry: logical participants to live transport connections.
//!
//! The registry holds at most one binding per `(ParticipantId, Role)` pair.
//! A later `bind` for the same identity silently supersedes the earlier
//! binding (the old connection is no longer addressable but is not closed).
//! A connection re-joining as a different identity releases the identity it
//! held before, so disconnect always evicts exactly what the connection owns.
//! Bindings live only for the process lifetime: a crash loses them all and
//! clients re-announce on reconnect.
//!
//! All operations are total. A `lookup` miss means the participant is
//! offline, which is a normal outcome and not an error.

use std::collections::HashMap;
use std::sync::RwLock;

use chrono::{DateTime, Utc};

use crate::ids::{ConnectionId, ParticipantId, Role};

#[derive(Debug, Clone)]
pub struct Binding {
    pub participant: ParticipantId,
    pub role: Role,
    pub connection: ConnectionId,
    pub last_seen: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct RegistryInner {
    by_identity: HashMap<(ParticipantId, Role), Binding>,
    by_connection: HashMap<ConnectionId, (ParticipantId, Role)>,
}

/// Process-wide registry, created at service start and cleared at shutdown.
/// Shared by reference with every component that resolves identities.
#[derive(Debug, Default)]
pub struct IdentityRegistry {
    inner: RwLock<RegistryInner>,
}

impl IdentityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Idempotent upsert: any prior binding for the same identity is dropped.
    pub fn bind(&self, participant: ParticipantId, role: Role, connection: ConnectionId) {
        let mut inner = match self.inner.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let key = (participant.clone(), role);
        // A connection re-joining as a different identity releases the
        // identity it held before, otherwise that binding would outlive the
        // connection's disconnect.
        let previous_key = inner.by_connection.get(&connection).cloned();
        if let Some(previous_key) = previous_key {
            if previous_key != key {
                inner.by_identity.remove(&previous_key);
            }
        }
        let stale = inner
            .by_identity
            .get(&key)
            .map(|binding| binding.connection.clone());
        if let Some(stale) = stale {
            inner.by_connection.remove(&stale);
        }
        inner
            .by_connection
            .insert(connection.clone(), key.clone());
        inner.by_identity.insert(
            key,
            Binding {
                participant,
                role,
                connection,
                last_seen: Utc::now(),
            },
        );
    }

    /// Remove the binding whose handle matches. No-op if the connection is
    /// unknown; disconnect races are expected and must not error. A binding
    /// already superseded by a newer connection is left untouched.
    pub fn unbind(&self, connection: &ConnectionId) {
        let mut inner = match self.inner.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Some(key) = inner.by_connection.remove(connection) {
            let still_current = inner
                .by_identity
                .get(&key)
                .map(|binding| binding.connection == *connection)
                .unwrap_or(false);
            if still_current {
                inner.by_identity.remove(&key);
            }
        }
    }

    /// Pure read; `None` means the participant is offline.
    pub fn lookup(&self, participant: &ParticipantId, role: Role) -> Option<ConnectionId> {
        let inner = match self.inner.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        inner
            .by_identity
            .get(&(participant.clone(), role))
            .map(|binding| binding.connection.clone())
    }

    pub fn len(&self) -> usize {
        let inner = match self.inner.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        inner.by_identity.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every binding (service shutdown).
    pub fn clear(&self) {
        let mut inner = match self.inner.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        inner.by_identity.clear();
        inner.by_connection.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn conn(id: &str) -> ConnectionId {
        ConnectionId::new(id)
    }

    #[test]
    fn bind_then_lookup_returns_connection() {
        let registry = IdentityRegistry::new();
        registry.bind("r1".into(), Role::Rider, conn("c1"));

        assert_eq!(
            registry.lookup(&"r1".into(), Role::Rider),
            Some(conn("c1"))
        );
        assert_eq!(registry.lookup(&"r1".into(), Role::Driver), None);
    }

    #[test]
    fn rebind_supersedes_earlier_connection() {
        let registry = IdentityRegistry::new();
        registry.bind("d1".into(), Role::Driver, conn("c1"));
        registry.bind("d1".into(), Role::Driver, conn("c2"));

        assert_eq!(
            registry.lookup(&"d1".into(), Role::Driver),
            Some(conn("c2"))
        );
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn unbind_removes_only_matching_connection() {
        let registry = IdentityRegistry::new();
        registry.bind("d1".into(), Role::Driver, conn("c1"));
        registry.unbind(&conn("c1"));

        assert_eq!(registry.lookup(&"d1".into(), Role::Driver), None);
        assert!(registry.is_empty());
    }

    #[test]
    fn unbind_unknown_connection_is_noop() {
        let registry = IdentityRegistry::new();
        registry.bind("d1".into(), Role::Driver, conn("c1"));
        registry.unbind(&conn("never-seen"));

        assert_eq!(
            registry.lookup(&"d1".into(), Role::Driver),
            Some(conn("c1"))
        );
    }

    #[test]
    fn late_disconnect_of_superseded_connection_keeps_new_binding() {
        let registry = IdentityRegistry::new();
        registry.bind("d1".into(), Role::Driver, conn("c1"));
        registry.bind("d1".into(), Role::Driver, conn("c2"));
        // The old transport reports its disconnect after the re-join.
        registry.unbind(&conn("c1"));

        assert_eq!(
            registry.lookup(&"d1".into(), Role::Driver),
            Some(conn("c2"))
        );
    }

    #[test]
    fn rejoining_as_a_different_identity_releases_the_old_binding() {
        let registry = IdentityRegistry::new();
        registry.bind("alice".into(), Role::Rider, conn("c1"));
        registry.bind("bob".into(), Role::Rider, conn("c1"));

        // The connection now answers for bob only.
        assert_eq!(registry.lookup(&"alice".into(), Role::Rider), None);
        assert_eq!(registry.lookup(&"bob".into(), Role::Rider), Some(conn("c1")));
        assert_eq!(registry.len(), 1);

        registry.unbind(&conn("c1"));
        assert_eq!(registry.lookup(&"bob".into(), Role::Rider), None);
        assert!(registry.is_empty());
    }

    #[test]
    fn same_id_different_roles_are_independent_bindings() {
        let registry = IdentityRegistry::new();
        registry.bind("p1".into(), Role::Rider, conn("c1"));
        registry.bind("p1".into(), Role::Driver, conn("c2"));

        assert_eq!(registry.lookup(&"p1".into(), Role::Rider), Some(conn("c1")));
        assert_eq!(
            registry.lookup(&"p1".into(), Role::Driver),
            Some(conn("c2"))
        );
        assert_eq!(registry.len(), 2);
    }
}
