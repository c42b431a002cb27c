use std::sync::{Arc, PoisonError, RwLock};

use tokio::sync::watch;

use winespa_authz::{Principal, SessionSnapshot};
use winespa_core::SessionId;

/// Supplies the current principal and notifies on login, logout and restore.
pub trait SessionProvider: Send + Sync {
    fn current(&self) -> SessionSnapshot;
    fn subscribe(&self) -> watch::Receiver<SessionSnapshot>;

    /// Identifier of the current login, if the provider tracks one.
    fn session_id(&self) -> Option<SessionId> {
        None
    }
}

impl<P> SessionProvider for Arc<P>
where
    P: SessionProvider + ?Sized,
{
    fn current(&self) -> SessionSnapshot {
        (**self).current()
    }

    fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        (**self).subscribe()
    }

    fn session_id(&self) -> Option<SessionId> {
        (**self).session_id()
    }
}

/// Session held in memory; starts [`SessionSnapshot::Unknown`] until restored.
#[derive(Debug)]
pub struct InMemorySessionProvider {
    tx: watch::Sender<SessionSnapshot>,
    session_id: RwLock<Option<SessionId>>,
}

impl InMemorySessionProvider {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(SessionSnapshot::Unknown);
        Self {
            tx,
            session_id: RwLock::new(None),
        }
    }

    /// Finish session restore with whatever was persisted.
    pub fn restore(&self, principal: Option<Principal>) {
        self.publish(principal.into());
    }

    pub fn login(&self, principal: Principal) {
        self.publish(SessionSnapshot::Authenticated(principal));
    }

    pub fn logout(&self) {
        self.publish(SessionSnapshot::Anonymous);
    }

    fn publish(&self, snapshot: SessionSnapshot) {
        // every sign-in is a new session, even for the same principal
        let session_id = snapshot.principal().map(|_| SessionId::new());
        *self
            .session_id
            .write()
            .unwrap_or_else(PoisonError::into_inner) = session_id;

        tracing::debug!(
            principal_id = ?snapshot.principal().map(|p| p.id),
            session_id = ?session_id,
            "session changed"
        );
        self.tx.send_replace(snapshot);
    }
}

impl Default for InMemorySessionProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionProvider for InMemorySessionProvider {
    fn current(&self) -> SessionSnapshot {
        self.tx.borrow().clone()
    }

    fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.tx.subscribe()
    }

    fn session_id(&self) -> Option<SessionId> {
        *self.session_id.read().unwrap_or_else(PoisonError::into_inner)
    }
}
