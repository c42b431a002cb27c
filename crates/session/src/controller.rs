//! Glue between the session, the permission cache and the pure engine.

use std::sync::Arc;

use winespa_authz::{
    ActionGuard, AuthorizationEngine, ControlState, Decision, EvaluateOptions, GuardConfig,
    MenuEntry, MenuVisibilityResolver, PermissionSet, Render, RouteGuard, SessionSnapshot,
};

use crate::cache::{CachedPermissions, LoadError, PermissionCache};
use crate::loaders::PermissionRowsLoader;
use crate::provider::SessionProvider;
use crate::repository::PermissionRowsRepository;

/// Access control for one signed-in (or not yet signed-in) user.
///
/// Every query reads the latest session and cache snapshots; nothing here
/// keeps decisions around.
pub struct AccessSession<L, R, P> {
    engine: Arc<AuthorizationEngine>,
    cache: Arc<PermissionCache<L, R>>,
    provider: P,
    config: GuardConfig,
}

impl<L, R, P> AccessSession<L, R, P>
where
    L: PermissionRowsLoader,
    R: PermissionRowsRepository,
    P: SessionProvider,
{
    pub fn new(
        engine: Arc<AuthorizationEngine>,
        cache: Arc<PermissionCache<L, R>>,
        provider: P,
        config: GuardConfig,
    ) -> Self {
        Self {
            engine,
            cache,
            provider,
            config,
        }
    }

    pub fn engine(&self) -> &AuthorizationEngine {
        &self.engine
    }

    pub fn cache(&self) -> &PermissionCache<L, R> {
        &self.cache
    }

    pub fn session(&self) -> SessionSnapshot {
        self.provider.current()
    }

    fn permissions_for(&self, session: &SessionSnapshot) -> CachedPermissions {
        match session.principal() {
            Some(principal) => self.cache.current_for(principal.id),
            None => CachedPermissions::Pending,
        }
    }

    pub fn permissions(&self) -> CachedPermissions {
        self.permissions_for(&self.session())
    }

    /// Decide a navigation now. A session that is still restoring evaluates
    /// as anonymous; pages should go through [`guard`](Self::guard) instead.
    pub fn evaluate(&self, path: &str, opts: &EvaluateOptions) -> Decision {
        let session = self.session();
        let permissions = self.permissions_for(&session);
        self.engine
            .evaluate(session.principal(), path, permissions.view(), opts)
    }

    pub fn guard(&self, path: impl Into<String>) -> RouteGuard {
        RouteGuard::new(path, self.config.clone())
    }

    /// Advance `guard` against the latest snapshots and report what to render.
    pub fn advance(&self, guard: &mut RouteGuard) -> Render {
        let session = self.session();
        let permissions = self.permissions_for(&session);
        guard.advance(&self.engine, &session, permissions.view());
        guard.render()
    }

    pub fn menu(&self, menu: &[MenuEntry]) -> Vec<MenuEntry> {
        let session = self.session();
        let permissions = self.permissions_for(&session);
        MenuVisibilityResolver::new(&self.engine).resolve(session.principal(), permissions.view(), menu)
    }

    pub fn allowed_routes(&self) -> Vec<String> {
        let session = self.session();
        let permissions = self.permissions_for(&session);
        MenuVisibilityResolver::new(&self.engine).allowed_routes(session.principal(), permissions.view())
    }

    pub fn control(&self, guard: &ActionGuard) -> ControlState {
        let session = self.session();
        let permissions = self.permissions_for(&session);
        guard.state(&self.engine, session.principal(), permissions.view())
    }

    /// Bring the cache in line with the current session once.
    pub async fn sync(&self) -> Result<Option<Arc<PermissionSet>>, LoadError> {
        match self.session() {
            SessionSnapshot::Authenticated(principal) => self.cache.load(&principal).await.map(Some),
            SessionSnapshot::Anonymous => {
                self.cache.invalidate();
                Ok(None)
            }
            SessionSnapshot::Unknown => Ok(None),
        }
    }

    /// The signed-in principal's grants changed server-side: drop the set and
    /// load it again.
    pub async fn permissions_changed(&self) -> Result<Option<Arc<PermissionSet>>, LoadError> {
        match self.session() {
            SessionSnapshot::Authenticated(principal) => {
                self.cache.reload(&principal).await.map(Some)
            }
            SessionSnapshot::Anonymous | SessionSnapshot::Unknown => Ok(None),
        }
    }

    /// Follow session changes until the provider goes away: load on login,
    /// invalidate on logout, abandon a load when the principal changes mid-way
    /// and load again whenever the cache is invalidated under a live session.
    pub async fn run(&self) {
        let mut rx = self.provider.subscribe();
        let mut invalidations = self.cache.subscribe_invalidations();
        loop {
            let snapshot = rx.borrow_and_update().clone();
            tracing::debug!(
                session_id = ?self.provider.session_id(),
                principal_id = ?snapshot.principal().map(|p| p.id),
                "following session change"
            );
            match snapshot {
                SessionSnapshot::Authenticated(principal) => {
                    invalidations.borrow_and_update();
                    let settled = tokio::select! {
                        result = self.cache.load(&principal) => match result {
                            Ok(_) => true,
                            Err(err) => {
                                tracing::debug!(error = %err, "permission load discarded; loading again");
                                false
                            }
                        },
                        Ok(()) = invalidations.changed() => false,
                        changed = rx.changed() => {
                            if changed.is_err() {
                                return;
                            }
                            false
                        }
                    };
                    if settled {
                        tokio::select! {
                            changed = rx.changed() => {
                                if changed.is_err() {
                                    return;
                                }
                            }
                            Ok(()) = invalidations.changed() => {}
                        }
                    }
                }
                SessionSnapshot::Anonymous => {
                    self.cache.invalidate();
                    if rx.changed().await.is_err() {
                        return;
                    }
                }
                SessionSnapshot::Unknown => {
                    if rx.changed().await.is_err() {
                        return;
                    }
                }
            }
        }
    }
}
