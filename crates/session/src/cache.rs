//! Per-session permission set cache.
//!
//! One set is current at a time. Loads for the same principal share one fetch;
//! a load for anyone else (or an invalidation) bumps the generation, and any
//! older load that finishes afterwards is discarded instead of written.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use thiserror::Error;
use tokio::sync::watch;

use winespa_authz::{AccessError, PermissionCatalog, PermissionSet, PermissionView, Principal};
use winespa_core::PrincipalId;

use crate::loaders::PermissionRowsLoader;
use crate::repository::PermissionRowsRepository;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LoadError {
    /// A newer load or an invalidation replaced this one before it committed.
    #[error("permission load for principal {principal_id} was superseded")]
    Superseded { principal_id: PrincipalId },
}

/// Snapshot of the cache as seen by a caller.
#[derive(Debug, Clone)]
pub enum CachedPermissions {
    /// Nothing committed yet for the principal. Unknown, not empty.
    Pending,
    Ready(Arc<PermissionSet>),
}

impl CachedPermissions {
    pub fn view(&self) -> PermissionView<'_> {
        match self {
            CachedPermissions::Pending => PermissionView::Pending,
            CachedPermissions::Ready(set) => PermissionView::Loaded(set),
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, CachedPermissions::Pending)
    }

    pub fn set(&self) -> Option<&Arc<PermissionSet>> {
        match self {
            CachedPermissions::Pending => None,
            CachedPermissions::Ready(set) => Some(set),
        }
    }
}

type Outcome = Option<Result<Arc<PermissionSet>, LoadError>>;

struct Inflight {
    principal_id: PrincipalId,
    generation: u64,
    rx: watch::Receiver<Outcome>,
}

#[derive(Default)]
struct CacheState {
    generation: u64,
    current: Option<Arc<PermissionSet>>,
    inflight: Option<Inflight>,
}

enum Step {
    Ready(Arc<PermissionSet>),
    Follow(watch::Receiver<Outcome>),
    Lead {
        generation: u64,
        tx: watch::Sender<Outcome>,
    },
}

/// Clears the in-flight slot if the leading load is dropped before committing,
/// so a waiting caller can take over.
struct InflightGuard<'a> {
    state: &'a Mutex<CacheState>,
    generation: u64,
}

impl Drop for InflightGuard<'_> {
    fn drop(&mut self) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if state
            .inflight
            .as_ref()
            .is_some_and(|i| i.generation == self.generation)
        {
            state.inflight = None;
        }
    }
}

pub struct PermissionCache<L, R> {
    loader: L,
    repository: R,
    catalog: PermissionCatalog,
    state: Mutex<CacheState>,
    invalidations: watch::Sender<u64>,
}

impl<L, R> PermissionCache<L, R>
where
    L: PermissionRowsLoader,
    R: PermissionRowsRepository,
{
    pub fn new(loader: L, repository: R) -> Self {
        Self::with_catalog(loader, repository, PermissionCatalog::builtin())
    }

    pub fn with_catalog(loader: L, repository: R, catalog: PermissionCatalog) -> Self {
        Self {
            loader,
            repository,
            catalog,
            state: Mutex::new(CacheState::default()),
            invalidations: watch::channel(0).0,
        }
    }

    pub fn catalog(&self) -> &PermissionCatalog {
        &self.catalog
    }

    /// Ticks on every [`invalidate`](Self::invalidate), so whoever keeps the
    /// set loaded knows to load it again.
    pub fn subscribe_invalidations(&self) -> watch::Receiver<u64> {
        self.invalidations.subscribe()
    }

    fn lock(&self) -> MutexGuard<'_, CacheState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Load (or join the in-flight load of) the principal's permission set.
    ///
    /// Fetch failures do not surface here: they resolve to an empty, degraded
    /// set. The only error is being superseded.
    pub async fn load(&self, principal: &Principal) -> Result<Arc<PermissionSet>, LoadError> {
        loop {
            match self.begin(principal.id) {
                Step::Ready(set) => return Ok(set),
                Step::Lead { generation, tx } => return self.lead(principal, generation, tx).await,
                Step::Follow(mut rx) => {
                    tracing::debug!(principal_id = %principal.id, "joining in-flight permission load");
                    match rx.wait_for(Option::is_some).await {
                        Ok(outcome) => {
                            if let Some(result) = (*outcome).clone() {
                                return result;
                            }
                        }
                        // leader dropped without committing; take over
                        Err(_) => continue,
                    }
                }
            }
        }
    }

    fn begin(&self, principal_id: PrincipalId) -> Step {
        let mut state = self.lock();

        if let Some(set) = state
            .current
            .as_ref()
            .filter(|s| s.principal_id() == principal_id)
        {
            return Step::Ready(set.clone());
        }

        let follow = state
            .inflight
            .as_ref()
            .filter(|i| {
                i.principal_id == principal_id
                    && i.generation == state.generation
                    && i.rx.has_changed().is_ok()
            })
            .map(|i| i.rx.clone());
        if let Some(rx) = follow {
            return Step::Follow(rx);
        }

        if let Some(previous) = state.inflight.as_ref() {
            tracing::debug!(
                principal_id = %previous.principal_id,
                generation = previous.generation,
                "superseding in-flight permission load"
            );
        }

        state.generation += 1;
        state.current = None;
        let generation = state.generation;
        let (tx, rx) = watch::channel(None);
        state.inflight = Some(Inflight {
            principal_id,
            generation,
            rx,
        });
        Step::Lead { generation, tx }
    }

    async fn lead(
        &self,
        principal: &Principal,
        generation: u64,
        tx: watch::Sender<Outcome>,
    ) -> Result<Arc<PermissionSet>, LoadError> {
        let _guard = InflightGuard {
            state: &self.state,
            generation,
        };

        let (set, fetched) = self.fetch(principal).await;
        let result = self.commit(principal.id, generation, set, fetched);
        tx.send_replace(Some(result.clone()));
        result
    }

    /// Returns the set plus the rows to persist when they came from the network.
    async fn fetch(&self, principal: &Principal) -> (PermissionSet, Option<Vec<String>>) {
        let principal_id = principal.id;

        // administrators never consult their set
        if principal.role.is_administrator() {
            return (PermissionSet::empty(principal_id), None);
        }

        match self.repository.get(principal_id) {
            Ok(Some(rows)) => {
                tracing::debug!(%principal_id, rows = rows.len(), "permission rows served from repository");
                return (PermissionSet::from_raw(principal_id, &rows, &self.catalog), None);
            }
            Ok(None) => {}
            Err(err) => tracing::warn!(
                %principal_id,
                error = %format!("{err:#}"),
                "permission rows repository read failed"
            ),
        }

        match self.loader.fetch_for_principal(principal_id).await {
            Ok(rows) => {
                let set = PermissionSet::from_raw(principal_id, &rows, &self.catalog);
                (set, Some(rows))
            }
            Err(err) => {
                tracing::warn!(
                    %principal_id,
                    error = %AccessError::CatalogUnavailable(format!("{err:#}")),
                    "continuing with no permissions"
                );
                (PermissionSet::unavailable(principal_id), None)
            }
        }
    }

    fn commit(
        &self,
        principal_id: PrincipalId,
        generation: u64,
        set: PermissionSet,
        fetched: Option<Vec<String>>,
    ) -> Result<Arc<PermissionSet>, LoadError> {
        let mut state = self.lock();

        if state.generation != generation {
            tracing::debug!(
                %principal_id,
                generation,
                current_generation = state.generation,
                "discarding superseded permission load"
            );
            return Err(LoadError::Superseded { principal_id });
        }

        if let Some(rows) = fetched {
            if let Err(err) = self.repository.set(principal_id, &rows) {
                tracing::warn!(%principal_id, error = %format!("{err:#}"), "could not persist permission rows");
            }
        }

        let set = Arc::new(set);
        state.current = Some(set.clone());
        state.inflight = None;
        tracing::debug!(
            %principal_id,
            generation,
            permissions = set.len(),
            degraded = set.is_degraded(),
            "permission set committed"
        );
        Ok(set)
    }

    /// The committed set, whoever it belongs to.
    pub fn current(&self) -> CachedPermissions {
        match self.lock().current.clone() {
            Some(set) => CachedPermissions::Ready(set),
            None => CachedPermissions::Pending,
        }
    }

    /// The committed set if it belongs to `principal_id`.
    pub fn current_for(&self, principal_id: PrincipalId) -> CachedPermissions {
        match self.lock().current.clone() {
            Some(set) if set.principal_id() == principal_id => CachedPermissions::Ready(set),
            _ => CachedPermissions::Pending,
        }
    }

    /// Drop the committed set, orphan any in-flight load and clear the repository.
    pub fn invalidate(&self) {
        let mut state = self.lock();
        state.generation += 1;
        state.current = None;
        state.inflight = None;
        if let Err(err) = self.repository.clear() {
            tracing::warn!(error = %format!("{err:#}"), "could not clear permission rows repository");
        }
        tracing::debug!(generation = state.generation, "permission cache invalidated");
        self.invalidations.send_replace(state.generation);
    }

    /// Invalidate, then load afresh (permission-changed events).
    pub async fn reload(&self, principal: &Principal) -> Result<Arc<PermissionSet>, LoadError> {
        self.invalidate();
        self.load(principal).await
    }
}
