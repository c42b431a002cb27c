use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use winespa_core::PrincipalId;

/// Client-side store of raw permission rows, keyed by principal.
///
/// Survives page reloads in the browser build, so a hit skips the network.
/// Cleared on logout and on permission-changed events.
pub trait PermissionRowsRepository: Send + Sync {
    fn get(&self, principal_id: PrincipalId) -> anyhow::Result<Option<Vec<String>>>;
    fn set(&self, principal_id: PrincipalId, rows: &[String]) -> anyhow::Result<()>;
    fn clear(&self) -> anyhow::Result<()>;
}

impl<S> PermissionRowsRepository for Arc<S>
where
    S: PermissionRowsRepository + ?Sized,
{
    fn get(&self, principal_id: PrincipalId) -> anyhow::Result<Option<Vec<String>>> {
        (**self).get(principal_id)
    }

    fn set(&self, principal_id: PrincipalId, rows: &[String]) -> anyhow::Result<()> {
        (**self).set(principal_id, rows)
    }

    fn clear(&self) -> anyhow::Result<()> {
        (**self).clear()
    }
}

/// In-memory repository for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryPermissionRowsRepository {
    inner: RwLock<HashMap<PrincipalId, Vec<String>>>,
}

impl InMemoryPermissionRowsRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.inner.read().map(|m| m.len()).unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl PermissionRowsRepository for InMemoryPermissionRowsRepository {
    fn get(&self, principal_id: PrincipalId) -> anyhow::Result<Option<Vec<String>>> {
        let map = self
            .inner
            .read()
            .map_err(|_| anyhow::anyhow!("permission rows lock poisoned"))?;
        Ok(map.get(&principal_id).cloned())
    }

    fn set(&self, principal_id: PrincipalId, rows: &[String]) -> anyhow::Result<()> {
        let mut map = self
            .inner
            .write()
            .map_err(|_| anyhow::anyhow!("permission rows lock poisoned"))?;
        map.insert(principal_id, rows.to_vec());
        Ok(())
    }

    fn clear(&self) -> anyhow::Result<()> {
        let mut map = self
            .inner
            .write()
            .map_err(|_| anyhow::anyhow!("permission rows lock poisoned"))?;
        map.clear();
        Ok(())
    }
}
