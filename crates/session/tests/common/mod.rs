#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::sync::Semaphore;

use winespa_authz::{Principal, Role};
use winespa_core::PrincipalId;
use winespa_session::PermissionRowsLoader;

/// Row loader that counts calls and, when gated, blocks until released.
pub struct ScriptedLoader {
    rows: HashMap<PrincipalId, Vec<String>>,
    calls: AtomicUsize,
    gate: Option<Semaphore>,
    fail: bool,
}

impl ScriptedLoader {
    pub fn new() -> Self {
        Self {
            rows: HashMap::new(),
            calls: AtomicUsize::new(0),
            gate: None,
            fail: false,
        }
    }

    pub fn with_rows(mut self, id: i64, rows: &[&str]) -> Self {
        self.rows
            .insert(PrincipalId::new(id), rows.iter().map(|r| r.to_string()).collect());
        self
    }

    pub fn gated(mut self) -> Self {
        self.gate = Some(Semaphore::new(0));
        self
    }

    pub fn failing(mut self) -> Self {
        self.fail = true;
        self
    }

    pub fn release(&self, fetches: usize) {
        if let Some(gate) = &self.gate {
            gate.add_permits(fetches);
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl PermissionRowsLoader for ScriptedLoader {
    async fn fetch_for_principal(&self, principal_id: PrincipalId) -> anyhow::Result<Vec<String>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.gate {
            gate.acquire().await?.forget();
        }
        if self.fail {
            anyhow::bail!("GET /roles/usuario/{principal_id}/permisos: 503 Service Unavailable");
        }
        Ok(self.rows.get(&principal_id).cloned().unwrap_or_default())
    }
}

pub fn principal(id: i64, role: Role) -> Principal {
    Principal::new(PrincipalId::new(id), role)
}

pub async fn yields(n: usize) {
    for _ in 0..n {
        tokio::task::yield_now().await;
    }
}
