//! Inbound collaborators that fetch permission data from the backend.
//!
//! Transport is the caller's business; these traits only describe the shape of
//! what comes back.

use serde::Deserialize;

use winespa_authz::{Permission, PermissionCatalog};
use winespa_core::PrincipalId;

/// Source of permission definitions (`GET /permisos` or equivalent).
#[async_trait::async_trait]
pub trait PermissionCatalogLoader: Send + Sync {
    async fn fetch_definitions(&self) -> anyhow::Result<Vec<Permission>>;
}

/// Source of a principal's raw permission rows: canonical names or legacy aliases.
#[async_trait::async_trait]
pub trait PermissionRowsLoader: Send + Sync {
    async fn fetch_for_principal(&self, principal_id: PrincipalId) -> anyhow::Result<Vec<String>>;
}

#[async_trait::async_trait]
impl<L> PermissionRowsLoader for std::sync::Arc<L>
where
    L: PermissionRowsLoader + ?Sized,
{
    async fn fetch_for_principal(&self, principal_id: PrincipalId) -> anyhow::Result<Vec<String>> {
        (**self).fetch_for_principal(principal_id).await
    }
}

#[async_trait::async_trait]
impl<L> PermissionCatalogLoader for std::sync::Arc<L>
where
    L: PermissionCatalogLoader + ?Sized,
{
    async fn fetch_definitions(&self) -> anyhow::Result<Vec<Permission>> {
        (**self).fetch_definitions().await
    }
}

/// A permission row as the role service returns it: either an object carrying
/// the name, or the bare name.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum RawPermissionRow {
    Named {
        #[serde(alias = "name")]
        nombre: String,
    },
    Bare(String),
}

impl RawPermissionRow {
    pub fn name(&self) -> &str {
        match self {
            RawPermissionRow::Named { nombre } | RawPermissionRow::Bare(nombre) => nombre,
        }
    }

    pub fn into_name(self) -> String {
        match self {
            RawPermissionRow::Named { nombre } | RawPermissionRow::Bare(nombre) => nombre,
        }
    }
}

/// Parse a row payload (a JSON array of strings and/or `{"nombre": ..}` objects)
/// into raw names. Entries that are neither are skipped.
pub fn rows_from_json(value: &serde_json::Value) -> anyhow::Result<Vec<String>> {
    let Some(items) = value.as_array() else {
        anyhow::bail!("permission rows must be a JSON array, got {value}");
    };

    let mut names = Vec::with_capacity(items.len());
    for item in items {
        match RawPermissionRow::deserialize(item) {
            Ok(row) => names.push(row.into_name()),
            Err(err) => tracing::debug!(%item, error = %err, "skipping malformed permission row"),
        }
    }
    Ok(names)
}

/// Build the catalog from fetched definitions.
///
/// A failed fetch falls back to the built-in definitions; normalization only
/// needs the alias table, so this never blocks authorization.
pub async fn load_catalog<L>(loader: &L) -> PermissionCatalog
where
    L: PermissionCatalogLoader + ?Sized,
{
    match loader.fetch_definitions().await {
        Ok(definitions) => {
            tracing::debug!(count = definitions.len(), "loaded permission definitions");
            PermissionCatalog::from_definitions(definitions)
        }
        Err(err) => {
            tracing::warn!(
                error = %winespa_authz::AccessError::CatalogUnavailable(format!("{err:#}")),
                "falling back to built-in permission definitions"
            );
            PermissionCatalog::builtin()
        }
    }
}
