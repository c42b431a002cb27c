use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::Serialize;

use winespa_core::PrincipalId;

use crate::PermissionCatalog;

/// Canonical permission names granted to one principal.
///
/// Built once per session and replaced wholesale on reload; there is no
/// partial update. An empty set grants nothing beyond the special rules.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PermissionSet {
    principal_id: PrincipalId,
    names: BTreeSet<String>,
    loaded_at: DateTime<Utc>,
    /// Set when the rows could not be fetched and the set fell back to empty.
    degraded: bool,
}

impl PermissionSet {
    /// Set from names that are already canonical.
    pub fn new<I, S>(principal_id: PrincipalId, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            principal_id,
            names: names.into_iter().map(Into::into).collect(),
            loaded_at: Utc::now(),
            degraded: false,
        }
    }

    pub fn empty(principal_id: PrincipalId) -> Self {
        Self::new(principal_id, Vec::<String>::new())
    }

    /// Fail-closed stand-in used when the permission rows are unavailable.
    pub fn unavailable(principal_id: PrincipalId) -> Self {
        Self {
            degraded: true,
            ..Self::empty(principal_id)
        }
    }

    /// Normalize raw rows (canonical names or legacy aliases).
    ///
    /// Rows that resolve to nothing are dropped.
    pub fn from_raw<I, S>(principal_id: PrincipalId, rows: I, catalog: &PermissionCatalog) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut names = BTreeSet::new();
        for row in rows {
            let raw = row.as_ref();
            match catalog.resolve_canonical_name(raw) {
                Some(name) => {
                    names.insert(name.to_string());
                }
                None => tracing::debug!(%principal_id, raw, "dropping unmapped permission row"),
            }
        }
        Self {
            principal_id,
            names,
            loaded_at: Utc::now(),
            degraded: false,
        }
    }

    pub fn principal_id(&self) -> PrincipalId {
        self.principal_id
    }

    pub fn contains(&self, canonical: &str) -> bool {
        self.names.contains(canonical)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn loaded_at(&self) -> DateTime<Utc> {
        self.loaded_at
    }

    pub fn is_degraded(&self) -> bool {
        self.degraded
    }
}

/// What the engine knows about the current principal's permissions.
///
/// `Pending` means "unknown", not "empty": rules that need the set report a
/// pending verdict instead of denying.
#[derive(Debug, Clone, Copy)]
pub enum PermissionView<'a> {
    Pending,
    Loaded(&'a PermissionSet),
}

impl<'a> PermissionView<'a> {
    pub fn is_pending(&self) -> bool {
        matches!(self, PermissionView::Pending)
    }

    pub fn set(&self) -> Option<&'a PermissionSet> {
        match self {
            PermissionView::Pending => None,
            PermissionView::Loaded(set) => Some(set),
        }
    }
}

impl<'a> From<&'a PermissionSet> for PermissionView<'a> {
    fn from(value: &'a PermissionSet) -> Self {
        PermissionView::Loaded(value)
    }
}

impl<'a> From<Option<&'a PermissionSet>> for PermissionView<'a> {
    fn from(value: Option<&'a PermissionSet>) -> Self {
        value.map_or(PermissionView::Pending, PermissionView::Loaded)
    }
}
