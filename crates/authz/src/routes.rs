//! Route table: the one declaration of what every protected path requires.
//!
//! Menus, guards and the engine all read from here; nothing else re-declares
//! route-to-permission mappings.

use std::collections::{BTreeSet, HashMap};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::permissions::is_canonical_name;

/// Route-level override that pre-empts the generic permission lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SpecialRule {
    /// Deliberately unmapped: only administrators reach the route. Distinct from
    /// a missing entry, which is a configuration gap.
    AdminBypass,
    /// Any authenticated principal (dashboards, own profile, booking flow).
    AlwaysAllowAuthenticated,
    /// Reachable by the `client` role.
    ClientAllowlist,
    /// Evaluated as the table's dashboard path.
    DashboardAlias,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteEntry {
    pub path: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub required_permission: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub special_rule: Option<SpecialRule>,
}

impl RouteEntry {
    pub fn protected(path: impl Into<String>, permission: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            required_permission: Some(permission.into()),
            special_rule: None,
        }
    }

    pub fn special(path: impl Into<String>, rule: SpecialRule) -> Self {
        Self {
            path: path.into(),
            required_permission: None,
            special_rule: Some(rule),
        }
    }

    pub fn with_rule(mut self, rule: SpecialRule) -> Self {
        self.special_rule = Some(rule);
        self
    }

    pub fn has_rule(&self, rule: SpecialRule) -> bool {
        self.special_rule == Some(rule)
    }
}

#[derive(Debug, Error)]
pub enum RouteTableError {
    #[error("invalid route table document: {0}")]
    Json(#[from] serde_json::Error),

    #[error("route path '{0}' must start with '/'")]
    InvalidPath(String),

    #[error("route '{0}' is declared more than once")]
    DuplicatePath(String),

    #[error("route '{path}' requires '{permission}', which is not a <module>_<action> name")]
    InvalidPermission { path: String, permission: String },

    #[error("route '{alias}' aliases the dashboard, but '{dashboard}' has no entry")]
    DanglingDashboardAlias { alias: String, dashboard: String },
}

/// Strip query, fragment and trailing slashes. The root stays `/`.
pub fn normalize_path(path: &str) -> &str {
    let path = path.split(['?', '#']).next().unwrap_or_default();
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() { "/" } else { trimmed }
}

fn is_pattern(path: &str) -> bool {
    path.split('/').any(|segment| segment.starts_with(':'))
}

fn pattern_matches(pattern: &str, path: &str) -> bool {
    let mut want = pattern.split('/');
    let mut have = path.split('/');
    loop {
        match (want.next(), have.next()) {
            (None, None) => return true,
            (Some(w), Some(h)) if (w.starts_with(':') && !h.is_empty()) || w == h => {}
            _ => return false,
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RouteTableDocument {
    #[serde(default = "default_dashboard_path")]
    dashboard_path: String,
    routes: Vec<RouteEntry>,
}

fn default_dashboard_path() -> String {
    RouteTable::DEFAULT_DASHBOARD_PATH.to_string()
}

/// Static path -> requirement table. Immutable after construction.
///
/// Lookups try exact paths first, then `:param` patterns in declaration order.
#[derive(Debug, Clone)]
pub struct RouteTable {
    exact: HashMap<String, RouteEntry>,
    patterns: Vec<RouteEntry>,
    dashboard_path: String,
}

impl RouteTable {
    pub const DEFAULT_DASHBOARD_PATH: &'static str = "/dashboard";

    pub fn new(entries: impl IntoIterator<Item = RouteEntry>) -> Result<Self, RouteTableError> {
        Self::with_dashboard_path(entries, Self::DEFAULT_DASHBOARD_PATH)
    }

    pub fn with_dashboard_path(
        entries: impl IntoIterator<Item = RouteEntry>,
        dashboard_path: impl Into<String>,
    ) -> Result<Self, RouteTableError> {
        let mut seen = BTreeSet::new();
        let mut validated = Vec::new();

        for mut entry in entries {
            if !entry.path.starts_with('/') {
                return Err(RouteTableError::InvalidPath(entry.path));
            }
            entry.path = normalize_path(&entry.path).to_string();

            if let Some(permission) = entry.required_permission.as_deref() {
                if !is_canonical_name(permission) {
                    return Err(RouteTableError::InvalidPermission {
                        path: entry.path,
                        permission: permission.to_string(),
                    });
                }
            }
            if !seen.insert(entry.path.clone()) {
                return Err(RouteTableError::DuplicatePath(entry.path));
            }
            validated.push(entry);
        }

        let dashboard_path = normalize_path(&dashboard_path.into()).to_string();
        let table = Self::assemble(validated, dashboard_path);

        if let Some(alias) = table
            .entries()
            .find(|e| e.has_rule(SpecialRule::DashboardAlias))
        {
            if !table.exact.contains_key(&table.dashboard_path) {
                return Err(RouteTableError::DanglingDashboardAlias {
                    alias: alias.path.clone(),
                    dashboard: table.dashboard_path.clone(),
                });
            }
        }

        Ok(table)
    }

    /// Parse a route policy document:
    /// `{"dashboardPath": "/dashboard", "routes": [{"path": .., "requiredPermission": .., "specialRule": ..}]}`.
    pub fn from_json_str(json: &str) -> Result<Self, RouteTableError> {
        let doc: RouteTableDocument = serde_json::from_str(json)?;
        Self::with_dashboard_path(doc.routes, doc.dashboard_path)
    }

    /// The WineSpa back-office routes.
    pub fn winespa_default() -> Self {
        Self::assemble(winespa_routes(), Self::DEFAULT_DASHBOARD_PATH.to_string())
    }

    fn assemble(entries: Vec<RouteEntry>, dashboard_path: String) -> Self {
        let mut exact = HashMap::new();
        let mut patterns = Vec::new();
        for entry in entries {
            if is_pattern(&entry.path) {
                patterns.push(entry);
            } else {
                exact.insert(entry.path.clone(), entry);
            }
        }
        Self {
            exact,
            patterns,
            dashboard_path,
        }
    }

    pub fn lookup(&self, path: &str) -> Option<&RouteEntry> {
        let path = normalize_path(path);
        self.exact.get(path).or_else(|| {
            self.patterns
                .iter()
                .find(|entry| pattern_matches(&entry.path, path))
        })
    }

    /// Like [`lookup`](Self::lookup), following a dashboard alias one hop.
    pub fn resolve(&self, path: &str) -> Option<&RouteEntry> {
        match self.lookup(path) {
            Some(entry) if entry.has_rule(SpecialRule::DashboardAlias) => {
                self.exact.get(&self.dashboard_path)
            }
            other => other,
        }
    }

    pub fn dashboard_path(&self) -> &str {
        &self.dashboard_path
    }

    /// Exact entries sorted by path, then patterns in declaration order.
    pub fn entries(&self) -> impl Iterator<Item = &RouteEntry> {
        let mut exact: Vec<&RouteEntry> = self.exact.values().collect();
        exact.sort_by(|a, b| a.path.cmp(&b.path));
        exact.into_iter().chain(self.patterns.iter())
    }

    pub fn len(&self) -> usize {
        self.exact.len() + self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Paths a client may reach: those tagged [`SpecialRule::ClientAllowlist`]
    /// plus every route open to any authenticated principal.
    pub fn client_allowlist(&self) -> ClientAllowlist {
        ClientAllowlist::new(
            self.entries()
                .filter(|e| {
                    e.has_rule(SpecialRule::ClientAllowlist)
                        || self
                            .resolve(&e.path)
                            .is_some_and(|r| r.has_rule(SpecialRule::AlwaysAllowAuthenticated))
                })
                .map(|e| e.path.as_str()),
        )
    }

    /// Paths with no entry. Meant for build/test-time checks of navigation menus.
    pub fn missing_paths<'a>(&self, paths: impl IntoIterator<Item = &'a str>) -> Vec<&'a str> {
        paths
            .into_iter()
            .filter(|path| self.lookup(path).is_none())
            .collect()
    }
}

impl Default for RouteTable {
    fn default() -> Self {
        Self::winespa_default()
    }
}

fn winespa_routes() -> Vec<RouteEntry> {
    use SpecialRule::*;

    vec![
        RouteEntry::special("/dashboard", AlwaysAllowAuthenticated),
        RouteEntry::special("/dashboard-manicurista", DashboardAlias),
        RouteEntry::special("/perfil", AlwaysAllowAuthenticated),
        RouteEntry::special("/reservar-cita", AlwaysAllowAuthenticated),
        RouteEntry::protected("/usuarios", "usuarios_listar"),
        RouteEntry::protected("/roles", "roles_listar"),
        RouteEntry::protected("/categoria-insumos", "categoria_insumos_listar"),
        RouteEntry::protected("/insumos", "insumos_listar"),
        RouteEntry::protected("/proveedores", "proveedores_listar"),
        RouteEntry::protected("/compras", "compras_listar"),
        RouteEntry::protected("/compra-insumo", "compras_listar"),
        RouteEntry::protected("/manicuristas", "manicuristas_listar"),
        RouteEntry::protected("/novedades", "novedades_listar"),
        RouteEntry::protected("/liquidaciones", "liquidaciones_listar"),
        RouteEntry::protected("/liquidacion", "liquidaciones_listar"),
        RouteEntry::protected("/servicios", "servicios_listar").with_rule(ClientAllowlist),
        RouteEntry::protected("/abastecimientos", "abastecimientos_listar"),
        RouteEntry::protected("/abastecimiento", "abastecimientos_listar"),
        RouteEntry::protected("/insumo-abastecimiento", "abastecimientos_listar"),
        RouteEntry::protected("/citas", "citas_listar").with_rule(ClientAllowlist),
        RouteEntry::protected("/citas/crear", "citas_crear"),
        RouteEntry::protected("/citas/:id", "citas_listar"),
        RouteEntry::protected("/citas-legacy", "citas_listar"),
        RouteEntry::protected("/clientes", "clientes_listar").with_rule(ClientAllowlist),
        RouteEntry::protected("/venta-servicios", "venta_servicios_listar")
            .with_rule(ClientAllowlist),
        RouteEntry::protected("/ventas-servicio", "venta_servicios_listar"),
    ]
}

/// Paths the `client` role may reach regardless of its permission set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClientAllowlist(BTreeSet<String>);

impl ClientAllowlist {
    pub fn new<I, S>(paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self(
            paths
                .into_iter()
                .map(|p| normalize_path(p.as_ref()).to_string())
                .collect(),
        )
    }

    pub fn contains(&self, path: &str) -> bool {
        let path = normalize_path(path);
        self.0.contains(path)
            || self
                .0
                .iter()
                .any(|allowed| is_pattern(allowed) && pattern_matches(allowed, path))
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}
