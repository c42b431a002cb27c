//! Permission vocabulary: definitions plus the legacy alias table.
//!
//! Two generations of names coexist in permission rows. Older roles carry a
//! single capitalized module name (`"Usuarios"`); newer ones carry canonical
//! `<module>_<action>` names. Everything past ingestion speaks canonical names
//! only, and this is the one place that translates.

use std::collections::{BTreeMap, HashMap};

use serde::Serialize;

use crate::permissions::{Action, Permission, is_canonical_name, split_canonical_name};

/// Legacy single-word module permissions and the canonical name each grants.
pub const LEGACY_ALIASES: &[(&str, &str)] = &[
    ("Usuarios", "usuarios_listar"),
    ("Roles", "roles_listar"),
    ("Clientes", "clientes_listar"),
    ("Manicuristas", "manicuristas_listar"),
    ("Citas", "citas_listar"),
    ("Servicios", "servicios_listar"),
    ("Insumos", "insumos_listar"),
    ("Categoria Insumos", "categoria_insumos_listar"),
    ("Compras", "compras_listar"),
    ("Proveedores", "proveedores_listar"),
    ("Abastecimientos", "abastecimientos_listar"),
    ("Venta Servicios", "venta_servicios_listar"),
    ("Liquidaciones", "liquidaciones_listar"),
    ("Novedades", "novedades_listar"),
    ("Dashboard", "dashboard_listar"),
];

/// Modules that support the full set of actions.
const CRUD_MODULES: &[&str] = &[
    "usuarios",
    "roles",
    "clientes",
    "manicuristas",
    "citas",
    "servicios",
    "insumos",
    "categoria_insumos",
    "compras",
    "proveedores",
    "abastecimientos",
    "venta_servicios",
    "liquidaciones",
    "novedades",
];

/// One module and the actions defined for it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModulePermissions {
    pub module: String,
    pub actions: Vec<Action>,
}

#[derive(Debug, Clone)]
pub struct PermissionCatalog {
    definitions: BTreeMap<String, Permission>,
    aliases: HashMap<&'static str, &'static str>,
}

impl PermissionCatalog {
    /// Catalog of the definitions the permission service ships by default.
    pub fn builtin() -> Self {
        let mut next_id = 0_i64;
        let mut definitions = Vec::new();

        for module in CRUD_MODULES {
            for action in Action::ALL {
                next_id += 1;
                if let Ok(p) = Permission::new(next_id, *module, action) {
                    definitions.push(p);
                }
            }
        }
        if let Ok(p) = Permission::new(next_id + 1, "dashboard", Action::List) {
            definitions.push(p);
        }

        Self::from_definitions(definitions)
    }

    /// Catalog over fetched definitions. The legacy alias table is always included.
    pub fn from_definitions(definitions: impl IntoIterator<Item = Permission>) -> Self {
        Self {
            definitions: definitions
                .into_iter()
                .map(|p| (p.canonical_name().to_string(), p))
                .collect(),
            aliases: LEGACY_ALIASES.iter().copied().collect(),
        }
    }

    /// Translate a raw permission name or legacy alias into its canonical name.
    ///
    /// Canonical input is returned unchanged; unknown aliases yield `None`,
    /// which callers treat as "not granted". Never panics.
    pub fn resolve_canonical_name<'a>(&'a self, raw: &'a str) -> Option<&'a str> {
        if is_canonical_name(raw) {
            return Some(raw);
        }
        self.aliases.get(raw).copied()
    }

    pub fn definition(&self, canonical: &str) -> Option<&Permission> {
        self.definitions.get(canonical)
    }

    pub fn definitions(&self) -> impl Iterator<Item = &Permission> {
        self.definitions.values()
    }

    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }

    /// Split a canonical name into module and action.
    ///
    /// Known definitions are authoritative; otherwise the name is split on its
    /// action suffix.
    pub fn parse_name<'a>(&'a self, canonical: &'a str) -> Option<(&'a str, Action)> {
        match self.definitions.get(canonical) {
            Some(p) => Some((p.module(), p.action())),
            None => split_canonical_name(canonical),
        }
    }

    /// Definitions grouped by module, modules and actions in sorted order.
    pub fn by_module(&self) -> Vec<ModulePermissions> {
        let mut grouped: BTreeMap<&str, Vec<Action>> = BTreeMap::new();
        for p in self.definitions.values() {
            grouped.entry(p.module()).or_default().push(p.action());
        }
        grouped
            .into_iter()
            .map(|(module, mut actions)| {
                actions.sort();
                actions.dedup();
                ModulePermissions {
                    module: module.to_string(),
                    actions,
                }
            })
            .collect()
    }
}

impl Default for PermissionCatalog {
    fn default() -> Self {
        Self::builtin()
    }
}
