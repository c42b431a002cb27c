use serde::Serialize;

use crate::authorize::{AuthorizationEngine, EvaluateOptions};
use crate::permission_set::PermissionView;
use crate::Principal;

/// Navigation tree node. Groups only exist to hold leaves.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MenuEntry {
    Item {
        label: String,
        path: String,
    },
    Group {
        label: String,
        children: Vec<MenuEntry>,
    },
}

impl MenuEntry {
    pub fn item(label: impl Into<String>, path: impl Into<String>) -> Self {
        MenuEntry::Item {
            label: label.into(),
            path: path.into(),
        }
    }

    pub fn group(label: impl Into<String>, children: Vec<MenuEntry>) -> Self {
        MenuEntry::Group {
            label: label.into(),
            children,
        }
    }

    pub fn label(&self) -> &str {
        match self {
            MenuEntry::Item { label, .. } | MenuEntry::Group { label, .. } => label,
        }
    }

    /// Every leaf path below (or at) this entry, depth first.
    pub fn paths(&self) -> Vec<&str> {
        match self {
            MenuEntry::Item { path, .. } => vec![path.as_str()],
            MenuEntry::Group { children, .. } => children.iter().flat_map(MenuEntry::paths).collect(),
        }
    }
}

/// Filters a navigation tree down to what the principal may open.
///
/// Stateless: every call re-evaluates against the engine.
#[derive(Debug, Clone, Copy)]
pub struct MenuVisibilityResolver<'e> {
    engine: &'e AuthorizationEngine,
}

impl<'e> MenuVisibilityResolver<'e> {
    pub fn new(engine: &'e AuthorizationEngine) -> Self {
        Self { engine }
    }

    /// Leaves whose path evaluates to `Allow`, and the groups that keep at
    /// least one of them. Pending leaves are hidden.
    pub fn resolve(
        &self,
        principal: Option<&Principal>,
        permissions: PermissionView<'_>,
        menu: &[MenuEntry],
    ) -> Vec<MenuEntry> {
        let opts = EvaluateOptions::default();
        menu.iter()
            .filter_map(|entry| self.filter(entry, principal, permissions, &opts))
            .collect()
    }

    fn filter(
        &self,
        entry: &MenuEntry,
        principal: Option<&Principal>,
        permissions: PermissionView<'_>,
        opts: &EvaluateOptions,
    ) -> Option<MenuEntry> {
        match entry {
            MenuEntry::Item { path, .. } => self
                .engine
                .evaluate(principal, path, permissions, opts)
                .is_allowed()
                .then(|| entry.clone()),
            MenuEntry::Group { label, children } => {
                let visible: Vec<MenuEntry> = children
                    .iter()
                    .filter_map(|child| self.filter(child, principal, permissions, opts))
                    .collect();
                (!visible.is_empty()).then(|| MenuEntry::Group {
                    label: label.clone(),
                    children: visible,
                })
            }
        }
    }

    /// Every concrete route-table path the principal may open, sorted.
    /// Parameterized routes are left out.
    pub fn allowed_routes(
        &self,
        principal: Option<&Principal>,
        permissions: PermissionView<'_>,
    ) -> Vec<String> {
        let opts = EvaluateOptions::default();
        let mut paths: Vec<String> = self
            .engine
            .routes()
            .entries()
            .filter(|e| !e.path.contains("/:"))
            .filter(|e| {
                self.engine
                    .evaluate(principal, &e.path, permissions, &opts)
                    .is_allowed()
            })
            .map(|e| e.path.clone())
            .collect();
        paths.sort();
        paths
    }
}

/// The back-office sidebar.
pub fn winespa_sidebar() -> Vec<MenuEntry> {
    vec![
        MenuEntry::item("Dashboard", "/dashboard"),
        MenuEntry::item("Roles", "/roles"),
        MenuEntry::item("Usuarios", "/usuarios"),
        MenuEntry::group(
            "Compras",
            vec![
                MenuEntry::item("Categoría de Insumos", "/categoria-insumos"),
                MenuEntry::item("Compras", "/compras"),
                MenuEntry::item("Insumos", "/insumos"),
                MenuEntry::item("Proveedores", "/proveedores"),
            ],
        ),
        MenuEntry::group(
            "Servicios",
            vec![
                MenuEntry::item("Abastecimiento", "/abastecimiento"),
                MenuEntry::item("Liquidación", "/liquidacion"),
                MenuEntry::item("Manicuristas", "/manicuristas"),
                MenuEntry::item("Novedades", "/novedades"),
                MenuEntry::item("Servicios", "/servicios"),
            ],
        ),
        MenuEntry::group(
            "Venta Servicios",
            vec![
                MenuEntry::item("Citas", "/citas"),
                MenuEntry::item("Clientes", "/clientes"),
                MenuEntry::item("Ventas", "/ventas-servicio"),
            ],
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{PermissionSet, Role};
    use winespa_core::PrincipalId;

    fn labels(entries: &[MenuEntry]) -> Vec<&str> {
        entries.iter().map(MenuEntry::label).collect()
    }

    #[test]
    fn sidebar_is_fully_mapped() {
        let engine = AuthorizationEngine::winespa_default();
        let sidebar = winespa_sidebar();
        let paths: Vec<&str> = sidebar.iter().flat_map(MenuEntry::paths).collect();
        assert_eq!(paths.len(), 15);
        assert!(engine.routes().missing_paths(paths).is_empty());
    }

    #[test]
    fn groups_collapse_when_no_child_is_visible() {
        let engine = AuthorizationEngine::winespa_default();
        let p = Principal::new(PrincipalId::new(8), Role::Manicurist);
        let set = PermissionSet::new(PrincipalId::new(8), ["citas_listar", "novedades_listar"]);

        let menu = MenuVisibilityResolver::new(&engine).resolve(Some(&p), (&set).into(), &winespa_sidebar());
        assert_eq!(labels(&menu), vec!["Dashboard", "Servicios", "Venta Servicios"]);

        let MenuEntry::Group { children, .. } = &menu[1] else {
            panic!("expected group");
        };
        assert_eq!(labels(children), vec!["Novedades"]);
    }

    #[test]
    fn administrators_see_everything() {
        let engine = AuthorizationEngine::winespa_default();
        let admin = Principal::new(PrincipalId::new(1), Role::Administrator);
        let set = PermissionSet::empty(PrincipalId::new(1));
        let menu = MenuVisibilityResolver::new(&engine).resolve(Some(&admin), (&set).into(), &winespa_sidebar());
        assert_eq!(menu, winespa_sidebar());
    }

    #[test]
    fn clients_see_allowlisted_leaves_only() {
        let engine = AuthorizationEngine::winespa_default();
        let client = Principal::new(PrincipalId::new(2), Role::Client);
        let set = PermissionSet::empty(PrincipalId::new(2));
        let resolver = MenuVisibilityResolver::new(&engine);

        let menu = resolver.resolve(Some(&client), (&set).into(), &winespa_sidebar());
        let visible: Vec<&str> = menu.iter().flat_map(MenuEntry::paths).collect();
        assert_eq!(visible, vec!["/dashboard", "/servicios", "/citas", "/clientes"]);
    }

    #[test]
    fn pending_hides_permission_gated_leaves() {
        let engine = AuthorizationEngine::winespa_default();
        let p = Principal::new(PrincipalId::new(4), Role::Assistant);
        let menu = MenuVisibilityResolver::new(&engine).resolve(
            Some(&p),
            PermissionView::Pending,
            &winespa_sidebar(),
        );
        assert_eq!(labels(&menu), vec!["Dashboard"]);
    }

    #[test]
    fn anonymous_sees_nothing() {
        let engine = AuthorizationEngine::winespa_default();
        let menu = MenuVisibilityResolver::new(&engine).resolve(None, PermissionView::Pending, &winespa_sidebar());
        assert!(menu.is_empty());
    }

    #[test]
    fn allowed_routes_are_sorted_and_concrete() {
        let engine = AuthorizationEngine::winespa_default();
        let p = Principal::new(PrincipalId::new(5), Role::Manicurist);
        let set = PermissionSet::new(PrincipalId::new(5), ["citas_listar"]);

        let routes = MenuVisibilityResolver::new(&engine).allowed_routes(Some(&p), (&set).into());
        assert_eq!(
            routes,
            vec![
                "/citas",
                "/citas-legacy",
                "/dashboard",
                "/dashboard-manicurista",
                "/perfil",
                "/reservar-cita",
            ]
        );
    }
}
