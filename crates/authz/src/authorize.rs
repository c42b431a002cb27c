use core::fmt;

use serde::Serialize;

use winespa_core::PrincipalId;

use crate::permission_set::PermissionView;
use crate::routes::{ClientAllowlist, RouteEntry, RouteTable, SpecialRule, normalize_path};
use crate::{AccessError, Action, PermissionCatalog, Principal};

/// Component-level requirements layered on top of the route's own.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EvaluateOptions {
    /// Role the principal must hold (compared case-insensitively).
    pub required_role: Option<String>,
    /// Permission checked instead of the route's, canonical or legacy.
    pub explicit_permission: Option<String>,
}

impl EvaluateOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn require_role(mut self, role: impl Into<String>) -> Self {
        self.required_role = Some(role.into());
        self
    }

    pub fn require_permission(mut self, permission: impl Into<String>) -> Self {
        self.explicit_permission = Some(permission.into());
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Allow,
    Deny,
    RedirectLogin,
    RedirectPasswordChange,
    /// The permission set is still loading. Not a denial.
    Pending,
}

impl Verdict {
    pub fn is_allow(self) -> bool {
        self == Verdict::Allow
    }

    pub fn is_pending(self) -> bool {
        self == Verdict::Pending
    }
}

/// Which rule produced a verdict.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Reason {
    AuthenticationRequired,
    PasswordChangeRequired,
    AdministratorBypass,
    AlwaysAllowAuthenticated,
    RoleMismatch { required: String },
    PermissionGranted { permission: String },
    PermissionMissing { permission: String },
    UnmappedPermission { raw: String },
    ClientAllowlisted,
    ClientNotAllowlisted,
    AdministratorOnly,
    UnmappedRoute { path: String },
    UnsupportedMethod { method: String },
    PermissionsPending { permission: String },
}

impl fmt::Display for Reason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reason::AuthenticationRequired => f.write_str("no authenticated principal"),
            Reason::PasswordChangeRequired => f.write_str("password change required"),
            Reason::AdministratorBypass => f.write_str("administrator"),
            Reason::AlwaysAllowAuthenticated => f.write_str("open to any authenticated principal"),
            Reason::RoleMismatch { required } => write!(f, "requires role '{required}'"),
            Reason::PermissionGranted { permission } => write!(f, "holds '{permission}'"),
            Reason::PermissionMissing { permission } => write!(f, "missing '{permission}'"),
            Reason::UnmappedPermission { raw } => write!(f, "'{raw}' is not a known permission"),
            Reason::ClientAllowlisted => f.write_str("route is open to clients"),
            Reason::ClientNotAllowlisted => f.write_str("route is not open to clients"),
            Reason::AdministratorOnly => f.write_str("route is restricted to administrators"),
            Reason::UnmappedRoute { path } => write!(f, "route '{path}' has no access policy"),
            Reason::UnsupportedMethod { method } => write!(f, "method '{method}' maps to no action"),
            Reason::PermissionsPending { permission } => {
                write!(f, "waiting for permissions to check '{permission}'")
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Decision {
    pub verdict: Verdict,
    pub reason: Reason,
}

impl Decision {
    pub fn new(verdict: Verdict, reason: Reason) -> Self {
        Self { verdict, reason }
    }

    pub fn allow(reason: Reason) -> Self {
        Self::new(Verdict::Allow, reason)
    }

    pub fn deny(reason: Reason) -> Self {
        Self::new(Verdict::Deny, reason)
    }

    pub fn is_allowed(&self) -> bool {
        self.verdict.is_allow()
    }

    /// `Ok(())` only for [`Verdict::Allow`].
    pub fn require(&self) -> Result<(), AccessError> {
        match (self.verdict, &self.reason) {
            (Verdict::Allow, _) => Ok(()),
            (Verdict::RedirectLogin, _) => Err(AccessError::AuthenticationRequired),
            (Verdict::RedirectPasswordChange, _) => Err(AccessError::PasswordChangeRequired),
            (Verdict::Pending, _) => Err(AccessError::PermissionsPending),
            (Verdict::Deny, Reason::UnmappedRoute { path }) => {
                Err(AccessError::UnmappedRoute(path.clone()))
            }
            (Verdict::Deny, reason) => Err(AccessError::PermissionDenied(reason.to_string())),
        }
    }
}

/// Pure decision function over a route table, a catalog and a client allowlist.
///
/// - No IO
/// - No panics
/// - Same inputs, same decision
#[derive(Debug, Clone)]
pub struct AuthorizationEngine {
    routes: RouteTable,
    catalog: PermissionCatalog,
    client_allowlist: ClientAllowlist,
}

impl AuthorizationEngine {
    /// Engine whose client allowlist is taken from the table's tagged routes.
    pub fn new(routes: RouteTable, catalog: PermissionCatalog) -> Self {
        let client_allowlist = routes.client_allowlist();
        Self {
            routes,
            catalog,
            client_allowlist,
        }
    }

    pub fn with_client_allowlist(mut self, client_allowlist: ClientAllowlist) -> Self {
        self.client_allowlist = client_allowlist;
        self
    }

    pub fn winespa_default() -> Self {
        Self::new(RouteTable::winespa_default(), PermissionCatalog::builtin())
    }

    pub fn routes(&self) -> &RouteTable {
        &self.routes
    }

    pub fn catalog(&self) -> &PermissionCatalog {
        &self.catalog
    }

    pub fn client_allowlist(&self) -> &ClientAllowlist {
        &self.client_allowlist
    }

    /// Decide whether `principal` may reach `path`. First matching rule wins.
    pub fn evaluate(
        &self,
        principal: Option<&Principal>,
        path: &str,
        permissions: PermissionView<'_>,
        opts: &EvaluateOptions,
    ) -> Decision {
        let Some(principal) = principal else {
            return Decision::new(Verdict::RedirectLogin, Reason::AuthenticationRequired);
        };
        if let Some(decision) = preflight(principal) {
            return decision;
        }

        let entry = self.routes.resolve(path);
        if entry.is_some_and(|e| e.has_rule(SpecialRule::AlwaysAllowAuthenticated)) {
            return Decision::allow(Reason::AlwaysAllowAuthenticated);
        }

        if let Some(required) = opts.required_role.as_deref() {
            if !principal.role.matches(required) {
                return Decision::deny(Reason::RoleMismatch {
                    required: required.to_string(),
                });
            }
        }

        if let Some(raw) = opts.explicit_permission.as_deref() {
            return self.check_permission(raw, permissions);
        }

        if principal.role.is_client() {
            return self.check_client(path);
        }

        self.check_route(path, entry, permissions)
    }

    /// Decide an API request from its method: the module comes from the route's
    /// permission, the action from the method.
    pub fn evaluate_request(
        &self,
        principal: Option<&Principal>,
        method: &str,
        path: &str,
        permissions: PermissionView<'_>,
    ) -> Decision {
        let Some(principal) = principal else {
            return Decision::new(Verdict::RedirectLogin, Reason::AuthenticationRequired);
        };
        if let Some(decision) = preflight(principal) {
            return decision;
        }

        let entry = self.routes.resolve(path);
        if entry.is_some_and(|e| e.has_rule(SpecialRule::AlwaysAllowAuthenticated)) {
            return Decision::allow(Reason::AlwaysAllowAuthenticated);
        }
        if principal.role.is_client() {
            return self.check_client(path);
        }

        let Some(entry) = entry else {
            return unmapped_route(path);
        };
        let Some(module) = entry
            .required_permission
            .as_deref()
            .and_then(|p| self.catalog.parse_name(p))
            .map(|(module, _)| module)
        else {
            return self.check_route(path, Some(entry), permissions);
        };

        let collection = !entry.path.contains("/:");
        match Action::from_http_method(method, collection) {
            Some(action) => check_grant(&format!("{module}_{action}"), permissions),
            None => Decision::deny(Reason::UnsupportedMethod {
                method: method.to_string(),
            }),
        }
    }

    /// Action-level check: rules 1 to 3, then the permission itself. Route rules
    /// do not apply.
    pub(crate) fn evaluate_permission(
        &self,
        principal: Option<&Principal>,
        raw: &str,
        permissions: PermissionView<'_>,
    ) -> Decision {
        let Some(principal) = principal else {
            return Decision::new(Verdict::RedirectLogin, Reason::AuthenticationRequired);
        };
        if let Some(decision) = preflight(principal) {
            return decision;
        }
        self.check_permission(raw, permissions)
    }

    fn check_permission(&self, raw: &str, permissions: PermissionView<'_>) -> Decision {
        match self.catalog.resolve_canonical_name(raw) {
            Some(canonical) => check_grant(canonical, permissions),
            None => Decision::deny(Reason::UnmappedPermission {
                raw: raw.to_string(),
            }),
        }
    }

    fn check_client(&self, path: &str) -> Decision {
        if self.client_allowlist.contains(path) {
            Decision::allow(Reason::ClientAllowlisted)
        } else {
            Decision::deny(Reason::ClientNotAllowlisted)
        }
    }

    fn check_route(
        &self,
        path: &str,
        entry: Option<&RouteEntry>,
        permissions: PermissionView<'_>,
    ) -> Decision {
        match entry {
            None => unmapped_route(path),
            Some(entry) => match entry.required_permission.as_deref() {
                Some(permission) => check_grant(permission, permissions),
                None if entry.has_rule(SpecialRule::AdminBypass) => {
                    Decision::deny(Reason::AdministratorOnly)
                }
                None => unmapped_route(path),
            },
        }
    }

    /// Explain the decision [`evaluate`](Self::evaluate) makes for these inputs.
    pub fn explain(
        &self,
        principal: Option<&Principal>,
        path: &str,
        permissions: PermissionView<'_>,
        opts: &EvaluateOptions,
    ) -> AuthorizationExplanation {
        let decision = self.evaluate(principal, path, permissions, opts);
        let entry = self.routes.resolve(path);

        let required_permission = match opts.explicit_permission.as_deref() {
            Some(raw) => self.catalog.resolve_canonical_name(raw).map(str::to_string),
            None => entry.and_then(|e| e.required_permission.clone()),
        };

        let principal_state = principal.map(|p| PrincipalState {
            principal_id: p.id,
            role: p.role.to_string(),
            must_change_password: p.must_change_password,
            permissions_loaded: !permissions.is_pending(),
            degraded: permissions.set().is_some_and(|s| s.is_degraded()),
            effective_permissions: permissions
                .set()
                .map(|s| s.iter().map(str::to_string).collect())
                .unwrap_or_default(),
        });

        let denial_reason = match decision.verdict {
            Verdict::Deny => denial_for(&decision.reason),
            _ => None,
        };

        AuthorizationExplanation {
            path: normalize_path(path).to_string(),
            required_permission,
            special_rule: entry.and_then(|e| e.special_rule),
            verdict: decision.verdict,
            granted: decision.is_allowed(),
            reason: decision.reason.to_string(),
            principal: principal_state,
            denial_reason,
        }
    }
}

impl Default for AuthorizationEngine {
    fn default() -> Self {
        Self::winespa_default()
    }
}

/// Rules 2 and 3: password change pre-empts everything, then administrators pass.
pub(crate) fn preflight(principal: &Principal) -> Option<Decision> {
    if principal.must_change_password {
        return Some(Decision::new(
            Verdict::RedirectPasswordChange,
            Reason::PasswordChangeRequired,
        ));
    }
    if principal.role.is_administrator() {
        return Some(Decision::allow(Reason::AdministratorBypass));
    }
    None
}

fn check_grant(canonical: &str, permissions: PermissionView<'_>) -> Decision {
    let permission = canonical.to_string();
    match permissions {
        PermissionView::Pending => {
            Decision::new(Verdict::Pending, Reason::PermissionsPending { permission })
        }
        PermissionView::Loaded(set) if set.contains(canonical) => {
            Decision::allow(Reason::PermissionGranted { permission })
        }
        PermissionView::Loaded(_) => Decision::deny(Reason::PermissionMissing { permission }),
    }
}

fn unmapped_route(path: &str) -> Decision {
    Decision::deny(Reason::UnmappedRoute {
        path: normalize_path(path).to_string(),
    })
}

// ─────────────────────────────────────────────────────────────────────────────
// Decision explanation (audit trail)
// ─────────────────────────────────────────────────────────────────────────────

/// Why a navigation was allowed, denied or redirected.
#[derive(Debug, Clone, Serialize)]
pub struct AuthorizationExplanation {
    pub path: String,

    /// Permission the decision hinged on, if any.
    pub required_permission: Option<String>,

    pub special_rule: Option<SpecialRule>,

    pub verdict: Verdict,

    pub granted: bool,

    pub reason: String,

    /// `None` when nobody is signed in.
    pub principal: Option<PrincipalState>,

    pub denial_reason: Option<DenialReason>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PrincipalState {
    pub principal_id: PrincipalId,
    pub role: String,
    pub must_change_password: bool,
    pub permissions_loaded: bool,
    /// The permission rows could not be fetched and the set is empty.
    pub degraded: bool,
    pub effective_permissions: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DenialReason {
    pub kind: DenialKind,
    pub message: String,
    pub suggestions: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DenialKind {
    RoleMismatch,
    MissingPermission,
    UnmappedPermission,
    ClientNotAllowlisted,
    AdministratorOnly,
    UnmappedRoute,
    UnsupportedMethod,
}

fn denial_for(reason: &Reason) -> Option<DenialReason> {
    let (kind, suggestions) = match reason {
        Reason::RoleMismatch { required } => (
            DenialKind::RoleMismatch,
            vec![format!("Sign in with a principal holding the '{required}' role")],
        ),
        Reason::PermissionMissing { permission } => (
            DenialKind::MissingPermission,
            vec![
                format!("Grant '{permission}' to the principal's role"),
                "Reload permissions after changing the role".to_string(),
            ],
        ),
        Reason::UnmappedPermission { raw } => (
            DenialKind::UnmappedPermission,
            vec![format!(
                "Use a canonical <module>_<action> name or add a legacy alias for '{raw}'"
            )],
        ),
        Reason::ClientNotAllowlisted => (
            DenialKind::ClientNotAllowlisted,
            vec!["Tag the route as client-allowlisted if clients should reach it".to_string()],
        ),
        Reason::AdministratorOnly => (
            DenialKind::AdministratorOnly,
            vec!["Only administrators may open this route".to_string()],
        ),
        Reason::UnmappedRoute { path } => (
            DenialKind::UnmappedRoute,
            vec![format!("Add an entry for '{path}' to the route table")],
        ),
        Reason::UnsupportedMethod { .. } => (
            DenialKind::UnsupportedMethod,
            vec!["Use GET, POST, PUT, PATCH or DELETE".to_string()],
        ),
        _ => return None,
    };
    Some(DenialReason {
        kind,
        message: reason.to_string(),
        suggestions,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{PermissionSet, Role};

    fn engine() -> AuthorizationEngine {
        AuthorizationEngine::winespa_default()
    }

    fn principal(role: Role) -> Principal {
        Principal::new(PrincipalId::new(7), role)
    }

    fn perms(names: &[&str]) -> PermissionSet {
        PermissionSet::new(PrincipalId::new(7), names.iter().copied())
    }

    fn eval(p: &Principal, path: &str, set: &PermissionSet) -> Decision {
        engine().evaluate(Some(p), path, set.into(), &EvaluateOptions::default())
    }

    #[test]
    fn password_change_preempts_admin_bypass() {
        let admin = principal(Role::Administrator).requiring_password_change();
        let d = eval(&admin, "/usuarios", &perms(&[]));
        assert_eq!(d.verdict, Verdict::RedirectPasswordChange);
    }

    #[test]
    fn custom_admin_named_roles_get_no_bypass() {
        for name in ["Admin", "administrator"] {
            let d = eval(&principal(Role::parse(name)), "/usuarios", &perms(&[]));
            assert_eq!(d.verdict, Verdict::Deny, "role {name}");
            assert_ne!(d.reason, Reason::AdministratorBypass);
        }
    }

    #[test]
    fn admin_passes_unmapped_routes() {
        let d = eval(&principal(Role::Administrator), "/reportes", &perms(&[]));
        assert_eq!(d, Decision::allow(Reason::AdministratorBypass));
    }

    #[test]
    fn dashboard_alias_is_open_to_authenticated() {
        let d = eval(&principal(Role::Manicurist), "/dashboard-manicurista", &perms(&[]));
        assert_eq!(d.reason, Reason::AlwaysAllowAuthenticated);
    }

    #[test]
    fn always_allow_does_not_wait_for_permissions() {
        let d = engine().evaluate(
            Some(&principal(Role::Assistant)),
            "/perfil",
            PermissionView::Pending,
            &EvaluateOptions::default(),
        );
        assert!(d.is_allowed());
    }

    #[test]
    fn required_role_is_case_insensitive() {
        let p = principal(Role::Manicurist);
        let set = perms(&["citas_listar"]);
        let opts = EvaluateOptions::new().require_role("MANICURISTA");
        assert!(engine().evaluate(Some(&p), "/citas", (&set).into(), &opts).is_allowed());

        let opts = EvaluateOptions::new().require_role("asistente");
        let d = engine().evaluate(Some(&p), "/citas", (&set).into(), &opts);
        assert_eq!(
            d.reason,
            Reason::RoleMismatch {
                required: "asistente".into()
            }
        );
    }

    #[test]
    fn explicit_permission_accepts_legacy_names() {
        let p = principal(Role::Assistant);
        let set = perms(&["compras_listar"]);
        let opts = EvaluateOptions::new().require_permission("Compras");
        let d = engine().evaluate(Some(&p), "/usuarios", (&set).into(), &opts);
        assert!(d.is_allowed());

        let opts = EvaluateOptions::new().require_permission("Reportes");
        let d = engine().evaluate(Some(&p), "/usuarios", (&set).into(), &opts);
        assert_eq!(d.verdict, Verdict::Deny);
        assert!(matches!(d.reason, Reason::UnmappedPermission { .. }));
    }

    #[test]
    fn clients_are_decided_by_the_allowlist_alone() {
        let client = principal(Role::Client);
        let everything = perms(&["usuarios_listar", "clientes_listar"]);
        assert_eq!(eval(&client, "/usuarios", &everything).reason, Reason::ClientNotAllowlisted);
        assert_eq!(eval(&client, "/clientes", &perms(&[])).reason, Reason::ClientAllowlisted);

        let d = engine().evaluate(
            Some(&client),
            "/servicios",
            PermissionView::Pending,
            &EvaluateOptions::default(),
        );
        assert!(d.is_allowed());
    }

    #[test]
    fn pending_set_is_not_a_denial() {
        let d = engine().evaluate(
            Some(&principal(Role::Manicurist)),
            "/clientes",
            PermissionView::Pending,
            &EvaluateOptions::default(),
        );
        assert_eq!(d.verdict, Verdict::Pending);
        assert_eq!(d.require(), Err(AccessError::PermissionsPending));
    }

    #[test]
    fn unmapped_route_is_denied_even_while_pending() {
        let d = engine().evaluate(
            Some(&principal(Role::Manicurist)),
            "/reportes/",
            PermissionView::Pending,
            &EvaluateOptions::default(),
        );
        assert_eq!(d.reason, Reason::UnmappedRoute { path: "/reportes".into() });
        assert_eq!(d.require(), Err(AccessError::UnmappedRoute("/reportes".into())));
    }

    #[test]
    fn admin_bypass_routes_deny_everyone_else() {
        let routes = RouteTable::new([
            RouteEntry::special("/dashboard", SpecialRule::AlwaysAllowAuthenticated),
            RouteEntry::special("/auditoria", SpecialRule::AdminBypass),
        ])
        .unwrap();
        let engine = AuthorizationEngine::new(routes, PermissionCatalog::builtin());
        let set = perms(&["usuarios_listar"]);

        let d = engine.evaluate(
            Some(&principal(Role::Assistant)),
            "/auditoria",
            (&set).into(),
            &EvaluateOptions::default(),
        );
        assert_eq!(d.reason, Reason::AdministratorOnly);

        let d = engine.evaluate(
            Some(&principal(Role::Administrator)),
            "/auditoria",
            (&set).into(),
            &EvaluateOptions::default(),
        );
        assert!(d.is_allowed());
    }

    #[test]
    fn parameterized_routes_use_their_permission() {
        let p = principal(Role::Manicurist);
        assert!(eval(&p, "/citas/42", &perms(&["citas_listar"])).is_allowed());
        assert!(!eval(&p, "/citas/crear", &perms(&["citas_listar"])).is_allowed());
    }

    #[test]
    fn request_methods_map_to_actions() {
        let e = engine();
        let p = principal(Role::Assistant);
        let set = perms(&["clientes_listar", "clientes_crear", "citas_ver_detalles"]);

        assert!(e.evaluate_request(Some(&p), "GET", "/clientes", (&set).into()).is_allowed());
        assert!(e.evaluate_request(Some(&p), "post", "/clientes", (&set).into()).is_allowed());
        let d = e.evaluate_request(Some(&p), "DELETE", "/clientes", (&set).into());
        assert_eq!(
            d.reason,
            Reason::PermissionMissing {
                permission: "clientes_eliminar".into()
            }
        );
        assert!(e.evaluate_request(Some(&p), "GET", "/citas/9", (&set).into()).is_allowed());

        let d = e.evaluate_request(Some(&p), "TRACE", "/clientes", (&set).into());
        assert!(matches!(d.reason, Reason::UnsupportedMethod { .. }));
    }

    #[test]
    fn request_without_principal_redirects() {
        let d = engine().evaluate_request(None, "GET", "/clientes", PermissionView::Pending);
        assert_eq!(d.verdict, Verdict::RedirectLogin);
    }

    #[test]
    fn require_maps_verdicts_to_errors() {
        let d = Decision::deny(Reason::PermissionMissing {
            permission: "roles_listar".into(),
        });
        assert_eq!(
            d.require(),
            Err(AccessError::PermissionDenied("missing 'roles_listar'".into()))
        );
        assert_eq!(
            Decision::new(Verdict::RedirectLogin, Reason::AuthenticationRequired).require(),
            Err(AccessError::AuthenticationRequired)
        );
        assert!(Decision::allow(Reason::AdministratorBypass).require().is_ok());
    }

    #[test]
    fn explain_reports_missing_permission() {
        let p = principal(Role::Manicurist);
        let set = perms(&["clientes_listar"]);
        let ex = engine().explain(Some(&p), "/usuarios", (&set).into(), &EvaluateOptions::default());

        assert!(!ex.granted);
        assert_eq!(ex.required_permission.as_deref(), Some("usuarios_listar"));
        let state = ex.principal.as_ref().unwrap();
        assert_eq!(state.effective_permissions, vec!["clientes_listar"]);
        assert!(state.permissions_loaded);
        let denial = ex.denial_reason.as_ref().unwrap();
        assert_eq!(denial.kind, DenialKind::MissingPermission);
        assert!(!denial.suggestions.is_empty());

        let json = serde_json::to_value(&ex).unwrap();
        assert_eq!(json["verdict"], "deny");
        assert_eq!(json["denial_reason"]["kind"], "missing_permission");
    }

    #[test]
    fn explain_without_principal_has_no_denial() {
        let ex = engine().explain(
            None,
            "/roles",
            PermissionView::Pending,
            &EvaluateOptions::default(),
        );
        assert_eq!(ex.verdict, Verdict::RedirectLogin);
        assert!(ex.principal.is_none());
        assert!(ex.denial_reason.is_none());
    }
}
