use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Action half of a canonical `<module>_<action>` permission name.
///
/// Serialized with the wire names the permission service uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Action {
    #[serde(rename = "crear")]
    Create,
    #[serde(rename = "listar")]
    List,
    #[serde(rename = "ver_detalles")]
    ViewDetails,
    #[serde(rename = "editar")]
    Edit,
    #[serde(rename = "eliminar")]
    Delete,
}

impl Action {
    pub const ALL: [Action; 5] = [
        Action::Create,
        Action::List,
        Action::ViewDetails,
        Action::Edit,
        Action::Delete,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            Action::Create => "crear",
            Action::List => "listar",
            Action::ViewDetails => "ver_detalles",
            Action::Edit => "editar",
            Action::Delete => "eliminar",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|a| a.as_str() == raw)
    }

    /// Map an HTTP method onto the action it exercises.
    ///
    /// `GET` on a collection lists, `GET` on a single resource views details.
    /// Unknown methods map to nothing, which callers treat as a denial.
    pub fn from_http_method(method: &str, collection: bool) -> Option<Self> {
        match method.to_ascii_uppercase().as_str() {
            "GET" | "HEAD" if collection => Some(Action::List),
            "GET" | "HEAD" => Some(Action::ViewDetails),
            "POST" => Some(Action::Create),
            "PUT" | "PATCH" => Some(Action::Edit),
            "DELETE" => Some(Action::Delete),
            _ => None,
        }
    }
}

impl core::fmt::Display for Action {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PermissionError {
    #[error("invalid module name '{0}' (expected lowercase letters, digits and underscores)")]
    InvalidModule(String),

    #[error("'{0}' is not a <module>_<action> permission name")]
    InvalidName(String),
}

/// Whether `raw` already has canonical `module_action` syntax.
///
/// Lowercase ASCII letters and digits, split by single underscores, with at
/// least two segments.
pub fn is_canonical_name(raw: &str) -> bool {
    raw.contains('_') && raw.split('_').all(is_lower_segment)
}

fn is_lower_segment(segment: &str) -> bool {
    !segment.is_empty()
        && segment
            .bytes()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit())
}

fn is_module_name(module: &str) -> bool {
    module.split('_').all(is_lower_segment)
}

/// Split a canonical name at its action suffix.
///
/// Module names may contain underscores themselves (`categoria_insumos`), so the
/// split is driven by the known action suffixes rather than the last `_`.
pub fn split_canonical_name(name: &str) -> Option<(&str, Action)> {
    if !is_canonical_name(name) {
        return None;
    }
    Action::ALL.into_iter().find_map(|action| {
        name.strip_suffix(action.as_str())
            .and_then(|rest| rest.strip_suffix('_'))
            .filter(|module| !module.is_empty())
            .map(|module| (module, action))
    })
}

/// A grantable capability: one action on one module.
///
/// Immutable once built; the canonical name is derived, never stored apart from
/// its parts.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "PermissionRecord")]
pub struct Permission {
    id: i64,
    module: String,
    action: Action,
    canonical_name: String,
}

#[derive(Deserialize)]
struct PermissionRecord {
    id: i64,
    module: String,
    action: Action,
}

impl TryFrom<PermissionRecord> for Permission {
    type Error = PermissionError;

    fn try_from(value: PermissionRecord) -> Result<Self, Self::Error> {
        Permission::new(value.id, value.module, value.action)
    }
}

impl Permission {
    pub fn new(id: i64, module: impl Into<String>, action: Action) -> Result<Self, PermissionError> {
        let module = module.into();
        if !is_module_name(&module) {
            return Err(PermissionError::InvalidModule(module));
        }
        let canonical_name = format!("{module}_{}", action.as_str());
        Ok(Self {
            id,
            module,
            action,
            canonical_name,
        })
    }

    /// Build a definition from its canonical name alone.
    pub fn from_canonical(id: i64, name: &str) -> Result<Self, PermissionError> {
        let (module, action) =
            split_canonical_name(name).ok_or_else(|| PermissionError::InvalidName(name.to_string()))?;
        Self::new(id, module, action)
    }

    pub fn id(&self) -> i64 {
        self.id
    }

    pub fn module(&self) -> &str {
        &self.module
    }

    pub fn action(&self) -> Action {
        self.action
    }

    pub fn canonical_name(&self) -> &str {
        &self.canonical_name
    }
}

impl core::fmt::Display for Permission {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.canonical_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_syntax() {
        assert!(is_canonical_name("usuarios_listar"));
        assert!(is_canonical_name("categoria_insumos_ver_detalles"));
        assert!(!is_canonical_name("Usuarios"));
        assert!(!is_canonical_name("usuarios"));
        assert!(!is_canonical_name("Usuarios_listar"));
        assert!(!is_canonical_name("_listar"));
        assert!(!is_canonical_name("usuarios__listar"));
        assert!(!is_canonical_name(""));
    }

    #[test]
    fn split_respects_multi_word_modules_and_actions() {
        assert_eq!(
            split_canonical_name("categoria_insumos_ver_detalles"),
            Some(("categoria_insumos", Action::ViewDetails))
        );
        assert_eq!(
            split_canonical_name("venta_servicios_listar"),
            Some(("venta_servicios", Action::List))
        );
        assert_eq!(split_canonical_name("dashboard_acceder"), None);
        assert_eq!(split_canonical_name("listar"), None);
    }

    #[test]
    fn new_derives_canonical_name() {
        let p = Permission::new(3, "clientes", Action::Edit).unwrap();
        assert_eq!(p.canonical_name(), "clientes_editar");
        assert_eq!(p.to_string(), "clientes_editar");
    }

    #[test]
    fn new_rejects_uppercase_modules() {
        let err = Permission::new(1, "Clientes", Action::List).unwrap_err();
        assert_eq!(err, PermissionError::InvalidModule("Clientes".to_string()));
    }

    #[test]
    fn deserializes_from_parts() {
        let p: Permission =
            serde_json::from_str(r#"{"id": 9, "module": "citas", "action": "ver_detalles"}"#).unwrap();
        assert_eq!(p.canonical_name(), "citas_ver_detalles");
        assert_eq!(p.action(), Action::ViewDetails);
    }

    #[test]
    fn http_methods_map_to_actions() {
        assert_eq!(Action::from_http_method("get", true), Some(Action::List));
        assert_eq!(Action::from_http_method("GET", false), Some(Action::ViewDetails));
        assert_eq!(Action::from_http_method("POST", false), Some(Action::Create));
        assert_eq!(Action::from_http_method("PATCH", false), Some(Action::Edit));
        assert_eq!(Action::from_http_method("DELETE", false), Some(Action::Delete));
        assert_eq!(Action::from_http_method("OPTIONS", true), None);
    }
}
