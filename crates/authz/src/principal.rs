use serde::{Deserialize, Serialize};

use winespa_core::PrincipalId;

use crate::Role;

/// The authenticated actor a decision is made for.
///
/// Owned by the session layer; the engine only reads it. Deserializes from the
/// user record the login endpoint returns (`rol`, `debe_cambiar_contraseña`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub id: PrincipalId,

    #[serde(alias = "rol")]
    pub role: Role,

    #[serde(default, alias = "debe_cambiar_contraseña")]
    pub must_change_password: bool,
}

impl Principal {
    pub fn new(id: PrincipalId, role: Role) -> Self {
        Self {
            id,
            role,
            must_change_password: false,
        }
    }

    pub fn requiring_password_change(mut self) -> Self {
        self.must_change_password = true;
        self
    }
}
