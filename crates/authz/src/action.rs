//! Action-level checks for buttons, forms and other controls inside a page.
//!
//! These skip the route rules: a control asks about one `<module>_<action>`
//! permission, not about a path.

use serde::Serialize;

use crate::authorize::{AuthorizationEngine, Decision, Reason, Verdict, preflight};
use crate::permission_set::PermissionView;
use crate::{Action, Principal};

impl AuthorizationEngine {
    /// May `principal` perform `action` on `module`?
    pub fn can_perform(
        &self,
        principal: Option<&Principal>,
        module: &str,
        action: Action,
        permissions: PermissionView<'_>,
    ) -> Decision {
        self.evaluate_permission(principal, &format!("{module}_{action}"), permissions)
    }

    /// Allowed when any of the module's actions is granted.
    pub fn can_access_module(
        &self,
        principal: Option<&Principal>,
        module: &str,
        permissions: PermissionView<'_>,
    ) -> Decision {
        let mut last = None;
        for action in Action::ALL {
            let decision = self.can_perform(principal, module, action, permissions);
            if decision.verdict != Verdict::Deny {
                return decision;
            }
            last = Some(decision);
        }
        match last {
            Some(Decision {
                reason: Reason::UnmappedPermission { raw },
                ..
            }) => Decision::deny(Reason::UnmappedPermission { raw }),
            _ => Decision::deny(Reason::PermissionMissing {
                permission: format!("{module}_*"),
            }),
        }
    }
}

/// How a control without permission is presented.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DisplayMode {
    #[default]
    Hide,
    Disable,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ControlState {
    Enabled,
    Disabled { reason: String },
    Hidden,
}

impl ControlState {
    pub fn is_visible(&self) -> bool {
        !matches!(self, ControlState::Hidden)
    }

    pub fn is_enabled(&self) -> bool {
        matches!(self, ControlState::Enabled)
    }
}

/// Guard for a single control: module access first, then the action itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionGuard {
    pub module: String,
    pub action: Action,
    pub display: DisplayMode,
    pub required_role: Option<String>,
}

impl ActionGuard {
    pub fn new(module: impl Into<String>, action: Action) -> Self {
        Self {
            module: module.into(),
            action,
            display: DisplayMode::Hide,
            required_role: None,
        }
    }

    pub fn display(mut self, display: DisplayMode) -> Self {
        self.display = display;
        self
    }

    pub fn require_role(mut self, role: impl Into<String>) -> Self {
        self.required_role = Some(role.into());
        self
    }

    /// A pending permission set counts as not granted; controls never wait.
    pub fn state(
        &self,
        engine: &AuthorizationEngine,
        principal: Option<&Principal>,
        permissions: PermissionView<'_>,
    ) -> ControlState {
        let decision = self.decide(engine, principal, permissions);
        if decision.is_allowed() {
            return ControlState::Enabled;
        }
        match self.display {
            DisplayMode::Hide => ControlState::Hidden,
            DisplayMode::Disable => ControlState::Disabled {
                reason: decision.reason.to_string(),
            },
        }
    }

    fn decide(
        &self,
        engine: &AuthorizationEngine,
        principal: Option<&Principal>,
        permissions: PermissionView<'_>,
    ) -> Decision {
        if let Some(p) = principal {
            if let Some(decision) = preflight(p) {
                return decision;
            }
            if let Some(required) = self.required_role.as_deref() {
                if !p.role.matches(required) {
                    return Decision::deny(Reason::RoleMismatch {
                        required: required.to_string(),
                    });
                }
            }
        }

        let module = engine.can_access_module(principal, &self.module, permissions);
        if !module.is_allowed() {
            return module;
        }
        engine.can_perform(principal, &self.module, self.action, permissions)
    }
}
