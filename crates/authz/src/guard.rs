//! Route guard: the state machine a protected page runs through before (and
//! while) it renders.
//!
//! `Idle -> AuthPending -> PermissionPending -> Resolved(decision)`. A session
//! or path change puts the guard back through the machine.

use serde::Serialize;

use crate::authorize::{AuthorizationEngine, Decision, EvaluateOptions, Reason, Verdict};
use crate::config::GuardConfig;
use crate::permission_set::PermissionView;
use crate::routes::normalize_path;
use crate::Principal;

/// What the session layer currently knows about who is signed in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionSnapshot {
    /// Session restore has not finished.
    Unknown,
    Anonymous,
    Authenticated(Principal),
}

impl SessionSnapshot {
    pub fn principal(&self) -> Option<&Principal> {
        match self {
            SessionSnapshot::Authenticated(p) => Some(p),
            _ => None,
        }
    }
}

impl From<Option<Principal>> for SessionSnapshot {
    fn from(value: Option<Principal>) -> Self {
        value.map_or(SessionSnapshot::Anonymous, SessionSnapshot::Authenticated)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardState {
    Idle,
    AuthPending,
    PermissionPending,
    Resolved(Decision),
}

impl GuardState {
    pub fn is_resolved(&self) -> bool {
        matches!(self, GuardState::Resolved(_))
    }

    fn name(&self) -> &'static str {
        match self {
            GuardState::Idle => "idle",
            GuardState::AuthPending => "auth_pending",
            GuardState::PermissionPending => "permission_pending",
            GuardState::Resolved(_) => "resolved",
        }
    }
}

/// What the page shell should do right now.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "render", rename_all = "snake_case")]
pub enum Render {
    /// Render the protected page.
    Content,
    /// Render a placeholder until the guard resolves.
    Loading,
    /// Render the access-denied panel in place; the URL does not change and the
    /// panel offers a history-back action.
    AccessDenied { path: String, reason: Reason },
    /// Navigate away, replacing the current history entry.
    Navigate {
        to: String,
        /// Path to come back to once the redirect target is done.
        return_to: Option<String>,
        replace: bool,
    },
}

#[derive(Debug, Clone)]
pub struct RouteGuard {
    path: String,
    options: EvaluateOptions,
    config: GuardConfig,
    state: GuardState,
}

impl RouteGuard {
    pub fn new(path: impl Into<String>, config: GuardConfig) -> Self {
        Self {
            path: path.into(),
            options: EvaluateOptions::default(),
            config,
            state: GuardState::Idle,
        }
    }

    /// Role or permission requirements of the guarded component.
    pub fn with_options(mut self, options: EvaluateOptions) -> Self {
        self.options = options;
        self
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn state(&self) -> &GuardState {
        &self.state
    }

    pub fn config(&self) -> &GuardConfig {
        &self.config
    }

    pub fn navigate(&mut self, path: impl Into<String>) {
        self.path = path.into();
        self.reset();
    }

    pub fn reset(&mut self) {
        self.transition(GuardState::Idle);
    }

    /// Re-evaluate against the latest session and permission snapshots.
    pub fn advance(
        &mut self,
        engine: &AuthorizationEngine,
        session: &SessionSnapshot,
        permissions: PermissionView<'_>,
    ) -> &GuardState {
        let next = match session {
            SessionSnapshot::Unknown => GuardState::AuthPending,
            SessionSnapshot::Anonymous | SessionSnapshot::Authenticated(_) => {
                let decision =
                    engine.evaluate(session.principal(), &self.path, permissions, &self.options);
                if decision.verdict.is_pending() {
                    GuardState::PermissionPending
                } else {
                    GuardState::Resolved(decision)
                }
            }
        };
        self.transition(next);
        &self.state
    }

    fn transition(&mut self, next: GuardState) {
        if self.state == next {
            return;
        }
        match &next {
            GuardState::Resolved(decision) => tracing::debug!(
                path = %self.path,
                from = self.state.name(),
                verdict = ?decision.verdict,
                reason = %decision.reason,
                "route guard resolved"
            ),
            _ => tracing::debug!(
                path = %self.path,
                from = self.state.name(),
                to = next.name(),
                "route guard transition"
            ),
        }
        self.state = next;
    }

    pub fn render(&self) -> Render {
        let waiting = || {
            if self.config.block_while_pending {
                Render::Loading
            } else {
                Render::Content
            }
        };

        match &self.state {
            GuardState::Idle | GuardState::AuthPending | GuardState::PermissionPending => waiting(),
            GuardState::Resolved(decision) => match decision.verdict {
                Verdict::Allow => Render::Content,
                Verdict::Deny => Render::AccessDenied {
                    path: normalize_path(&self.path).to_string(),
                    reason: decision.reason.clone(),
                },
                Verdict::RedirectLogin => Render::Navigate {
                    to: self.config.login_path.clone(),
                    return_to: Some(self.path.clone()),
                    replace: true,
                },
                Verdict::RedirectPasswordChange => Render::Navigate {
                    to: self.config.password_change_path.clone(),
                    return_to: None,
                    replace: true,
                },
                Verdict::Pending => waiting(),
            },
        }
    }
}
