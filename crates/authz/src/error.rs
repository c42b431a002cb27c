//! Access-control error taxonomy.
//!
//! The engine itself never returns these: every abnormal condition degrades to a
//! [`Decision`](crate::Decision). They exist for callers that prefer `?` over
//! matching on verdicts, and for operator-facing log lines.

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AccessError {
    /// No authenticated principal.
    #[error("authentication required")]
    AuthenticationRequired,

    /// The principal must change its password before doing anything else.
    #[error("password change required")]
    PasswordChangeRequired,

    /// Normal, expected denial.
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// Permission rows or definitions could not be fetched.
    ///
    /// Recovered by treating the principal as holding no permissions.
    #[error("permission catalog unavailable: {0}")]
    CatalogUnavailable(String),

    /// A route has no entry in the route table (configuration gap).
    #[error("route '{0}' has no access policy")]
    UnmappedRoute(String),

    /// The permission set has not finished loading.
    #[error("permissions are still loading")]
    PermissionsPending,
}
