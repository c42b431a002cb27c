//! `winespa-authz`: pure access-control decisions for the WineSpa back office.
//!
//! This crate is intentionally decoupled from HTTP, storage and the async
//! runtime. Loading permission sets lives in `winespa-session`.

pub mod action;
pub mod authorize;
pub mod catalog;
pub mod config;
pub mod error;
pub mod guard;
pub mod menu;
pub mod permission_set;
pub mod permissions;
pub mod principal;
pub mod roles;
pub mod routes;

pub use action::{ActionGuard, ControlState, DisplayMode};
pub use authorize::{
    AuthorizationEngine, AuthorizationExplanation, Decision, DenialKind, DenialReason,
    EvaluateOptions, PrincipalState, Reason, Verdict,
};
pub use catalog::{LEGACY_ALIASES, ModulePermissions, PermissionCatalog};
pub use config::GuardConfig;
pub use error::AccessError;
pub use guard::{GuardState, Render, RouteGuard, SessionSnapshot};
pub use menu::{MenuEntry, MenuVisibilityResolver, winespa_sidebar};
pub use permission_set::{PermissionSet, PermissionView};
pub use permissions::{Action, Permission, PermissionError, is_canonical_name};
pub use principal::Principal;
pub use roles::Role;
pub use routes::{ClientAllowlist, RouteEntry, RouteTable, RouteTableError, SpecialRule};
