//! `winespa-session`: the async side of access control: loading, caching and
//! invalidating permission sets as the session changes.

pub mod cache;
pub mod controller;
pub mod loaders;
pub mod provider;
pub mod repository;

pub use cache::{CachedPermissions, LoadError, PermissionCache};
pub use controller::AccessSession;
pub use loaders::{
    PermissionCatalogLoader, PermissionRowsLoader, RawPermissionRow, load_catalog, rows_from_json,
};
pub use provider::{InMemorySessionProvider, SessionProvider};
pub use repository::{InMemoryPermissionRowsRepository, PermissionRowsRepository};
