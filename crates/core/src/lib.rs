//! `winespa-core`: identifiers shared by the access-control crates.
//!
//! No IO, no policy. Just the strongly-typed handles every other crate agrees on.

pub mod error;
pub mod id;

pub use error::{CoreError, CoreResult};
pub use id::{PrincipalId, SessionId};
