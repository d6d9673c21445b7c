//! `scholar-auth` — pure authentication/authorization boundary.
//!
//! This crate is intentionally decoupled from HTTP and storage: it defines the
//! identity records, permission keys and the guard predicates, while resolving
//! sessions and role assignments is left to the infra layer.

pub mod authorize;
pub mod identity;
pub mod password;
pub mod permissions;
pub mod principal;
pub mod roles;
pub mod session;

pub use authorize::{AuthzError, Guard, RequireOwnership, RequirePermissions, authorize};
pub use identity::{Organization, PermissionRecord, RoleRecord, User};
pub use permissions::{PermissionKey, PermissionSet};
pub use principal::Principal;
pub use roles::RoleKey;
pub use session::{IssuedSession, Session, SessionToken};
