//! Guard predicates evaluated against a resolved [`Principal`].
//!
//! - No IO
//! - No panics
//! - No business logic (pure policy checks)
//!
//! Two predicates exist: holding permission keys (role-based) and owning the
//! targeted resource (e.g. teaching the course). Handlers compose them with
//! [`Guard::and`] instead of folding ownership checks into their bodies.

use thiserror::Error;

use scholar_core::{DomainError, UserId};

use crate::{PermissionKey, Principal};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthzError {
    #[error("unauthenticated")]
    Unauthenticated,

    #[error("forbidden: missing permission(s) {}", .0.join(", "))]
    MissingPermissions(Vec<String>),

    #[error("forbidden: not an owner of this {0}")]
    NotOwner(&'static str),
}

impl From<AuthzError> for DomainError {
    fn from(value: AuthzError) -> Self {
        match value {
            AuthzError::Unauthenticated => DomainError::Unauthenticated,
            other => DomainError::forbidden(other.to_string()),
        }
    }
}

/// A single authorization predicate.
pub trait Guard {
    fn check(&self, principal: &Principal) -> Result<(), AuthzError>;

    /// Both predicates must pass; `self` is evaluated first.
    fn and<G: Guard>(self, other: G) -> Both<Self, G>
    where
        Self: Sized,
    {
        Both(self, other)
    }
}

impl<G: Guard + ?Sized> Guard for &G {
    fn check(&self, principal: &Principal) -> Result<(), AuthzError> {
        (**self).check(principal)
    }
}

/// Requires **all** listed keys (AND, not ANY).
#[derive(Debug, Clone, Copy)]
pub struct RequirePermissions<'a>(pub &'a [PermissionKey]);

impl Guard for RequirePermissions<'_> {
    fn check(&self, principal: &Principal) -> Result<(), AuthzError> {
        let missing = principal.permissions.missing(self.0);
        if missing.is_empty() {
            Ok(())
        } else {
            Err(AuthzError::MissingPermissions(
                missing.into_iter().map(|k| k.as_str().to_string()).collect(),
            ))
        }
    }
}

/// Requires the acting user to be listed among the resource's owners.
#[derive(Debug, Clone, Copy)]
pub struct RequireOwnership<'a> {
    pub resource: &'static str,
    pub owners: &'a [UserId],
}

impl<'a> RequireOwnership<'a> {
    pub fn new(resource: &'static str, owners: &'a [UserId]) -> Self {
        Self { resource, owners }
    }
}

impl Guard for RequireOwnership<'_> {
    fn check(&self, principal: &Principal) -> Result<(), AuthzError> {
        if self.owners.contains(&principal.user_id()) {
            Ok(())
        } else {
            Err(AuthzError::NotOwner(self.resource))
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Both<A, B>(A, B);

impl<A: Guard, B: Guard> Guard for Both<A, B> {
    fn check(&self, principal: &Principal) -> Result<(), AuthzError> {
        self.0.check(principal)?;
        self.1.check(principal)
    }
}

/// Check `guard` for an optional principal (anonymous requests fail first).
pub fn authorize<G: Guard>(principal: Option<&Principal>, guard: G) -> Result<(), AuthzError> {
    let principal = principal.ok_or(AuthzError::Unauthenticated)?;
    let result = guard.check(principal);
    if let Err(e) = &result {
        tracing::info!(user_id = %principal.user_id(), reason = %e, "authorization denied");
    }
    result
}
