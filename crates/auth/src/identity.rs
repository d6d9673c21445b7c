//! Identity and access-control records.
//!
//! These mirror the relational rows one-to-one; the store is their only owner.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use scholar_core::{DomainError, OrganizationId, PermissionId, RoleId, UserId};

use crate::{PermissionKey, RoleKey};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub name: String,
    pub email: String,
    /// Argon2 PHC string; `None` for accounts that cannot sign in with a password.
    #[serde(skip_serializing)]
    pub password_hash: Option<String>,
    pub image: Option<String>,
    pub is_email_verified: bool,
    pub created_at: DateTime<Utc>,
}

impl User {
    /// Build a new user, normalising and validating the email address.
    pub fn new(
        name: impl Into<String>,
        email: &str,
        password_hash: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<Self, DomainError> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(DomainError::validation("name must not be empty"));
        }
        Ok(Self {
            id: UserId::new(),
            name,
            email: normalize_email(email)?,
            password_hash,
            image: None,
            is_email_verified: false,
            created_at: now,
        })
    }
}

/// Trim and lowercase an email address, rejecting obviously malformed input.
pub fn normalize_email(email: &str) -> Result<String, DomainError> {
    let email = email.trim().to_lowercase();
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && domain.contains('.') => Ok(email),
        _ => Err(DomainError::validation("invalid email address")),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Organization {
    pub id: OrganizationId,
    pub name: String,
    pub is_default: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleRecord {
    pub id: RoleId,
    pub name: String,
    pub key: RoleKey,
    pub description: Option<String>,
    pub assigned_on_sign_up: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionRecord {
    pub id: PermissionId,
    pub name: String,
    pub key: PermissionKey,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}
