use serde::{Deserialize, Serialize};

use scholar_core::{OrganizationId, UserId};

use crate::{PermissionKey, PermissionSet, User};

/// A fully resolved principal for authorization decisions.
///
/// Construction is decoupled from storage and transport: the infra layer
/// resolves the session, the organization context and the role grants, then
/// hands this object to the guards and to downstream handlers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub user: User,
    pub organization_id: OrganizationId,
    pub permissions: PermissionSet,
}

impl Principal {
    pub fn new(user: User, organization_id: OrganizationId, permissions: PermissionSet) -> Self {
        Self {
            user,
            organization_id,
            permissions,
        }
    }

    pub fn user_id(&self) -> UserId {
        self.user.id
    }

    pub fn has(&self, key: &PermissionKey) -> bool {
        self.permissions.contains(key)
    }
}
