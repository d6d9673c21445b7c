use scholar_auth::Principal;
use scholar_core::{OrganizationId, UserId};

/// Authenticated request context.
///
/// Inserted by the session middleware; every protected handler can rely on it
/// being present.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrincipalContext {
    principal: Principal,
    token: String,
}

impl PrincipalContext {
    pub fn new(principal: Principal, token: impl Into<String>) -> Self {
        Self {
            principal,
            token: token.into(),
        }
    }

    pub fn principal(&self) -> &Principal {
        &self.principal
    }

    pub fn user_id(&self) -> UserId {
        self.principal.user_id()
    }

    pub fn organization_id(&self) -> OrganizationId {
        self.principal.organization_id
    }

    /// The raw session token the request was authenticated with.
    pub fn token(&self) -> &str {
        &self.token
    }
}
