//! Principal resolution and permission checks.
//!
//! The request flow is: token → session → user → organization context →
//! permission set → [`Principal`]. Guards from `scholar-auth` then run
//! against the principal without touching storage again.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::instrument;

use scholar_auth::{PermissionKey, PermissionSet, Principal, RequirePermissions, authorize};
use scholar_core::{DomainError, OrganizationId, UserId};

use crate::error::ServiceResult;
use crate::services::identity::SessionService;
use crate::store::Store;

/// Computes the effective permission keys of a user within an organization.
#[async_trait]
pub trait PermissionResolver: Send + Sync {
    async fn resolve_permissions(
        &self,
        user: UserId,
        organization: OrganizationId,
    ) -> ServiceResult<PermissionSet>;
}

/// Resolver that runs one join query per call; nothing is cached.
#[derive(Clone)]
pub struct StorePermissionResolver {
    store: Arc<dyn Store>,
}

impl StorePermissionResolver {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl PermissionResolver for StorePermissionResolver {
    async fn resolve_permissions(
        &self,
        user: UserId,
        organization: OrganizationId,
    ) -> ServiceResult<PermissionSet> {
        Ok(self.store.permission_keys_for(user, organization).await?)
    }
}

#[derive(Clone)]
pub struct AccessService {
    sessions: SessionService,
    resolver: Arc<dyn PermissionResolver>,
    store: Arc<dyn Store>,
}

impl AccessService {
    pub fn new(
        sessions: SessionService,
        resolver: Arc<dyn PermissionResolver>,
        store: Arc<dyn Store>,
    ) -> Self {
        Self {
            sessions,
            resolver,
            store,
        }
    }

    /// The organization requests act in. Every request runs in the default
    /// organization; there is no per-request switching.
    pub async fn organization_context(&self) -> ServiceResult<OrganizationId> {
        self.store
            .default_organization()
            .await?
            .map(|o| o.id)
            .ok_or_else(|| DomainError::not_found("default organization").into())
    }

    /// Resolve the full principal behind a session token.
    #[instrument(skip_all)]
    pub async fn authenticate(&self, raw_token: &str) -> ServiceResult<Principal> {
        let user = self
            .sessions
            .resolve_user(raw_token)
            .await?
            .ok_or(DomainError::Unauthenticated)?;
        let organization = self.organization_context().await?;
        let permissions = self
            .resolver
            .resolve_permissions(user.id, organization)
            .await?;
        Ok(Principal::new(user, organization, permissions))
    }

    /// Authenticate, then require **all** of `keys`.
    pub async fn require_permission(
        &self,
        raw_token: &str,
        keys: &[PermissionKey],
    ) -> ServiceResult<Principal> {
        let principal = self.authenticate(raw_token).await?;
        authorize(Some(&principal), RequirePermissions(keys))?;
        Ok(principal)
    }
}
