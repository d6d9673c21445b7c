//! Session lifecycle and user resolution.

use std::sync::Arc;

use chrono::{Duration, Utc};
use tracing::instrument;

use scholar_auth::identity::normalize_email;
use scholar_auth::password::{hash_password, verify_against_dummy, verify_password};
use scholar_auth::{IssuedSession, Session, SessionToken, User};
use scholar_core::{DomainError, RoleId};

use crate::error::{ServiceError, ServiceResult};
use crate::store::Store;

#[derive(Clone)]
pub struct SessionService {
    store: Arc<dyn Store>,
    ttl: Duration,
}

impl SessionService {
    pub fn new(store: Arc<dyn Store>, ttl: Duration) -> Self {
        Self { store, ttl }
    }

    /// Resolve the user behind a presented session token.
    ///
    /// A missing, blank, unknown or expired token yields `Ok(None)`; only a
    /// storage failure is an error. Resolution never touches the session.
    pub async fn resolve_user(&self, raw_token: &str) -> ServiceResult<Option<User>> {
        let Some(token) = SessionToken::parse(raw_token) else {
            return Ok(None);
        };
        let Some(session) = self.store.session_by_token_hash(&token.hash()).await? else {
            return Ok(None);
        };
        if !session.is_active(Utc::now()) {
            return Ok(None);
        }
        Ok(self.store.user_by_id(session.user_id).await?)
    }

    /// Exchange credentials for a new session.
    ///
    /// Unknown email and wrong password fail identically.
    #[instrument(skip(self, password))]
    pub async fn sign_in(&self, email: &str, password: &str) -> ServiceResult<IssuedSession> {
        let email = normalize_email(email).map_err(|_| DomainError::Unauthenticated)?;
        let user = self.store.user_by_email(&email).await?;

        let hash = user.as_ref().and_then(|u| u.password_hash.clone());
        let verified = verify_on_blocking_thread(password.to_owned(), hash).await?;
        let user_id = match user {
            Some(u) if verified => u.id,
            _ => {
                tracing::info!("sign-in rejected");
                return Err(DomainError::Unauthenticated.into());
            }
        };

        let token = SessionToken::generate();
        let session = Session::new(&token, user_id, Utc::now(), self.ttl);
        self.store.insert_session(&session).await?;
        tracing::info!(user_id = %user_id, "session issued");
        Ok(IssuedSession { token, session })
    }

    /// Delete the session behind `raw_token`. Unknown tokens are ignored.
    pub async fn sign_out(&self, raw_token: &str) -> ServiceResult<()> {
        if let Some(token) = SessionToken::parse(raw_token) {
            self.store.delete_session(&token.hash()).await?;
        }
        Ok(())
    }

    /// Register a user, join them to the default organization and grant the
    /// roles flagged for sign-up there, as one store write.
    #[instrument(skip(self, name, password))]
    pub async fn sign_up(&self, name: &str, email: &str, password: &str) -> ServiceResult<User> {
        let organization = self
            .store
            .default_organization()
            .await?
            .ok_or_else(|| DomainError::not_found("default organization"))?;
        let roles: Vec<RoleId> = self
            .store
            .sign_up_roles()
            .await?
            .into_iter()
            .map(|role| role.id)
            .collect();

        let hash = hash_on_blocking_thread(password.to_owned()).await?;
        let user = User::new(name.trim(), email, Some(hash), Utc::now())?;
        self.store
            .register_user(&user, organization.id, &roles)
            .await?;

        tracing::info!(user_id = %user.id, "user signed up");
        Ok(user)
    }
}

// argon2 runs on the blocking pool.

async fn hash_on_blocking_thread(password: String) -> ServiceResult<String> {
    let hash = tokio::task::spawn_blocking(move || hash_password(&password))
        .await
        .map_err(|e| ServiceError::Internal(format!("password hashing task: {e}")))??;
    Ok(hash)
}

/// Without a stored hash the dummy is verified instead, so both rejections
/// take the same time.
async fn verify_on_blocking_thread(password: String, hash: Option<String>) -> ServiceResult<bool> {
    tokio::task::spawn_blocking(move || match hash {
        Some(hash) => verify_password(&password, &hash),
        None => verify_against_dummy(&password),
    })
    .await
    .map_err(|e| ServiceError::Internal(format!("password verification task: {e}")))
}
