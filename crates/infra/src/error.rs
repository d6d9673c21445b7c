//! Storage and service error types.
//!
//! ## Error Mapping
//!
//! | SQLx error | PostgreSQL code | StoreError |
//! |------------|-----------------|------------|
//! | unique violation | `23505` | `Conflict` |
//! | foreign key violation | `23503` | `NotFound` |
//! | RowNotFound | N/A | `NotFound` |
//! | anything else | any | `Backend` |

use thiserror::Error;

use scholar_auth::AuthzError;
use scholar_core::DomainError;
use scholar_courses::TransitionError;

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("conflict: {0}")]
    Conflict(String),

    #[error("not found: {0}")]
    NotFound(String),

    /// A domain rule evaluated inside a store transaction refused the change.
    #[error(transparent)]
    Rejected(#[from] DomainError),

    #[error("storage backend error: {0}")]
    Backend(String),
}

impl From<TransitionError> for StoreError {
    fn from(value: TransitionError) -> Self {
        StoreError::Rejected(value.into())
    }
}

pub(crate) fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match &err {
        sqlx::Error::Database(db) => match db.code().as_deref() {
            Some("23505") => StoreError::Conflict(format!(
                "{operation}: {}",
                db.constraint().unwrap_or("unique constraint")
            )),
            Some("23503") => StoreError::NotFound(format!(
                "{operation}: referenced record ({})",
                db.constraint().unwrap_or("foreign key")
            )),
            _ => StoreError::Backend(format!("{operation}: {err}")),
        },
        sqlx::Error::RowNotFound => StoreError::NotFound(operation.to_string()),
        _ => StoreError::Backend(format!("{operation}: {err}")),
    }
}

/// Error returned by the application services.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error("storage failure: {0}")]
    Storage(String),

    /// Work handed to a blocking thread panicked or was cancelled.
    #[error("internal failure: {0}")]
    Internal(String),
}

pub type ServiceResult<T> = Result<T, ServiceError>;

impl ServiceError {
    pub fn as_domain(&self) -> Option<&DomainError> {
        match self {
            ServiceError::Domain(e) => Some(e),
            ServiceError::Storage(_) | ServiceError::Internal(_) => None,
        }
    }
}

impl From<StoreError> for ServiceError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::Conflict(msg) => ServiceError::Domain(DomainError::Conflict(msg)),
            StoreError::NotFound(msg) => ServiceError::Domain(DomainError::NotFound(msg)),
            StoreError::Rejected(e) => ServiceError::Domain(e),
            StoreError::Backend(msg) => ServiceError::Storage(msg),
        }
    }
}

impl From<AuthzError> for ServiceError {
    fn from(value: AuthzError) -> Self {
        ServiceError::Domain(value.into())
    }
}

impl From<TransitionError> for ServiceError {
    fn from(value: TransitionError) -> Self {
        ServiceError::Domain(value.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_errors_keep_their_domain_kind() {
        let e: ServiceError = StoreError::Conflict("slug".into()).into();
        assert!(matches!(e.as_domain(), Some(DomainError::Conflict(_))));

        let e: ServiceError = StoreError::from(TransitionError::NotStarted).into();
        assert!(matches!(e.as_domain(), Some(DomainError::InvalidStateTransition(_))));

        let e: ServiceError = StoreError::Backend("down".into()).into();
        assert!(e.as_domain().is_none());
    }

    #[test]
    fn row_not_found_maps_to_not_found() {
        assert!(matches!(
            map_sqlx_error("load", sqlx::Error::RowNotFound),
            StoreError::NotFound(_)
        ));
    }
}
