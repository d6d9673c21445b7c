//! Application services: the operations the HTTP layer exposes.

use std::sync::Arc;

use chrono::Duration;

use crate::store::Store;

pub mod access;
pub mod catalog;
pub mod identity;
pub mod progress;

pub use access::{AccessService, PermissionResolver, StorePermissionResolver};
pub use catalog::{CatalogService, CourseChanges};
pub use identity::SessionService;
pub use progress::ProgressService;

/// Every service, wired against one store.
#[derive(Clone)]
pub struct Services {
    pub store: Arc<dyn Store>,
    pub sessions: SessionService,
    pub access: AccessService,
    pub catalog: CatalogService,
    pub progress: ProgressService,
}

impl Services {
    pub fn new(store: Arc<dyn Store>, session_ttl: Duration) -> Self {
        let sessions = SessionService::new(store.clone(), session_ttl);
        let resolver = Arc::new(StorePermissionResolver::new(store.clone()));
        Self {
            access: AccessService::new(sessions.clone(), resolver, store.clone()),
            catalog: CatalogService::new(store.clone()),
            progress: ProgressService::new(store.clone()),
            sessions,
            store,
        }
    }
}
