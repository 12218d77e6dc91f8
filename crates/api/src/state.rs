//! Shared application state.

use std::sync::Arc;

use domain::{CatalogService, IdentityService, OrderService, PasswordHasher, TransitionPolicy};
use store::Store;

/// Services shared by all handlers.
pub struct AppState<S: Store> {
    pub orders: OrderService<S>,
    pub catalog: CatalogService<S>,
    pub identity: IdentityService<S>,
}

impl<S: Store> AppState<S> {
    pub fn new(store: S, policy: TransitionPolicy, hasher: PasswordHasher) -> Arc<Self> {
        Arc::new(Self {
            orders: OrderService::new(store.clone(), policy),
            catalog: CatalogService::new(store.clone()),
            identity: IdentityService::new(store, hasher),
        })
    }
}
