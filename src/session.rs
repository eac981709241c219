//! Session lifecycle
//!
//! Owns the switchable tenant scope the key generator reads. Every identity
//! change resets the cache store first, so nothing fetched for the previous
//! tenant can be read or written under the new one.

use std::sync::Arc;

use crate::cache::key::{ScopeProvider, SessionScope, TenantScope};
use crate::cache::store::CacheStore;

pub struct Session {
    store: Arc<CacheStore>,
    scope: SessionScope,
}

impl Session {
    /// `scope` must be the same provider the store's key generator reads.
    pub fn new(store: Arc<CacheStore>, scope: SessionScope) -> Self {
        Self { store, scope }
    }

    pub fn store(&self) -> &Arc<CacheStore> {
        &self.store
    }

    pub fn current(&self) -> Option<TenantScope> {
        self.scope.current_scope()
    }

    pub fn is_signed_in(&self) -> bool {
        self.current().is_some()
    }

    /// Start a session for `user_id`, optionally inside `org_id`.
    pub fn login(&self, user_id: &str, org_id: Option<&str>) {
        self.store.reset_all();
        self.scope
            .set(Some(TenantScope::from_parts(Some(user_id), org_id)));
        log::debug!("Signed in as {}", user_id);
    }

    pub fn logout(&self) {
        self.store.reset_all();
        self.scope.set(None);
        log::debug!("Signed out");
    }

    /// Move the current user to `org_id`. Returns `false` when already there.
    pub fn switch_organization(&self, org_id: &str) -> bool {
        let current = self.current();
        if current
            .as_ref()
            .is_some_and(|scope| scope.organization_id == org_id)
        {
            return false;
        }

        let user_id = current.map(|scope| scope.user_id);
        self.store.reset_all();
        self.scope
            .set(Some(TenantScope::from_parts(user_id.as_deref(), Some(org_id))));
        log::debug!("Switched organization to {}", org_id);
        true
    }
}
