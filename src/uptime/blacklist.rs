//! Registry of urls that failed onboarding.
//!
//! Auto-detection consults this registry so a url that could not pass its
//! onboarding window is not picked up again for a while.

use std::sync::Arc;
use std::time::Duration;
use async_trait::async_trait;

use crate::store::{failed_url_key, StateStore, StoreResult};

#[async_trait]
pub trait FailedUrlRegistry: Send + Sync {
    async fn mark_failed(&self, url: &str) -> StoreResult<()>;

    async fn is_failed(&self, url: &str) -> StoreResult<bool>;
}

/// Registry stored as TTL keys in the shared state store.
#[derive(Clone)]
pub struct StoreFailedUrlRegistry {
    store: Arc<dyn StateStore>,
    ttl: Duration,
}

impl StoreFailedUrlRegistry {
    pub fn new(store: Arc<dyn StateStore>, ttl: Duration) -> Self {
        Self { store, ttl }
    }
}

#[async_trait]
impl FailedUrlRegistry for StoreFailedUrlRegistry {
    async fn mark_failed(&self, url: &str) -> StoreResult<()> {
        self.store.set(&failed_url_key(url), "1".to_string(), Some(self.ttl)).await
    }

    async fn is_failed(&self, url: &str) -> StoreResult<bool> {
        self.store.exists(&failed_url_key(url)).await
    }
}
