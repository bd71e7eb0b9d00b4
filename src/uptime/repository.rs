//! Subscription and binding persistence.
//!
//! # Responsibilities
//! - Resolve subscriptions and their project bindings by subscription id
//! - Persist status, region and lifecycle changes made by the dispatcher
//!
//! # Design Decisions
//! - Deletes are idempotent: removing a missing row succeeds
//! - Updates against a missing row fail with `RepositoryError::Missing`
//! - A subscription may be monitored by several project bindings

use std::collections::BTreeSet;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use async_trait::async_trait;
use dashmap::DashMap;
use serde::Deserialize;
use thiserror::Error;

use crate::uptime::types::{
    BindingMode, ProjectSubscription, Subscription, SubscriptionId, SubscriptionStatus,
    UptimeStatus,
};

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("{kind} {id} does not exist")]
    Missing { kind: &'static str, id: String },

    #[error("repository backend error: {0}")]
    Backend(String),
}

pub type RepositoryResult<T> = Result<T, RepositoryError>;

/// Relational store holding subscription configuration.
#[async_trait]
pub trait SubscriptionRepository: Send + Sync {
    async fn get_subscription(&self, id: &SubscriptionId) -> RepositoryResult<Option<Subscription>>;

    /// Every binding monitoring this subscription, ordered by binding id.
    async fn get_bindings_for_subscription(
        &self,
        id: &SubscriptionId,
    ) -> RepositoryResult<Vec<ProjectSubscription>>;

    async fn count_bindings_for_subscription(&self, id: &SubscriptionId) -> RepositoryResult<usize>;

    async fn update_uptime_status(&self, binding_id: u64, status: UptimeStatus) -> RepositoryResult<()>;

    async fn update_regions(
        &self,
        id: &SubscriptionId,
        region_slugs: BTreeSet<String>,
        status: SubscriptionStatus,
    ) -> RepositoryResult<()>;

    async fn create_subscription(&self, subscription: Subscription) -> RepositoryResult<()>;

    /// Point a binding at another subscription and change its mode.
    async fn rebind(
        &self,
        binding_id: u64,
        subscription_id: &SubscriptionId,
        mode: BindingMode,
    ) -> RepositoryResult<()>;

    async fn delete_subscription(&self, id: &SubscriptionId) -> RepositoryResult<()>;

    async fn delete_binding(&self, binding_id: u64) -> RepositoryResult<()>;
}

/// Initial repository contents, read from a JSON file.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct RepositorySeed {
    pub subscriptions: Vec<Subscription>,
    pub bindings: Vec<ProjectSubscription>,
}

#[derive(Debug, Error)]
pub enum SeedError {
    #[error("failed to read seed file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse seed file: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Repository kept in process memory.
#[derive(Clone, Default)]
pub struct InMemorySubscriptionRepository {
    subscriptions: Arc<DashMap<SubscriptionId, Subscription>>,
    bindings: Arc<DashMap<u64, ProjectSubscription>>,
    read_only: Arc<AtomicBool>,
}

impl InMemorySubscriptionRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_seed(seed: RepositorySeed) -> Self {
        let repo = Self::new();
        for subscription in seed.subscriptions {
            repo.insert_subscription(subscription);
        }
        for binding in seed.bindings {
            repo.insert_binding(binding);
        }
        repo
    }

    /// Load a [`RepositorySeed`] from a JSON file.
    pub fn load_seed(path: impl AsRef<Path>) -> Result<Self, SeedError> {
        let content = std::fs::read_to_string(path)?;
        let seed: RepositorySeed = serde_json::from_str(&content)?;
        Ok(Self::from_seed(seed))
    }

    /// Reject every subsequent write with a backend error. Reads keep working.
    pub fn set_read_only(&self, read_only: bool) {
        self.read_only.store(read_only, Ordering::SeqCst);
    }

    fn check_writable(&self) -> RepositoryResult<()> {
        if self.read_only.load(Ordering::SeqCst) {
            return Err(RepositoryError::Backend("repository is read-only".into()));
        }
        Ok(())
    }

    pub fn insert_subscription(&self, subscription: Subscription) {
        self.subscriptions
            .insert(subscription.subscription_id.clone(), subscription);
    }

    pub fn insert_binding(&self, binding: ProjectSubscription) {
        self.bindings.insert(binding.id, binding);
    }

    pub fn subscription(&self, id: &SubscriptionId) -> Option<Subscription> {
        self.subscriptions.get(id).map(|r| r.value().clone())
    }

    pub fn binding(&self, binding_id: u64) -> Option<ProjectSubscription> {
        self.bindings.get(&binding_id).map(|r| r.value().clone())
    }

    pub fn subscription_count(&self) -> usize {
        self.subscriptions.len()
    }
}

#[async_trait]
impl SubscriptionRepository for InMemorySubscriptionRepository {
    async fn get_subscription(&self, id: &SubscriptionId) -> RepositoryResult<Option<Subscription>> {
        Ok(self.subscription(id))
    }

    async fn get_bindings_for_subscription(
        &self,
        id: &SubscriptionId,
    ) -> RepositoryResult<Vec<ProjectSubscription>> {
        let mut bindings: Vec<ProjectSubscription> = self
            .bindings
            .iter()
            .filter(|r| &r.value().subscription_id == id)
            .map(|r| r.value().clone())
            .collect();
        bindings.sort_by_key(|b| b.id);
        Ok(bindings)
    }

    async fn count_bindings_for_subscription(&self, id: &SubscriptionId) -> RepositoryResult<usize> {
        Ok(self
            .bindings
            .iter()
            .filter(|r| &r.value().subscription_id == id)
            .count())
    }

    async fn update_uptime_status(&self, binding_id: u64, status: UptimeStatus) -> RepositoryResult<()> {
        self.check_writable()?;
        let mut binding = self.bindings.get_mut(&binding_id).ok_or(RepositoryError::Missing {
            kind: "binding",
            id: binding_id.to_string(),
        })?;
        binding.uptime_status = status;
        Ok(())
    }

    async fn update_regions(
        &self,
        id: &SubscriptionId,
        region_slugs: BTreeSet<String>,
        status: SubscriptionStatus,
    ) -> RepositoryResult<()> {
        self.check_writable()?;
        let mut subscription = self.subscriptions.get_mut(id).ok_or(RepositoryError::Missing {
            kind: "subscription",
            id: id.to_string(),
        })?;
        subscription.region_slugs = region_slugs;
        subscription.status = status;
        Ok(())
    }

    async fn create_subscription(&self, subscription: Subscription) -> RepositoryResult<()> {
        self.check_writable()?;
        self.insert_subscription(subscription);
        Ok(())
    }

    async fn rebind(
        &self,
        binding_id: u64,
        subscription_id: &SubscriptionId,
        mode: BindingMode,
    ) -> RepositoryResult<()> {
        self.check_writable()?;
        let mut binding = self.bindings.get_mut(&binding_id).ok_or(RepositoryError::Missing {
            kind: "binding",
            id: binding_id.to_string(),
        })?;
        binding.subscription_id = subscription_id.clone();
        binding.mode = mode;
        Ok(())
    }

    async fn delete_subscription(&self, id: &SubscriptionId) -> RepositoryResult<()> {
        self.check_writable()?;
        self.subscriptions.remove(id);
        Ok(())
    }

    async fn delete_binding(&self, binding_id: u64) -> RepositoryResult<()> {
        self.check_writable()?;
        self.bindings.remove(&binding_id);
        Ok(())
    }
}
