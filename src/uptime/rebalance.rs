//! Region rebalancing.
//!
//! # Responsibilities
//! - Reconcile a subscription's regions with the enabled region set
//! - Tell added regions to start probing and removed regions to stop
//!
//! # Design Decisions
//! - Runs on a sampled subset of results; assignment drift is tolerated
//!   until the next sampled result for the subscription
//! - Region descriptors are read fresh from a hot-swappable source
//! - Persistence and emission are not transactional; receivers are idempotent
//! - Status follows the region set: Active when any region probes the
//!   subscription, Disabled when none does

use std::collections::BTreeSet;
use std::sync::Arc;
use arc_swap::ArcSwap;
use rand::Rng;

use crate::config::RegionConfig;
use crate::observability::metrics;
use crate::uptime::producer::{send_config, ConfigMessage, Producer};
use crate::uptime::repository::{RepositoryResult, SubscriptionRepository};
use crate::uptime::types::{Subscription, SubscriptionStatus};

/// Source of uniform draws in `0.0..1.0`.
pub trait ProbabilitySource: Send + Sync {
    fn draw(&self) -> f64;
}

/// Draws from the thread-local RNG.
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadRngSource;

impl ProbabilitySource for ThreadRngSource {
    fn draw(&self) -> f64 {
        rand::thread_rng().gen::<f64>()
    }
}

/// Always returns the same value; `FixedDraw(0.0)` always samples,
/// `FixedDraw(1.0)` never does.
#[derive(Debug, Clone, Copy)]
pub struct FixedDraw(pub f64);

impl ProbabilitySource for FixedDraw {
    fn draw(&self) -> f64 {
        self.0
    }
}

/// Shared, atomically replaceable list of region descriptors.
#[derive(Clone)]
pub struct RegionSource(Arc<ArcSwap<Vec<RegionConfig>>>);

impl RegionSource {
    pub fn new(regions: Vec<RegionConfig>) -> Self {
        Self(Arc::new(ArcSwap::from_pointee(regions)))
    }

    pub fn load(&self) -> Arc<Vec<RegionConfig>> {
        self.0.load_full()
    }

    pub fn replace(&self, regions: Vec<RegionConfig>) {
        self.0.store(Arc::new(regions));
    }

    /// Config topics of every enabled region, deduplicated.
    pub fn enabled_topics(&self) -> BTreeSet<String> {
        self.load()
            .iter()
            .filter(|r| r.enabled)
            .map(|r| r.config_topic.clone())
            .collect()
    }
}

/// What a rebalance changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RebalanceReport {
    pub added: BTreeSet<String>,
    pub removed: BTreeSet<String>,
    pub status: SubscriptionStatus,
    pub status_changed: bool,
}

pub struct RegionRebalancer {
    regions: RegionSource,
    repository: Arc<dyn SubscriptionRepository>,
    producer: Arc<dyn Producer>,
    sampler: Arc<dyn ProbabilitySource>,
    sample_rate: f64,
}

impl RegionRebalancer {
    pub fn new(
        regions: RegionSource,
        repository: Arc<dyn SubscriptionRepository>,
        producer: Arc<dyn Producer>,
        sampler: Arc<dyn ProbabilitySource>,
        sample_rate: f64,
    ) -> Self {
        Self {
            regions,
            repository,
            producer,
            sampler,
            sample_rate,
        }
    }

    /// Rebalance when the sampler selects this invocation.
    pub async fn maybe_rebalance(
        &self,
        subscription: &Subscription,
    ) -> RepositoryResult<Option<RebalanceReport>> {
        if self.sampler.draw() >= self.sample_rate {
            return Ok(None);
        }
        self.rebalance(subscription).await
    }

    /// Reconcile regions now. Returns `None` when nothing had to change.
    pub async fn rebalance(
        &self,
        subscription: &Subscription,
    ) -> RepositoryResult<Option<RebalanceReport>> {
        let regions = self.regions.load();
        let desired: BTreeSet<String> = regions
            .iter()
            .filter(|r| r.enabled)
            .map(|r| r.slug.clone())
            .collect();
        let current = &subscription.region_slugs;

        if &desired == current {
            return Ok(None);
        }

        let added: BTreeSet<String> = desired.difference(current).cloned().collect();
        let removed: BTreeSet<String> = current.difference(&desired).cloned().collect();
        let status = if desired.is_empty() {
            SubscriptionStatus::Disabled
        } else {
            SubscriptionStatus::Active
        };

        self.repository
            .update_regions(&subscription.subscription_id, desired.clone(), status)
            .await?;

        let mut updated = subscription.clone();
        updated.region_slugs = desired;
        updated.status = status;

        let upsert = ConfigMessage::upsert(&updated);
        for region in regions.iter().filter(|r| added.contains(&r.slug)) {
            send_config(self.producer.as_ref(), &region.config_topic, &upsert).await;
        }

        let delete = ConfigMessage::delete(&subscription.subscription_id);
        for slug in &removed {
            match regions.iter().find(|r| &r.slug == slug) {
                Some(region) => {
                    send_config(self.producer.as_ref(), &region.config_topic, &delete).await;
                }
                None => {
                    // Region dropped from config entirely; nobody left to notify
                    tracing::warn!(
                        subscription_id = %subscription.subscription_id,
                        region = %slug,
                        "Removed region has no descriptor, skipping config deletion"
                    );
                }
            }
        }

        metrics::record_regions_rebalanced(added.len(), removed.len());
        tracing::info!(
            subscription_id = %subscription.subscription_id,
            added = ?added,
            removed = ?removed,
            status = ?status,
            "Rebalanced subscription regions"
        );

        Ok(Some(RebalanceReport {
            added,
            removed,
            status,
            status_changed: status != subscription.status,
        }))
    }
}
