//! Shared fixtures for integration tests.

#![allow(dead_code)]

use std::collections::BTreeSet;
use std::sync::Arc;
use chrono::{DateTime, Utc};

use uptime_results::config::{PipelineConfig, RegionConfig};
use uptime_results::consumer::StreamMessage;
use uptime_results::store::InMemoryStateStore;
use uptime_results::uptime::blacklist::StoreFailedUrlRegistry;
use uptime_results::uptime::issues::InMemoryIssueStore;
use uptime_results::uptime::producer::RecordingProducer;
use uptime_results::uptime::rebalance::{FixedDraw, RegionSource};
use uptime_results::uptime::repository::InMemorySubscriptionRepository;
use uptime_results::uptime::types::{
    BindingMode, CheckResult, CheckStatus, ProjectSubscription, Subscription, SubscriptionStatus,
    UptimeStatus,
};
use uptime_results::uptime::{Collaborators, ResultDispatcher};

/// Draw that always triggers a rebalance.
pub const ALWAYS_SAMPLE: f64 = 0.0;
/// Draw that never triggers a rebalance.
pub const NEVER_SAMPLE: f64 = 1.0;

/// A dispatcher wired to in-memory adapters the test can inspect.
pub struct Pipeline {
    pub dispatcher: Arc<ResultDispatcher>,
    pub store: InMemoryStateStore,
    pub repo: InMemorySubscriptionRepository,
    pub issues: InMemoryIssueStore,
    pub producer: RecordingProducer,
    /// Backs the failed-url registry, separate from `store`.
    pub url_store: InMemoryStateStore,
    pub failed_urls: Arc<StoreFailedUrlRegistry>,
}

pub fn region(slug: &str, enabled: bool) -> RegionConfig {
    RegionConfig {
        slug: slug.into(),
        name: slug.to_uppercase(),
        config_topic: format!("uptime-configs-{slug}"),
        enabled,
    }
}

/// Two enabled regions, thresholds of two, analytics off.
pub fn test_config() -> PipelineConfig {
    let mut config = PipelineConfig::default();
    config.regions = vec![region("a", true), region("b", true)];
    config.thresholds.active_failure_threshold = 2;
    config.thresholds.onboarding_failure_threshold = 2;
    config.analytics.enabled = false;
    config
}

pub fn pipeline(config: PipelineConfig, draw: f64) -> Pipeline {
    let store = InMemoryStateStore::new();
    let repo = InMemorySubscriptionRepository::new();
    let issues = InMemoryIssueStore::new();
    let producer = RecordingProducer::new();
    let url_store = InMemoryStateStore::new();
    let failed_urls = Arc::new(StoreFailedUrlRegistry::new(
        Arc::new(url_store.clone()),
        config.thresholds.failed_url_ttl(),
    ));

    let deps = Collaborators {
        store: Arc::new(store.clone()),
        repository: Arc::new(repo.clone()),
        issues: Arc::new(issues.clone()),
        producer: Arc::new(producer.clone()),
        failed_urls: failed_urls.clone(),
        sampler: Arc::new(FixedDraw(draw)),
        regions: RegionSource::new(config.regions.clone()),
    };

    Pipeline {
        dispatcher: Arc::new(ResultDispatcher::new(deps, &config)),
        store,
        repo,
        issues,
        producer,
        url_store,
        failed_urls,
    }
}

pub fn subscription(id: &str, regions: &[&str], date_added: DateTime<Utc>) -> Subscription {
    Subscription {
        subscription_id: id.into(),
        url: format!("https://{id}.example.com"),
        interval_seconds: 60,
        timeout_ms: 10_000,
        region_slugs: regions.iter().map(|r| r.to_string()).collect::<BTreeSet<_>>(),
        status: SubscriptionStatus::Active,
        host_provider_id: None,
        date_added,
    }
}

pub fn binding(
    id: u64,
    subscription_id: &str,
    mode: BindingMode,
    date_added: DateTime<Utc>,
) -> ProjectSubscription {
    ProjectSubscription {
        id,
        project_id: 100 + id,
        organization_id: 1,
        subscription_id: subscription_id.into(),
        mode,
        uptime_status: UptimeStatus::Ok,
        owner: None,
        date_added,
    }
}

/// Register a subscription in regions `a` and `b` with one binding.
pub fn seed(p: &Pipeline, binding_id: u64, subscription_id: &str, mode: BindingMode) {
    let now = Utc::now();
    p.repo.insert_subscription(subscription(subscription_id, &["a", "b"], now));
    p.repo.insert_binding(binding(binding_id, subscription_id, mode, now));
}

pub fn check(subscription_id: &str, status: CheckStatus, scheduled_ms: i64) -> CheckResult {
    CheckResult {
        guid: format!("{subscription_id}-{scheduled_ms}"),
        subscription_id: subscription_id.into(),
        status,
        status_reason: None,
        trace_id: "0".repeat(32),
        span_id: "0".repeat(16),
        scheduled_check_time_ms: scheduled_ms,
        actual_check_time_ms: scheduled_ms + 5,
        duration_ms: Some(120),
        request_info: None,
        region: Some("a".into()),
    }
}

pub fn message(offset: u64, result: &CheckResult) -> StreamMessage {
    StreamMessage::new(0, offset, serde_json::to_vec(result).unwrap())
}
