//! Onboarding lifecycle state machine.
//!
//! # States
//! ```text
//! Onboarding ──(success, onboarding period elapsed)──▶ Active (graduated)
//! Onboarding ──(onboarding failure threshold)────────▶ torn down
//! ```
//!
//! # Design Decisions
//! - Graduation swaps the subscription row instead of mutating it, so probers
//!   see a new subscription at the production interval
//! - Teardown is idempotent: every delete tolerates a missing row
//! - Teardown blacklists the url before deleting rows, so a failed attempt
//!   still resolves the binding when the result is redelivered
//! - A subscription shared with other bindings outlives the transition

use std::sync::Arc;
use chrono::Utc;

use crate::config::ThresholdConfig;
use crate::observability::metrics;
use crate::uptime::blacklist::FailedUrlRegistry;
use crate::uptime::error::ProcessingResult;
use crate::uptime::producer::{send_config, ConfigMessage, Producer};
use crate::uptime::rebalance::RegionSource;
use crate::uptime::repository::SubscriptionRepository;
use crate::uptime::tracker::TrackerSignal;
use crate::uptime::types::{
    BindingMode, CheckResult, CheckStatus, ProjectSubscription, Subscription, SubscriptionId,
    SubscriptionStatus,
};

/// A lifecycle change applied to a binding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LifecycleTransition {
    Graduated {
        old_subscription_id: SubscriptionId,
        new_subscription_id: SubscriptionId,
    },
    TornDown {
        url: String,
    },
}

pub struct OnboardingLifecycle {
    repository: Arc<dyn SubscriptionRepository>,
    producer: Arc<dyn Producer>,
    regions: RegionSource,
    failed_urls: Arc<dyn FailedUrlRegistry>,
    thresholds: ThresholdConfig,
}

impl OnboardingLifecycle {
    pub fn new(
        repository: Arc<dyn SubscriptionRepository>,
        producer: Arc<dyn Producer>,
        regions: RegionSource,
        failed_urls: Arc<dyn FailedUrlRegistry>,
        thresholds: ThresholdConfig,
    ) -> Self {
        Self {
            repository,
            producer,
            regions,
            failed_urls,
            thresholds,
        }
    }

    /// Whether this result lets an onboarding binding graduate.
    pub fn should_graduate(
        &self,
        binding: &ProjectSubscription,
        result: &CheckResult,
        signal: TrackerSignal,
    ) -> bool {
        if !binding.mode.is_onboarding() || result.status != CheckStatus::Success || signal.is_failure() {
            return false;
        }
        let period = chrono::Duration::seconds(self.thresholds.onboarding_period_secs as i64);
        result.scheduled_check_time() - binding.date_added >= period
    }

    /// Move the binding to a new subscription at the production interval.
    pub async fn graduate(
        &self,
        binding: &ProjectSubscription,
        subscription: &Subscription,
        result: &CheckResult,
    ) -> ProcessingResult<LifecycleTransition> {
        let graduated = Subscription {
            subscription_id: SubscriptionId::generate(),
            interval_seconds: self.thresholds.active_interval_secs,
            status: SubscriptionStatus::Active,
            date_added: Utc::now(),
            ..subscription.clone()
        };

        self.repository.create_subscription(graduated.clone()).await?;
        self.repository
            .rebind(binding.id, &graduated.subscription_id, BindingMode::AutoDetectedActive)
            .await?;
        let retired = self.release_subscription(subscription).await?;

        let upsert = ConfigMessage::upsert(&graduated);
        let delete = ConfigMessage::delete(&subscription.subscription_id);
        for topic in self.region_topics(subscription) {
            send_config(self.producer.as_ref(), &topic, &upsert).await;
            if retired {
                send_config(self.producer.as_ref(), &topic, &delete).await;
            }
        }

        metrics::record_graduated_onboarding(result.region_tag());
        tracing::info!(
            binding_id = binding.id,
            project_id = binding.project_id,
            url = %subscription.url,
            old_subscription_id = %subscription.subscription_id,
            new_subscription_id = %graduated.subscription_id,
            "Uptime monitor graduated from onboarding"
        );

        Ok(LifecycleTransition::Graduated {
            old_subscription_id: subscription.subscription_id.clone(),
            new_subscription_id: graduated.subscription_id,
        })
    }

    /// Remove a monitor that failed onboarding and blacklist its url.
    pub async fn tear_down(
        &self,
        binding: &ProjectSubscription,
        subscription: &Subscription,
        result: &CheckResult,
    ) -> ProcessingResult<LifecycleTransition> {
        self.failed_urls.mark_failed(&subscription.url).await?;
        self.repository.delete_binding(binding.id).await?;

        if self.release_subscription(subscription).await? {
            let delete = ConfigMessage::delete(&subscription.subscription_id);
            for topic in self.region_topics(subscription) {
                send_config(self.producer.as_ref(), &topic, &delete).await;
            }
        }

        let failure_reason = result
            .status_reason
            .as_ref()
            .map(|r| r.reason_type.as_str())
            .unwrap_or("unknown");
        metrics::record_failed_onboarding(failure_reason, result.region_tag());
        tracing::info!(
            binding_id = binding.id,
            project_id = binding.project_id,
            url = %subscription.url,
            failure_reason,
            "Uptime monitor failed onboarding"
        );

        Ok(LifecycleTransition::TornDown {
            url: subscription.url.clone(),
        })
    }

    /// Delete the subscription once no binding references it.
    async fn release_subscription(&self, subscription: &Subscription) -> ProcessingResult<bool> {
        let remaining = self
            .repository
            .count_bindings_for_subscription(&subscription.subscription_id)
            .await?;
        if remaining > 0 {
            return Ok(false);
        }
        self.repository.delete_subscription(&subscription.subscription_id).await?;
        Ok(true)
    }

    fn region_topics(&self, subscription: &Subscription) -> Vec<String> {
        let regions = self.regions.load();
        let mut topics: Vec<String> = regions
            .iter()
            .filter(|r| subscription.region_slugs.contains(&r.slug))
            .map(|r| r.config_topic.clone())
            .collect();
        topics.sort();
        topics.dedup();
        topics
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;
    use chrono::Duration;
    use crate::config::RegionConfig;
    use crate::store::InMemoryStateStore;
    use crate::uptime::blacklist::StoreFailedUrlRegistry;
    use crate::uptime::producer::{ConfigAction, RecordingProducer};
    use crate::uptime::repository::InMemorySubscriptionRepository;
    use crate::uptime::types::UptimeStatus;

    struct Fixture {
        lifecycle: OnboardingLifecycle,
        repo: InMemorySubscriptionRepository,
        producer: RecordingProducer,
        url_store: Arc<InMemoryStateStore>,
        failed_urls: Arc<StoreFailedUrlRegistry>,
        binding: ProjectSubscription,
        subscription: Subscription,
    }

    fn fixture(onboarded_for: Duration) -> Fixture {
        let repo = InMemorySubscriptionRepository::new();
        let producer = RecordingProducer::new();
        let url_store = Arc::new(InMemoryStateStore::new());
        let failed_urls = Arc::new(StoreFailedUrlRegistry::new(
            url_store.clone(),
            std::time::Duration::from_secs(60),
        ));
        let regions = RegionSource::new(vec![RegionConfig {
            slug: "us".into(),
            name: "US".into(),
            config_topic: "configs-us".into(),
            enabled: true,
        }]);

        let subscription = Subscription {
            subscription_id: "onboarding-sub".into(),
            url: "https://new.site".into(),
            interval_seconds: 60,
            timeout_ms: 1000,
            region_slugs: BTreeSet::from(["us".to_string()]),
            status: SubscriptionStatus::Active,
            host_provider_id: None,
            date_added: Utc::now() - onboarded_for,
        };
        let binding = ProjectSubscription {
            id: 5,
            project_id: 1,
            organization_id: 1,
            subscription_id: subscription.subscription_id.clone(),
            mode: BindingMode::AutoDetectedOnboarding,
            uptime_status: UptimeStatus::Ok,
            owner: None,
            date_added: Utc::now() - onboarded_for,
        };
        repo.insert_subscription(subscription.clone());
        repo.insert_binding(binding.clone());

        let lifecycle = OnboardingLifecycle::new(
            Arc::new(repo.clone()),
            Arc::new(producer.clone()),
            regions,
            failed_urls.clone(),
            ThresholdConfig::default(),
        );
        Fixture { lifecycle, repo, producer, url_store, failed_urls, binding, subscription }
    }

    fn success_now() -> CheckResult {
        CheckResult {
            guid: "g".into(),
            subscription_id: "onboarding-sub".into(),
            status: CheckStatus::Success,
            status_reason: None,
            trace_id: String::new(),
            span_id: String::new(),
            scheduled_check_time_ms: Utc::now().timestamp_millis(),
            actual_check_time_ms: Utc::now().timestamp_millis(),
            duration_ms: Some(10),
            request_info: None,
            region: Some("us".into()),
        }
    }

    #[test]
    fn test_graduation_needs_elapsed_period() {
        let young = fixture(Duration::hours(1));
        assert!(!young.lifecycle.should_graduate(&young.binding, &success_now(), TrackerSignal::None));

        let old = fixture(Duration::days(4));
        assert!(old.lifecycle.should_graduate(&old.binding, &success_now(), TrackerSignal::None));
        assert!(!old.lifecycle.should_graduate(&old.binding, &success_now(), TrackerSignal::Escalate));
    }

    #[tokio::test]
    async fn test_graduate_swaps_subscription() {
        let f = fixture(Duration::days(4));
        let transition = f.lifecycle.graduate(&f.binding, &f.subscription, &success_now()).await.unwrap();

        let LifecycleTransition::Graduated { new_subscription_id, old_subscription_id } = transition else {
            panic!("expected graduation");
        };
        assert!(f.repo.subscription(&old_subscription_id).is_none());
        let new_sub = f.repo.subscription(&new_subscription_id).unwrap();
        assert_eq!(new_sub.interval_seconds, 300);
        assert_eq!(new_sub.url, f.subscription.url);

        let binding = f.repo.binding(f.binding.id).unwrap();
        assert_eq!(binding.mode, BindingMode::AutoDetectedActive);
        assert_eq!(binding.subscription_id, new_subscription_id);

        let actions: Vec<ConfigAction> = f
            .producer
            .messages_for("configs-us")
            .iter()
            .map(|m| m.json::<ConfigMessage>().unwrap().action)
            .collect();
        assert_eq!(actions, vec![ConfigAction::Upsert, ConfigAction::Delete]);
    }

    #[tokio::test]
    async fn test_tear_down_is_idempotent() {
        let f = fixture(Duration::hours(1));
        let mut failure = success_now();
        failure.status = CheckStatus::Failure;

        f.lifecycle.tear_down(&f.binding, &f.subscription, &failure).await.unwrap();
        assert!(f.repo.binding(f.binding.id).is_none());
        assert!(f.repo.subscription(&f.subscription.subscription_id).is_none());
        assert!(f.failed_urls.is_failed("https://new.site").await.unwrap());

        // Second teardown of the same target still succeeds
        f.lifecycle.tear_down(&f.binding, &f.subscription, &failure).await.unwrap();
    }

    #[tokio::test]
    async fn test_tear_down_keeps_rows_when_blacklist_fails() {
        let f = fixture(Duration::hours(1));
        let mut failure = success_now();
        failure.status = CheckStatus::Failure;
        f.url_store.set_unavailable(true);

        assert!(f.lifecycle.tear_down(&f.binding, &f.subscription, &failure).await.is_err());
        assert!(f.repo.binding(f.binding.id).is_some());
        assert!(f.repo.subscription(&f.subscription.subscription_id).is_some());
        assert!(f.producer.messages().is_empty());

        f.url_store.set_unavailable(false);
        f.lifecycle.tear_down(&f.binding, &f.subscription, &failure).await.unwrap();
        assert!(f.repo.binding(f.binding.id).is_none());
        assert!(f.failed_urls.is_failed("https://new.site").await.unwrap());
    }

    #[tokio::test]
    async fn test_shared_subscription_survives_graduation() {
        let f = fixture(Duration::days(4));
        let other = ProjectSubscription {
            id: 6,
            project_id: 2,
            ..f.binding.clone()
        };
        f.repo.insert_binding(other);

        f.lifecycle.graduate(&f.binding, &f.subscription, &success_now()).await.unwrap();
        assert!(f.repo.subscription(&f.subscription.subscription_id).is_some());

        let actions: Vec<ConfigAction> = f
            .producer
            .messages_for("configs-us")
            .iter()
            .map(|m| m.json::<ConfigMessage>().unwrap().action)
            .collect();
        assert_eq!(actions, vec![ConfigAction::Upsert]);
    }
}
