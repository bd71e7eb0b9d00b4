//! Per-result dispatcher.
//!
//! # Responsibilities
//! - Resolve the subscription and every binding a result belongs to
//! - Drop results older than a binding's last processed check
//! - Drive the tracker, issue calls, lifecycle transitions and rebalancing
//! - Emit one analytics record per binding the result reached
//!
//! # Design Decisions
//! - The last-update marker is written only after the mutating steps
//!   succeed; a store failure leaves the result eligible for redelivery
//! - `uptime_status` changes only after the issue call it depends on succeeds
//! - Issue creation is a per-call capability, not a global switch
//! - Produce and rebalance failures never fail a result

use std::sync::Arc;
use async_trait::async_trait;

use crate::config::schema::IssueConfig;
use crate::config::PipelineConfig;
use crate::consumer::ResultHandler;
use crate::observability::metrics::{self, ResultTags};
use crate::store::{last_update_key, StateStore};
use crate::uptime::analytics::AnalyticsEmitter;
use crate::uptime::blacklist::FailedUrlRegistry;
use crate::uptime::error::ProcessingResult;
use crate::uptime::issues::{fingerprint_for_binding, IssueStore, IssueType};
use crate::uptime::onboarding::{LifecycleTransition, OnboardingLifecycle};
use crate::uptime::producer::{send_config, ConfigMessage, Producer};
use crate::uptime::rebalance::{ProbabilitySource, RebalanceReport, RegionRebalancer, RegionSource};
use crate::uptime::repository::SubscriptionRepository;
use crate::uptime::tracker::{FailureTracker, TrackerSignal};
use crate::uptime::types::{CheckResult, CheckStatus, ProjectSubscription, Subscription, UptimeStatus};

/// What happened to a single result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessOutcome {
    /// No subscription or binding matched; probers were told to stop.
    SubscriptionNotFound,
    Handled(HandledResult),
}

impl ProcessOutcome {
    /// Outcome for one binding, if the result reached it.
    pub fn binding(&self, binding_id: u64) -> Option<&BindingOutcome> {
        match self {
            ProcessOutcome::Handled(handled) => handled
                .bindings
                .iter()
                .find(|b| b.binding_id == binding_id)
                .map(|b| &b.outcome),
            ProcessOutcome::SubscriptionNotFound => None,
        }
    }

    /// Shorthand for a binding that went through the tracker.
    pub fn processed(&self, binding_id: u64) -> Option<&ProcessedResult> {
        match self.binding(binding_id)? {
            BindingOutcome::Processed(processed) => Some(processed),
            BindingOutcome::SkippedStale => None,
        }
    }

    pub fn rebalance(&self) -> Option<&RebalanceReport> {
        match self {
            ProcessOutcome::Handled(handled) => handled.rebalance.as_ref(),
            ProcessOutcome::SubscriptionNotFound => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandledResult {
    /// One entry per binding, in binding id order.
    pub bindings: Vec<BindingResult>,
    pub rebalance: Option<RebalanceReport>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindingResult {
    pub binding_id: u64,
    pub outcome: BindingOutcome,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BindingOutcome {
    /// The binding already processed a check at or after this one.
    SkippedStale,
    Processed(ProcessedResult),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessedResult {
    pub signal: TrackerSignal,
    /// The subscription's host provider suppresses issue calls.
    pub restricted: bool,
    pub uptime_status: UptimeStatus,
    pub transition: Option<LifecycleTransition>,
}

/// External systems the dispatcher talks to.
#[derive(Clone)]
pub struct Collaborators {
    pub store: Arc<dyn StateStore>,
    pub repository: Arc<dyn SubscriptionRepository>,
    pub issues: Arc<dyn IssueStore>,
    pub producer: Arc<dyn Producer>,
    pub failed_urls: Arc<dyn FailedUrlRegistry>,
    pub sampler: Arc<dyn ProbabilitySource>,
    pub regions: RegionSource,
}

pub struct ResultDispatcher {
    store: Arc<dyn StateStore>,
    repository: Arc<dyn SubscriptionRepository>,
    issues: Arc<dyn IssueStore>,
    producer: Arc<dyn Producer>,
    regions: RegionSource,
    tracker: FailureTracker,
    lifecycle: OnboardingLifecycle,
    rebalancer: RegionRebalancer,
    analytics: AnalyticsEmitter,
    issue_config: IssueConfig,
    last_update_ttl: std::time::Duration,
}

impl ResultDispatcher {
    pub fn new(deps: Collaborators, config: &PipelineConfig) -> Self {
        let thresholds = config.thresholds.clone();
        Self {
            tracker: FailureTracker::new(deps.store.clone(), thresholds.clone()),
            lifecycle: OnboardingLifecycle::new(
                deps.repository.clone(),
                deps.producer.clone(),
                deps.regions.clone(),
                deps.failed_urls,
                thresholds.clone(),
            ),
            rebalancer: RegionRebalancer::new(
                deps.regions.clone(),
                deps.repository.clone(),
                deps.producer.clone(),
                deps.sampler,
                config.rebalance.sample_rate,
            ),
            analytics: AnalyticsEmitter::new(deps.producer.clone(), config.analytics.clone()),
            store: deps.store,
            repository: deps.repository,
            issues: deps.issues,
            producer: deps.producer,
            regions: deps.regions,
            issue_config: config.issues.clone(),
            last_update_ttl: thresholds.last_update_ttl(),
        }
    }

    /// Process a result with the configured issue-creation capability.
    pub async fn handle(&self, result: &CheckResult) -> ProcessingResult<ProcessOutcome> {
        self.handle_with(result, self.issue_config.create_issues).await
    }

    /// Process a result; `create_issues` decides whether escalation and
    /// recovery reach the issue store.
    pub async fn handle_with(
        &self,
        result: &CheckResult,
        create_issues: bool,
    ) -> ProcessingResult<ProcessOutcome> {
        let Some(subscription) = self.repository.get_subscription(&result.subscription_id).await? else {
            self.handle_not_found(result).await;
            return Ok(ProcessOutcome::SubscriptionNotFound);
        };
        let bindings = self
            .repository
            .get_bindings_for_subscription(&result.subscription_id)
            .await?;
        if bindings.is_empty() {
            self.handle_not_found(result).await;
            return Ok(ProcessOutcome::SubscriptionNotFound);
        }

        let restricted = self.is_restricted(&subscription, result);
        let issue_calls = create_issues && !restricted;

        let mut handled = Vec::with_capacity(bindings.len());
        for binding in &bindings {
            let outcome = self
                .handle_for_binding(binding, &subscription, result, restricted, issue_calls)
                .await?;
            handled.push(BindingResult {
                binding_id: binding.id,
                outcome,
            });
        }

        let processed_any = handled
            .iter()
            .any(|b| matches!(b.outcome, BindingOutcome::Processed(_)));
        // The subscription row is gone or replaced after a transition
        let transitioned = handled.iter().any(|b| {
            matches!(&b.outcome, BindingOutcome::Processed(p) if p.transition.is_some())
        });
        let rebalance = if processed_any && !transitioned {
            self.rebalance(&subscription).await
        } else {
            None
        };

        Ok(ProcessOutcome::Handled(HandledResult {
            bindings: handled,
            rebalance,
        }))
    }

    async fn handle_for_binding(
        &self,
        binding: &ProjectSubscription,
        subscription: &Subscription,
        result: &CheckResult,
        restricted: bool,
        issue_calls: bool,
    ) -> ProcessingResult<BindingOutcome> {
        let tags = ResultTags {
            status: result.status.as_str(),
            status_reason: result.status_reason_tag().to_string(),
            mode: binding.mode.as_str(),
            uptime_region: result.region_tag().to_string(),
        };
        metrics::record_result_handled(&tags);

        let marker_key = last_update_key(binding.id);
        if let Some(last) = self.store.get_i64(&marker_key).await? {
            if result.scheduled_check_time_ms <= last {
                metrics::record_skipped_stale(&tags);
                tracing::debug!(
                    binding_id = binding.id,
                    guid = %result.guid,
                    scheduled_check_time_ms = result.scheduled_check_time_ms,
                    last_update_ms = last,
                    "Skipping already processed update"
                );
                self.analytics.emit(binding, result, binding.uptime_status).await;
                return Ok(BindingOutcome::SkippedStale);
            }
        }

        if result.status == CheckStatus::MissedWindow {
            tracing::debug!(
                binding_id = binding.id,
                guid = %result.guid,
                "Missed check window, streaks untouched"
            );
        }

        let signal = self.tracker.observe(binding, result).await?;
        let mut uptime_status = binding.uptime_status;
        let mut transition = None;

        match signal {
            TrackerSignal::Escalate => {
                if issue_calls {
                    let issue = self
                        .issues
                        .create_or_get_issue(
                            &fingerprint_for_binding(binding.id),
                            IssueType::UptimeDomainFailure,
                            binding.owner,
                        )
                        .await?;
                    metrics::record_issue_created(&tags);
                    tracing::info!(
                        binding_id = binding.id,
                        project_id = binding.project_id,
                        issue_id = issue.id,
                        url = %subscription.url,
                        "Uptime monitor escalated"
                    );
                }
                self.repository
                    .update_uptime_status(binding.id, UptimeStatus::Failed)
                    .await?;
                uptime_status = UptimeStatus::Failed;
            }
            TrackerSignal::Resolve => {
                if issue_calls {
                    let resolved = self
                        .issues
                        .resolve_issue(&fingerprint_for_binding(binding.id))
                        .await?;
                    metrics::record_issue_resolved(&tags);
                    tracing::info!(
                        binding_id = binding.id,
                        project_id = binding.project_id,
                        had_issue = resolved,
                        url = %subscription.url,
                        "Uptime monitor recovered"
                    );
                }
                self.repository
                    .update_uptime_status(binding.id, UptimeStatus::Ok)
                    .await?;
                uptime_status = UptimeStatus::Ok;
            }
            TrackerSignal::UnderThreshold => {
                metrics::record_under_threshold(tags.status);
            }
            TrackerSignal::FailedOnboarding => {
                transition = Some(self.lifecycle.tear_down(binding, subscription, result).await?);
                self.tracker.reset(binding.id).await?;
            }
            TrackerSignal::None => {
                if self.lifecycle.should_graduate(binding, result, signal) {
                    transition = Some(self.lifecycle.graduate(binding, subscription, result).await?);
                }
            }
        }

        self.store
            .set_i64(&marker_key, result.scheduled_check_time_ms, Some(self.last_update_ttl))
            .await?;

        self.analytics.emit(binding, result, uptime_status).await;

        Ok(BindingOutcome::Processed(ProcessedResult {
            signal,
            restricted,
            uptime_status,
            transition,
        }))
    }

    /// Sampled region reconciliation. A failure leaves the regions to the next sample.
    async fn rebalance(&self, subscription: &Subscription) -> Option<RebalanceReport> {
        match self.rebalancer.maybe_rebalance(subscription).await {
            Ok(report) => report,
            Err(e) => {
                metrics::record_rebalance_failure();
                tracing::warn!(
                    subscription_id = %subscription.subscription_id,
                    error = %e,
                    "Failed to rebalance subscription regions"
                );
                None
            }
        }
    }

    async fn handle_not_found(&self, result: &CheckResult) {
        metrics::record_subscription_not_found(result.region_tag());
        tracing::info!(
            subscription_id = %result.subscription_id,
            guid = %result.guid,
            "Subscription not found, requesting config removal"
        );
        let delete = ConfigMessage::delete(&result.subscription_id);
        for topic in self.regions.enabled_topics() {
            send_config(self.producer.as_ref(), &topic, &delete).await;
        }
    }

    fn is_restricted(&self, subscription: &Subscription, result: &CheckResult) -> bool {
        let Some(provider) = subscription.host_provider_id.as_deref() else {
            return false;
        };
        let restricted = self
            .issue_config
            .restricted_host_provider_ids
            .iter()
            .any(|id| id == provider);
        if restricted {
            metrics::record_restricted_by_provider(provider, result.region_tag());
        }
        restricted
    }
}

#[async_trait]
impl ResultHandler for ResultDispatcher {
    async fn handle_result(&self, result: CheckResult) -> ProcessingResult<ProcessOutcome> {
        self.handle(&result).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;
    use chrono::Utc;
    use crate::config::RegionConfig;
    use crate::store::InMemoryStateStore;
    use crate::uptime::blacklist::StoreFailedUrlRegistry;
    use crate::uptime::error::ProcessingError;
    use crate::uptime::issues::{InMemoryIssueStore, IssueStatus};
    use crate::uptime::producer::{ConfigAction, RecordingProducer};
    use crate::uptime::rebalance::FixedDraw;
    use crate::uptime::repository::InMemorySubscriptionRepository;
    use crate::uptime::types::{BindingMode, ProjectSubscription, SubscriptionStatus};

    struct Harness {
        dispatcher: ResultDispatcher,
        store: InMemoryStateStore,
        repo: InMemorySubscriptionRepository,
        issues: InMemoryIssueStore,
        producer: RecordingProducer,
    }

    fn harness(config: PipelineConfig) -> Harness {
        let store = InMemoryStateStore::new();
        let repo = InMemorySubscriptionRepository::new();
        let issues = InMemoryIssueStore::new();
        let producer = RecordingProducer::new();
        let regions = RegionSource::new(vec![RegionConfig {
            slug: "us".into(),
            name: "US".into(),
            config_topic: "configs-us".into(),
            enabled: true,
        }]);
        let deps = Collaborators {
            store: Arc::new(store.clone()),
            repository: Arc::new(repo.clone()),
            issues: Arc::new(issues.clone()),
            producer: Arc::new(producer.clone()),
            failed_urls: Arc::new(StoreFailedUrlRegistry::new(
                Arc::new(store.clone()),
                config.thresholds.failed_url_ttl(),
            )),
            sampler: Arc::new(FixedDraw(1.0)),
            regions,
        };
        Harness {
            dispatcher: ResultDispatcher::new(deps, &config),
            store,
            repo,
            issues,
            producer,
        }
    }

    fn config() -> PipelineConfig {
        let mut config = PipelineConfig::default();
        config.thresholds.active_failure_threshold = 1;
        config.analytics.enabled = false;
        config.issues.restricted_host_provider_ids = vec!["blocked-host".into()];
        config
    }

    fn seed(repo: &InMemorySubscriptionRepository, host_provider_id: Option<&str>) -> u64 {
        repo.insert_subscription(Subscription {
            subscription_id: "sub".into(),
            url: "https://shop.example".into(),
            interval_seconds: 60,
            timeout_ms: 1000,
            region_slugs: BTreeSet::from(["us".to_string()]),
            status: SubscriptionStatus::Active,
            host_provider_id: host_provider_id.map(String::from),
            date_added: Utc::now(),
        });
        repo.insert_binding(ProjectSubscription {
            id: 9,
            project_id: 1,
            organization_id: 1,
            subscription_id: "sub".into(),
            mode: BindingMode::Manual,
            uptime_status: UptimeStatus::Ok,
            owner: None,
            date_added: Utc::now(),
        });
        9
    }

    fn result(status: CheckStatus, scheduled: i64) -> CheckResult {
        CheckResult {
            guid: format!("guid-{scheduled}"),
            subscription_id: "sub".into(),
            status,
            status_reason: None,
            trace_id: String::new(),
            span_id: String::new(),
            scheduled_check_time_ms: scheduled,
            actual_check_time_ms: scheduled,
            duration_ms: None,
            request_info: None,
            region: Some("us".into()),
        }
    }

    #[tokio::test]
    async fn test_unknown_subscription_requests_removal() {
        let h = harness(config());

        let outcome = h.dispatcher.handle(&result(CheckStatus::Success, 1)).await.unwrap();
        assert_eq!(outcome, ProcessOutcome::SubscriptionNotFound);

        let sent = h.producer.messages_for("configs-us");
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].json::<ConfigMessage>().unwrap().action, ConfigAction::Delete);
    }

    #[tokio::test]
    async fn test_restricted_provider_suppresses_issues() {
        let h = harness(config());
        let binding_id = seed(&h.repo, Some("blocked-host"));

        let outcome = h.dispatcher.handle(&result(CheckStatus::Failure, 1)).await.unwrap();
        let processed = outcome.processed(binding_id).unwrap();
        assert!(processed.restricted);
        assert_eq!(processed.signal, TrackerSignal::Escalate);
        assert_eq!(h.issues.count(), 0);
        // Status still tracks the escalation
        assert_eq!(h.repo.binding(binding_id).unwrap().uptime_status, UptimeStatus::Failed);
    }

    #[tokio::test]
    async fn test_issue_capability_is_per_call() {
        let h = harness(config());
        let binding_id = seed(&h.repo, None);

        h.dispatcher.handle_with(&result(CheckStatus::Failure, 1), false).await.unwrap();
        assert_eq!(h.issues.count(), 0);
        assert_eq!(h.repo.binding(binding_id).unwrap().uptime_status, UptimeStatus::Failed);

        h.dispatcher.handle_with(&result(CheckStatus::Success, 2), true).await.unwrap();
        h.dispatcher.handle_with(&result(CheckStatus::Failure, 3), true).await.unwrap();
        let issue = h.issues.get(&fingerprint_for_binding(binding_id)).unwrap();
        assert_eq!(issue.status, IssueStatus::Unresolved);
    }

    #[tokio::test]
    async fn test_store_outage_leaves_result_retryable() {
        let h = harness(config());
        let binding_id = seed(&h.repo, None);
        h.store.set_unavailable(true);

        let err = h.dispatcher.handle(&result(CheckStatus::Failure, 5)).await.unwrap_err();
        assert!(matches!(err, ProcessingError::Store(_)));

        h.store.set_unavailable(false);
        assert!(h.store.get_i64(&last_update_key(binding_id)).await.unwrap().is_none());
        let retried = h.dispatcher.handle(&result(CheckStatus::Failure, 5)).await.unwrap();
        assert!(retried.processed(binding_id).is_some());
        assert_eq!(h.store.get_i64(&last_update_key(binding_id)).await.unwrap(), Some(5));
    }

    #[tokio::test]
    async fn test_missed_window_advances_marker_only() {
        let h = harness(config());
        let binding_id = seed(&h.repo, None);

        let outcome = h.dispatcher.handle(&result(CheckStatus::MissedWindow, 7)).await.unwrap();
        let processed = outcome.processed(binding_id).unwrap();
        assert_eq!(processed.signal, TrackerSignal::None);
        assert_eq!(processed.uptime_status, UptimeStatus::Ok);
        assert_eq!(h.store.get_i64(&last_update_key(binding_id)).await.unwrap(), Some(7));
    }

    #[tokio::test]
    async fn test_analytics_emitted_for_stale_results() {
        let mut cfg = config();
        cfg.analytics.enabled = true;
        let h = harness(cfg);
        let binding_id = seed(&h.repo, None);

        h.dispatcher.handle(&result(CheckStatus::Success, 10)).await.unwrap();
        let stale = h.dispatcher.handle(&result(CheckStatus::Success, 10)).await.unwrap();
        assert_eq!(stale.binding(binding_id), Some(&BindingOutcome::SkippedStale));
        assert_eq!(h.producer.messages_for("snuba-uptime-results").len(), 2);
    }

    #[tokio::test]
    async fn test_escalation_retried_after_issue_failure() {
        let h = harness(config());
        let binding_id = seed(&h.repo, None);
        h.issues.set_failing(true);

        let err = h.dispatcher.handle(&result(CheckStatus::Failure, 1)).await.unwrap_err();
        assert!(matches!(err, ProcessingError::Issue(_)));
        assert_eq!(h.repo.binding(binding_id).unwrap().uptime_status, UptimeStatus::Ok);

        h.issues.set_failing(false);
        let retried = h.dispatcher.handle(&result(CheckStatus::Failure, 1)).await.unwrap();
        assert_eq!(retried.processed(binding_id).unwrap().signal, TrackerSignal::Escalate);
        assert_eq!(h.issues.count(), 1);
        assert_eq!(h.repo.binding(binding_id).unwrap().uptime_status, UptimeStatus::Failed);
    }
}
