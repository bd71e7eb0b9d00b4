//! Failure/success tracking per binding.
//!
//! # State Transitions
//! ```text
//! Active/Manual (uptime_status Ok):
//!     failure → streak += 1 → UnderThreshold | Escalate (streak >= active_failure_threshold)
//!     success → streak cleared
//! Active/Manual (uptime_status Failed):
//!     success → recovery += 1 → Resolve (recovery >= active_recovery_threshold)
//!     failure → recovery cleared, no new escalation
//! Onboarding:
//!     failure → TTL counter += 1 → FailedOnboarding (counter >= onboarding_failure_threshold)
//!     success → counter cleared
//!     teardown done → counter cleared by `reset`
//! Missed window: counters untouched
//! ```
//!
//! # Design Decisions
//! - Counters live in the shared state store, not in process memory, since
//!   several dispatcher instances may serve different partitions
//! - Reaching a threshold compares with `>=` so a redelivered result escalates again
//! - `uptime_status` is written by the dispatcher only after the issue call
//!   succeeds, so a failed escalation or recovery is retried on redelivery

use std::sync::Arc;

use crate::config::ThresholdConfig;
use crate::store::{
    active_failure_key, active_success_key, onboarding_failure_key, StateStore, StoreResult,
};
use crate::uptime::types::{CheckResult, CheckStatus, ProjectSubscription, UptimeStatus};

/// What a result means for the binding's alerting state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackerSignal {
    /// Nothing to act on.
    None,
    /// A failure was counted but the escalation threshold was not reached.
    UnderThreshold,
    /// The failure threshold was reached: raise an issue.
    Escalate,
    /// An escalated binding recovered: resolve its issue.
    Resolve,
    /// Too many failures while onboarding: tear the monitor down.
    FailedOnboarding,
}

impl TrackerSignal {
    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            TrackerSignal::UnderThreshold | TrackerSignal::Escalate | TrackerSignal::FailedOnboarding
        )
    }
}

pub struct FailureTracker {
    store: Arc<dyn StateStore>,
    thresholds: ThresholdConfig,
}

impl FailureTracker {
    pub fn new(store: Arc<dyn StateStore>, thresholds: ThresholdConfig) -> Self {
        Self { store, thresholds }
    }

    /// Count `result` against the binding and report the resulting signal.
    pub async fn observe(
        &self,
        binding: &ProjectSubscription,
        result: &CheckResult,
    ) -> StoreResult<TrackerSignal> {
        match result.status {
            CheckStatus::MissedWindow => Ok(TrackerSignal::None),
            status if binding.mode.is_onboarding() => self.observe_onboarding(binding.id, status).await,
            status => self.observe_active(binding.id, binding.uptime_status, status).await,
        }
    }

    async fn observe_active(
        &self,
        binding_id: u64,
        uptime_status: UptimeStatus,
        status: CheckStatus,
    ) -> StoreResult<TrackerSignal> {
        let failure_key = active_failure_key(binding_id);
        let success_key = active_success_key(binding_id);
        let ttl = Some(self.thresholds.streak_ttl());

        match (uptime_status, status) {
            (UptimeStatus::Ok, CheckStatus::Failure) => {
                let streak = self.store.get_i64(&failure_key).await?.unwrap_or(0) + 1;
                self.store.set_i64(&failure_key, streak, ttl).await?;
                if streak >= self.thresholds.active_failure_threshold as i64 {
                    Ok(TrackerSignal::Escalate)
                } else {
                    Ok(TrackerSignal::UnderThreshold)
                }
            }
            (UptimeStatus::Ok, _) => {
                self.store.delete(&failure_key).await?;
                Ok(TrackerSignal::None)
            }
            (UptimeStatus::Failed, CheckStatus::Success) => {
                self.store.delete(&failure_key).await?;
                let recovered = self.store.get_i64(&success_key).await?.unwrap_or(0) + 1;
                if recovered >= self.thresholds.active_recovery_threshold as i64 {
                    self.store.delete(&success_key).await?;
                    Ok(TrackerSignal::Resolve)
                } else {
                    self.store.set_i64(&success_key, recovered, ttl).await?;
                    Ok(TrackerSignal::None)
                }
            }
            (UptimeStatus::Failed, _) => {
                self.store.delete(&success_key).await?;
                Ok(TrackerSignal::None)
            }
        }
    }

    async fn observe_onboarding(&self, binding_id: u64, status: CheckStatus) -> StoreResult<TrackerSignal> {
        let key = onboarding_failure_key(binding_id);

        if status != CheckStatus::Failure {
            self.store.delete(&key).await?;
            return Ok(TrackerSignal::None);
        }

        let failures = self.store.get_i64(&key).await?.unwrap_or(0) + 1;
        self.store
            .set_i64(&key, failures, Some(self.thresholds.onboarding_period()))
            .await?;
        if failures >= self.thresholds.onboarding_failure_threshold as i64 {
            Ok(TrackerSignal::FailedOnboarding)
        } else {
            Ok(TrackerSignal::None)
        }
    }

    /// Drop every counter held for a binding that no longer exists.
    pub async fn reset(&self, binding_id: u64) -> StoreResult<()> {
        self.store.delete(&onboarding_failure_key(binding_id)).await?;
        self.store.delete(&active_failure_key(binding_id)).await?;
        self.store.delete(&active_success_key(binding_id)).await
    }
}
