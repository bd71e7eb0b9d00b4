//! Per-result analytics records.

use std::sync::Arc;
use serde::{Deserialize, Serialize};

use crate::config::schema::AnalyticsConfig;
use crate::observability::metrics;
use crate::uptime::producer::Producer;
use crate::uptime::types::{CheckResult, ProjectSubscription, SubscriptionId, UptimeStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IncidentStatus {
    NoIncident,
    InIncident,
}

impl From<UptimeStatus> for IncidentStatus {
    fn from(status: UptimeStatus) -> Self {
        match status {
            UptimeStatus::Ok => IncidentStatus::NoIncident,
            UptimeStatus::Failed => IncidentStatus::InIncident,
        }
    }
}

/// One row in the analytics sink, per result that resolved a binding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalyticsRecord {
    pub organization_id: u64,
    pub project_id: u64,
    pub retention_days: u16,
    pub guid: String,
    pub subscription_id: SubscriptionId,
    pub check_status: String,
    pub check_status_reason: Option<String>,
    pub incident_status: IncidentStatus,
    pub region: Option<String>,
    pub scheduled_check_time_ms: i64,
    pub actual_check_time_ms: i64,
    pub duration_ms: Option<i64>,
    pub http_status_code: Option<u16>,
    pub trace_id: String,
    pub span_id: String,
}

impl AnalyticsRecord {
    pub fn new(
        binding: &ProjectSubscription,
        result: &CheckResult,
        uptime_status: UptimeStatus,
        retention_days: u16,
    ) -> Self {
        Self {
            organization_id: binding.organization_id,
            project_id: binding.project_id,
            retention_days,
            guid: result.guid.clone(),
            subscription_id: result.subscription_id.clone(),
            check_status: result.status.as_str().to_string(),
            check_status_reason: result
                .status_reason
                .as_ref()
                .map(|r| r.reason_type.as_str().to_string()),
            incident_status: uptime_status.into(),
            region: result.region.clone(),
            scheduled_check_time_ms: result.scheduled_check_time_ms,
            actual_check_time_ms: result.actual_check_time_ms,
            duration_ms: result.duration_ms,
            http_status_code: result.request_info.as_ref().and_then(|r| r.http_status_code),
            trace_id: result.trace_id.clone(),
            span_id: result.span_id.clone(),
        }
    }
}

pub struct AnalyticsEmitter {
    producer: Arc<dyn Producer>,
    config: AnalyticsConfig,
}

impl AnalyticsEmitter {
    pub fn new(producer: Arc<dyn Producer>, config: AnalyticsConfig) -> Self {
        Self { producer, config }
    }

    /// Send a record for `result`. Failures are logged and counted.
    pub async fn emit(&self, binding: &ProjectSubscription, result: &CheckResult, uptime_status: UptimeStatus) {
        if !self.config.enabled {
            return;
        }

        let record = AnalyticsRecord::new(binding, result, uptime_status, self.config.retention_days);
        let payload = match serde_json::to_vec(&record) {
            Ok(payload) => payload,
            Err(e) => {
                tracing::warn!(guid = %result.guid, error = %e, "Failed to encode analytics record");
                metrics::record_produce_failure("analytics");
                return;
            }
        };

        if let Err(e) = self
            .producer
            .produce(&self.config.topic, result.subscription_id.as_str(), payload)
            .await
        {
            tracing::warn!(
                topic = %self.config.topic,
                guid = %result.guid,
                error = %e,
                "Failed to produce analytics record"
            );
            metrics::record_produce_failure("analytics");
        }
    }
}
