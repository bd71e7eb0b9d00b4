//! Uptime domain types.

use std::collections::BTreeSet;
use std::fmt;
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::observability::metrics::DEFAULT_REGION_TAG;

/// Identifier shared between a subscription row and the probers.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubscriptionId(pub String);

impl SubscriptionId {
    /// Generate a fresh identifier (uuid v4, simple hex form).
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().simple().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SubscriptionId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Outcome of a single probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckStatus {
    Success,
    Failure,
    /// The prober could not run the check in its scheduled window.
    MissedWindow,
}

impl CheckStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CheckStatus::Success => "success",
            CheckStatus::Failure => "failure",
            CheckStatus::MissedWindow => "missed_window",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusReasonType {
    Timeout,
    DnsError,
    Failure,
}

impl StatusReasonType {
    pub fn as_str(&self) -> &'static str {
        match self {
            StatusReasonType::Timeout => "timeout",
            StatusReasonType::DnsError => "dns_error",
            StatusReasonType::Failure => "failure",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusReason {
    #[serde(rename = "type")]
    pub reason_type: StatusReasonType,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestInfo {
    pub request_type: String,
    #[serde(default)]
    pub http_status_code: Option<u16>,
}

/// A check result as delivered by the results stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckResult {
    pub guid: String,
    pub subscription_id: SubscriptionId,
    pub status: CheckStatus,
    #[serde(default)]
    pub status_reason: Option<StatusReason>,
    #[serde(default)]
    pub trace_id: String,
    #[serde(default)]
    pub span_id: String,
    pub scheduled_check_time_ms: i64,
    pub actual_check_time_ms: i64,
    #[serde(default)]
    pub duration_ms: Option<i64>,
    #[serde(default)]
    pub request_info: Option<RequestInfo>,
    #[serde(default)]
    pub region: Option<String>,
}

impl CheckResult {
    pub fn scheduled_check_time(&self) -> DateTime<Utc> {
        Utc.timestamp_millis_opt(self.scheduled_check_time_ms)
            .single()
            .unwrap_or_default()
    }

    /// Region tag for metrics, falling back to a sentinel.
    pub fn region_tag(&self) -> &str {
        self.region.as_deref().unwrap_or(DEFAULT_REGION_TAG)
    }

    /// Reason tag for metrics; `none` when the prober gave no reason.
    pub fn status_reason_tag(&self) -> &'static str {
        self.status_reason
            .as_ref()
            .map(|r| r.reason_type.as_str())
            .unwrap_or("none")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    Active,
    Disabled,
}

/// A probe subscription, owned by the configuration store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscription {
    pub subscription_id: SubscriptionId,
    pub url: String,
    pub interval_seconds: u32,
    pub timeout_ms: u32,
    pub region_slugs: BTreeSet<String>,
    pub status: SubscriptionStatus,
    pub host_provider_id: Option<String>,
    pub date_added: DateTime<Utc>,
}

/// How a binding is being monitored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BindingMode {
    /// Created by a user; behaves like an active monitor.
    Manual,
    /// Auto-detected and still inside the onboarding window.
    AutoDetectedOnboarding,
    /// Auto-detected and graduated to the production interval.
    AutoDetectedActive,
}

impl BindingMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            BindingMode::Manual => "manual",
            BindingMode::AutoDetectedOnboarding => "auto_detected_onboarding",
            BindingMode::AutoDetectedActive => "auto_detected_active",
        }
    }

    pub fn is_onboarding(&self) -> bool {
        matches!(self, BindingMode::AutoDetectedOnboarding)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UptimeStatus {
    Ok,
    Failed,
}

/// Owner an escalated issue is assigned to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Actor {
    User(u64),
    Team(u64),
}

/// Links a subscription to a monitored project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectSubscription {
    pub id: u64,
    pub project_id: u64,
    pub organization_id: u64,
    pub subscription_id: SubscriptionId,
    pub mode: BindingMode,
    pub uptime_status: UptimeStatus,
    pub owner: Option<Actor>,
    pub date_added: DateTime<Utc>,
}
