//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the results
//! pipeline. All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Root configuration for the uptime results pipeline.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct PipelineConfig {
    /// Stream consumer settings (mode, batching, workers).
    pub consumer: ConsumerConfig,

    /// Failure/success thresholds and onboarding timings.
    pub thresholds: ThresholdConfig,

    /// Probe regions known to the system.
    pub regions: Vec<RegionConfig>,

    /// Region rebalancing settings.
    pub rebalance: RebalanceConfig,

    /// Issue creation settings.
    pub issues: IssueConfig,

    /// Downstream analytics sink settings.
    pub analytics: AnalyticsConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

impl PipelineConfig {
    /// Regions currently enabled for probing.
    pub fn enabled_regions(&self) -> impl Iterator<Item = &RegionConfig> {
        self.regions.iter().filter(|r| r.enabled)
    }
}

/// How the consumer hands results to the dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConsumerMode {
    /// One result at a time, in stream order.
    Serial,
    /// Batched, grouped by subscription, run on a bounded worker pool.
    Parallel,
}

impl std::str::FromStr for ConsumerMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "serial" => Ok(ConsumerMode::Serial),
            "parallel" => Ok(ConsumerMode::Parallel),
            other => Err(format!("unknown consumer mode: {}", other)),
        }
    }
}

/// Stream consumer configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ConsumerConfig {
    /// Processing mode.
    pub mode: ConsumerMode,

    /// Number of buffered results that triggers a flush in parallel mode.
    pub max_batch_size: usize,

    /// Maximum time a batch may stay buffered before it is flushed.
    pub max_batch_time_ms: u64,

    /// Size of the worker pool in parallel mode.
    pub max_workers: usize,

    /// How often the consumer loop polls the strategy for time-based flushes.
    pub poll_interval_ms: u64,
}

impl ConsumerConfig {
    pub fn max_batch_time(&self) -> Duration {
        Duration::from_millis(self.max_batch_time_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            mode: ConsumerMode::Serial,
            max_batch_size: 500,
            max_batch_time_ms: 1_000,
            max_workers: 16,
            poll_interval_ms: 100,
        }
    }
}

/// Thresholds driving escalation and the onboarding lifecycle.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ThresholdConfig {
    /// Consecutive failures that escalate an active monitor.
    pub active_failure_threshold: u32,

    /// Consecutive successes that resolve an escalated monitor.
    pub active_recovery_threshold: u32,

    /// Consecutive failures that fail an onboarding monitor.
    pub onboarding_failure_threshold: u32,

    /// Length of the onboarding window in seconds.
    pub onboarding_period_secs: u64,

    /// Probe interval of a graduated subscription in seconds.
    pub active_interval_secs: u32,

    /// TTL of active-mode streak counters in seconds.
    pub streak_ttl_secs: u64,

    /// TTL of the last-update marker in seconds.
    pub last_update_ttl_secs: u64,

    /// How long a failed onboarding url stays blacklisted, in seconds.
    pub failed_url_ttl_secs: u64,
}

impl ThresholdConfig {
    pub fn onboarding_period(&self) -> Duration {
        Duration::from_secs(self.onboarding_period_secs)
    }

    pub fn streak_ttl(&self) -> Duration {
        Duration::from_secs(self.streak_ttl_secs)
    }

    pub fn last_update_ttl(&self) -> Duration {
        Duration::from_secs(self.last_update_ttl_secs)
    }

    pub fn failed_url_ttl(&self) -> Duration {
        Duration::from_secs(self.failed_url_ttl_secs)
    }
}

impl Default for ThresholdConfig {
    fn default() -> Self {
        Self {
            active_failure_threshold: 3,
            active_recovery_threshold: 1,
            onboarding_failure_threshold: 3,
            onboarding_period_secs: 3 * 24 * 60 * 60,
            active_interval_secs: 5 * 60,
            streak_ttl_secs: 24 * 60 * 60,
            last_update_ttl_secs: 24 * 60 * 60,
            failed_url_ttl_secs: 7 * 24 * 60 * 60,
        }
    }
}

/// A probe region descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct RegionConfig {
    /// Stable region identifier (e.g., "us-west").
    pub slug: String,

    /// Human readable name.
    pub name: String,

    /// Topic the region's probers read subscription configs from.
    pub config_topic: String,

    /// Whether subscriptions should be probed from this region.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

/// Region rebalancing configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RebalanceConfig {
    /// Fraction of handled results that trigger a region check (0.0..=1.0).
    pub sample_rate: f64,
}

impl Default for RebalanceConfig {
    fn default() -> Self {
        Self { sample_rate: 0.01 }
    }
}

/// Issue creation configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct IssueConfig {
    /// Default capability for issue creation when the caller does not override it.
    pub create_issues: bool,

    /// Host provider identifiers for which issues are never created.
    pub restricted_host_provider_ids: Vec<String>,
}

impl Default for IssueConfig {
    fn default() -> Self {
        Self {
            create_issues: true,
            restricted_host_provider_ids: Vec::new(),
        }
    }
}

/// Analytics sink configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AnalyticsConfig {
    /// Emit a normalized record for every handled result.
    pub enabled: bool,

    /// Topic analytics records are produced to.
    pub topic: String,

    /// Retention attached to each record.
    pub retention_days: u16,
}

impl Default for AnalyticsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            topic: "snuba-uptime-results".to_string(),
            retention_days: 90,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Emit logs as JSON lines.
    pub json_logs: bool,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logs: false,
            metrics_enabled: true,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}
