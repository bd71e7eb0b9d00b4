//! Metrics collection and exposition.
//!
//! # Responsibilities
//! - Define pipeline metrics (per-result outcomes, lifecycle transitions, produce failures)
//! - Expose Prometheus-compatible metrics endpoint
//!
//! # Metrics
//! - `uptime.result_processor.handle_result_for_project` (counter): every result with a binding
//! - `uptime.result_processor.subscription_not_found` (counter)
//! - `uptime.result_processor.restricted_by_provider` (counter)
//! - `uptime.result_processor.skipping_already_processed_update` (counter)
//! - `uptime.result_processor.active.under_threshold` (counter)
//! - `uptime.result_processor.active.sent_occurrence` / `.resolved` (counters)
//! - `uptime.result_processor.autodetection.failed_onboarding` / `.graduated_onboarding` (counters)
//! - `uptime.result_processor.regions_rebalanced` / `.rebalance_failed` (counters)
//! - `uptime.result_consumer.*` (counters, histogram): batching and decode failures
//!
//! # Design Decisions
//! - Tags mirror the result: status, status_reason, mode, uptime_region
//! - Produce and rebalance failures are counted, never fatal

use std::net::SocketAddr;
use metrics::{counter, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Tag value used when a result carries no region.
pub const DEFAULT_REGION_TAG: &str = "default";

/// Tags attached to every per-result metric.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultTags {
    pub status: &'static str,
    pub status_reason: String,
    pub mode: &'static str,
    pub uptime_region: String,
}

impl ResultTags {
    fn labels(&self) -> [(&'static str, String); 4] {
        [
            ("status", self.status.to_string()),
            ("status_reason", self.status_reason.clone()),
            ("mode", self.mode.to_string()),
            ("uptime_region", self.uptime_region.clone()),
        ]
    }
}

/// Install the Prometheus recorder and its HTTP listener.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_result_handled(tags: &ResultTags) {
    counter!("uptime.result_processor.handle_result_for_project", &tags.labels()).increment(1);
}

pub fn record_subscription_not_found(region: &str) {
    counter!("uptime.result_processor.subscription_not_found", "uptime_region" => region.to_string())
        .increment(1);
}

pub fn record_restricted_by_provider(host_provider_id: &str, region: &str) {
    counter!(
        "uptime.result_processor.restricted_by_provider",
        "host_provider_id" => host_provider_id.to_string(),
        "uptime_region" => region.to_string()
    )
    .increment(1);
}

pub fn record_skipped_stale(tags: &ResultTags) {
    counter!(
        "uptime.result_processor.skipping_already_processed_update",
        "status" => tags.status,
        "mode" => tags.mode,
        "uptime_region" => tags.uptime_region.clone()
    )
    .increment(1);
}

pub fn record_under_threshold(status: &'static str) {
    counter!("uptime.result_processor.active.under_threshold", "status" => status).increment(1);
}

pub fn record_issue_created(tags: &ResultTags) {
    counter!("uptime.result_processor.active.sent_occurrence", &tags.labels()).increment(1);
}

pub fn record_issue_resolved(tags: &ResultTags) {
    counter!("uptime.result_processor.active.resolved", &tags.labels()).increment(1);
}

pub fn record_failed_onboarding(failure_reason: &str, region: &str) {
    counter!(
        "uptime.result_processor.autodetection.failed_onboarding",
        "failure_reason" => failure_reason.to_string(),
        "uptime_region" => region.to_string()
    )
    .increment(1);
}

pub fn record_graduated_onboarding(region: &str) {
    counter!(
        "uptime.result_processor.autodetection.graduated_onboarding",
        "uptime_region" => region.to_string()
    )
    .increment(1);
}

pub fn record_regions_rebalanced(added: usize, removed: usize) {
    counter!("uptime.result_processor.regions_rebalanced").increment(1);
    counter!("uptime.result_processor.regions_added").increment(added as u64);
    counter!("uptime.result_processor.regions_removed").increment(removed as u64);
}

pub fn record_rebalance_failure() {
    counter!("uptime.result_processor.rebalance_failed").increment(1);
}

pub fn record_produce_failure(kind: &'static str) {
    counter!("uptime.result_processor.produce_failed", "kind" => kind).increment(1);
}

pub fn record_invalid_message() {
    counter!("uptime.result_consumer.invalid_message").increment(1);
}

pub fn record_batch_flushed(results: usize, groups: usize) {
    counter!("uptime.result_consumer.batches_flushed").increment(1);
    histogram!("uptime.result_consumer.batch_size").record(results as f64);
    histogram!("uptime.result_consumer.batch_groups").record(groups as f64);
}

pub fn record_processing_error() {
    counter!("uptime.result_consumer.processing_error").increment(1);
}
