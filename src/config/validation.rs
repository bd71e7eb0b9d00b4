//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (batch sizes, worker counts, thresholds > 0)
//! - Detect duplicate region slugs
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: PipelineConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::collections::HashSet;
use std::net::SocketAddr;
use thiserror::Error;

use crate::config::schema::PipelineConfig;

/// A single semantic problem found in a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("consumer.{field} must be greater than zero")]
    ZeroConsumerSetting { field: &'static str },

    #[error("thresholds.{field} must be greater than zero")]
    ZeroThreshold { field: &'static str },

    #[error("rebalance.sample_rate must be within 0.0..=1.0, got {0}")]
    SampleRateOutOfRange(String),

    #[error("duplicate region slug: {0}")]
    DuplicateRegion(String),

    #[error("region {0} has an empty config topic")]
    EmptyConfigTopic(String),

    #[error("analytics.topic must not be empty when analytics is enabled")]
    EmptyAnalyticsTopic,

    #[error("invalid metrics address: {0}")]
    InvalidMetricsAddress(String),
}

/// Validate a parsed configuration, collecting every problem found.
pub fn validate_config(config: &PipelineConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    let consumer = &config.consumer;
    for (field, value) in [
        ("max_batch_size", consumer.max_batch_size as u64),
        ("max_workers", consumer.max_workers as u64),
        ("max_batch_time_ms", consumer.max_batch_time_ms),
        ("poll_interval_ms", consumer.poll_interval_ms),
    ] {
        if value == 0 {
            errors.push(ValidationError::ZeroConsumerSetting { field });
        }
    }

    let thresholds = &config.thresholds;
    for (field, value) in [
        ("active_failure_threshold", thresholds.active_failure_threshold as u64),
        ("active_recovery_threshold", thresholds.active_recovery_threshold as u64),
        ("onboarding_failure_threshold", thresholds.onboarding_failure_threshold as u64),
        ("onboarding_period_secs", thresholds.onboarding_period_secs),
        ("active_interval_secs", thresholds.active_interval_secs as u64),
    ] {
        if value == 0 {
            errors.push(ValidationError::ZeroThreshold { field });
        }
    }

    let rate = config.rebalance.sample_rate;
    if !(0.0..=1.0).contains(&rate) {
        errors.push(ValidationError::SampleRateOutOfRange(rate.to_string()));
    }

    let mut seen = HashSet::new();
    for region in &config.regions {
        if !seen.insert(region.slug.as_str()) {
            errors.push(ValidationError::DuplicateRegion(region.slug.clone()));
        }
        if region.config_topic.trim().is_empty() {
            errors.push(ValidationError::EmptyConfigTopic(region.slug.clone()));
        }
    }

    if config.analytics.enabled && config.analytics.topic.trim().is_empty() {
        errors.push(ValidationError::EmptyAnalyticsTopic);
    }

    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::InvalidMetricsAddress(
            config.observability.metrics_address.clone(),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::RegionConfig;

    fn region(slug: &str, topic: &str) -> RegionConfig {
        RegionConfig {
            slug: slug.into(),
            name: slug.to_uppercase(),
            config_topic: topic.into(),
            enabled: true,
        }
    }

    #[test]
    fn test_default_config_is_valid() {
        assert!(validate_config(&PipelineConfig::default()).is_ok());
    }

    #[test]
    fn test_reports_all_errors() {
        let mut config = PipelineConfig::default();
        config.consumer.max_workers = 0;
        config.thresholds.active_failure_threshold = 0;
        config.rebalance.sample_rate = 1.5;
        config.regions = vec![region("us", "configs"), region("us", "")];

        let errors = validate_config(&config).unwrap_err();
        assert!(errors.contains(&ValidationError::ZeroConsumerSetting { field: "max_workers" }));
        assert!(errors.contains(&ValidationError::ZeroThreshold {
            field: "active_failure_threshold"
        }));
        assert!(errors.contains(&ValidationError::SampleRateOutOfRange("1.5".into())));
        assert!(errors.contains(&ValidationError::DuplicateRegion("us".into())));
        assert!(errors.contains(&ValidationError::EmptyConfigTopic("us".into())));
        assert_eq!(errors.len(), 5);
    }

    #[test]
    fn test_metrics_address_only_checked_when_enabled() {
        let mut config = PipelineConfig::default();
        config.observability.metrics_address = "not-an-address".into();
        assert!(validate_config(&config).is_err());

        config.observability.metrics_enabled = false;
        assert!(validate_config(&config).is_ok());
    }
}
