//! Outbound producers for config topics and the analytics sink.
//!
//! # Design Decisions
//! - Produce failures are best effort: logged and counted, never propagated
//! - Receivers are idempotent, so duplicate emission is acceptable

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::observability::metrics;
use crate::uptime::types::{Subscription, SubscriptionId};

#[derive(Debug, Error)]
pub enum ProduceError {
    #[error("failed to encode message: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("transport rejected message for {topic}: {reason}")]
    Transport { topic: String, reason: String },
}

/// A message handed to the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProducedMessage {
    pub topic: String,
    pub key: String,
    pub payload: Vec<u8>,
}

impl ProducedMessage {
    /// Decode the payload as JSON.
    pub fn json<T: for<'de> Deserialize<'de>>(&self) -> serde_json::Result<T> {
        serde_json::from_slice(&self.payload)
    }
}

#[async_trait]
pub trait Producer: Send + Sync {
    async fn produce(&self, topic: &str, key: &str, payload: Vec<u8>) -> Result<(), ProduceError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfigAction {
    Upsert,
    Delete,
}

/// Subscription config sent to a region's probers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigMessage {
    pub subscription_id: SubscriptionId,
    pub action: ConfigAction,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interval_seconds: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region_slugs: Option<Vec<String>>,
}

impl ConfigMessage {
    pub fn upsert(subscription: &Subscription) -> Self {
        Self {
            subscription_id: subscription.subscription_id.clone(),
            action: ConfigAction::Upsert,
            url: Some(subscription.url.clone()),
            interval_seconds: Some(subscription.interval_seconds),
            timeout_ms: Some(subscription.timeout_ms),
            region_slugs: Some(subscription.region_slugs.iter().cloned().collect()),
        }
    }

    pub fn delete(subscription_id: &SubscriptionId) -> Self {
        Self {
            subscription_id: subscription_id.clone(),
            action: ConfigAction::Delete,
            url: None,
            interval_seconds: None,
            timeout_ms: None,
            region_slugs: None,
        }
    }
}

/// Encode and send a config message. Returns whether it was accepted.
pub async fn send_config(producer: &dyn Producer, topic: &str, message: &ConfigMessage) -> bool {
    let result = match serde_json::to_vec(message) {
        Ok(payload) => producer.produce(topic, message.subscription_id.as_str(), payload).await,
        Err(e) => Err(ProduceError::from(e)),
    };
    match result {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!(
                topic,
                subscription_id = %message.subscription_id,
                action = ?message.action,
                error = %e,
                "Failed to produce subscription config"
            );
            metrics::record_produce_failure("config");
            false
        }
    }
}

/// Producer that only logs what it would send.
#[derive(Debug, Default, Clone)]
pub struct LoggingProducer;

#[async_trait]
impl Producer for LoggingProducer {
    async fn produce(&self, topic: &str, key: &str, payload: Vec<u8>) -> Result<(), ProduceError> {
        tracing::debug!(
            topic,
            key,
            payload = %String::from_utf8_lossy(&payload),
            "Produced message"
        );
        Ok(())
    }
}

/// Producer that keeps every message in memory.
#[derive(Debug, Default, Clone)]
pub struct RecordingProducer {
    messages: Arc<Mutex<Vec<ProducedMessage>>>,
    failing: Arc<AtomicBool>,
}

impl RecordingProducer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject every subsequent message.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn messages(&self) -> Vec<ProducedMessage> {
        self.messages
            .lock()
            .map(|messages| messages.clone())
            .unwrap_or_default()
    }

    pub fn messages_for(&self, topic: &str) -> Vec<ProducedMessage> {
        self.messages()
            .into_iter()
            .filter(|m| m.topic == topic)
            .collect()
    }

    pub fn clear(&self) {
        if let Ok(mut messages) = self.messages.lock() {
            messages.clear();
        }
    }
}

#[async_trait]
impl Producer for RecordingProducer {
    async fn produce(&self, topic: &str, key: &str, payload: Vec<u8>) -> Result<(), ProduceError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(ProduceError::Transport {
                topic: topic.to_string(),
                reason: "producer switched off".into(),
            });
        }
        let mut messages = self.messages.lock().map_err(|_| ProduceError::Transport {
            topic: topic.to_string(),
            reason: "recording producer lock poisoned".into(),
        })?;
        messages.push(ProducedMessage {
            topic: topic.to_string(),
            key: key.to_string(),
            payload,
        });
        Ok(())
    }
}
