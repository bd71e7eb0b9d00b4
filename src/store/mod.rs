//! State store adapter.
//!
//! # Responsibilities
//! - Typed get/set/exists/delete over a shared key-value backend
//! - Deterministic key construction from binding identity
//! - TTL support so onboarding counters expire on their own
//!
//! # Design Decisions
//! - No retries here: failures surface as `StoreError::Unavailable` and the
//!   result is redelivered by the transport
//! - Writes are upserts; callers never share a key across concurrent workers
//!   because keys are partitioned by subscription

pub mod memory;

use std::time::Duration;
use async_trait::async_trait;
use thiserror::Error;

pub use memory::InMemoryStateStore;

/// Errors raised by a state store backend.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The backend could not be reached or rejected the call.
    #[error("state store unavailable: {0}")]
    Unavailable(String),

    /// A stored value could not be interpreted.
    #[error("corrupt value at {key}: {value}")]
    Corrupt { key: String, value: String },
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Key-value backend shared across dispatcher instances.
#[async_trait]
pub trait StateStore: Send + Sync {
    async fn get(&self, key: &str) -> StoreResult<Option<String>>;

    /// Upsert a value, optionally expiring after `ttl`.
    async fn set(&self, key: &str, value: String, ttl: Option<Duration>) -> StoreResult<()>;

    /// Delete a key. Deleting a missing key is not an error.
    async fn delete(&self, key: &str) -> StoreResult<()>;

    async fn exists(&self, key: &str) -> StoreResult<bool>;

    async fn get_i64(&self, key: &str) -> StoreResult<Option<i64>> {
        match self.get(key).await? {
            None => Ok(None),
            Some(raw) => raw
                .parse()
                .map(Some)
                .map_err(|_| StoreError::Corrupt { key: key.to_string(), value: raw }),
        }
    }

    async fn set_i64(&self, key: &str, value: i64, ttl: Option<Duration>) -> StoreResult<()> {
        self.set(key, value.to_string(), ttl).await
    }
}

pub fn last_update_key(binding_id: u64) -> String {
    format!("last_update:{}", binding_id)
}

pub fn onboarding_failure_key(binding_id: u64) -> String {
    format!("onboarding_failure:{}", binding_id)
}

pub fn active_failure_key(binding_id: u64) -> String {
    format!("active_failure:{}", binding_id)
}

pub fn active_success_key(binding_id: u64) -> String {
    format!("active_success:{}", binding_id)
}

pub fn failed_url_key(url: &str) -> String {
    format!("failed_url:{}", blake3::hash(url.as_bytes()).to_hex())
}
