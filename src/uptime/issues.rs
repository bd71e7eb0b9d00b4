//! Issue storage interface.
//!
//! The issue platform owns deduplication; this crate only asks it to
//! create-or-get and resolve issues by fingerprint.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::uptime::types::Actor;

/// Issue type raised by the uptime pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueType {
    UptimeDomainFailure,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueStatus {
    Unresolved,
    Resolved,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Issue {
    pub id: u64,
    pub fingerprint: String,
    pub issue_type: IssueType,
    pub assignee: Option<Actor>,
    pub status: IssueStatus,
}

#[derive(Debug, Error)]
pub enum IssueError {
    #[error("issue platform error: {0}")]
    Backend(String),
}

/// Stable fingerprint for a binding's issue.
pub fn fingerprint_for_binding(binding_id: u64) -> String {
    blake3::hash(binding_id.to_string().as_bytes()).to_hex().to_string()
}

#[async_trait]
pub trait IssueStore: Send + Sync {
    /// Create an issue for `fingerprint`, or return the one that already exists.
    async fn create_or_get_issue(
        &self,
        fingerprint: &str,
        issue_type: IssueType,
        assignee: Option<Actor>,
    ) -> Result<Issue, IssueError>;

    /// Resolve the issue for `fingerprint`. Returns false when there was none.
    async fn resolve_issue(&self, fingerprint: &str) -> Result<bool, IssueError>;
}

/// Issue store kept in process memory, keyed by fingerprint.
#[derive(Clone, Default)]
pub struct InMemoryIssueStore {
    issues: Arc<DashMap<String, Issue>>,
    failing: Arc<AtomicBool>,
}

impl InMemoryIssueStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail every subsequent call with a backend error.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    fn check_available(&self) -> Result<(), IssueError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(IssueError::Backend("issue platform unavailable".into()));
        }
        Ok(())
    }

    pub fn get(&self, fingerprint: &str) -> Option<Issue> {
        self.issues.get(fingerprint).map(|r| r.value().clone())
    }

    pub fn count(&self) -> usize {
        self.issues.len()
    }
}

#[async_trait]
impl IssueStore for InMemoryIssueStore {
    async fn create_or_get_issue(
        &self,
        fingerprint: &str,
        issue_type: IssueType,
        assignee: Option<Actor>,
    ) -> Result<Issue, IssueError> {
        self.check_available()?;
        let next_id = self.issues.len() as u64 + 1;
        let mut entry = self
            .issues
            .entry(fingerprint.to_string())
            .or_insert_with(|| Issue {
                id: next_id,
                fingerprint: fingerprint.to_string(),
                issue_type,
                assignee,
                status: IssueStatus::Unresolved,
            });
        // A regression reopens the existing issue
        entry.status = IssueStatus::Unresolved;
        Ok(entry.clone())
    }

    async fn resolve_issue(&self, fingerprint: &str) -> Result<bool, IssueError> {
        self.check_available()?;
        match self.issues.get_mut(fingerprint) {
            Some(mut issue) => {
                issue.status = IssueStatus::Resolved;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}
