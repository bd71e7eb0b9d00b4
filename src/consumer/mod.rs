//! Results stream consumer.
//!
//! # Data Flow
//! ```text
//! transport ──▶ mpsc ──▶ run_consumer ──▶ ProcessingStrategy
//!                                           ├─ SequentialStrategy: decode → handle → commit
//!                                           └─ ParallelStrategy:   buffer → group by subscription
//!                                                                  → worker pool → commit
//! ```
//!
//! # Design Decisions
//! - Offsets are committed only after every result before them succeeded
//! - Undecodable payloads are counted and committed past; they never block the stream
//! - Per-subscription delivery order is preserved in both modes

pub mod message;
pub mod runner;
pub mod strategy;
pub mod transport;

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use async_trait::async_trait;
use thiserror::Error;

use crate::uptime::dispatcher::ProcessOutcome;
use crate::uptime::error::{ProcessingError, ProcessingResult};
use crate::uptime::types::CheckResult;

pub use message::StreamMessage;
pub use runner::run_consumer;
pub use strategy::{ParallelStrategy, ProcessingStrategy, ResultsStrategyFactory, SequentialStrategy};

/// Processes one decoded result.
#[async_trait]
pub trait ResultHandler: Send + Sync {
    async fn handle_result(&self, result: CheckResult) -> ProcessingResult<ProcessOutcome>;
}

/// Receives offsets that are safe to commit: the next offset to read per partition.
pub trait OffsetCommitter: Send + Sync {
    fn commit(&self, offsets: &BTreeMap<u32, u64>);
}

#[derive(Debug, Error)]
pub enum ConsumerError {
    #[error("processing failed at partition {partition} offset {offset}: {source}")]
    Processing {
        partition: u32,
        offset: u64,
        #[source]
        source: ProcessingError,
    },

    #[error("worker task panicked: {0}")]
    WorkerPanic(String),

    #[error("worker pool closed")]
    WorkerPool(#[from] tokio::sync::AcquireError),
}

/// Committer that logs commits.
#[derive(Debug, Default, Clone)]
pub struct LoggingCommitter;

impl OffsetCommitter for LoggingCommitter {
    fn commit(&self, offsets: &BTreeMap<u32, u64>) {
        tracing::debug!(offsets = ?offsets, "Committed offsets");
    }
}

/// Committer that remembers the highest committed offset per partition.
#[derive(Debug, Default, Clone)]
pub struct RecordingCommitter {
    committed: Arc<Mutex<BTreeMap<u32, u64>>>,
    commits: Arc<Mutex<usize>>,
}

impl RecordingCommitter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn committed(&self) -> BTreeMap<u32, u64> {
        self.committed.lock().map(|c| c.clone()).unwrap_or_default()
    }

    pub fn commit_count(&self) -> usize {
        self.commits.lock().map(|c| *c).unwrap_or_default()
    }
}

impl OffsetCommitter for RecordingCommitter {
    fn commit(&self, offsets: &BTreeMap<u32, u64>) {
        if let Ok(mut committed) = self.committed.lock() {
            for (partition, offset) in offsets {
                let entry = committed.entry(*partition).or_insert(0);
                *entry = (*entry).max(*offset);
            }
        }
        if let Ok(mut commits) = self.commits.lock() {
            *commits += 1;
        }
    }
}
