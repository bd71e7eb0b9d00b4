//! Processing strategies.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::{Duration, Instant};
use async_trait::async_trait;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use super::{ConsumerError, OffsetCommitter, ResultHandler, StreamMessage};
use crate::config::{ConsumerConfig, ConsumerMode};
use crate::observability::metrics;
use crate::uptime::types::{CheckResult, SubscriptionId};

/// Drives messages from the transport into a result handler.
#[async_trait]
pub trait ProcessingStrategy: Send {
    /// Accept the next message from the stream.
    async fn submit(&mut self, message: StreamMessage) -> Result<(), ConsumerError>;

    /// Called periodically; flushes work that has waited long enough.
    async fn poll(&mut self) -> Result<(), ConsumerError>;

    /// Finish all outstanding work and commit it.
    async fn join(&mut self) -> Result<(), ConsumerError>;
}

/// A decoded result waiting in a batch.
#[derive(Debug, Clone)]
pub struct PendingResult {
    pub partition: u32,
    pub offset: u64,
    pub result: CheckResult,
}

fn decode_or_skip(message: &StreamMessage) -> Option<CheckResult> {
    match message.decode() {
        Ok(result) => Some(result),
        Err(e) => {
            metrics::record_invalid_message();
            tracing::warn!(
                partition = message.partition,
                offset = message.offset,
                error = %e,
                "Dropping undecodable check result"
            );
            None
        }
    }
}

/// Handles each message before accepting the next one.
pub struct SequentialStrategy {
    handler: Arc<dyn ResultHandler>,
    committer: Arc<dyn OffsetCommitter>,
}

impl SequentialStrategy {
    pub fn new(handler: Arc<dyn ResultHandler>, committer: Arc<dyn OffsetCommitter>) -> Self {
        Self { handler, committer }
    }
}

#[async_trait]
impl ProcessingStrategy for SequentialStrategy {
    async fn submit(&mut self, message: StreamMessage) -> Result<(), ConsumerError> {
        if let Some(result) = decode_or_skip(&message) {
            self.handler
                .handle_result(result)
                .await
                .map_err(|source| ConsumerError::Processing {
                    partition: message.partition,
                    offset: message.offset,
                    source,
                })?;
        }
        self.committer
            .commit(&BTreeMap::from([(message.partition, message.offset + 1)]));
        Ok(())
    }

    async fn poll(&mut self) -> Result<(), ConsumerError> {
        Ok(())
    }

    async fn join(&mut self) -> Result<(), ConsumerError> {
        Ok(())
    }
}

/// Split a batch into per-subscription groups.
///
/// Groups appear in the order their subscription was first seen and keep
/// delivery order inside each group.
pub fn group_by_subscription(batch: Vec<PendingResult>) -> Vec<Vec<PendingResult>> {
    let mut index: HashMap<SubscriptionId, usize> = HashMap::new();
    let mut groups: Vec<Vec<PendingResult>> = Vec::new();
    for pending in batch {
        let slot = *index
            .entry(pending.result.subscription_id.clone())
            .or_insert_with(|| {
                groups.push(Vec::new());
                groups.len() - 1
            });
        groups[slot].push(pending);
    }
    groups
}

/// Buffers results and runs per-subscription groups on a bounded worker pool.
pub struct ParallelStrategy {
    handler: Arc<dyn ResultHandler>,
    committer: Arc<dyn OffsetCommitter>,
    workers: Arc<Semaphore>,
    max_batch_size: usize,
    max_batch_time: Duration,
    buffer: Vec<PendingResult>,
    /// Next offset to commit per partition once the batch succeeds.
    offsets: BTreeMap<u32, u64>,
    batch_started: Option<Instant>,
}

impl ParallelStrategy {
    pub fn new(
        handler: Arc<dyn ResultHandler>,
        committer: Arc<dyn OffsetCommitter>,
        max_batch_size: usize,
        max_batch_time: Duration,
        max_workers: usize,
    ) -> Self {
        Self {
            handler,
            committer,
            workers: Arc::new(Semaphore::new(max_workers.max(1))),
            max_batch_size: max_batch_size.max(1),
            max_batch_time,
            buffer: Vec::new(),
            offsets: BTreeMap::new(),
            batch_started: None,
        }
    }

    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    async fn flush(&mut self) -> Result<(), ConsumerError> {
        let batch = std::mem::take(&mut self.buffer);
        let offsets = std::mem::take(&mut self.offsets);
        self.batch_started = None;

        if batch.is_empty() {
            if !offsets.is_empty() {
                self.committer.commit(&offsets);
            }
            return Ok(());
        }

        let total = batch.len();
        let groups = group_by_subscription(batch);
        metrics::record_batch_flushed(total, groups.len());
        tracing::debug!(results = total, groups = groups.len(), "Flushing batch");

        let mut tasks = JoinSet::new();
        for group in groups {
            let permit = self.workers.clone().acquire_owned().await?;
            let handler = self.handler.clone();
            tasks.spawn(async move {
                let _permit = permit;
                for pending in group {
                    handler
                        .handle_result(pending.result)
                        .await
                        .map_err(|source| ConsumerError::Processing {
                            partition: pending.partition,
                            offset: pending.offset,
                            source,
                        })?;
                }
                Ok::<(), ConsumerError>(())
            });
        }

        let mut first_error = None;
        while let Some(joined) = tasks.join_next().await {
            let outcome = match joined {
                Ok(outcome) => outcome,
                Err(e) => Err(ConsumerError::WorkerPanic(e.to_string())),
            };
            if let Err(e) = outcome {
                first_error.get_or_insert(e);
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => {
                self.committer.commit(&offsets);
                Ok(())
            }
        }
    }
}

#[async_trait]
impl ProcessingStrategy for ParallelStrategy {
    async fn submit(&mut self, message: StreamMessage) -> Result<(), ConsumerError> {
        if self.buffer.len() >= self.max_batch_size {
            self.flush().await?;
        }

        self.batch_started.get_or_insert_with(Instant::now);
        self.offsets.insert(message.partition, message.offset + 1);
        if let Some(result) = decode_or_skip(&message) {
            self.buffer.push(PendingResult {
                partition: message.partition,
                offset: message.offset,
                result,
            });
        }
        Ok(())
    }

    async fn poll(&mut self) -> Result<(), ConsumerError> {
        match self.batch_started {
            Some(started) if started.elapsed() >= self.max_batch_time => self.flush().await,
            _ => Ok(()),
        }
    }

    async fn join(&mut self) -> Result<(), ConsumerError> {
        self.flush().await
    }
}

/// Builds the strategy selected by configuration.
pub struct ResultsStrategyFactory {
    config: ConsumerConfig,
    handler: Arc<dyn ResultHandler>,
    committer: Arc<dyn OffsetCommitter>,
}

impl ResultsStrategyFactory {
    pub fn new(
        config: ConsumerConfig,
        handler: Arc<dyn ResultHandler>,
        committer: Arc<dyn OffsetCommitter>,
    ) -> Self {
        Self {
            config,
            handler,
            committer,
        }
    }

    pub fn create(&self) -> Box<dyn ProcessingStrategy> {
        match self.config.mode {
            ConsumerMode::Serial => Box::new(SequentialStrategy::new(
                self.handler.clone(),
                self.committer.clone(),
            )),
            ConsumerMode::Parallel => Box::new(ParallelStrategy::new(
                self.handler.clone(),
                self.committer.clone(),
                self.config.max_batch_size,
                self.config.max_batch_time(),
                self.config.max_workers,
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Mutex;
    use crate::consumer::RecordingCommitter;
    use crate::store::StoreError;
    use crate::uptime::dispatcher::ProcessOutcome;
    use crate::uptime::error::ProcessingResult;

    /// Records handled results; fails for configured subscriptions.
    #[derive(Default)]
    struct RecordingHandler {
        handled: Mutex<Vec<(String, String)>>,
        failing: HashSet<String>,
    }

    impl RecordingHandler {
        fn failing(subscriptions: &[&str]) -> Self {
            Self {
                failing: subscriptions.iter().map(|s| s.to_string()).collect(),
                ..Self::default()
            }
        }

        fn handled(&self) -> Vec<(String, String)> {
            self.handled.lock().unwrap().clone()
        }

        fn handled_for(&self, subscription: &str) -> Vec<String> {
            self.handled()
                .into_iter()
                .filter(|(s, _)| s == subscription)
                .map(|(_, guid)| guid)
                .collect()
        }
    }

    #[async_trait]
    impl ResultHandler for RecordingHandler {
        async fn handle_result(&self, result: CheckResult) -> ProcessingResult<ProcessOutcome> {
            let subscription = result.subscription_id.as_str().to_string();
            if self.failing.contains(&subscription) {
                return Err(StoreError::Unavailable("redis down".into()).into());
            }
            self.handled.lock().unwrap().push((subscription, result.guid));
            Ok(ProcessOutcome::SubscriptionNotFound)
        }
    }

    fn message(offset: u64, subscription: &str, guid: &str) -> StreamMessage {
        let payload = serde_json::json!({
            "guid": guid,
            "subscription_id": subscription,
            "status": "success",
            "scheduled_check_time_ms": offset as i64,
            "actual_check_time_ms": offset as i64,
        });
        StreamMessage::new(0, offset, payload.to_string())
    }

    fn parallel(
        handler: Arc<RecordingHandler>,
        committer: RecordingCommitter,
        max_batch_size: usize,
    ) -> ParallelStrategy {
        ParallelStrategy::new(
            handler,
            Arc::new(committer),
            max_batch_size,
            Duration::from_secs(60),
            4,
        )
    }

    #[test]
    fn test_group_by_subscription_keeps_order() {
        let pending = |offset: u64, sub: &str| PendingResult {
            partition: 0,
            offset,
            result: message(offset, sub, &format!("r{offset}")).decode().unwrap(),
        };
        let groups = group_by_subscription(vec![
            pending(1, "s1"),
            pending(2, "s2"),
            pending(3, "s1"),
        ]);
        let guids: Vec<Vec<String>> = groups
            .iter()
            .map(|g| g.iter().map(|p| p.result.guid.clone()).collect())
            .collect();
        assert_eq!(guids, vec![vec!["r1", "r3"], vec!["r2"]]);
    }

    #[tokio::test]
    async fn test_fourth_submit_flushes_batch() {
        let handler = Arc::new(RecordingHandler::default());
        let committer = RecordingCommitter::new();
        let mut strategy = parallel(handler.clone(), committer.clone(), 3);

        strategy.submit(message(0, "s1", "r1")).await.unwrap();
        strategy.submit(message(1, "s1", "r2")).await.unwrap();
        strategy.submit(message(2, "s2", "r3")).await.unwrap();
        assert!(handler.handled().is_empty());
        assert_eq!(committer.commit_count(), 0);

        strategy.submit(message(3, "s2", "r4")).await.unwrap();
        assert_eq!(handler.handled_for("s1"), vec!["r1", "r2"]);
        assert_eq!(handler.handled_for("s2"), vec!["r3"]);
        assert_eq!(committer.committed().get(&0), Some(&3));
        assert_eq!(strategy.buffered(), 1);

        strategy.join().await.unwrap();
        assert_eq!(handler.handled_for("s2"), vec!["r3", "r4"]);
        assert_eq!(committer.committed().get(&0), Some(&4));
    }

    #[tokio::test]
    async fn test_failed_group_blocks_commit() {
        let handler = Arc::new(RecordingHandler::failing(&["bad"]));
        let committer = RecordingCommitter::new();
        let mut strategy = parallel(handler.clone(), committer.clone(), 10);

        strategy.submit(message(0, "good", "r1")).await.unwrap();
        strategy.submit(message(1, "bad", "r2")).await.unwrap();

        let err = strategy.join().await.unwrap_err();
        assert!(matches!(err, ConsumerError::Processing { offset: 1, .. }));
        assert_eq!(handler.handled_for("good"), vec!["r1"]);
        assert_eq!(committer.commit_count(), 0);
    }

    #[tokio::test]
    async fn test_invalid_message_is_committed_past() {
        let handler = Arc::new(RecordingHandler::default());
        let committer = RecordingCommitter::new();
        let mut strategy = SequentialStrategy::new(handler.clone(), Arc::new(committer.clone()));

        strategy.submit(StreamMessage::new(0, 0, "{broken")).await.unwrap();
        strategy.submit(message(1, "s1", "r1")).await.unwrap();

        assert_eq!(handler.handled().len(), 1);
        assert_eq!(committer.committed().get(&0), Some(&2));
        assert_eq!(committer.commit_count(), 2);
    }

    #[tokio::test]
    async fn test_sequential_error_stops_commit() {
        let handler = Arc::new(RecordingHandler::failing(&["bad"]));
        let committer = RecordingCommitter::new();
        let mut strategy = SequentialStrategy::new(handler, Arc::new(committer.clone()));

        strategy.submit(message(0, "ok", "r1")).await.unwrap();
        assert!(strategy.submit(message(1, "bad", "r2")).await.is_err());
        assert_eq!(committer.committed().get(&0), Some(&1));
    }

    #[tokio::test]
    async fn test_poll_flushes_after_batch_time() {
        let handler = Arc::new(RecordingHandler::default());
        let committer = RecordingCommitter::new();
        let mut strategy = ParallelStrategy::new(
            handler.clone(),
            Arc::new(committer.clone()),
            100,
            Duration::from_millis(10),
            2,
        );

        strategy.submit(message(0, "s1", "r1")).await.unwrap();
        strategy.poll().await.unwrap();
        assert!(handler.handled().is_empty());

        tokio::time::sleep(Duration::from_millis(20)).await;
        strategy.poll().await.unwrap();
        assert_eq!(handler.handled().len(), 1);
        assert_eq!(committer.committed().get(&0), Some(&1));
    }
}
