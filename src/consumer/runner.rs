//! Consumer loop.

use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio::time::MissedTickBehavior;

use super::{ConsumerError, ProcessingStrategy, StreamMessage};
use crate::observability::metrics;

/// Feed messages from `rx` into `strategy` until the channel closes or
/// shutdown is signalled, then drain outstanding work.
pub async fn run_consumer(
    mut strategy: Box<dyn ProcessingStrategy>,
    mut rx: mpsc::Receiver<StreamMessage>,
    poll_interval: Duration,
    mut shutdown: broadcast::Receiver<()>,
) -> Result<(), ConsumerError> {
    let mut ticker = tokio::time::interval(poll_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let outcome = loop {
        tokio::select! {
            maybe = rx.recv() => match maybe {
                Some(message) => {
                    if let Err(e) = strategy.submit(message).await {
                        break Err(e);
                    }
                }
                None => {
                    tracing::info!("Results stream closed");
                    break Ok(());
                }
            },
            _ = ticker.tick() => {
                if let Err(e) = strategy.poll().await {
                    break Err(e);
                }
            }
            _ = shutdown.recv() => {
                tracing::info!("Shutdown signal received, draining consumer");
                break Ok(());
            }
        }
    };

    let outcome = match outcome {
        Ok(()) => strategy.join().await,
        Err(e) => Err(e),
    };

    if let Err(e) = &outcome {
        metrics::record_processing_error();
        tracing::error!(error = %e, "Consumer stopped on processing error");
    }
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};
    use async_trait::async_trait;

    #[derive(Clone, Default)]
    struct CountingStrategy {
        submitted: Arc<Mutex<Vec<u64>>>,
        joined: Arc<Mutex<bool>>,
    }

    #[async_trait]
    impl ProcessingStrategy for CountingStrategy {
        async fn submit(&mut self, message: StreamMessage) -> Result<(), ConsumerError> {
            self.submitted.lock().unwrap().push(message.offset);
            Ok(())
        }

        async fn poll(&mut self) -> Result<(), ConsumerError> {
            Ok(())
        }

        async fn join(&mut self) -> Result<(), ConsumerError> {
            *self.joined.lock().unwrap() = true;
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_drains_on_channel_close() {
        let strategy = CountingStrategy::default();
        let (tx, rx) = mpsc::channel(8);
        let (_shutdown_tx, shutdown_rx) = broadcast::channel(1);

        for offset in 0..3 {
            tx.send(StreamMessage::new(0, offset, "{}")).await.unwrap();
        }
        drop(tx);

        run_consumer(Box::new(strategy.clone()), rx, Duration::from_millis(5), shutdown_rx)
            .await
            .unwrap();
        assert_eq!(*strategy.submitted.lock().unwrap(), vec![0, 1, 2]);
        assert!(*strategy.joined.lock().unwrap());
    }

    #[tokio::test]
    async fn test_shutdown_joins_strategy() {
        let strategy = CountingStrategy::default();
        let (_tx, rx) = mpsc::channel::<StreamMessage>(8);
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);

        let handle = tokio::spawn(run_consumer(
            Box::new(strategy.clone()),
            rx,
            Duration::from_millis(5),
            shutdown_rx,
        ));
        shutdown_tx.send(()).unwrap();
        handle.await.unwrap().unwrap();
        assert!(*strategy.joined.lock().unwrap());
    }
}
