//! Broker read loop shared by the path producer, the chunk assembler and the audit sink.
//!
//! Reads wait at most `poll_timeout` so cancellation is observed within one poll. A
//! delivery is acknowledged once its handler finishes, which makes consumption
//! at-least-once: a crash between handling and commit redelivers the message.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use docket_broker::{Broker, BrokerError, Delivery, Subscription};
use tokio_util::sync::CancellationToken;

use crate::error::{Disposition, PipelineError};

/// Processes one delivery from a topic.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    async fn handle(&self, delivery: &Delivery) -> Result<(), PipelineError>;
}

#[derive(Debug, Clone)]
pub struct ConsumerLoop {
    pub name: &'static str,
    pub topic: String,
    pub group: String,
    pub poll_timeout: Duration,
    pub retry_backoff: Duration,
}

impl ConsumerLoop {
    pub fn new(name: &'static str, topic: impl Into<String>, group: impl Into<String>) -> Self {
        Self {
            name,
            topic: topic.into(),
            group: group.into(),
            poll_timeout: Duration::from_secs(5),
            retry_backoff: Duration::from_secs(1),
        }
    }

    pub fn with_poll_timeout(mut self, poll_timeout: Duration) -> Self {
        self.poll_timeout = poll_timeout;
        self
    }

    pub fn with_retry_backoff(mut self, retry_backoff: Duration) -> Self {
        self.retry_backoff = retry_backoff;
        self
    }

    /// Spawns [`ConsumerLoop::run`] on the runtime.
    pub fn spawn(
        self,
        broker: Arc<dyn Broker>,
        handler: Arc<dyn MessageHandler>,
        cancel: CancellationToken,
    ) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move { self.run(broker, handler, cancel).await })
    }

    /// Consumes until `cancel` fires or the broker closes.
    pub async fn run(
        self,
        broker: Arc<dyn Broker>,
        handler: Arc<dyn MessageHandler>,
        cancel: CancellationToken,
    ) {
        let Some(mut subscription) = self.subscribe(broker.as_ref(), &cancel).await else {
            return;
        };

        tracing::info!(
            consumer = self.name,
            topic = %self.topic,
            group = %self.group,
            "Consumer started"
        );

        loop {
            let next = tokio::select! {
                _ = cancel.cancelled() => break,
                next = subscription.next(self.poll_timeout) => next,
            };

            match next {
                Ok(None) => continue,
                Ok(Some(delivery)) => {
                    if !self
                        .process(subscription.as_mut(), handler.as_ref(), &delivery, &cancel)
                        .await
                    {
                        break;
                    }
                }
                Err(BrokerError::Closed) => {
                    tracing::info!(consumer = self.name, "Broker closed");
                    break;
                }
                Err(e) => {
                    tracing::warn!(consumer = self.name, error = %e, "Broker read failed, retrying");
                    if !self.backoff(&cancel).await {
                        break;
                    }
                }
            }
        }

        tracing::info!(consumer = self.name, "Consumer stopped");
    }

    async fn subscribe(
        &self,
        broker: &dyn Broker,
        cancel: &CancellationToken,
    ) -> Option<Box<dyn Subscription>> {
        loop {
            match broker.subscribe(&self.topic, &self.group).await {
                Ok(subscription) => return Some(subscription),
                Err(BrokerError::Closed) => return None,
                Err(e) => {
                    tracing::error!(
                        consumer = self.name,
                        topic = %self.topic,
                        error = %e,
                        "Failed to subscribe, retrying"
                    );
                    if !self.backoff(cancel).await {
                        return None;
                    }
                }
            }
        }
    }

    /// Handles one delivery to a final outcome and commits it. Returns false when the loop
    /// should stop; the delivery is then left uncommitted.
    async fn process(
        &self,
        subscription: &mut dyn Subscription,
        handler: &dyn MessageHandler,
        delivery: &Delivery,
        cancel: &CancellationToken,
    ) -> bool {
        loop {
            match handler.handle(delivery).await {
                Ok(()) => break,
                Err(e) => match e.disposition() {
                    Disposition::Skip => {
                        tracing::warn!(
                            consumer = self.name,
                            partition = delivery.partition,
                            offset = delivery.offset,
                            error = %e,
                            "Skipping malformed message"
                        );
                        break;
                    }
                    Disposition::Abandon => {
                        tracing::error!(
                            consumer = self.name,
                            partition = delivery.partition,
                            offset = delivery.offset,
                            error = %e,
                            "Message abandoned"
                        );
                        break;
                    }
                    Disposition::Stop => {
                        tracing::info!(
                            consumer = self.name,
                            partition = delivery.partition,
                            offset = delivery.offset,
                            "Handling interrupted by shutdown, message left uncommitted"
                        );
                        return false;
                    }
                    Disposition::Retry => {
                        tracing::warn!(
                            consumer = self.name,
                            partition = delivery.partition,
                            offset = delivery.offset,
                            error = %e,
                            "Message handling failed, retrying"
                        );
                        if !self.backoff(cancel).await {
                            return false;
                        }
                    }
                },
            }
        }

        if let Err(e) = subscription.ack(delivery).await {
            tracing::warn!(
                consumer = self.name,
                partition = delivery.partition,
                offset = delivery.offset,
                error = %e,
                "Failed to commit offset"
            );
        }
        true
    }

    /// Sleeps for the retry backoff. Returns false if cancelled first.
    async fn backoff(&self, cancel: &CancellationToken) -> bool {
        tokio::select! {
            _ = cancel.cancelled() => false,
            _ = tokio::time::sleep(self.retry_backoff) => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docket_broker::MemoryBroker;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Recorder {
        seen: AtomicUsize,
        fail_first: AtomicUsize,
    }

    #[async_trait]
    impl MessageHandler for Recorder {
        async fn handle(&self, delivery: &Delivery) -> Result<(), PipelineError> {
            if delivery.payload == b"bad" {
                let source = serde_json::from_slice::<serde_json::Value>(b"{").unwrap_err();
                return Err(PipelineError::Decode {
                    kind: "test",
                    source,
                });
            }
            if delivery.payload == b"interrupted" {
                return Err(PipelineError::Cancelled);
            }
            if self.fail_first.load(Ordering::SeqCst) > 0 {
                self.fail_first.fetch_sub(1, Ordering::SeqCst);
                return Err(BrokerError::Transport("flaky".into()).into());
            }
            self.seen.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    async fn wait_for(mut check: impl FnMut() -> bool) {
        for _ in 0..200 {
            if check() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("condition not reached");
    }

    #[tokio::test]
    async fn malformed_messages_are_committed_and_skipped() {
        let broker = MemoryBroker::with_partitions(1);
        broker.publish("t", b"k", b"bad").await.unwrap();
        broker.publish("t", b"k", b"good").await.unwrap();

        let handler = Arc::new(Recorder {
            seen: AtomicUsize::new(0),
            fail_first: AtomicUsize::new(0),
        });
        let cancel = CancellationToken::new();
        let task = ConsumerLoop::new("test", "t", "g")
            .with_poll_timeout(Duration::from_millis(50))
            .spawn(Arc::new(broker.clone()), handler.clone(), cancel.clone());

        wait_for(|| broker.lag("t", "g") == 0).await;
        assert_eq!(handler.seen.load(Ordering::SeqCst), 1);

        cancel.cancel();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn transient_failures_are_retried_in_place() {
        let broker = MemoryBroker::with_partitions(1);
        broker.publish("t", b"k", b"one").await.unwrap();

        let handler = Arc::new(Recorder {
            seen: AtomicUsize::new(0),
            fail_first: AtomicUsize::new(2),
        });
        let cancel = CancellationToken::new();
        let task = ConsumerLoop::new("test", "t", "g")
            .with_poll_timeout(Duration::from_millis(50))
            .with_retry_backoff(Duration::from_millis(5))
            .spawn(Arc::new(broker.clone()), handler.clone(), cancel.clone());

        wait_for(|| handler.seen.load(Ordering::SeqCst) == 1).await;
        wait_for(|| broker.lag("t", "g") == 0).await;

        cancel.cancel();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn interrupted_handling_leaves_message_uncommitted() {
        let broker = MemoryBroker::with_partitions(1);
        broker.publish("t", b"k", b"interrupted").await.unwrap();

        let handler = Arc::new(Recorder {
            seen: AtomicUsize::new(0),
            fail_first: AtomicUsize::new(0),
        });
        let task = ConsumerLoop::new("test", "t", "g")
            .with_poll_timeout(Duration::from_millis(50))
            .spawn(
                Arc::new(broker.clone()),
                handler.clone(),
                CancellationToken::new(),
            );

        // The loop exits on its own without committing.
        tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .expect("consumer did not stop")
            .unwrap();
        assert_eq!(broker.lag("t", "g"), 1);
        assert_eq!(handler.seen.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn cancellation_stops_an_idle_consumer() {
        let broker = MemoryBroker::new();
        let handler = Arc::new(Recorder {
            seen: AtomicUsize::new(0),
            fail_first: AtomicUsize::new(0),
        });
        let cancel = CancellationToken::new();
        let task = ConsumerLoop::new("test", "t", "g").spawn(
            Arc::new(broker),
            handler,
            cancel.clone(),
        );

        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .expect("consumer did not stop")
            .unwrap();
    }
}
