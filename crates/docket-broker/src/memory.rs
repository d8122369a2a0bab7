//! In-process broker backend
//!
//! Each topic is split into a fixed number of partitions and keys are routed by hash, so
//! every message of one key sits on one partition in publication order. Consumer groups
//! track a committed offset per partition and lease a partition to a single subscriber
//! while a delivery from it is outstanding. That keeps per-key ordering intact when
//! several subscribers share a group, mirroring how a partition is owned by one consumer.
//!
//! Records are never trimmed, so memory grows with everything ever published. This
//! backend is for tests; worker and gateway configuration reject it outside
//! `ENVIRONMENT=test`.

use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Notify;
use tokio::time::Instant;

use crate::traits::{Broker, BrokerError, BrokerResult, Delivery, Subscription};

const DEFAULT_PARTITIONS: usize = 4;

#[derive(Debug, Clone)]
struct Record {
    key: Vec<u8>,
    payload: Vec<u8>,
}

#[derive(Debug, Default)]
struct GroupState {
    /// Next offset to hand out, per partition.
    committed: Vec<i64>,
    /// Partitions with an unacknowledged delivery, and the subscriber holding each.
    leases: HashMap<usize, u64>,
}

#[derive(Debug)]
struct TopicLog {
    partitions: Vec<Vec<Record>>,
    groups: HashMap<String, GroupState>,
}

impl TopicLog {
    fn new(partitions: usize) -> Self {
        Self {
            partitions: vec![Vec::new(); partitions],
            groups: HashMap::new(),
        }
    }

    fn group(&mut self, group: &str) -> &mut GroupState {
        let partitions = self.partitions.len();
        self.groups
            .entry(group.to_string())
            .or_insert_with(|| GroupState {
                committed: vec![0; partitions],
                leases: HashMap::new(),
            })
    }
}

#[derive(Debug, Default)]
struct State {
    topics: HashMap<String, TopicLog>,
    closed: bool,
    next_subscriber: u64,
}

#[derive(Debug)]
struct Inner {
    partitions: usize,
    state: Mutex<State>,
    notify: Notify,
}

impl Inner {
    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// In-memory broker. Clones share the same topics.
#[derive(Debug, Clone)]
pub struct MemoryBroker {
    inner: Arc<Inner>,
}

impl Default for MemoryBroker {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBroker {
    pub fn new() -> Self {
        Self::with_partitions(DEFAULT_PARTITIONS)
    }

    pub fn with_partitions(partitions: usize) -> Self {
        Self {
            inner: Arc::new(Inner {
                partitions: partitions.max(1),
                state: Mutex::new(State::default()),
                notify: Notify::new(),
            }),
        }
    }

    /// Stops the broker. Pending and future reads fail with [`BrokerError::Closed`].
    pub fn close(&self) {
        self.inner.state().closed = true;
        self.inner.notify.notify_waiters();
    }

    fn partition_for(&self, key: &[u8]) -> usize {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        (hasher.finish() % self.inner.partitions as u64) as usize
    }

    /// Every message on `topic`, partition by partition, in offset order.
    pub fn messages(&self, topic: &str) -> Vec<Delivery> {
        let state = self.inner.state();
        let Some(log) = state.topics.get(topic) else {
            return Vec::new();
        };
        log.partitions
            .iter()
            .enumerate()
            .flat_map(|(partition, records)| {
                records
                    .iter()
                    .enumerate()
                    .map(move |(offset, record)| Delivery {
                        topic: topic.to_string(),
                        partition: partition as i32,
                        offset: offset as i64,
                        key: Some(record.key.clone()),
                        payload: record.payload.clone(),
                    })
            })
            .collect()
    }

    /// Messages on `topic` published with `key`, in publication order.
    pub fn messages_for_key(&self, topic: &str, key: &[u8]) -> Vec<Delivery> {
        self.messages(topic)
            .into_iter()
            .filter(|delivery| delivery.key.as_deref() == Some(key))
            .collect()
    }

    /// Number of messages `group` has not yet committed on `topic`.
    pub fn lag(&self, topic: &str, group: &str) -> usize {
        let mut state = self.inner.state();
        let Some(log) = state.topics.get_mut(topic) else {
            return 0;
        };
        let lengths: Vec<i64> = log.partitions.iter().map(|p| p.len() as i64).collect();
        let group = log.group(group);
        lengths
            .iter()
            .zip(group.committed.iter())
            .map(|(len, committed)| (len - committed).max(0) as usize)
            .sum()
    }
}

#[async_trait]
impl Broker for MemoryBroker {
    async fn publish(&self, topic: &str, key: &[u8], payload: &[u8]) -> BrokerResult<()> {
        let partition = self.partition_for(key);
        {
            let mut state = self.inner.state();
            if state.closed {
                return Err(BrokerError::Closed);
            }
            let partitions = self.inner.partitions;
            state
                .topics
                .entry(topic.to_string())
                .or_insert_with(|| TopicLog::new(partitions))
                .partitions[partition]
                .push(Record {
                    key: key.to_vec(),
                    payload: payload.to_vec(),
                });
        }
        self.inner.notify.notify_waiters();
        Ok(())
    }

    async fn subscribe(&self, topic: &str, group: &str) -> BrokerResult<Box<dyn Subscription>> {
        let id = {
            let mut state = self.inner.state();
            if state.closed {
                return Err(BrokerError::Closed);
            }
            let partitions = self.inner.partitions;
            state
                .topics
                .entry(topic.to_string())
                .or_insert_with(|| TopicLog::new(partitions))
                .group(group);
            state.next_subscriber += 1;
            state.next_subscriber
        };

        Ok(Box::new(MemorySubscription {
            inner: self.inner.clone(),
            id,
            topic: topic.to_string(),
            group: group.to_string(),
        }))
    }
}

/// Consumer handle returned by [`MemoryBroker::subscribe`].
///
/// Dropping it releases its leases without committing, so unacknowledged messages go to
/// the next subscriber of the group.
struct MemorySubscription {
    inner: Arc<Inner>,
    id: u64,
    topic: String,
    group: String,
}

impl MemorySubscription {
    fn try_claim(&self) -> BrokerResult<Option<Delivery>> {
        let mut state = self.inner.state();
        if state.closed {
            return Err(BrokerError::Closed);
        }
        let Some(log) = state.topics.get_mut(&self.topic) else {
            return Ok(None);
        };
        let lengths: Vec<usize> = log.partitions.iter().map(Vec::len).collect();
        let group = log.group(&self.group);

        let Some(partition) = (0..lengths.len()).find(|&p| {
            !group.leases.contains_key(&p) && (group.committed[p] as usize) < lengths[p]
        }) else {
            return Ok(None);
        };

        let offset = group.committed[partition];
        group.leases.insert(partition, self.id);
        let record = log.partitions[partition][offset as usize].clone();

        Ok(Some(Delivery {
            topic: self.topic.clone(),
            partition: partition as i32,
            offset,
            key: Some(record.key),
            payload: record.payload,
        }))
    }
}

#[async_trait]
impl Subscription for MemorySubscription {
    async fn next(&mut self, timeout: Duration) -> BrokerResult<Option<Delivery>> {
        let deadline = Instant::now() + timeout;
        loop {
            let notified = self.inner.notify.notified();
            tokio::pin!(notified);
            // Register before checking so a publish between the check and the wait is seen.
            notified.as_mut().enable();

            if let Some(delivery) = self.try_claim()? {
                return Ok(Some(delivery));
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return Ok(None);
            }
        }
    }

    async fn ack(&mut self, delivery: &Delivery) -> BrokerResult<()> {
        {
            let mut state = self.inner.state();
            let log = state.topics.get_mut(&delivery.topic).ok_or_else(|| {
                BrokerError::Transport(format!("unknown topic {}", delivery.topic))
            })?;
            let group = log.group(&self.group);
            let partition = delivery.partition as usize;
            if partition >= group.committed.len() {
                return Err(BrokerError::Transport(format!(
                    "unknown partition {}",
                    delivery.partition
                )));
            }
            if group.leases.get(&partition) == Some(&self.id) {
                group.leases.remove(&partition);
            }
            let next = delivery.offset + 1;
            if next > group.committed[partition] {
                group.committed[partition] = next;
            }
        }
        self.inner.notify.notify_waiters();
        Ok(())
    }
}

impl Drop for MemorySubscription {
    fn drop(&mut self) {
        let mut state = self.inner.state();
        if let Some(log) = state.topics.get_mut(&self.topic) {
            let id = self.id;
            log.group(&self.group).leases.retain(|_, holder| *holder != id);
        }
        drop(state);
        self.inner.notify.notify_waiters();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SHORT: Duration = Duration::from_millis(50);

    #[tokio::test]
    async fn same_key_is_delivered_in_order() {
        let broker = MemoryBroker::new();
        for i in 0..10u8 {
            broker.publish("chunk", b"upload-a", &[i]).await.unwrap();
        }

        let mut sub = broker.subscribe("chunk", "g").await.unwrap();
        for i in 0..10u8 {
            let delivery = sub.next(SHORT).await.unwrap().unwrap();
            assert_eq!(delivery.payload, vec![i]);
            assert_eq!(delivery.key.as_deref(), Some(&b"upload-a"[..]));
            sub.ack(&delivery).await.unwrap();
        }
        assert!(sub.next(SHORT).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn unacked_partition_is_not_handed_to_another_subscriber() {
        let broker = MemoryBroker::with_partitions(1);
        broker.publish("t", b"k", b"first").await.unwrap();
        broker.publish("t", b"k", b"second").await.unwrap();

        let mut a = broker.subscribe("t", "g").await.unwrap();
        let mut b = broker.subscribe("t", "g").await.unwrap();

        let first = a.next(SHORT).await.unwrap().unwrap();
        assert_eq!(first.payload, b"first");
        assert!(b.next(SHORT).await.unwrap().is_none());

        a.ack(&first).await.unwrap();
        let second = b.next(SHORT).await.unwrap().unwrap();
        assert_eq!(second.payload, b"second");
    }

    #[tokio::test]
    async fn dropped_subscriber_leaves_message_for_redelivery() {
        let broker = MemoryBroker::with_partitions(1);
        broker.publish("t", b"k", b"payload").await.unwrap();

        let mut first = broker.subscribe("t", "g").await.unwrap();
        let delivery = first.next(SHORT).await.unwrap().unwrap();
        drop(first);

        let mut second = broker.subscribe("t", "g").await.unwrap();
        let again = second.next(SHORT).await.unwrap().unwrap();
        assert_eq!(again.offset, delivery.offset);
        assert_eq!(again.payload, b"payload");
    }

    #[tokio::test]
    async fn groups_have_independent_offsets() {
        let broker = MemoryBroker::new();
        broker.publish("t", b"k", b"x").await.unwrap();

        let mut a = broker.subscribe("t", "one").await.unwrap();
        let delivery = a.next(SHORT).await.unwrap().unwrap();
        a.ack(&delivery).await.unwrap();
        assert_eq!(broker.lag("t", "one"), 0);

        let mut b = broker.subscribe("t", "two").await.unwrap();
        assert!(b.next(SHORT).await.unwrap().is_some());
        assert_eq!(broker.lag("t", "two"), 1);
    }

    #[tokio::test]
    async fn waiting_reader_wakes_on_publish() {
        let broker = MemoryBroker::new();
        let mut sub = broker.subscribe("t", "g").await.unwrap();

        let publisher = broker.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            publisher.publish("t", b"k", b"late").await.unwrap();
        });

        let delivery = sub.next(Duration::from_secs(5)).await.unwrap().unwrap();
        assert_eq!(delivery.payload, b"late");
    }

    #[tokio::test]
    async fn closed_broker_fails_reads() {
        let broker = MemoryBroker::new();
        let mut sub = broker.subscribe("t", "g").await.unwrap();
        broker.close();
        assert!(matches!(sub.next(SHORT).await, Err(BrokerError::Closed)));
        assert!(matches!(
            broker.publish("t", b"k", b"x").await,
            Err(BrokerError::Closed)
        ));
    }
}
