use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, Weak};

use async_trait::async_trait;
use rdkafka::consumer::{Consumer, StreamConsumer};
use rdkafka::error::KafkaError;
use rdkafka::Message;
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::KafkaConsumerConfig;

#[derive(Error, Debug)]
pub enum SubscriberError {
    #[error("kafka error: {0}")]
    Kafka(#[from] KafkaError),
}

/// The run loop's view of the bus. `Subscriber` is the real implementation;
/// tests substitute fakes.
#[async_trait]
pub trait BusSubscriber: Send + Sync {
    async fn recv(&self) -> Result<Delivery, SubscriberError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SettleState {
    InFlight,
    Acked,
    Nacked,
}

/// Per-partition settlement bookkeeping for concurrent handlers.
///
/// Handlers settle out of order, but an offset may only be stored once every
/// earlier delivery on its partition has been acked. A nacked delivery pins
/// the stored position: later acks are remembered but never committed past
/// it, so after a restart or rebalance the bus redelivers from the nacked
/// message onward (replayed acked messages are duplicates the warehouse
/// tolerates).
#[derive(Default)]
struct OffsetTracker {
    partitions: Mutex<HashMap<i32, BTreeMap<i64, SettleState>>>,
}

impl OffsetTracker {
    fn track(&self, partition: i32, offset: i64) {
        let Ok(mut partitions) = self.partitions.lock() else {
            warn!("poisoned offset tracker mutex");
            return;
        };
        partitions
            .entry(partition)
            .or_default()
            .insert(offset, SettleState::InFlight);
    }

    /// Marks the delivery acked. Returns the newest offset that became safe
    /// to store, if the contiguous acked prefix advanced.
    fn ack(&self, partition: i32, offset: i64) -> Option<i64> {
        let Ok(mut partitions) = self.partitions.lock() else {
            warn!("poisoned offset tracker mutex");
            return None;
        };
        let pending = partitions.get_mut(&partition)?;
        if let Some(state) = pending.get_mut(&offset) {
            *state = SettleState::Acked;
        }

        let mut storable = None;
        while let Some((&front, &state)) = pending.first_key_value() {
            if state != SettleState::Acked {
                break;
            }
            pending.remove(&front);
            storable = Some(front);
        }
        storable
    }

    fn nack(&self, partition: i32, offset: i64) {
        let Ok(mut partitions) = self.partitions.lock() else {
            warn!("poisoned offset tracker mutex");
            return;
        };
        if let Some(state) = partitions
            .get_mut(&partition)
            .and_then(|pending| pending.get_mut(&offset))
        {
            *state = SettleState::Nacked;
        }
    }
}

/// Pull-style subscription to the carts topic with manual acknowledgment.
///
/// Auto offset store is disabled: an offset is only stored when the
/// delivery and every delivery before it on the partition are acked, so
/// unacked messages are redelivered by the bus after a restart or
/// rebalance. Local redelivery is intentionally not attempted.
#[derive(Clone)]
pub struct Subscriber {
    inner: Arc<Inner>,
}

struct Inner {
    consumer: StreamConsumer,
    topic: String,
    tracker: OffsetTracker,
}

impl Subscriber {
    pub fn new(config: &KafkaConsumerConfig) -> Result<Self, KafkaError> {
        let consumer: StreamConsumer = rdkafka::ClientConfig::from(config).create()?;
        consumer.subscribe(&[config.kafka_topic.as_str()])?;

        Ok(Self {
            inner: Arc::new(Inner {
                consumer,
                topic: config.kafka_topic.clone(),
                tracker: OffsetTracker::default(),
            }),
        })
    }
}

#[async_trait]
impl BusSubscriber for Subscriber {
    /// Wait for the next message on the subscription.
    async fn recv(&self) -> Result<Delivery, SubscriberError> {
        let message = self.inner.consumer.recv().await?;
        self.inner
            .tracker
            .track(message.partition(), message.offset());

        Ok(Delivery {
            payload: message.payload().map(<[u8]>::to_vec).unwrap_or_default(),
            partition: message.partition(),
            offset: message.offset(),
            handle: Arc::downgrade(&self.inner),
        })
    }
}

/// One received message plus the handle needed to settle it. Must be
/// settled exactly once, by `ack` or `nack`.
pub struct Delivery {
    payload: Vec<u8>,
    partition: i32,
    offset: i64,
    handle: Weak<Inner>,
}

impl Delivery {
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Positively acknowledge. The offset is stored once its contiguous
    /// acked prefix is complete, so the bus will not redeliver it to the
    /// group.
    pub fn ack(self) {
        let Some(inner) = self.handle.upgrade() else {
            warn!("subscriber gone, cannot store offset");
            return;
        };
        let Some(storable) = inner.tracker.ack(self.partition, self.offset) else {
            // An earlier delivery on this partition is unsettled or nacked
            return;
        };
        if let Err(e) = inner
            .consumer
            .store_offset(&inner.topic, self.partition, storable)
        {
            warn!(
                partition = self.partition,
                offset = storable,
                "failed to store offset: {}",
                e
            );
        }
    }

    /// Negatively acknowledge: leave the offset unstored and let the bus's
    /// own redelivery policy pick the message up again.
    pub fn nack(self) {
        metrics::counter!("carts_events_nacked_total").increment(1);
        if let Some(inner) = self.handle.upgrade() {
            inner.tracker.nack(self.partition, self.offset);
        }
        debug!(
            partition = self.partition,
            offset = self.offset,
            "message nacked, leaving redelivery to the bus"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn in_order_acks_store_each_offset() {
        let tracker = OffsetTracker::default();
        tracker.track(0, 5);
        tracker.track(0, 6);

        assert_eq!(tracker.ack(0, 5), Some(5));
        assert_eq!(tracker.ack(0, 6), Some(6));
    }

    #[test]
    fn out_of_order_ack_waits_for_the_prefix() {
        let tracker = OffsetTracker::default();
        tracker.track(0, 5);
        tracker.track(0, 6);

        // 6 settles first while 5 is in flight: nothing is safe to store yet
        assert_eq!(tracker.ack(0, 6), None);
        assert_eq!(tracker.ack(0, 5), Some(6));
    }

    #[test]
    fn nack_pins_the_stored_position() {
        let tracker = OffsetTracker::default();
        tracker.track(0, 5);
        tracker.track(0, 6);
        tracker.track(0, 7);

        tracker.nack(0, 6);
        assert_eq!(tracker.ack(0, 5), Some(5));
        // a concurrent later ack never moves the position past the nack
        assert_eq!(tracker.ack(0, 7), None);
    }

    #[test]
    fn partitions_are_tracked_independently() {
        let tracker = OffsetTracker::default();
        tracker.track(0, 5);
        tracker.track(1, 9);

        assert_eq!(tracker.ack(1, 9), Some(9));
        assert_eq!(tracker.ack(0, 5), Some(5));
    }
}
