use pubq_core::{KeyLayout, MsgId, Score, Timestamp};
use pubq_store::Store;
use tracing::warn;

use crate::ack::{ack, AckKeys, AckOutcome};
use crate::config::BrokerConfig;
use crate::dispatch::{dispatch, DispatchKeys, DispatchOutcome};
use crate::error::TxResult;
use crate::inspect::{self, ConsumerDepth, MessageRecord};
use crate::lease::{lease, LeaseKeys, Leased};
use crate::publish::{publish, PublishArgs, PublishKeys};
use crate::reclaim::reclaim_stale;
use crate::reject::{reject, RejectKeys};
use crate::sweep::{sweep_expired, SweepKeys};
use crate::tracking::{purge, track_delivered, PurgeKeys};

/// A message submitted by a producer.
#[derive(Debug, Clone)]
pub struct NewMessage {
    pub id: MsgId,
    pub score: Score,
    pub payload: Vec<u8>,
    pub expire_at: Timestamp,
}

/// Validates caller-supplied message identifiers.
pub fn parse_ids<I: AsRef<str>>(raw: &[I]) -> TxResult<Vec<MsgId>> {
    let ids = raw
        .iter()
        .map(|id| MsgId::parse(id.as_ref()))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(ids)
}

/// Stateful facade naming topics and consumers instead of raw keys.
///
/// Owns the store handle, config, and key layout, and keeps consumer
/// tracking lists populated on dispatch so expiry sweeps see every
/// delivered message.
pub struct Broker<S: Store> {
    store: S,
    config: BrokerConfig,
    layout: KeyLayout,
}

impl<S: Store> Broker<S> {
    pub fn new(store: S, config: BrokerConfig) -> Self {
        let layout = config.layout();
        Self {
            store,
            config,
            layout,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn config(&self) -> &BrokerConfig {
        &self.config
    }

    pub fn layout(&self) -> &KeyLayout {
        &self.layout
    }

    pub fn publish(
        &self,
        topic: &str,
        publisher: &str,
        message: NewMessage,
        now: &Timestamp,
    ) -> TxResult<MsgId> {
        let keys = PublishKeys::from_layout(&self.layout, topic);
        let id = message.id.clone();
        let args = PublishArgs {
            topic: topic.to_string(),
            id: message.id,
            score: message.score,
            payload: message.payload,
            expire_at: message.expire_at,
            publisher: publisher.to_string(),
            now: now.clone(),
        };
        publish(&self.store, &keys, &args)?;
        Ok(id)
    }

    /// Dispatches one backlog batch to `consumers` and tracks it for each.
    pub fn dispatch<C: AsRef<str>>(&self, topic: &str, consumers: &[C]) -> TxResult<DispatchOutcome> {
        let keys = DispatchKeys::from_layout(&self.layout, topic, consumers);
        let outcome = dispatch(&self.store, &keys, self.config.dispatch_args())?;
        if outcome.is_empty() {
            return Ok(outcome);
        }
        for (i, consumer) in consumers.iter().enumerate() {
            let name: &str = consumer.as_ref();
            if consumers[..i].iter().any(|seen| {
                let seen: &str = seen.as_ref();
                seen == name
            }) {
                continue;
            }
            let tracking = self.layout.consumer_tracking(name);
            // Delivery already committed; an untracked id only escapes sweeps.
            if let Err(error) = track_delivered(&self.store, &tracking, &outcome.ids) {
                warn!(consumer = name, %error, "failed to track dispatched messages");
            }
        }
        Ok(outcome)
    }

    pub fn lease(&self, consumer: &str, now: &Timestamp) -> TxResult<Vec<Leased>> {
        let keys = LeaseKeys::from_layout(&self.layout, consumer);
        lease(&self.store, &keys, &self.config.lease_args(now))
    }

    pub fn reject(&self, consumer: &str, ids: &[MsgId]) -> TxResult<usize> {
        reject(&self.store, &RejectKeys::from_layout(&self.layout, consumer), ids)
    }

    pub fn ack(&self, consumer: &str, ids: &[MsgId]) -> TxResult<AckOutcome> {
        ack(&self.store, &AckKeys::from_layout(&self.layout, consumer), ids)
    }

    pub fn sweep(&self, consumer: &str, now: &Timestamp) -> TxResult<Vec<MsgId>> {
        let keys = SweepKeys::from_layout(&self.layout, consumer);
        sweep_expired(&self.store, &keys, &self.config.sweep_args(now))
    }

    /// Sweeps `consumer`, then purges what expired from its own queue and
    /// from every peer's queue and tracking list.
    pub fn sweep_and_propagate<C: AsRef<str>>(
        &self,
        consumer: &str,
        peers: &[C],
        now: &Timestamp,
    ) -> TxResult<Vec<MsgId>> {
        let expired = self.sweep(consumer, now)?;
        if expired.is_empty() {
            return Ok(expired);
        }
        self.purge(consumer, &expired)?;
        for peer in peers {
            self.purge(peer.as_ref(), &expired)?;
        }
        Ok(expired)
    }

    pub fn purge(&self, consumer: &str, ids: &[MsgId]) -> TxResult<usize> {
        purge(&self.store, &PurgeKeys::from_layout(&self.layout, consumer), ids)
    }

    /// Rejects leases of `consumer` recorded before `cutoff`.
    pub fn reclaim(&self, consumer: &str, cutoff: &Timestamp) -> TxResult<Vec<MsgId>> {
        reclaim_stale(&self.store, &RejectKeys::from_layout(&self.layout, consumer), cutoff)
    }

    pub fn message(&self, id: &MsgId) -> TxResult<MessageRecord> {
        inspect::message_record(&self.store, &self.layout, id)
    }

    pub fn depth(&self, consumer: &str) -> TxResult<ConsumerDepth> {
        inspect::consumer_depth(&self.store, &self.layout, consumer)
    }

    pub fn backlog_len(&self, topic: &str) -> TxResult<usize> {
        inspect::backlog_len(&self.store, &self.layout, topic)
    }

    pub fn topic_last_published(&self, topic: &str) -> TxResult<Option<Timestamp>> {
        inspect::topic_last_published(&self.store, &self.layout, topic)
    }

    pub fn producer_last_seen(&self, producer: &str) -> TxResult<Option<Timestamp>> {
        inspect::producer_last_seen(&self.store, &self.layout, producer)
    }
}

#[cfg(test)]
mod tests {
    use pubq_core::{MsgId, Score, Timestamp};
    use pubq_store::{MemoryStore, WriteOp};

    use super::{parse_ids, Broker, NewMessage};
    use crate::config::BrokerConfig;
    use crate::error::TxError;

    fn message(id: &str, score: f64, expire_at: &str) -> NewMessage {
        NewMessage {
            id: MsgId::parse(id).expect("valid id"),
            score: Score(score),
            payload: id.as_bytes().to_vec(),
            expire_at: Timestamp::new(expire_at),
        }
    }

    fn now() -> Timestamp {
        Timestamp::new("2024-05-01T10:00:00.000000")
    }

    #[test]
    fn dispatch_tracks_for_every_consumer() {
        let broker = Broker::new(MemoryStore::new(), BrokerConfig::default());
        broker
            .publish("t", "p1", message("m1", 1.0, "2099-01-01T00:00:00"), &now())
            .expect("publish");
        broker.dispatch("t", &["c1", "c2"]).expect("dispatch");

        for consumer in ["c1", "c2"] {
            let depth = broker.depth(consumer).expect("depth");
            assert_eq!((depth.queued, depth.tracked), (1, 1));
        }
        assert_eq!(broker.backlog_len("t").expect("backlog"), 0);
        assert_eq!(broker.topic_last_published("t").expect("read"), Some(now()));
        assert_eq!(broker.producer_last_seen("p1").expect("read"), Some(now()));
    }

    #[test]
    fn tracking_failure_does_not_fail_dispatch() {
        let broker = Broker::new(MemoryStore::new(), BrokerConfig::default());
        broker
            .publish("t", "p1", message("m1", 1.0, "2099-01-01T00:00:00"), &now())
            .expect("publish");
        broker.store().fail_op(WriteOp::RPush);

        let outcome = broker.dispatch("t", &["c1"]).expect("dispatch");
        assert_eq!(outcome.ids.len(), 1);
        assert_eq!(broker.depth("c1").expect("depth").tracked, 0);
    }

    #[test]
    fn sweep_propagates_to_peers() {
        let broker = Broker::new(MemoryStore::new(), BrokerConfig::default());
        broker
            .publish("t", "p1", message("m1", 1.0, "2020-01-01T00:00:00.000000"), &now())
            .expect("publish");
        broker.dispatch("t", &["c1", "c2"]).expect("dispatch");

        let expired = broker
            .sweep_and_propagate("c1", &["c2"], &now())
            .expect("sweep");
        assert_eq!(expired.len(), 1);
        for consumer in ["c1", "c2"] {
            let depth = broker.depth(consumer).expect("depth");
            assert_eq!((depth.queued, depth.tracked), (0, 0));
        }
        assert!(broker.message(&expired[0]).expect("record").is_collected());
    }

    #[test]
    fn invalid_ids_surface_as_core_errors() {
        let ids = parse_ids(&["m1", "m2"]).expect("valid ids");
        assert_eq!(ids.len(), 2);

        let err = parse_ids(&["m1", ""]).expect_err("empty id");
        assert!(matches!(err, TxError::Core(_)));
        assert_eq!(err.to_string(), "invalid input: empty message id");
    }
}
