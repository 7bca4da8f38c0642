use pubq_core::{KeyLayout, MsgId, Timestamp};
use pubq_store::{Store, WriteMode};
use tracing::debug;

use crate::error::{TxError, TxResult};
use crate::txn::{stored_ids, Txn};

/// Store keys touched by [`lease`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeaseKeys {
    pub queue: String,
    pub in_flight_ids: String,
    pub in_flight_data: String,
    pub bodies: String,
}

impl LeaseKeys {
    pub fn from_layout(layout: &KeyLayout, consumer: &str) -> Self {
        Self {
            queue: layout.consumer_queue(consumer),
            in_flight_ids: layout.consumer_in_flight_ids(consumer),
            in_flight_data: layout.consumer_in_flight_data(consumer),
            bodies: layout.message_bodies(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct LeaseArgs {
    pub max_batch_size: usize,
    /// Recorded as the lease time of every returned message.
    pub now: Timestamp,
}

/// A message handed to a consumer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Leased {
    pub id: MsgId,
    /// `None` when the body was already collected, e.g. by an expiry sweep.
    pub payload: Option<Vec<u8>>,
}

/// Moves up to `max_batch_size` messages from the head of a consumer queue
/// into its in-flight set and returns them with their payloads.
///
/// Every returned identifier is out of the queue and in the in-flight set
/// when the transaction commits; both writes must succeed. The lease time is
/// best-effort. An empty queue yields an empty batch.
pub fn lease<S: Store>(store: &S, keys: &LeaseKeys, args: &LeaseArgs) -> TxResult<Vec<Leased>> {
    if args.max_batch_size == 0 {
        return Ok(Vec::new());
    }

    store.atomically(|ops| {
        let mut txn = Txn::new(ops, "lease");
        let ids = stored_ids(txn.reader().lrange(&keys.queue, args.max_batch_size)?);
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let fields: Vec<&str> = ids.iter().map(MsgId::as_str).collect();
        let payloads = txn.reader().hmget(&keys.bodies, &fields)?;

        for id in &ids {
            txn.sadd(WriteMode::MustSucceed, &keys.in_flight_ids, id)?;
            txn.hset(
                WriteMode::BestEffort,
                &keys.in_flight_data,
                id.as_str(),
                args.now.as_str().as_bytes(),
            )?;
            txn.lrem(WriteMode::MustSucceed, &keys.queue, id)?;
        }

        debug!(queue = %keys.queue, leased = ids.len(), "leased messages");
        Ok::<_, TxError>(
            ids.iter()
                .cloned()
                .zip(payloads)
                .map(|(id, payload)| Leased { id, payload })
                .collect(),
        )
    })
}

#[cfg(test)]
mod tests {
    use pubq_core::{KeyLayout, MsgId, Timestamp};
    use pubq_store::{MemoryStore, Store, StoreError, WriteOp};

    use super::{lease, LeaseArgs, LeaseKeys};

    fn seed(store: &MemoryStore, keys: &LeaseKeys, ids: &[&str]) {
        store
            .atomically(|ops| -> Result<(), StoreError> {
                for id in ids {
                    ops.rpush(&keys.queue, id)?;
                    ops.hset(&keys.bodies, id, format!("body-{id}").as_bytes())?;
                }
                Ok(())
            })
            .expect("seed should succeed");
    }

    fn args(max_batch_size: usize) -> LeaseArgs {
        LeaseArgs {
            max_batch_size,
            now: Timestamp::new("2024-05-01T10:00:00.000000"),
        }
    }

    #[test]
    fn lease_moves_head_batch_in_flight() {
        let store = MemoryStore::new();
        let keys = LeaseKeys::from_layout(&KeyLayout::default(), "c1");
        seed(&store, &keys, &["m1", "m2", "m3"]);

        let leased = lease(&store, &keys, &args(2)).expect("lease should succeed");
        let ids: Vec<_> = leased.iter().map(|l| l.id.as_str()).collect();
        assert_eq!(ids, vec!["m1", "m2"]);
        assert_eq!(leased[0].payload, Some(b"body-m1".to_vec()));

        let (queue, in_flight, lease_time) = store
            .atomically(|ops| -> Result<_, StoreError> {
                Ok((
                    ops.lrange(&keys.queue, 10)?,
                    ops.smembers(&keys.in_flight_ids)?,
                    ops.hget(&keys.in_flight_data, "m2")?,
                ))
            })
            .expect("reads should succeed");
        assert_eq!(queue, vec!["m3"]);
        assert_eq!(in_flight, vec!["m1", "m2"]);
        assert_eq!(lease_time, Some(b"2024-05-01T10:00:00.000000".to_vec()));
    }

    #[test]
    fn empty_queue_returns_nothing() {
        let store = MemoryStore::new();
        let keys = LeaseKeys::from_layout(&KeyLayout::default(), "c1");
        assert!(lease(&store, &keys, &args(10)).expect("lease").is_empty());
        assert!(lease(&store, &keys, &args(0)).expect("lease").is_empty());
    }

    #[test]
    fn missing_body_is_returned_as_none() {
        let store = MemoryStore::new();
        let keys = LeaseKeys::from_layout(&KeyLayout::default(), "c1");
        store
            .atomically(|ops| ops.rpush(&keys.queue, "gone"))
            .expect("seed should succeed");

        let leased = lease(&store, &keys, &args(10)).expect("lease should succeed");
        assert_eq!(leased.len(), 1);
        assert_eq!(leased[0].id, MsgId::parse("gone").expect("valid id"));
        assert!(leased[0].payload.is_none());
    }

    #[test]
    fn duplicate_queue_entries_lease_once() {
        let store = MemoryStore::new();
        let keys = LeaseKeys::from_layout(&KeyLayout::default(), "c1");
        seed(&store, &keys, &["m1", "m2", "m1"]);

        let leased = lease(&store, &keys, &args(10)).expect("lease should succeed");
        let ids: Vec<_> = leased.iter().map(|l| l.id.as_str()).collect();
        assert_eq!(ids, vec!["m1", "m2"]);
    }

    #[test]
    fn failed_in_flight_insert_leaves_queue_untouched() {
        let store = MemoryStore::new();
        let keys = LeaseKeys::from_layout(&KeyLayout::default(), "c1");
        seed(&store, &keys, &["m1", "m2"]);
        store.fail_writes(WriteOp::SAdd, keys.in_flight_ids.clone());

        let err = lease(&store, &keys, &args(10)).expect_err("critical write fails");
        assert!(err.is_critical());
        let queue = store
            .atomically(|ops| ops.lrange(&keys.queue, 10))
            .expect("read should succeed");
        assert_eq!(queue, vec!["m1", "m2"]);
    }

    #[test]
    fn lease_time_failure_still_leases() {
        let store = MemoryStore::new();
        let keys = LeaseKeys::from_layout(&KeyLayout::default(), "c1");
        seed(&store, &keys, &["m1"]);
        store.fail_writes(WriteOp::HSet, keys.in_flight_data.clone());

        let leased = lease(&store, &keys, &args(10)).expect("lease time is best-effort");
        assert_eq!(leased.len(), 1);
    }
}
