use pubq_core::{KeyLayout, MsgId, Timestamp};
use pubq_store::{Store, WriteMode};
use tracing::{debug, warn};

use crate::error::{TxError, TxResult};
use crate::txn::{stored_ids, Txn};

/// Identifiers examined per sweep call unless configured otherwise.
pub const DEFAULT_SWEEP_BATCH: usize = 500;

/// Store keys touched by [`sweep_expired`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SweepKeys {
    /// Caller-maintained list of every identifier routed to the consumer.
    pub tracking: String,
    pub in_flight_ids: String,
    pub bodies: String,
    pub expiries: String,
    pub unacked: String,
}

impl SweepKeys {
    pub fn from_layout(layout: &KeyLayout, consumer: &str) -> Self {
        Self {
            tracking: layout.consumer_tracking(consumer),
            in_flight_ids: layout.consumer_in_flight_ids(consumer),
            bodies: layout.message_bodies(),
            expiries: layout.message_expiries(),
            unacked: layout.unacked_counter(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SweepArgs {
    /// Current time in the same fixed-width encoding as stored expiries.
    pub now: Timestamp,
    pub batch_size: usize,
}

/// Deletes expired messages tracked for one consumer and returns their ids.
///
/// Scans up to `batch_size` identifiers from the tracking list. Identifiers
/// in the consumer's in-flight set are skipped whatever their expiry. The
/// others are compared against `now` as strings; expired ones leave the
/// tracking list and lose their body, expiry, and counter. Tracking entries
/// whose expiry is already gone are dropped without being reported. Every
/// step is best-effort per identifier.
pub fn sweep_expired<S: Store>(
    store: &S,
    keys: &SweepKeys,
    args: &SweepArgs,
) -> TxResult<Vec<MsgId>> {
    store.atomically(|ops| {
        let mut txn = Txn::new(ops, "sweep");
        let ids = stored_ids(txn.reader().lrange(&keys.tracking, args.batch_size)?);
        let mut expired = Vec::new();

        for id in ids {
            let in_flight = txn.reader().sismember(&keys.in_flight_ids, id.as_str());
            match in_flight {
                Ok(true) => continue,
                Ok(false) => {}
                Err(error) => {
                    warn!(id = %id, error = %error, "in-flight check failed, skipping");
                    continue;
                }
            }

            let lookup = txn.reader().hget(&keys.expiries, id.as_str());
            let expire_at = match lookup {
                Ok(Some(raw)) => Timestamp::new(String::from_utf8_lossy(&raw)),
                Ok(None) => {
                    debug!(id = %id, "dropping tracking entry of collected message");
                    txn.lrem(WriteMode::BestEffort, &keys.tracking, &id)?;
                    continue;
                }
                Err(error) => {
                    warn!(id = %id, error = %error, "expiry lookup failed, skipping");
                    continue;
                }
            };
            if !expire_at.is_past(&args.now) {
                continue;
            }

            txn.lrem(WriteMode::BestEffort, &keys.tracking, &id)?;
            txn.hdel(WriteMode::BestEffort, &keys.bodies, id.as_str())?;
            txn.hdel(WriteMode::BestEffort, &keys.expiries, id.as_str())?;
            txn.hdel(WriteMode::BestEffort, &keys.unacked, id.as_str())?;
            expired.push(id);
        }

        if !expired.is_empty() {
            debug!(tracking = %keys.tracking, expired = expired.len(), "swept expired messages");
        }
        Ok::<_, TxError>(expired)
    })
}

#[cfg(test)]
mod tests {
    use pubq_core::{KeyLayout, MsgId, Timestamp};
    use pubq_store::{MemoryStore, Store, StoreError, WriteOp};

    use super::{sweep_expired, SweepArgs, SweepKeys, DEFAULT_SWEEP_BATCH};

    fn id(raw: &str) -> MsgId {
        MsgId::parse(raw).expect("valid id")
    }

    fn seed(store: &MemoryStore, keys: &SweepKeys, msg: &str, expire_at: &str) {
        store
            .atomically(|ops| -> Result<(), StoreError> {
                ops.rpush(&keys.tracking, msg)?;
                ops.hset(&keys.bodies, msg, b"payload")?;
                ops.hset(&keys.expiries, msg, expire_at.as_bytes())?;
                ops.hincrby(&keys.unacked, msg, 1)?;
                Ok(())
            })
            .expect("seed should succeed");
    }

    fn args(now: &str) -> SweepArgs {
        SweepArgs {
            now: Timestamp::new(now),
            batch_size: DEFAULT_SWEEP_BATCH,
        }
    }

    #[test]
    fn expired_message_is_deleted_and_reported_once() {
        let store = MemoryStore::new();
        let keys = SweepKeys::from_layout(&KeyLayout::default(), "c1");
        seed(&store, &keys, "old", "2020-01-01T00:00:00.000000");
        seed(&store, &keys, "fresh", "2099-01-01T00:00:00.000000");

        let now = "2024-05-01T10:00:00.000000";
        let expired = sweep_expired(&store, &keys, &args(now)).expect("sweep");
        assert_eq!(expired, vec![id("old")]);
        assert!(sweep_expired(&store, &keys, &args(now)).expect("sweep").is_empty());

        let (tracking, old_body, fresh_body, old_counter) = store
            .atomically(|ops| -> Result<_, StoreError> {
                Ok((
                    ops.lrange(&keys.tracking, 10)?,
                    ops.hget(&keys.bodies, "old")?,
                    ops.hget(&keys.bodies, "fresh")?,
                    ops.hget(&keys.unacked, "old")?,
                ))
            })
            .expect("reads should succeed");
        assert_eq!(tracking, vec!["fresh"]);
        assert!(old_body.is_none());
        assert!(fresh_body.is_some());
        assert!(old_counter.is_none());
    }

    #[test]
    fn in_flight_messages_are_never_swept() {
        let store = MemoryStore::new();
        let keys = SweepKeys::from_layout(&KeyLayout::default(), "c1");
        seed(&store, &keys, "m1", "2000-01-01T00:00:00.000000");
        store
            .atomically(|ops| ops.sadd(&keys.in_flight_ids, "m1"))
            .expect("seed should succeed");

        let expired = sweep_expired(&store, &keys, &args("2024-05-01T10:00:00.000000"))
            .expect("sweep");
        assert!(expired.is_empty());
        let body = store
            .atomically(|ops| ops.hget(&keys.bodies, "m1"))
            .expect("read should succeed");
        assert!(body.is_some());
    }

    #[test]
    fn expiry_equal_to_now_is_not_expired() {
        let store = MemoryStore::new();
        let keys = SweepKeys::from_layout(&KeyLayout::default(), "c1");
        seed(&store, &keys, "m1", "2024-05-01T10:00:00.000000");

        let expired = sweep_expired(&store, &keys, &args("2024-05-01T10:00:00.000000"))
            .expect("sweep");
        assert!(expired.is_empty());
    }

    #[test]
    fn tracking_entry_without_expiry_is_dropped_silently() {
        let store = MemoryStore::new();
        let keys = SweepKeys::from_layout(&KeyLayout::default(), "c1");
        store
            .atomically(|ops| ops.rpush(&keys.tracking, "acked-already"))
            .expect("seed should succeed");

        let expired = sweep_expired(&store, &keys, &args("2024-05-01T10:00:00.000000"))
            .expect("sweep");
        assert!(expired.is_empty());
        assert_eq!(store.key_count(), 0);
    }

    #[test]
    fn batch_size_bounds_the_scan() {
        let store = MemoryStore::new();
        let keys = SweepKeys::from_layout(&KeyLayout::default(), "c1");
        for n in 0..5 {
            seed(&store, &keys, &format!("m{n}"), "2000-01-01T00:00:00.000000");
        }
        let bounded = SweepArgs {
            batch_size: 2,
            ..args("2024-05-01T10:00:00.000000")
        };
        assert_eq!(sweep_expired(&store, &keys, &bounded).expect("sweep").len(), 2);
        assert_eq!(sweep_expired(&store, &keys, &bounded).expect("sweep").len(), 2);
        assert_eq!(sweep_expired(&store, &keys, &bounded).expect("sweep").len(), 1);
    }

    #[test]
    fn cleanup_failure_does_not_block_the_batch() {
        let store = MemoryStore::new();
        let keys = SweepKeys::from_layout(&KeyLayout::default(), "c1");
        seed(&store, &keys, "m1", "2000-01-01T00:00:00.000000");
        seed(&store, &keys, "m2", "2000-01-01T00:00:00.000000");
        store.fail_writes(WriteOp::HDel, keys.bodies.clone());

        let expired = sweep_expired(&store, &keys, &args("2024-05-01T10:00:00.000000"))
            .expect("sweep is best-effort");
        assert_eq!(expired, vec![id("m1"), id("m2")]);
        let tracking = store
            .atomically(|ops| ops.llen(&keys.tracking))
            .expect("read should succeed");
        assert_eq!(tracking, 0);
    }
}
