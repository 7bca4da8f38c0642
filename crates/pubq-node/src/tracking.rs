use pubq_core::{KeyLayout, MsgId};
use pubq_store::{Store, WriteMode};
use tracing::debug;

use crate::error::{TxError, TxResult};
use crate::txn::Txn;

/// Appends delivered identifiers to a consumer's tracking list.
///
/// Expiry sweeps only see what is tracked, so whoever routes messages to a
/// consumer calls this after dispatch.
pub fn track_delivered<S: Store>(store: &S, tracking: &str, ids: &[MsgId]) -> TxResult<usize> {
    if ids.is_empty() {
        return Ok(0);
    }
    store.atomically(|ops| {
        let mut txn = Txn::new(ops, "track");
        for id in ids {
            txn.rpush(WriteMode::MustSucceed, tracking, id)?;
        }
        Ok::<_, TxError>(ids.len())
    })
}

/// Store keys touched by [`purge`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PurgeKeys {
    pub queue: String,
    pub tracking: String,
    pub in_flight_ids: String,
}

impl PurgeKeys {
    pub fn from_layout(layout: &KeyLayout, consumer: &str) -> Self {
        Self {
            queue: layout.consumer_queue(consumer),
            tracking: layout.consumer_tracking(consumer),
            in_flight_ids: layout.consumer_in_flight_ids(consumer),
        }
    }
}

/// Removes identifiers collected elsewhere (typically by another consumer's
/// expiry sweep) from this consumer's pull queue and tracking list.
///
/// In-flight identifiers are left alone; they settle through ack or reject.
/// Returns how many identifiers were removed from at least one structure.
pub fn purge<S: Store>(store: &S, keys: &PurgeKeys, ids: &[MsgId]) -> TxResult<usize> {
    if ids.is_empty() {
        return Ok(0);
    }
    store.atomically(|ops| {
        let mut txn = Txn::new(ops, "purge");
        let mut purged = 0;
        for id in ids {
            if txn.reader().sismember(&keys.in_flight_ids, id.as_str())? {
                continue;
            }
            let from_queue = txn.lrem(WriteMode::BestEffort, &keys.queue, id)?;
            let from_tracking = txn.lrem(WriteMode::BestEffort, &keys.tracking, id)?;
            if from_queue.unwrap_or(0) + from_tracking.unwrap_or(0) > 0 {
                purged += 1;
            }
        }
        debug!(queue = %keys.queue, purged, "purged collected messages");
        Ok::<_, TxError>(purged)
    })
}
