use pubq_core::{KeyLayout, MsgId};
use pubq_store::{Store, WriteMode};
use tracing::debug;

use crate::error::{TxError, TxResult};
use crate::txn::Txn;

/// Store keys touched by [`reject`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RejectKeys {
    pub queue: String,
    pub in_flight_ids: String,
    pub in_flight_data: String,
}

impl RejectKeys {
    pub fn from_layout(layout: &KeyLayout, consumer: &str) -> Self {
        Self {
            queue: layout.consumer_queue(consumer),
            in_flight_ids: layout.consumer_in_flight_ids(consumer),
            in_flight_data: layout.consumer_in_flight_data(consumer),
        }
    }
}

/// Returns leased messages to the head of the consumer queue for redelivery.
///
/// Only identifiers currently in flight are requeued; the count of requeued
/// messages is returned. The unacked counter is never touched. Leaving the
/// in-flight set and re-entering the queue must both succeed; dropping the
/// lease time is best-effort.
pub fn reject<S: Store>(store: &S, keys: &RejectKeys, ids: &[MsgId]) -> TxResult<usize> {
    if ids.is_empty() {
        return Ok(0);
    }

    store.atomically(|ops| {
        let mut txn = Txn::new(ops, "reject");
        let mut requeued = 0;
        for id in ids {
            txn.hdel(WriteMode::BestEffort, &keys.in_flight_data, id.as_str())?;
            let was_in_flight = txn.srem(WriteMode::MustSucceed, &keys.in_flight_ids, id)?;
            if was_in_flight != Some(true) {
                debug!(queue = %keys.queue, id = %id, "reject ignored for message not in flight");
                continue;
            }
            txn.lpush(WriteMode::MustSucceed, &keys.queue, id)?;
            requeued += 1;
        }
        Ok::<_, TxError>(requeued)
    })
}
