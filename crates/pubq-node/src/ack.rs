use pubq_core::{KeyLayout, MsgId};
use pubq_store::{Store, WriteMode};
use tracing::debug;

use crate::error::{TxError, TxResult};
use crate::txn::Txn;

/// Store keys touched by [`ack`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AckKeys {
    pub in_flight_ids: String,
    pub in_flight_data: String,
    pub unacked: String,
    pub bodies: String,
    pub expiries: String,
}

impl AckKeys {
    pub fn from_layout(layout: &KeyLayout, consumer: &str) -> Self {
        Self {
            in_flight_ids: layout.consumer_in_flight_ids(consumer),
            in_flight_data: layout.consumer_in_flight_data(consumer),
            unacked: layout.unacked_counter(),
            bodies: layout.message_bodies(),
            expiries: layout.message_expiries(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AckOutcome {
    /// Identifiers whose pending delivery was settled by this call.
    pub acked: Vec<MsgId>,
    /// Identifiers whose last pending delivery was settled; body, expiry,
    /// and counter were deleted.
    pub collected: Vec<MsgId>,
}

/// Acknowledges leased messages for one consumer.
///
/// Each identifier leaves the in-flight set and lease-time map, then the
/// global unacked counter is decremented. When it reaches zero the message
/// body, expiry, and counter are deleted. Identifiers that are not in flight
/// leave the counter alone. Every write is best-effort.
pub fn ack<S: Store>(store: &S, keys: &AckKeys, ids: &[MsgId]) -> TxResult<AckOutcome> {
    if ids.is_empty() {
        return Ok(AckOutcome::default());
    }

    store.atomically(|ops| {
        let mut txn = Txn::new(ops, "ack");
        let mut outcome = AckOutcome::default();

        for id in ids {
            let was_in_flight = txn.srem(WriteMode::BestEffort, &keys.in_flight_ids, id)?;
            txn.hdel(WriteMode::BestEffort, &keys.in_flight_data, id.as_str())?;
            if was_in_flight == Some(false) {
                debug!(id = %id, "ack ignored for message not in flight");
                continue;
            }

            let Some(remaining) = txn.hincrby(WriteMode::BestEffort, &keys.unacked, id, -1)? else {
                // Counter state unknown; a later sweep reconciles the message.
                continue;
            };
            outcome.acked.push(id.clone());

            if remaining == 0 {
                txn.hdel(WriteMode::BestEffort, &keys.bodies, id.as_str())?;
                txn.hdel(WriteMode::BestEffort, &keys.expiries, id.as_str())?;
                txn.hdel(WriteMode::BestEffort, &keys.unacked, id.as_str())?;
                outcome.collected.push(id.clone());
            } else if remaining < 0 {
                // Already collected (e.g. swept); drop the stray counter.
                txn.hdel(WriteMode::BestEffort, &keys.unacked, id.as_str())?;
            }
        }

        debug!(
            acked = outcome.acked.len(),
            collected = outcome.collected.len(),
            "acknowledged messages"
        );
        Ok::<_, TxError>(outcome)
    })
}
