//! Read-only views over broker state for operators and tests.

use pubq_core::{KeyLayout, MsgId, Timestamp};
use pubq_store::{Store, StoreError};

use crate::error::TxResult;

/// Global records held for one message.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessageRecord {
    pub body: Option<Vec<u8>>,
    pub expire_at: Option<Timestamp>,
    /// Deliveries still waiting for an ack.
    pub unacked: Option<i64>,
}

impl MessageRecord {
    /// True once body, expiry, and counter are all gone.
    pub fn is_collected(&self) -> bool {
        self.body.is_none() && self.expire_at.is_none() && self.unacked.is_none()
    }
}

/// Per-consumer structure sizes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConsumerDepth {
    pub queued: usize,
    pub in_flight: usize,
    pub tracked: usize,
}

fn timestamp(raw: Option<Vec<u8>>) -> Option<Timestamp> {
    raw.map(|raw| Timestamp::new(String::from_utf8_lossy(&raw)))
}

pub fn message_record<S: Store>(store: &S, layout: &KeyLayout, id: &MsgId) -> TxResult<MessageRecord> {
    let record = store.atomically(|ops| -> Result<_, StoreError> {
        let body = ops.hget(&layout.message_bodies(), id.as_str())?;
        let expire_at = timestamp(ops.hget(&layout.message_expiries(), id.as_str())?);
        let unacked = ops
            .hget(&layout.unacked_counter(), id.as_str())?
            .and_then(|raw| String::from_utf8(raw).ok())
            .and_then(|text| text.parse::<i64>().ok());
        Ok(MessageRecord {
            body,
            expire_at,
            unacked,
        })
    })?;
    Ok(record)
}

pub fn consumer_depth<S: Store>(store: &S, layout: &KeyLayout, consumer: &str) -> TxResult<ConsumerDepth> {
    let depth = store.atomically(|ops| -> Result<_, StoreError> {
        Ok(ConsumerDepth {
            queued: ops.llen(&layout.consumer_queue(consumer))?,
            in_flight: ops.smembers(&layout.consumer_in_flight_ids(consumer))?.len(),
            tracked: ops.llen(&layout.consumer_tracking(consumer))?,
        })
    })?;
    Ok(depth)
}

pub fn backlog_len<S: Store>(store: &S, layout: &KeyLayout, topic: &str) -> TxResult<usize> {
    Ok(store.atomically(|ops| ops.zcard(&layout.topic_backlog(topic)))?)
}

pub fn topic_last_published<S: Store>(
    store: &S,
    layout: &KeyLayout,
    topic: &str,
) -> TxResult<Option<Timestamp>> {
    let raw = store.atomically(|ops| ops.hget(&layout.topic_last_publish(), topic))?;
    Ok(timestamp(raw))
}

pub fn producer_last_seen<S: Store>(
    store: &S,
    layout: &KeyLayout,
    producer: &str,
) -> TxResult<Option<Timestamp>> {
    let raw = store.atomically(|ops| ops.hget(&layout.producer_last_seen(), producer))?;
    Ok(timestamp(raw))
}
