use pubq_core::{KeyLayout, MsgId, Score, Timestamp};
use pubq_store::{Store, WriteMode};
use tracing::debug;

use crate::error::{TxError, TxResult};
use crate::txn::Txn;

/// Store keys touched by [`publish`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishKeys {
    pub backlog: String,
    pub bodies: String,
    pub expiries: String,
    pub topic_last_publish: String,
    pub producer_last_seen: String,
}

impl PublishKeys {
    pub fn from_layout(layout: &KeyLayout, topic: &str) -> Self {
        Self {
            backlog: layout.topic_backlog(topic),
            bodies: layout.message_bodies(),
            expiries: layout.message_expiries(),
            topic_last_publish: layout.topic_last_publish(),
            producer_last_seen: layout.producer_last_seen(),
        }
    }
}

/// One message to publish.
#[derive(Debug, Clone)]
pub struct PublishArgs {
    pub topic: String,
    /// Caller-generated, unique identifier.
    pub id: MsgId,
    pub score: Score,
    pub payload: Vec<u8>,
    pub expire_at: Timestamp,
    pub publisher: String,
    pub now: Timestamp,
}

/// Inserts a message into its topic backlog and stores its body and expiry.
///
/// Backlog, body, and expiry writes must succeed or nothing is kept. The
/// topic last-publish and producer last-seen timestamps are best-effort.
pub fn publish<S: Store>(store: &S, keys: &PublishKeys, args: &PublishArgs) -> TxResult<()> {
    store.atomically(|ops| {
        let mut txn = Txn::new(ops, "publish");
        let id = &args.id;

        txn.zadd(WriteMode::MustSucceed, &keys.backlog, args.score, id)?;
        txn.hset(WriteMode::MustSucceed, &keys.bodies, id.as_str(), &args.payload)?;
        txn.hset(
            WriteMode::MustSucceed,
            &keys.expiries,
            id.as_str(),
            args.expire_at.as_str().as_bytes(),
        )?;

        let now = args.now.as_str().as_bytes();
        txn.hset(
            WriteMode::BestEffort,
            &keys.topic_last_publish,
            &args.topic,
            now,
        )?;
        txn.hset(
            WriteMode::BestEffort,
            &keys.producer_last_seen,
            &args.publisher,
            now,
        )?;

        debug!(topic = %args.topic, id = %id, bytes = args.payload.len(), "published message");
        Ok::<_, TxError>(())
    })
}
