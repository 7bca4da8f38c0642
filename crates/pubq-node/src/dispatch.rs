use pubq_core::{DeliveryOrder, KeyLayout, MsgId};
use pubq_store::{ScanOrder, Store, WriteMode};
use tracing::debug;

use crate::error::{TxError, TxResult};
use crate::txn::{stored_ids, Txn};

/// Store keys touched by [`dispatch`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchKeys {
    pub backlog: String,
    /// Backlog-full marker owned by the external backlog policy; no step reads it.
    pub backlog_full: String,
    pub unacked: String,
    /// Consumer pull queues receiving every dispatched message.
    pub targets: Vec<String>,
}

impl DispatchKeys {
    pub fn from_layout<C: AsRef<str>>(layout: &KeyLayout, topic: &str, consumers: &[C]) -> Self {
        Self {
            backlog: layout.topic_backlog(topic),
            backlog_full: layout.backlog_full(topic),
            unacked: layout.unacked_counter(),
            targets: consumers.iter().fold(Vec::new(), |mut targets, consumer| {
                let queue = layout.consumer_queue(consumer.as_ref());
                if !targets.contains(&queue) {
                    targets.push(queue);
                }
                targets
            }),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct DispatchArgs {
    pub order: DeliveryOrder,
    /// Maximum number of backlog entries moved per call.
    pub max_depth: usize,
}

/// Result of one dispatch run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchOutcome {
    /// Identifiers moved out of the backlog, in read order.
    pub ids: Vec<MsgId>,
    /// Queue inserts performed (`ids.len() * targets`).
    pub pushes: usize,
}

impl DispatchOutcome {
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

/// Fans a batch of backlog entries out to every target consumer queue.
///
/// Reads up to `max_depth` identifiers (highest score first for FIFO,
/// lowest first for LIFO) and pushes each onto the head of every target
/// queue, incrementing the unacked counter once per push. The batch leaves
/// the backlog only after every target received it.
///
/// Targets must be non-empty and distinct, since a lease drains every copy
/// of an id from a queue. Queue pushes must succeed; counter increments and
/// backlog removal are best-effort.
pub fn dispatch<S: Store>(
    store: &S,
    keys: &DispatchKeys,
    args: DispatchArgs,
) -> TxResult<DispatchOutcome> {
    if keys.targets.is_empty() {
        return Err(TxError::InvalidInput("dispatch requires at least one target queue"));
    }
    for (i, target) in keys.targets.iter().enumerate() {
        if keys.targets[..i].contains(target) {
            return Err(TxError::InvalidInput("dispatch target queues must be distinct"));
        }
    }

    store.atomically(|ops| {
        let mut txn = Txn::new(ops, "dispatch");
        let scan = if args.order.reads_descending() {
            ScanOrder::Descending
        } else {
            ScanOrder::Ascending
        };
        let ids = stored_ids(txn.reader().zrange(&keys.backlog, scan, args.max_depth)?);
        if ids.is_empty() {
            return Ok(DispatchOutcome::default());
        }

        let mut pushes = 0;
        for target in &keys.targets {
            for id in &ids {
                txn.lpush(WriteMode::MustSucceed, target, id)?;
                txn.hincrby(WriteMode::BestEffort, &keys.unacked, id, 1)?;
                pushes += 1;
            }
        }

        for id in &ids {
            txn.zrem(WriteMode::BestEffort, &keys.backlog, id)?;
        }

        debug!(
            backlog = %keys.backlog,
            moved = ids.len(),
            targets = keys.targets.len(),
            "dispatched backlog batch"
        );
        Ok::<_, TxError>(DispatchOutcome { ids, pushes })
    })
}
