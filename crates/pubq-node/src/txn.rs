use pubq_core::{MsgId, Score};
use pubq_store::{StoreOps, StoreResult, WriteMode, WriteOp};
use tracing::warn;

use crate::error::{TxError, TxResult};

/// Write-mode aware view over one running store transaction.
///
/// Every write names its [`WriteMode`]. A failed `MustSucceed` write becomes
/// [`TxError::Critical`], which the caller propagates so the store rolls the
/// transaction back. A failed `BestEffort` write is logged and reported as
/// `Ok(None)`.
pub(crate) struct Txn<'a> {
    ops: &'a mut dyn StoreOps,
    name: &'static str,
}

impl<'a> Txn<'a> {
    pub(crate) fn new(ops: &'a mut dyn StoreOps, name: &'static str) -> Self {
        Self { ops, name }
    }

    /// Read access; reads are never best-effort.
    pub(crate) fn reader(&self) -> &dyn StoreOps {
        &*self.ops
    }

    fn settle<T>(
        &self,
        mode: WriteMode,
        op: WriteOp,
        key: &str,
        result: StoreResult<T>,
    ) -> TxResult<Option<T>> {
        match result {
            Ok(value) => Ok(Some(value)),
            Err(source) => match mode {
                WriteMode::MustSucceed => Err(TxError::Critical {
                    tx: self.name,
                    op,
                    key: key.to_string(),
                    source,
                }),
                WriteMode::BestEffort => {
                    warn!(
                        tx = self.name,
                        %op,
                        key,
                        error = %source,
                        "best-effort write failed"
                    );
                    Ok(None)
                }
            },
        }
    }

    pub(crate) fn zadd(
        &mut self,
        mode: WriteMode,
        key: &str,
        score: Score,
        id: &MsgId,
    ) -> TxResult<Option<bool>> {
        let result = self.ops.zadd(key, score, id.as_str());
        self.settle(mode, WriteOp::ZAdd, key, result)
    }

    pub(crate) fn zrem(&mut self, mode: WriteMode, key: &str, id: &MsgId) -> TxResult<Option<bool>> {
        let result = self.ops.zrem(key, id.as_str());
        self.settle(mode, WriteOp::ZRem, key, result)
    }

    pub(crate) fn hset(
        &mut self,
        mode: WriteMode,
        key: &str,
        field: &str,
        value: &[u8],
    ) -> TxResult<Option<bool>> {
        let result = self.ops.hset(key, field, value);
        self.settle(mode, WriteOp::HSet, key, result)
    }

    pub(crate) fn hdel(&mut self, mode: WriteMode, key: &str, field: &str) -> TxResult<Option<bool>> {
        let result = self.ops.hdel(key, field);
        self.settle(mode, WriteOp::HDel, key, result)
    }

    pub(crate) fn hincrby(
        &mut self,
        mode: WriteMode,
        key: &str,
        id: &MsgId,
        delta: i64,
    ) -> TxResult<Option<i64>> {
        let result = self.ops.hincrby(key, id.as_str(), delta);
        self.settle(mode, WriteOp::HIncrBy, key, result)
    }

    pub(crate) fn lpush(&mut self, mode: WriteMode, key: &str, id: &MsgId) -> TxResult<Option<usize>> {
        let result = self.ops.lpush(key, id.as_str());
        self.settle(mode, WriteOp::LPush, key, result)
    }

    pub(crate) fn rpush(&mut self, mode: WriteMode, key: &str, id: &MsgId) -> TxResult<Option<usize>> {
        let result = self.ops.rpush(key, id.as_str());
        self.settle(mode, WriteOp::RPush, key, result)
    }

    pub(crate) fn lrem(&mut self, mode: WriteMode, key: &str, id: &MsgId) -> TxResult<Option<usize>> {
        let result = self.ops.lrem(key, id.as_str());
        self.settle(mode, WriteOp::LRem, key, result)
    }

    pub(crate) fn sadd(&mut self, mode: WriteMode, key: &str, id: &MsgId) -> TxResult<Option<bool>> {
        let result = self.ops.sadd(key, id.as_str());
        self.settle(mode, WriteOp::SAdd, key, result)
    }

    pub(crate) fn srem(&mut self, mode: WriteMode, key: &str, id: &MsgId) -> TxResult<Option<bool>> {
        let result = self.ops.srem(key, id.as_str());
        self.settle(mode, WriteOp::SRem, key, result)
    }
}

/// Converts identifiers read back from the store, skipping duplicates.
pub(crate) fn stored_ids(raw: Vec<String>) -> Vec<MsgId> {
    let mut ids: Vec<MsgId> = Vec::with_capacity(raw.len());
    for item in raw {
        if let Ok(id) = MsgId::parse(item) {
            if !ids.contains(&id) {
                ids.push(id);
            }
        }
    }
    ids
}
