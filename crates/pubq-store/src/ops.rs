use std::fmt;

use pubq_core::Score;
use thiserror::Error;

/// How a transaction treats a failed write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    /// Failure aborts the enclosing transaction and rolls back its writes.
    MustSucceed,
    /// Failure is logged and the transaction carries on.
    BestEffort,
}

/// Mutating primitives, used to name failed writes and inject faults.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WriteOp {
    ZAdd,
    ZRem,
    HSet,
    HDel,
    HIncrBy,
    LPush,
    RPush,
    LRem,
    SAdd,
    SRem,
}

impl WriteOp {
    pub fn as_str(self) -> &'static str {
        match self {
            WriteOp::ZAdd => "zadd",
            WriteOp::ZRem => "zrem",
            WriteOp::HSet => "hset",
            WriteOp::HDel => "hdel",
            WriteOp::HIncrBy => "hincrby",
            WriteOp::LPush => "lpush",
            WriteOp::RPush => "rpush",
            WriteOp::LRem => "lrem",
            WriteOp::SAdd => "sadd",
            WriteOp::SRem => "srem",
        }
    }
}

impl fmt::Display for WriteOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Sorted-set range direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanOrder {
    /// Lowest score first.
    Ascending,
    /// Highest score first.
    Descending,
}

/// Errors returned by store backends.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("key {key} holds a different structure type")]
    WrongType { key: String },
    #[error("field {field} of {key} is not an integer")]
    NotAnInteger { key: String, field: String },
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("injected failure on {op} {key}")]
    Injected { op: WriteOp, key: String },
    #[error("snapshot error: {0}")]
    Snapshot(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Typed primitives available inside one transaction.
///
/// Missing keys read as empty collections. A key holds a single structure
/// type, and a collection whose last element is removed stops existing.
pub trait StoreOps {
    /// Adds or rescores `member`; returns whether it was new.
    fn zadd(&mut self, key: &str, score: Score, member: &str) -> StoreResult<bool>;
    /// Returns up to `limit` members in the requested score order.
    fn zrange(&self, key: &str, order: ScanOrder, limit: usize) -> StoreResult<Vec<String>>;
    fn zrem(&mut self, key: &str, member: &str) -> StoreResult<bool>;
    fn zcard(&self, key: &str) -> StoreResult<usize>;

    /// Sets a hash field; returns whether the field was new.
    fn hset(&mut self, key: &str, field: &str, value: &[u8]) -> StoreResult<bool>;
    fn hget(&self, key: &str, field: &str) -> StoreResult<Option<Vec<u8>>>;
    fn hmget(&self, key: &str, fields: &[&str]) -> StoreResult<Vec<Option<Vec<u8>>>>;
    fn hdel(&mut self, key: &str, field: &str) -> StoreResult<bool>;
    /// Adds `delta` to an integer field (missing counts as zero); returns the new value.
    fn hincrby(&mut self, key: &str, field: &str, delta: i64) -> StoreResult<i64>;
    /// All fields ordered by field name.
    fn hgetall(&self, key: &str) -> StoreResult<Vec<(String, Vec<u8>)>>;

    /// Pushes onto the head; returns the new length.
    fn lpush(&mut self, key: &str, value: &str) -> StoreResult<usize>;
    /// Pushes onto the tail; returns the new length.
    fn rpush(&mut self, key: &str, value: &str) -> StoreResult<usize>;
    /// Returns up to `limit` elements starting at the head.
    fn lrange(&self, key: &str, limit: usize) -> StoreResult<Vec<String>>;
    /// Removes every occurrence of `value`; returns how many were removed.
    fn lrem(&mut self, key: &str, value: &str) -> StoreResult<usize>;
    fn llen(&self, key: &str) -> StoreResult<usize>;

    fn sadd(&mut self, key: &str, member: &str) -> StoreResult<bool>;
    fn srem(&mut self, key: &str, member: &str) -> StoreResult<bool>;
    fn sismember(&self, key: &str, member: &str) -> StoreResult<bool>;
    /// Members in ascending order.
    fn smembers(&self, key: &str) -> StoreResult<Vec<String>>;

    fn exists(&self, key: &str) -> StoreResult<bool>;
}

/// Shared transactional store.
///
/// `atomically` executes `f` to completion without interleaving with any
/// other transaction. When `f` returns an error, none of its writes remain
/// visible.
pub trait Store: Send + Sync {
    fn atomically<R, E, F>(&self, f: F) -> Result<R, E>
    where
        F: FnOnce(&mut dyn StoreOps) -> Result<R, E>,
        E: From<StoreError>;
}
