use std::cmp::Ordering;
use std::fmt;

use chrono::{DateTime, Utc};
use rand::RngCore;
use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Fixed-width rendering used for every stored timestamp.
///
/// Zero-padded fields with a constant microsecond suffix keep string order
/// equal to time order.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.6f";

/// Caller-generated message identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MsgId(String);

impl MsgId {
    /// Wraps a non-empty identifier.
    pub fn parse(raw: impl Into<String>) -> Result<Self, CoreError> {
        let raw = raw.into();
        if raw.is_empty() {
            return Err(CoreError::InvalidInput("empty message id"));
        }
        Ok(Self(raw))
    }

    /// Generates a random 128-bit identifier rendered as 32 lowercase hex chars.
    pub fn generate() -> Self {
        let mut bytes = [0_u8; 16];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self(hex::encode(bytes))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MsgId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for MsgId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Pre-formatted, lexicographically sortable timestamp.
///
/// The core never parses these values; comparisons are plain string
/// comparisons, so every producer must use the same fixed-width encoding.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timestamp(String);

impl Timestamp {
    /// Accepts a caller-formatted timestamp as-is.
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// Current UTC time in [`TIMESTAMP_FORMAT`].
    pub fn now() -> Self {
        Self::from_datetime(Utc::now())
    }

    pub fn from_datetime(at: DateTime<Utc>) -> Self {
        Self(at.format(TIMESTAMP_FORMAT).to_string())
    }

    /// Whether `now` is strictly later than this timestamp.
    pub fn is_past(&self, now: &Timestamp) -> bool {
        now.0 > self.0
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Backlog ordering score (publish time or sequence number).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Score(pub f64);

impl PartialEq for Score {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Score {}

impl PartialOrd for Score {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Score {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

impl From<f64> for Score {
    fn from(value: f64) -> Self {
        Self(value)
    }
}

impl From<u64> for Score {
    fn from(value: u64) -> Self {
        Self(value as f64)
    }
}

/// Order in which dispatched messages are delivered to consumers.
///
/// The name reflects delivery order. `Fifo` reads the backlog highest score
/// first because consumer queues are filled at the head and leased from the
/// head.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryOrder {
    #[default]
    Fifo,
    Lifo,
}

impl DeliveryOrder {
    /// Whether the backlog is read highest score first.
    pub fn reads_descending(self) -> bool {
        matches!(self, DeliveryOrder::Fifo)
    }
}
