use serde::{Deserialize, Serialize};

/// Builds store key names for topics and consumers under a common prefix.
///
/// Transactions take explicit keys; this layout is a convenience for callers
/// that do not bring their own naming scheme.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyLayout {
    prefix: String,
}

impl Default for KeyLayout {
    fn default() -> Self {
        Self::new("pubq")
    }
}

impl KeyLayout {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Topic-scoped ordered backlog.
    pub fn topic_backlog(&self, topic: &str) -> String {
        format!("{}:topic:backlog:{topic}", self.prefix)
    }

    /// Marker consulted by external backlog-size policy.
    pub fn backlog_full(&self, topic: &str) -> String {
        format!("{}:topic:backlog-full:{topic}", self.prefix)
    }

    pub fn message_bodies(&self) -> String {
        format!("{}:msg:values", self.prefix)
    }

    pub fn message_expiries(&self) -> String {
        format!("{}:msg:expire-at", self.prefix)
    }

    pub fn unacked_counter(&self) -> String {
        format!("{}:msg:unack-counter", self.prefix)
    }

    pub fn topic_last_publish(&self) -> String {
        format!("{}:topic:last-pub-time", self.prefix)
    }

    pub fn producer_last_seen(&self) -> String {
        format!("{}:producer:last-seen", self.prefix)
    }

    pub fn consumer_queue(&self, consumer: &str) -> String {
        format!("{}:consumer:queue:{consumer}", self.prefix)
    }

    pub fn consumer_in_flight_ids(&self, consumer: &str) -> String {
        format!("{}:consumer:in-flight:ids:{consumer}", self.prefix)
    }

    pub fn consumer_in_flight_data(&self, consumer: &str) -> String {
        format!("{}:consumer:in-flight:data:{consumer}", self.prefix)
    }

    /// Every identifier ever routed to `consumer`, scanned by expiry sweeps.
    pub fn consumer_tracking(&self, consumer: &str) -> String {
        format!("{}:consumer:msg-ids:{consumer}", self.prefix)
    }
}
