//! pubq broker transactions.
//!
//! Six atomic transactions implement at-least-once pull delivery over a
//! shared [`Store`](pubq_store::Store): publish into a topic backlog,
//! dispatch to consumer queues, lease, reject, ack with reference-counted
//! collection, and expiry sweeping. Tracking, purge, lease reclaim, and
//! inspection helpers sit on top, and [`Broker`] wires them together by
//! topic and consumer name.

pub mod ack;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod inspect;
pub mod lease;
pub mod publish;
pub mod reclaim;
pub mod reject;
pub mod service;
pub mod sweep;
pub mod tracking;
mod txn;

pub use config::BrokerConfig;
pub use error::{TxError, TxResult};
pub use service::{parse_ids, Broker, NewMessage};
