//! Core pubq primitives shared across crates.
//!
//! Includes message identifiers, sortable timestamps, ordering scores,
//! delivery order, store key naming, and base errors.

pub mod error;
pub mod keys;
pub mod types;

pub use error::CoreError;
pub use keys::KeyLayout;
pub use types::{DeliveryOrder, MsgId, Score, Timestamp, TIMESTAMP_FORMAT};
