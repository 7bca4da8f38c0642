//! Transactional key/value store capability used by the pubq broker core.
//!
//! [`Store`] runs a closure over [`StoreOps`] as one indivisible unit.
//! [`MemoryStore`] is the in-process backend used by the admin tool and tests.

pub mod memory;
pub mod ops;
pub mod persistence;

pub use memory::MemoryStore;
pub use ops::{ScanOrder, Store, StoreError, StoreOps, StoreResult, WriteMode, WriteOp};
