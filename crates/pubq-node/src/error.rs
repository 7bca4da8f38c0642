use pubq_core::CoreError;
use pubq_store::{StoreError, WriteOp};
use thiserror::Error;

/// Errors surfaced by broker transactions.
#[derive(Debug, Error)]
pub enum TxError {
    /// A must-succeed write failed; the transaction was rolled back.
    #[error("{tx}: critical {op} on {key} failed: {source}")]
    Critical {
        tx: &'static str,
        op: WriteOp,
        key: String,
        #[source]
        source: StoreError,
    },
    /// The store failed outside a write (unavailable, wrong type on read).
    #[error("store error: {0}")]
    Store(#[from] StoreError),
    #[error(transparent)]
    Core(#[from] CoreError),
    #[error("invalid input: {0}")]
    InvalidInput(&'static str),
}

pub type TxResult<T> = Result<T, TxError>;

impl TxError {
    pub fn is_critical(&self) -> bool {
        matches!(self, TxError::Critical { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::TxError;
    use pubq_store::{StoreError, WriteOp};

    #[test]
    fn critical_error_names_transaction_and_write() {
        let err = TxError::Critical {
            tx: "dispatch",
            op: WriteOp::LPush,
            key: "q:c1".to_string(),
            source: StoreError::Unavailable("down".to_string()),
        };
        assert!(err.is_critical());
        assert_eq!(
            err.to_string(),
            "dispatch: critical lpush on q:c1 failed: store unavailable: down"
        );
    }

    #[test]
    fn store_errors_convert() {
        let err: TxError = StoreError::Unavailable("down".to_string()).into();
        assert!(!err.is_critical());
        assert!(matches!(err, TxError::Store(_)));
    }
}
