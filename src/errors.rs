//! Engine-wide error types.

use thiserror::Error;

/// Convenience alias used across the crate.
pub type Result<T> = std::result::Result<T, EngineError>;

/// Root error type for every settlement-engine operation.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("store error: {0}")]
    Store(#[from] rocksdb::Error),

    #[error("corrupted record at {key}: {source}")]
    Corrupted {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("encode error: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("unknown stake tier: {0}")]
    UnknownTier(String),

    #[error("price catalog is empty")]
    CatalogEmpty,

    #[error("insufficient funds: balance {balance}, required {required}")]
    InsufficientFunds { balance: u64, required: u64 },

    #[error("account {0} not found")]
    AccountNotFound(u64),

    #[error("inventory item not found")]
    ItemNotFound,

    #[error("item is not a withdrawable prize")]
    NotWithdrawable,

    #[error("withdrawal task not found")]
    TaskNotFound,

    #[error("free wager cooldown: {remaining_secs}s remaining")]
    Cooldown { remaining_secs: i64 },

    #[error("unknown prize: {0}")]
    UnknownPrize(String),

    #[error("invalid configuration: {0}")]
    Config(String),
}
