use thiserror::Error;

/// Failure taxonomy for the whole node. Validation variants are local
/// decisions reported back over the RPC surface; only `SyncExhausted` is
/// allowed to take the process down, and only during startup.
#[derive(Debug, Error)]
pub enum ChainError {
    #[error("transaction signature does not verify")]
    InvalidSignature,

    #[error("embedded public key is malformed")]
    InvalidPublicKey,

    #[error("sender {address} holds {balance}, transaction needs {needed}")]
    InsufficientBalance {
        address: String,
        balance: f64,
        needed: f64,
    },

    #[error("merkle root mismatch (block carries {expected}, recomputed {computed})")]
    RootMismatch { expected: String, computed: String },

    #[error("previous block hash does not match the chain tip")]
    LinkageMismatch,

    #[error("block not found: {0}")]
    BlockNotFound(String),

    #[error("storage failure: {0}")]
    Storage(String),

    #[error("network unreachable: {0}")]
    Network(String),

    #[error("leader sync retries exhausted")]
    SyncExhausted,
}

impl From<sled::Error> for ChainError {
    fn from(err: sled::Error) -> Self {
        ChainError::Storage(err.to_string())
    }
}
