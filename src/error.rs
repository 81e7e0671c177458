use alloy::primitives::Address;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ProbeError>;

#[derive(Debug, Clone, Error)]
pub enum ProbeError {
    /// No bytecode at the chain head: never deployed, or self-destructed
    /// without a redeploy. Terminal, not retryable.
    #[error("no code at chain head for {0:#x}")]
    NotDeployed(Address),
    #[error("oracle error: {0}")]
    Oracle(#[from] OracleError),
    #[error("invalid query: {0}")]
    InvalidQuery(String),
}

#[derive(Debug, Clone, Error)]
pub enum OracleError {
    #[error("transport failure during {context}: {message}")]
    Transport { context: String, message: String },
    #[error("{context} timed out after {elapsed_ms}ms")]
    Timeout { context: String, elapsed_ms: u64 },
}

/// Storage failures are returned explicitly so callers can tell "no value"
/// from "storage broken". The cache adapter downgrades them to a logged miss;
/// nothing else is allowed to swallow them.
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    #[error("sqlite failure during {context}: {message}")]
    Sqlite { context: String, message: String },
    #[error("malformed value for key `{key}`: `{value}`")]
    Malformed { key: String, value: String },
}
