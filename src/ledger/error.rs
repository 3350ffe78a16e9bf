use thiserror::Error;

/// Failures of the job ledger keyspace
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("Ledger keyspace error: {0}")]
    Keyspace(#[from] fjall::Error),

    #[error("Job record encoding error: {0}")]
    Encoding(#[from] serde_json::Error),

    /// A stored entry that cannot be read back as written
    #[error("Corrupt ledger entry: {0}")]
    Corrupt(String),

    #[error("Cannot create ledger directory: {0}")]
    Directory(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, LedgerError>;
