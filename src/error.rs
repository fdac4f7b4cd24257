//! Error types shared by the contract client, aggregator and upload paths.

use thiserror::Error as ThisError;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, ThisError)]
pub enum Error {
    #[error("config error: {0}")]
    Config(String),

    /// Transport or JSON-RPC level failure talking to the node.
    #[error("rpc error: {0}")]
    Rpc(String),

    /// Contract returned bytes that do not match the expected ABI shape.
    #[error("decode error: {0}")]
    Decode(String),

    #[error("timed out after {secs}s: {what}")]
    Timeout { what: String, secs: u64 },

    #[error("transaction {tx_hash} reverted")]
    Reverted { tx_hash: String },

    #[error("upload failed: {0}")]
    Upload(String),

    /// Caller-side requirement not met; nothing was sent.
    #[error("{0}")]
    Precondition(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Csv(#[from] csv::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        Error::Rpc(err.to_string())
    }
}

impl Error {
    /// Failures worth resubmitting under a bounded retry policy.
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::Rpc(_) | Error::Timeout { .. })
    }
}
