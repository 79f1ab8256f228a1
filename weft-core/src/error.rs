//! Error types for weft-core

use thiserror::Error;
use weft_model::{Cid, CryptoError, LogId, ThreadId};

/// Errors surfaced by thread service operations.
#[derive(Error, Debug)]
pub enum Error {
    #[error("unknown thread: {0}")]
    ThreadUnknown(ThreadId),

    #[error("unknown log: {0}")]
    LogUnknown(LogId),

    /// Signature or AEAD tag failure. Fatal for the operation; the
    /// replication server maps the envelope-signature case to 401.
    #[error("crypto: {0}")]
    CryptoAuth(#[from] CryptoError),

    #[error("codec: {0}")]
    Codec(String),

    #[error("block not found: {0}")]
    NotFound(Cid),

    /// A remote peer returned non-success during push fan-out.
    #[error("replication: {0}")]
    Replication(String),

    #[error("operation canceled")]
    Canceled,

    #[error("block is not an event")]
    InvalidEvent,

    #[error("identity: {0}")]
    Identity(#[from] weft_model::IdentityError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("database error: {0}")]
    Database(#[from] redb::DatabaseError),

    #[error("table error: {0}")]
    Table(#[from] redb::TableError),

    #[error("transaction error: {0}")]
    Transaction(#[from] redb::TransactionError),

    #[error("commit error: {0}")]
    Commit(#[from] redb::CommitError),

    #[error("storage error: {0}")]
    Storage(#[from] redb::StorageError),
}

impl Error {
    /// Whether this error is an authentication failure (signature or AEAD
    /// tag), as opposed to a structural or storage problem.
    pub fn is_auth(&self) -> bool {
        matches!(self, Error::CryptoAuth(_))
    }
}
