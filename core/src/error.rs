use thiserror::Error;

use crate::store::Namespace;

/// Errors raised by the index stores and the engines built on them.
///
/// "Not found" is never an error here: lookups return `Option`. An `Err`
/// always means the storage layer or the persisted data is at fault.
#[derive(Error, Debug)]
pub enum Error {
    #[error("storage error: {0}")]
    Storage(#[from] sled::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("record codec error: {0}")]
    Codec(#[from] bincode::Error),

    /// A persisted value could not be decoded. Only the offending key is lost.
    #[error("corrupt value in {namespace} for key {key}: {reason}")]
    Encoding {
        namespace: Namespace,
        key: String,
        reason: String,
    },

    #[error("registry conflict: {0}")]
    Registry(String),

    /// A derived entry required to score a page is missing.
    #[error("index inconsistency: {0}")]
    Consistency(String),

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl Error {
    pub fn encoding(namespace: Namespace, key: impl ToString, reason: impl ToString) -> Self {
        Error::Encoding { namespace, key: key.to_string(), reason: reason.to_string() }
    }

    pub fn is_encoding(&self) -> bool {
        matches!(self, Error::Encoding { .. })
    }
}

pub type Result<T> = std::result::Result<T, Error>;
