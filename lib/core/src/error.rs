use crate::item::ItemId;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Invalid vector dimension: expected {expected}, got {actual}")]
    InvalidDimension { expected: usize, actual: usize },

    #[error("Invalid vector: {0}")]
    InvalidVector(String),

    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    #[error("Invalid item {id}: {reason}")]
    InvalidItem { id: ItemId, reason: String },

    #[error("Item already exists: {0}")]
    DuplicateId(ItemId),

    #[error("Item not found: {0}")]
    ItemNotFound(ItemId),

    #[error("Item {0} is indexed but has no catalog entry")]
    DanglingEmbedding(ItemId),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Unknown booster: {0}")]
    UnknownBooster(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Coarse classification used by callers to decide how to surface an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Rejected input; never retried.
    Validation,
    /// Index and catalog disagree about an item.
    DataIntegrity,
    /// Bad weights, unknown boosters or invalid engine settings.
    Configuration,
    /// Store or config file failures.
    External,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::InvalidDimension { .. }
            | Error::InvalidVector(_)
            | Error::InvalidQuery(_)
            | Error::InvalidItem { .. }
            | Error::DuplicateId(_)
            | Error::ItemNotFound(_) => ErrorKind::Validation,
            Error::DanglingEmbedding(_) => ErrorKind::DataIntegrity,
            Error::InvalidConfig(_) | Error::UnknownBooster(_) => ErrorKind::Configuration,
            Error::Io(_) | Error::Serialization(_) => ErrorKind::External,
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}
