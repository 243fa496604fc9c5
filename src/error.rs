//! Crate-wide error type.
//!
//! Every fallible operation in the core returns [`Result`]. The variants map
//! onto the HTTP status codes the server reports:
//!
//! | Variant | Status |
//! |---------|--------|
//! | [`Error::Input`] | 400 |
//! | [`Error::NotFound`] | 404 |
//! | [`Error::Unavailable`] | 503 |
//! | everything else | 500 |

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid input: {0}")]
    Input(String),

    #[error("{kind} not found: {name}")]
    NotFound { kind: &'static str, name: String },

    #[error("{0} unavailable")]
    Unavailable(&'static str),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("archive error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("graph database error: {0}")]
    Kv(#[from] redb::DatabaseError),

    #[error("graph storage error: {0}")]
    KvStorage(#[from] redb::StorageError),

    #[error("graph transaction error: {0}")]
    KvTransaction(#[from] redb::TransactionError),

    #[error("graph table error: {0}")]
    KvTable(#[from] redb::TableError),

    #[error("graph commit error: {0}")]
    KvCommit(#[from] redb::CommitError),
}

impl Error {
    /// Shorthand for an [`Error::Input`] from anything displayable.
    pub fn input(msg: impl Into<String>) -> Self {
        Error::Input(msg.into())
    }

    /// HTTP status code this error should surface as.
    pub fn status(&self) -> u16 {
        match self {
            Error::Input(_) => 400,
            Error::NotFound { .. } => 404,
            Error::Unavailable(_) => 503,
            _ => 500,
        }
    }
}
