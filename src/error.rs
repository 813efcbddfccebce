use std::path::PathBuf;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("index engine error: {0}")]
    Engine(tantivy::TantivyError),

    #[error("index locked by another writer: {0}")]
    Lock(String),

    #[error("query parse error: {0}")]
    QueryParse(#[from] tantivy::query::QueryParserError),

    #[error("metadata store error: {0}")]
    Meta(#[from] redb::Error),

    #[error("metadata store open error: {0}")]
    MetaOpen(#[from] redb::DatabaseError),

    #[error("metadata storage error: {0}")]
    MetaStorage(#[from] redb::StorageError),

    #[error("metadata transaction error: {0}")]
    MetaTransaction(#[from] redb::TransactionError),

    #[error("metadata table error: {0}")]
    MetaTable(#[from] redb::TableError),

    #[error("metadata commit error: {0}")]
    MetaCommit(#[from] redb::CommitError),

    #[error("record serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("no database found under {0} (import a document to initialize)")]
    Uninitialized(PathBuf),

    #[error("directory {0} exists but does not contain a database")]
    InitializationConflict(PathBuf),

    #[error("database opened read-only")]
    ReadOnly,

    #[error("document already exists for id {0}")]
    DocidInUse(u64),

    #[error("no document found for id {0}")]
    DocNotFound(u64),

    #[error("document has no valid docid")]
    NoDocid,

    #[error("invalid query: {0}")]
    Query(String),

    #[error("multiple documents match term '{term}'")]
    AmbiguousMatch { term: String },

    #[error("sort accepts only 'relevance' or 'year', got '{0}'")]
    InvalidSort(String),

    #[error("file exists at intended document directory location: {0}")]
    DocdirObstructed(PathBuf),

    #[error("could not extract text from '{name}': {reason}")]
    Extraction { name: String, reason: String },

    #[error("source '{name}' does not provide {capability}")]
    SourceCapability {
        name: String,
        capability: &'static str,
    },

    #[error("string matches no known source: {0}")]
    SourceMatch(String),

    #[error("nothing to add: need a file, a source, or a bibliographic record")]
    NothingToAdd,
}

impl From<tantivy::TantivyError> for Error {
    fn from(e: tantivy::TantivyError) -> Self {
        match e {
            tantivy::TantivyError::LockFailure(..) => Error::Lock(e.to_string()),
            other => Error::Engine(other),
        }
    }
}
