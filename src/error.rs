use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("schema migration {version} ({name}) failed: {source}")]
    Schema {
        version: u32,
        name: &'static str,
        #[source]
        source: rusqlite::Error,
    },

    #[error("unsupported schema version: got {found}, expected at most {supported}")]
    SchemaVersion { found: u32, supported: u32 },

    #[error("database error: {0}")]
    Store(#[from] rusqlite::Error),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid feed: {0}")]
    Feed(String),

    #[error("invalid feed json: {0}")]
    FeedJson(#[from] serde_json::Error),

    #[error("invalid filter: {0}")]
    InvalidFilter(String),

    #[error("validation failed: {}", .0.join("; "))]
    Validation(Vec<String>),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound(_))
    }

    /// A problem with one input record rather than with the store.
    pub fn is_record_error(&self) -> bool {
        matches!(self, Error::Feed(_) | Error::FeedJson(_))
    }
}
