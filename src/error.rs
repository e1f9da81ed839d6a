use thiserror::Error;

/// Errors raised by the catalog's persistence and cache layers.
///
/// The search and related-item entry points never surface these to callers;
/// they log and degrade to empty results instead.
#[derive(Debug, Error)]
pub enum CatalogError {
    /// Underlying SQLite error (including FTS5 match-expression syntax errors).
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// A record handed to the writer is unusable as-is.
    #[error("invalid record: {0}")]
    InvalidRecord(String),

    /// Configuration value could not be interpreted.
    #[error("config error: {0}")]
    Config(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, CatalogError>;
