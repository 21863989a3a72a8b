/// Error types for the catalog.
use std::path::PathBuf;
use thiserror::Error;

/// Catalog operation result type.
pub type Result<T> = std::result::Result<T, CatalogError>;

/// Errors surfaced by the store and the sync engine.
#[derive(Error, Debug)]
pub enum CatalogError {
    /// SQLite error (open, schema, query, insert)
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Filesystem error on a specific path
    #[error("IO error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A dataset or composite cache descriptor that is not valid JSON for its format
    #[error("Malformed descriptor {}: {source}", .path.display())]
    Descriptor {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// The store file could not be deleted during a rebuild
    #[error("Cannot remove store {}: {source}", .path.display())]
    StoreRemoval {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A failed reset left no store open; reset again to recover
    #[error("Catalog {} is unavailable after a failed reset", .0.display())]
    StoreUnavailable(PathBuf),

    /// The ingestion root does not exist or is not a directory
    #[error("Ingestion root not found: {}", .0.display())]
    MissingRoot(PathBuf),
}

impl CatalogError {
    /// Wrap an I/O error with the path it happened on.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Wrap a JSON error with the descriptor path.
    pub fn descriptor(path: impl Into<PathBuf>, source: serde_json::Error) -> Self {
        Self::Descriptor {
            path: path.into(),
            source,
        }
    }

    /// Whether this error only concerns a single pass directory.
    ///
    /// Database and store-removal failures are fatal to a whole sync run.
    pub fn is_pass_local(&self) -> bool {
        matches!(self, Self::Io { .. } | Self::Descriptor { .. })
    }
}
