use logscope_core::QueryError;

/// Boxed cause carried by [`StoreError::Storage`].
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Errors that can occur during log store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// No record with the given id.
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: i64 },

    /// A single insert named an id that is already taken.
    #[error("{entity} {id} already exists")]
    Conflict { entity: &'static str, id: i64 },

    /// The query was rejected before reaching the backend.
    #[error("invalid query: {0}")]
    InvalidQuery(#[from] QueryError),

    /// An error from the underlying storage backend.
    #[error("storage error during {operation}: {source}")]
    Storage {
        /// Store operation that failed, e.g. `find_page`.
        operation: &'static str,
        #[source]
        source: BoxError,
    },

    /// A value read from the backend could not be mapped onto a record.
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl StoreError {
    /// Wrap a backend error for `operation`.
    pub fn storage(operation: &'static str, source: impl Into<BoxError>) -> Self {
        Self::Storage {
            operation,
            source: source.into(),
        }
    }
}
