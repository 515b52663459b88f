use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// Feed or article page unreachable, timed out or answered non-200.
    #[error("external fetch failed: {0}")]
    ExternalFetch(String),

    /// Classifier pair missing, of the wrong kind or not fitted.
    #[error("classifier pair unusable: {0}")]
    ModelCorruption(String),

    /// A freshly created classifier pair could not be written to disk.
    #[error("failed to persist classifier pair to {path}: {source}")]
    PersistenceWrite {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{0}")]
    Validation(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    Database(#[from] sqlx::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
