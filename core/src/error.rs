use thiserror::Error;

/// Image reaper error types
#[derive(Error, Debug)]
pub enum ReaperError {
    /// Registry listing or deletion call failed
    #[error("Registry error: {repository} - {message}")]
    RegistryError { repository: String, message: String },

    /// A deletion chunk failed after earlier chunks were already applied
    #[error("Deletion incomplete: removed {removed} of {requested} images from {repository} before failure - {message}")]
    PartialDeletion {
        repository: String,
        removed: usize,
        requested: usize,
        message: String,
    },

    /// Version-control oracle could not answer for a tag
    #[error("Classification error: {tag} - {message}")]
    ClassificationError { tag: String, message: String },

    /// Invalid retention parameters
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// I/O error
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl ReaperError {
    /// Number of images that were deleted before this error, if any.
    ///
    /// Deletions are not transactional, so callers must report this count
    /// even though the run failed.
    pub fn removed_count(&self) -> usize {
        match self {
            ReaperError::PartialDeletion { removed, .. } => *removed,
            _ => 0,
        }
    }
}

impl From<serde_json::Error> for ReaperError {
    fn from(err: serde_json::Error) -> Self {
        ReaperError::SerializationError(err.to_string())
    }
}

impl From<serde_yaml::Error> for ReaperError {
    fn from(err: serde_yaml::Error) -> Self {
        ReaperError::SerializationError(err.to_string())
    }
}

/// Result type alias for image reaper operations
pub type Result<T> = std::result::Result<T, ReaperError>;
